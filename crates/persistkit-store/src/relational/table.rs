//! Table layout derived from an entity schema

use std::collections::BTreeMap;
use std::sync::Arc;

use persistkit_core::mapper::{EntitySchema, FieldKind};
use persistkit_core::registry::EntityConfig;
use persistkit_core::value::ID_FIELD;

/// Quote an identifier for SQLite
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Column type for a declared field kind
pub fn column_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Text
        | FieldKind::Uuid
        | FieldKind::Timestamp
        | FieldKind::Json
        | FieldKind::UuidList => "TEXT",
        FieldKind::Integer | FieldKind::Boolean => "INTEGER",
        FieldKind::Real => "REAL",
    }
}

/// Everything needed to create, evolve and query one entity table
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub table: String,
    pub schema: Arc<EntitySchema>,
    /// Unique index name → attribute
    pub unique: BTreeMap<String, String>,
    /// Local field → (target table, target column)
    pub foreign_keys: BTreeMap<String, (String, String)>,
    /// Local fields of single-valued relations; each gets a lookup index
    pub lookup_fields: Vec<String>,
}

impl TableSpec {
    /// Layout for a registered entity, without foreign keys
    pub fn from_config(config: &EntityConfig) -> Self {
        let mut lookup_fields: Vec<String> = config
            .relations
            .values()
            .filter(|r| !r.many)
            .map(|r| r.local_field.clone())
            .collect();
        lookup_fields.sort();
        lookup_fields.dedup();
        Self {
            table: config.collection.clone(),
            schema: config.schema.clone(),
            unique: config.unique.clone(),
            foreign_keys: BTreeMap::new(),
            lookup_fields,
        }
    }

    pub fn with_foreign_keys(mut self, foreign_keys: BTreeMap<String, (String, String)>) -> Self {
        self.foreign_keys = foreign_keys;
        self
    }

    /// Identity column followed by data columns, in declaration order
    pub fn columns(&self) -> Vec<String> {
        std::iter::once(ID_FIELD.to_string())
            .chain(self.schema.data_fields().map(|f| f.name.clone()))
            .collect()
    }

    /// Declared kind of a column; `None` for an untyped identity
    pub fn kind_of(&self, column: &str) -> Option<FieldKind> {
        self.schema.field_def(column).map(|f| f.kind)
    }

    /// Column definition as it appears in CREATE TABLE and ALTER TABLE
    pub fn column_def(&self, column: &str) -> String {
        let mut def = quote_ident(column);
        if let Some(kind) = self.kind_of(column) {
            def.push(' ');
            def.push_str(column_type(kind));
        }
        def
    }

    /// `CREATE TABLE IF NOT EXISTS` statement
    pub fn create_table_sql(&self) -> String {
        let mut parts = vec![format!("{} PRIMARY KEY", self.column_def(ID_FIELD))];
        for field in self.schema.data_fields() {
            let mut def = self.column_def(&field.name);
            if !field.optional {
                def.push_str(" NOT NULL");
            }
            parts.push(def);
        }
        for (local, (target_table, target_column)) in &self.foreign_keys {
            parts.push(format!(
                "FOREIGN KEY ({}) REFERENCES {}({})",
                quote_ident(local),
                quote_ident(target_table),
                quote_ident(target_column)
            ));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            quote_ident(&self.table),
            parts.join(",\n    ")
        )
    }

    pub fn unique_index_name(&self, index: &str) -> String {
        format!("uniq_{}_{}", index, self.table)
    }

    pub fn lookup_index_name(&self, local_field: &str) -> String {
        format!("idx_{}_{}", self.table, local_field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistkit_core::registry::Relation;

    fn orders() -> EntityConfig {
        EntityConfig::new(
            EntitySchema::new("Order")
                .field("id", FieldKind::Integer)
                .field("customerId", FieldKind::Integer)
                .field("total", FieldKind::Real)
                .optional_field("productIds", FieldKind::UuidList),
            "orders",
        )
        .relation("customer", Relation::one("customerId", "customer"))
        .relation("products", Relation::many("productIds", "product"))
    }

    #[test]
    fn test_create_table_sql() {
        let mut fks = BTreeMap::new();
        fks.insert("customerId".to_string(), ("customers".to_string(), "id".to_string()));
        let spec = TableSpec::from_config(&orders()).with_foreign_keys(fks);

        assert_eq!(
            spec.create_table_sql(),
            "CREATE TABLE IF NOT EXISTS \"orders\" (\n    \
             \"id\" INTEGER PRIMARY KEY,\n    \
             \"customerId\" INTEGER NOT NULL,\n    \
             \"total\" REAL NOT NULL,\n    \
             \"productIds\" TEXT,\n    \
             FOREIGN KEY (\"customerId\") REFERENCES \"customers\"(\"id\")\n)"
        );
    }

    #[test]
    fn test_lookup_fields_only_for_single_relations() {
        let spec = TableSpec::from_config(&orders());
        assert_eq!(spec.lookup_fields, vec!["customerId".to_string()]);
        assert_eq!(spec.lookup_index_name("customerId"), "idx_orders_customerId");
        assert_eq!(spec.unique_index_name("email"), "uniq_email_orders");
    }

    #[test]
    fn test_untyped_identity_column() {
        let spec = TableSpec::from_config(&EntityConfig::new(EntitySchema::new("Tag"), "tags"));
        assert_eq!(spec.column_def("id"), "\"id\"");
        assert_eq!(spec.columns(), vec!["id".to_string()]);
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
