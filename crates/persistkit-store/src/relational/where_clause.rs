//! Criteria → parameterised WHERE clause
//!
//! Each criterion becomes one column predicate and predicates are joined
//! with AND. Values are always bound as parameters, never inlined.

use std::collections::HashSet;

use persistkit_core::criteria::{Criteria, Predicate, RangeOp};
use persistkit_core::errors::{PersistError, Result};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use super::convert::to_sql;
use super::table::{quote_ident, TableSpec};

/// SQL fragment (without the `WHERE` keyword) and its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

struct Builder<'a> {
    spec: &'a TableSpec,
    column: &'a str,
    quoted: String,
    parts: Vec<String>,
    params: Vec<SqlValue>,
}

impl<'a> Builder<'a> {
    fn new(spec: &'a TableSpec, column: &'a str) -> Self {
        Self {
            spec,
            column,
            quoted: quote_ident(column),
            parts: Vec::new(),
            params: Vec::new(),
        }
    }

    fn bind(&mut self, value: &Value) -> Result<()> {
        self.params
            .push(to_sql(self.column, self.spec.kind_of(self.column), value)?);
        Ok(())
    }

    fn raw(&mut self, suffix: &str) {
        self.parts.push(format!("{} {}", self.quoted, suffix));
    }

    fn compare(&mut self, op: &str, value: &Value) -> Result<()> {
        self.raw(&format!("{} ?", op));
        self.bind(value)
    }

    fn equals(&mut self, value: &Value) -> Result<()> {
        if value.is_null() {
            self.raw("IS NULL");
            Ok(())
        } else {
            self.compare("=", value)
        }
    }

    fn not_equals(&mut self, value: &Value) -> Result<()> {
        if value.is_null() {
            self.raw("IS NOT NULL");
            Ok(())
        } else {
            self.compare("<>", value)
        }
    }

    fn one_of(&mut self, values: &[Value]) -> Result<()> {
        let marks = vec!["?"; values.len()].join(", ");
        self.raw(&format!("IN ({})", marks));
        for v in values {
            self.bind(v)?;
        }
        Ok(())
    }

    fn range(&mut self, op: &RangeOp) -> Result<()> {
        match op {
            RangeOp::Gte(v) => self.compare(">=", v),
            RangeOp::Gt(v) => self.compare(">", v),
            RangeOp::Lte(v) => self.compare("<=", v),
            RangeOp::Lt(v) => self.compare("<", v),
            RangeOp::Between(lo, hi) => {
                self.raw("BETWEEN ? AND ?");
                self.bind(lo)?;
                self.bind(hi)
            }
            RangeOp::In(values) => self.one_of(values),
            RangeOp::Eq(v) => self.equals(v),
            RangeOp::Ne(v) => self.not_equals(v),
        }
    }
}

/// Translate validated criteria against the table's actual columns
///
/// # Errors
///
/// `UnknownColumn` when a declared attribute has no column on the table,
/// `Serialization` when an operand cannot be bound for the column's kind.
pub fn build_where(
    criteria: &Criteria,
    spec: &TableSpec,
    columns: &HashSet<String>,
) -> Result<WhereClause> {
    let mut parts = Vec::new();
    let mut params = Vec::new();

    for criterion in criteria.iter() {
        let column = criterion.field.as_str();
        if !columns.contains(column) {
            return Err(PersistError::UnknownColumn {
                table: spec.table.clone(),
                column: column.to_string(),
            });
        }

        let mut builder = Builder::new(spec, column);
        match &criterion.predicate {
            Predicate::Null => builder.raw("IS NULL"),
            Predicate::Equals(v) => builder.equals(v)?,
            Predicate::NotEquals(v) => builder.not_equals(v)?,
            Predicate::MultiValue(values) => builder.one_of(values)?,
            Predicate::Range(ops) => {
                for op in ops {
                    builder.range(op)?;
                }
            }
        }
        parts.extend(builder.parts);
        params.extend(builder.params);
    }

    Ok(WhereClause {
        sql: parts.join(" AND "),
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistkit_core::mapper::{EntitySchema, FieldKind};
    use persistkit_core::registry::EntityConfig;
    use serde_json::json;

    fn spec() -> TableSpec {
        TableSpec::from_config(&EntityConfig::new(
            EntitySchema::new("Order")
                .field("id", FieldKind::Integer)
                .field("total", FieldKind::Real)
                .field("status", FieldKind::Text)
                .optional_field("note", FieldKind::Text)
                .optional_field("archived", FieldKind::Boolean),
            "orders",
        ))
    }

    fn all_columns() -> HashSet<String> {
        spec().columns().into_iter().collect()
    }

    #[test]
    fn test_between_is_inclusive_range() {
        let criteria = Criteria::new().between("total", 10, 20);
        let clause = build_where(&criteria, &spec(), &all_columns()).unwrap();
        assert_eq!(clause.sql, "\"total\" BETWEEN ? AND ?");
        assert_eq!(clause.params, vec![SqlValue::Real(10.0), SqlValue::Real(20.0)]);
    }

    #[test]
    fn test_predicates_join_with_and() {
        let criteria = Criteria::new()
            .is_null("note")
            .any_of("status", ["open", "paid"])
            .ne("archived", true);
        let clause = build_where(&criteria, &spec(), &all_columns()).unwrap();
        assert_eq!(
            clause.sql,
            "\"note\" IS NULL AND \"status\" IN (?, ?) AND \"archived\" <> ?"
        );
        assert_eq!(
            clause.params,
            vec![
                SqlValue::Text("open".into()),
                SqlValue::Text("paid".into()),
                SqlValue::Integer(1)
            ]
        );
    }

    #[test]
    fn test_range_object() {
        let criteria = Criteria::from_json(&json!({"total": {"gte": 10, "lt": 20}})).unwrap();
        let clause = build_where(&criteria, &spec(), &all_columns()).unwrap();
        assert_eq!(clause.sql, "\"total\" >= ? AND \"total\" < ?");
    }

    #[test]
    fn test_null_equality_uses_is_null() {
        let criteria = Criteria::new().eq("note", Value::Null);
        let clause = build_where(&criteria, &spec(), &all_columns()).unwrap();
        assert_eq!(clause.sql, "\"note\" IS NULL");
        assert!(clause.params.is_empty());
    }

    #[test]
    fn test_missing_column_is_unknown_column() {
        let mut columns = all_columns();
        columns.remove("note");
        let err = build_where(&Criteria::new().eq("note", "x"), &spec(), &columns).unwrap_err();
        assert!(matches!(err, PersistError::UnknownColumn { ref column, .. } if column == "note"));
    }
}
