//! Entity schema and the mapper contract between attribute and storage space

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{PersistError, Result};
use crate::value::{EntityId, Record, ID_FIELD};

/// Declared type of an entity attribute
///
/// Drives relational column types and row conversion. The memory and
/// document backends store JSON values as given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Integer,
    Real,
    Boolean,
    Uuid,
    Timestamp,
    Json,
    UuidList,
}

/// One declared attribute of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub optional: bool,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            optional: false,
        }
    }

    /// Mark the attribute nullable
    pub fn nullable(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Attribute list of an entity type
///
/// The identity attribute `id` is always part of the schema; listing it
/// explicitly only pins its column type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    name: String,
    fields: Vec<FieldDef>,
}

impl EntitySchema {
    /// Create an empty schema for the named entity type
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a required attribute
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.push(FieldDef::new(name, kind));
        self
    }

    /// Add a nullable attribute
    pub fn optional_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.push(FieldDef::new(name, kind).nullable());
        self
    }

    fn push(&mut self, def: FieldDef) {
        if let Some(existing) = self.fields.iter_mut().find(|f| f.name == def.name) {
            *existing = def;
        } else {
            self.fields.push(def);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared attributes in declaration order (identity only if listed)
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Declared kind of the identity attribute, if pinned
    pub fn identity_kind(&self) -> Option<FieldKind> {
        self.field_def(ID_FIELD).map(|f| f.kind)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        name == ID_FIELD || self.field_def(name).is_some()
    }

    /// Non-identity attributes in declaration order
    pub fn data_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.name != ID_FIELD)
    }
}

/// Bidirectional mapping between an entity record and its storage form
///
/// Every backend repository talks to its entity only through this trait.
pub trait Mapper: Send + Sync {
    /// Entity type name used in error messages
    fn entity_name(&self) -> &str;

    /// Collection or table name
    fn collection_name(&self) -> &str;

    fn schema(&self) -> &EntitySchema;

    /// Identity of an entity; fails when absent or not a scalar
    fn identity_of(&self, entity: &Record) -> Result<EntityId>;

    fn to_storage(&self, entity: &Record) -> Result<Record>;

    fn from_storage(&self, stored: Record) -> Result<Record>;

    /// Storage key the identity lives under (`id` or `_id`)
    fn identity_storage_key(&self) -> &str;

    /// Unique index name → attribute
    fn unique_fields(&self) -> &BTreeMap<String, String>;

    fn has_attribute(&self, name: &str) -> bool;

    fn attribute_to_storage_key(&self, name: &str) -> String;
}

/// Schema-driven mapper shared by all three backends
///
/// Attributes keep their names in storage except the identity, which is
/// stored under `identity_key`. Undeclared keys are dropped on the way in
/// and on the way out.
#[derive(Debug, Clone)]
pub struct SchemaMapper {
    schema: Arc<EntitySchema>,
    collection: String,
    identity_key: String,
    unique: BTreeMap<String, String>,
}

impl SchemaMapper {
    pub fn new(
        schema: Arc<EntitySchema>,
        collection: impl Into<String>,
        unique: BTreeMap<String, String>,
    ) -> Self {
        Self {
            schema,
            collection: collection.into(),
            identity_key: ID_FIELD.to_string(),
            unique,
        }
    }

    /// Store the identity under a different key (the document backend uses `_id`)
    pub fn with_identity_key(mut self, key: impl Into<String>) -> Self {
        self.identity_key = key.into();
        self
    }

    fn invalid(&self, reason: impl Into<String>) -> PersistError {
        PersistError::InvalidEntity {
            entity: self.schema.name().to_string(),
            reason: reason.into(),
        }
    }
}

impl Mapper for SchemaMapper {
    fn entity_name(&self) -> &str {
        self.schema.name()
    }

    fn collection_name(&self) -> &str {
        &self.collection
    }

    fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    fn identity_of(&self, entity: &Record) -> Result<EntityId> {
        match entity.get(ID_FIELD) {
            Some(v @ (Value::String(_) | Value::Number(_))) => Ok(v.clone()),
            Some(Value::Null) | None => Err(self.invalid("missing identity 'id'")),
            Some(other) => Err(self.invalid(format!("identity must be a string or number, got {}", other))),
        }
    }

    fn to_storage(&self, entity: &Record) -> Result<Record> {
        let id = self.identity_of(entity)?;
        let mut stored = Record::new();
        stored.insert(self.identity_key.clone(), id);
        for def in self.schema.data_fields() {
            if let Some(v) = entity.get(&def.name) {
                stored.insert(def.name.clone(), v.clone());
            }
        }
        Ok(stored)
    }

    fn from_storage(&self, mut stored: Record) -> Result<Record> {
        let id = stored
            .remove(&self.identity_key)
            .ok_or_else(|| self.invalid(format!("stored record has no '{}'", self.identity_key)))?;
        let mut entity = Record::new();
        entity.insert(ID_FIELD.to_string(), id);
        for def in self.schema.data_fields() {
            if let Some(v) = stored.remove(&def.name) {
                entity.insert(def.name.clone(), v);
            }
        }
        Ok(entity)
    }

    fn identity_storage_key(&self) -> &str {
        &self.identity_key
    }

    fn unique_fields(&self) -> &BTreeMap<String, String> {
        &self.unique
    }

    fn has_attribute(&self, name: &str) -> bool {
        self.schema.has_attribute(name)
    }

    fn attribute_to_storage_key(&self, name: &str) -> String {
        if name == ID_FIELD {
            self.identity_key.clone()
        } else {
            name.to_string()
        }
    }
}
