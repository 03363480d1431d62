//! Entity registry: entity key → schema, storage name, indexes, relations
//!
//! Built once at startup through [`RegistryBuilder`] and read-only
//! afterwards. Building validates that every relation points at a
//! registered entity and that every referenced attribute is declared.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::Backend;
use crate::errors::{PersistError, Result};
use crate::mapper::{EntitySchema, SchemaMapper};
use crate::value::ID_FIELD;

/// Declared reference from one entity to another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Attribute on the owning entity holding the reference(s)
    pub local_field: String,
    /// Entity key of the referenced entity
    pub target: String,
    /// `id`, or the name of a unique index on the target
    pub by: String,
    pub many: bool,
}

impl Relation {
    /// Single-valued relation resolved by identity
    pub fn one(local_field: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            local_field: local_field.into(),
            target: target.into(),
            by: ID_FIELD.to_string(),
            many: false,
        }
    }

    /// Many-valued relation resolved by identity
    pub fn many(local_field: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            many: true,
            ..Self::one(local_field, target)
        }
    }

    /// Resolve through a unique index on the target instead of its identity
    pub fn by(mut self, index: impl Into<String>) -> Self {
        self.by = index.into();
        self
    }

    pub fn by_identity(&self) -> bool {
        self.by == ID_FIELD
    }
}

/// Everything the factory needs to build repositories for one entity
#[derive(Debug, Clone)]
pub struct EntityConfig {
    pub schema: Arc<EntitySchema>,
    /// Collection (document) or table (relational) name
    pub collection: String,
    /// Unique index name → attribute
    pub unique: BTreeMap<String, String>,
    /// Entity-level backend override
    pub backend: Option<Backend>,
    /// Relation name → declaration
    pub relations: BTreeMap<String, Relation>,
}

impl EntityConfig {
    pub fn new(schema: EntitySchema, collection: impl Into<String>) -> Self {
        Self {
            schema: Arc::new(schema),
            collection: collection.into(),
            unique: BTreeMap::new(),
            backend: None,
            relations: BTreeMap::new(),
        }
    }

    pub fn unique(mut self, index: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.unique.insert(index.into(), attribute.into());
        self
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn relation(mut self, name: impl Into<String>, relation: Relation) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }

    /// Mapper with the identity stored under `id`
    pub fn mapper(&self) -> SchemaMapper {
        SchemaMapper::new(self.schema.clone(), self.collection.clone(), self.unique.clone())
    }
}

/// Read-only entity registry
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entries: BTreeMap<String, EntityConfig>,
}

impl EntityRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// # Errors
    ///
    /// `UnknownEntity` if `key` was never registered.
    pub fn get_config(&self, key: &str) -> Result<&EntityConfig> {
        self.entries.get(key).ok_or_else(|| PersistError::UnknownEntity {
            entity_key: key.to_string(),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// # Errors
    ///
    /// `UnknownEntity` if `key` was never registered.
    pub fn collection_name(&self, key: &str) -> Result<&str> {
        self.get_config(key).map(|c| c.collection.as_str())
    }

    /// # Errors
    ///
    /// `UnknownEntity` if `key` was never registered.
    pub fn relations(&self, key: &str) -> Result<&BTreeMap<String, Relation>> {
        self.get_config(key).map(|c| &c.relations)
    }

    /// Local field → (target table, target column) for single-valued relations
    ///
    /// # Errors
    ///
    /// `UnknownEntity` if `key` or a relation target was never registered.
    pub fn foreign_keys(&self, key: &str) -> Result<BTreeMap<String, (String, String)>> {
        let mut fks = BTreeMap::new();
        for relation in self.get_config(key)?.relations.values() {
            if relation.many {
                continue;
            }
            let target = self.get_config(&relation.target)?;
            let column = target
                .unique
                .get(&relation.by)
                .cloned()
                .unwrap_or_else(|| relation.by.clone());
            fks.insert(
                relation.local_field.clone(),
                (target.collection.clone(), column),
            );
        }
        Ok(fks)
    }

    /// Registered entity keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: BTreeMap<String, EntityConfig>,
}

impl RegistryBuilder {
    /// Register (or replace) an entity
    pub fn register(mut self, key: impl Into<String>, config: EntityConfig) -> Self {
        self.entries.insert(key.into(), config);
        self
    }

    /// Validate and freeze
    ///
    /// # Errors
    ///
    /// `Configuration` when a unique index or relation names an undeclared
    /// attribute, a relation targets an unregistered entity, or a relation
    /// resolves through an index the target does not declare.
    pub fn build(self) -> Result<EntityRegistry> {
        for (key, config) in &self.entries {
            for (index, attribute) in &config.unique {
                if !config.schema.has_attribute(attribute) {
                    return Err(invalid(format!(
                        "unique index '{}' on '{}' names undeclared attribute '{}'",
                        index, key, attribute
                    )));
                }
            }
            for (name, relation) in &config.relations {
                if !config.schema.has_attribute(&relation.local_field) {
                    return Err(invalid(format!(
                        "relation '{}.{}' uses undeclared local field '{}'",
                        key, name, relation.local_field
                    )));
                }
                let target = self.entries.get(&relation.target).ok_or_else(|| {
                    invalid(format!(
                        "relation '{}.{}' targets unregistered entity '{}'",
                        key, name, relation.target
                    ))
                })?;
                if !relation.by_identity() && !target.unique.contains_key(&relation.by) {
                    return Err(invalid(format!(
                        "relation '{}.{}' resolves by '{}', which is not a unique index of '{}'",
                        key, name, relation.by, relation.target
                    )));
                }
            }
        }
        Ok(EntityRegistry {
            entries: self.entries,
        })
    }
}

fn invalid(message: String) -> PersistError {
    PersistError::Configuration { message }
}
