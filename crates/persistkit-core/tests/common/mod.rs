use std::collections::HashMap;
use std::sync::Arc;

use persistkit_core::errors::{PersistError, Result};
use persistkit_core::mapper::{EntitySchema, FieldKind};
use persistkit_core::registry::{EntityConfig, EntityRegistry, Relation};
use persistkit_core::repository::{Repository, RepositoryResolver};
use persistkit_core::value::Record;
use persistkit_core::MemoryRepository;
use serde_json::Value;

/// Resolver over a fixed set of memory repositories, one per registry entry
#[allow(dead_code)]
pub struct MapResolver {
    repos: HashMap<String, Arc<dyn Repository>>,
}

#[allow(dead_code)]
impl MapResolver {
    pub fn for_registry(registry: &EntityRegistry) -> Self {
        let repos = registry
            .keys()
            .map(|key| {
                let config = registry.get_config(key).unwrap();
                let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::from_config(key, config));
                (key.to_string(), repo)
            })
            .collect();
        Self { repos }
    }

    pub fn repo(&self, key: &str) -> Arc<dyn Repository> {
        self.repos.get(key).cloned().unwrap()
    }
}

impl RepositoryResolver for MapResolver {
    fn resolve(&self, entity_key: &str) -> Result<Arc<dyn Repository>> {
        self.repos
            .get(entity_key)
            .cloned()
            .ok_or_else(|| PersistError::UnknownEntity {
                entity_key: entity_key.to_string(),
            })
    }
}

/// Convert a `json!({...})` literal into a record
#[allow(dead_code)]
pub fn rec(v: Value) -> Record {
    v.as_object().cloned().unwrap()
}

/// Orders referencing customers (by id) and products (many, by id)
#[allow(dead_code)]
pub fn shop_registry() -> EntityRegistry {
    EntityRegistry::builder()
        .register(
            "customer",
            EntityConfig::new(
                EntitySchema::new("Customer")
                    .field("id", FieldKind::Integer)
                    .field("name", FieldKind::Text)
                    .optional_field("email", FieldKind::Text),
                "customers",
            )
            .unique("email", "email"),
        )
        .register(
            "product",
            EntityConfig::new(
                EntitySchema::new("Product")
                    .field("id", FieldKind::Text)
                    .field("title", FieldKind::Text),
                "products",
            ),
        )
        .register(
            "order",
            EntityConfig::new(
                EntitySchema::new("Order")
                    .field("id", FieldKind::Integer)
                    .field("customerId", FieldKind::Integer)
                    .field("total", FieldKind::Real)
                    .optional_field("productIds", FieldKind::Json)
                    .optional_field("contactEmail", FieldKind::Text),
                "orders",
            )
            .relation("customer", Relation::one("customerId", "customer"))
            .relation("products", Relation::many("productIds", "product"))
            .relation("contact", Relation::one("contactEmail", "customer").by("email")),
        )
        .build()
        .unwrap()
}

/// Posts → author (user) → company
#[allow(dead_code)]
pub fn blog_registry() -> EntityRegistry {
    EntityRegistry::builder()
        .register(
            "company",
            EntityConfig::new(EntitySchema::new("Company").field("name", FieldKind::Text), "companies"),
        )
        .register(
            "user",
            EntityConfig::new(
                EntitySchema::new("User")
                    .field("name", FieldKind::Text)
                    .optional_field("companyId", FieldKind::Text),
                "users",
            )
            .relation("company", Relation::one("companyId", "company")),
        )
        .register(
            "post",
            EntityConfig::new(
                EntitySchema::new("Post")
                    .field("title", FieldKind::Text)
                    .field("authorId", FieldKind::Text),
                "posts",
            )
            .relation("author", Relation::one("authorId", "user")),
        )
        .build()
        .unwrap()
}
