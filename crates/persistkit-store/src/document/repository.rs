//! Repository over a document collection

use std::sync::Arc;

use async_trait::async_trait;
use persistkit_core::config::Backend;
use persistkit_core::criteria::{plan, validate_sort, Criteria, QueryPlan};
use persistkit_core::errors::PersistError;
use persistkit_core::log_op_vacuous;
use persistkit_core::logging_facility::observe;
use persistkit_core::mapper::{Mapper, SchemaMapper};
use persistkit_core::registry::EntityConfig;
use persistkit_core::repository::{ListQuery, Repository};
use persistkit_core::value::{EntityId, Record};
use serde_json::Value;
use tokio::sync::OnceCell;

use super::driver::{Document, DocumentCollection, DocumentDatabase, DOCUMENT_ID};
use super::filter::{eq_filter, find_options, to_filter};
use crate::errors::{for_entity, Result};

const BACKEND: &str = "document";

/// Document-store repository
///
/// The identity attribute is stored under `_id`. Unique indexes are
/// created as `uniq_{index}` the first time any data operation runs.
pub struct DocumentRepository {
    entity_key: String,
    mapper: Arc<dyn Mapper>,
    collection: Arc<dyn DocumentCollection>,
    indexes: OnceCell<()>,
}

impl DocumentRepository {
    pub fn new(
        entity_key: impl Into<String>,
        mapper: Arc<dyn Mapper>,
        collection: Arc<dyn DocumentCollection>,
    ) -> Self {
        Self {
            entity_key: entity_key.into(),
            mapper,
            collection,
            indexes: OnceCell::new(),
        }
    }

    /// Repository for a registered entity on `db`
    pub fn from_config(
        entity_key: impl Into<String>,
        config: &EntityConfig,
        db: &dyn DocumentDatabase,
    ) -> Self {
        let mapper: SchemaMapper = config.mapper().with_identity_key(DOCUMENT_ID);
        Self::new(entity_key, Arc::new(mapper), db.collection(&config.collection))
    }

    async fn ensure_indexes(&self) -> Result<()> {
        self.indexes
            .get_or_try_init(|| async {
                for (name, attribute) in self.mapper.unique_fields() {
                    let key = self.mapper.attribute_to_storage_key(attribute);
                    self.collection
                        .create_index(&key, &format!("uniq_{}", name), true)
                        .await
                        .map_err(|e| for_entity(e, &self.entity_key))?;
                }
                tracing::debug!(
                    entity_key = %self.entity_key,
                    collection = %self.collection.name(),
                    "document indexes ready"
                );
                Ok::<(), PersistError>(())
            })
            .await
            .map(|_| ())
    }

    fn identity_filter(&self, id: &EntityId) -> Document {
        eq_filter(self.mapper.identity_storage_key(), id)
    }

    fn load(&self, docs: Vec<Document>) -> Result<Vec<Record>> {
        docs.into_iter().map(|d| self.mapper.from_storage(d)).collect()
    }
}

#[async_trait]
impl Repository for DocumentRepository {
    fn entity_key(&self) -> &str {
        &self.entity_key
    }

    fn backend(&self) -> Backend {
        Backend::Document
    }

    async fn init_indexes(&self) -> Result<()> {
        observe("init_indexes", &self.entity_key, BACKEND, self.ensure_indexes()).await
    }

    async fn add(&self, entity: Record) -> Result<()> {
        observe("add", &self.entity_key, BACKEND, async {
            let doc = self.mapper.to_storage(&entity)?;
            self.ensure_indexes().await?;
            self.collection
                .insert_one(doc)
                .await
                .map_err(|e| for_entity(e, &self.entity_key))
        })
        .await
    }

    async fn get(&self, id: &EntityId) -> Result<Option<Record>> {
        observe("get", &self.entity_key, BACKEND, async {
            self.ensure_indexes().await?;
            self.collection
                .find_one(&self.identity_filter(id))
                .await?
                .map(|d| self.mapper.from_storage(d))
                .transpose()
        })
        .await
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<Record>> {
        observe("list", &self.entity_key, BACKEND, async {
            validate_sort(query.sort.as_ref(), self.mapper.as_ref())?;
            self.ensure_indexes().await?;
            let options = find_options(
                query.sort.as_ref(),
                query.offset,
                query.limit,
                self.mapper.as_ref(),
            );
            let docs = self.collection.find(&Document::new(), &options).await?;
            self.load(docs)
        })
        .await
    }

    async fn update(&self, entity: Record) -> Result<()> {
        observe("update", &self.entity_key, BACKEND, async {
            let id = self.mapper.identity_of(&entity)?;
            let doc = self.mapper.to_storage(&entity)?;
            self.ensure_indexes().await?;
            let matched = self
                .collection
                .replace_one(&self.identity_filter(&id), doc)
                .await
                .map_err(|e| for_entity(e, &self.entity_key))?;
            if matched == 0 {
                tracing::debug!(entity_key = %self.entity_key, id = %id, "update matched nothing");
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &EntityId) -> Result<()> {
        observe("delete", &self.entity_key, BACKEND, async {
            self.ensure_indexes().await?;
            self.collection.delete_one(&self.identity_filter(id)).await?;
            Ok(())
        })
        .await
    }

    async fn get_by_index(&self, index: &str, value: &Value) -> Result<Option<Record>> {
        observe("get_by_index", &self.entity_key, BACKEND, async {
            let Some(attribute) = self.mapper.unique_fields().get(index) else {
                return Ok(None);
            };
            if value.is_null() {
                return Ok(None);
            }
            self.ensure_indexes().await?;
            let key = self.mapper.attribute_to_storage_key(attribute);
            self.collection
                .find_one(&eq_filter(&key, value))
                .await?
                .map(|d| self.mapper.from_storage(d))
                .transpose()
        })
        .await
    }

    async fn list_by_fields(&self, criteria: &Criteria, query: &ListQuery) -> Result<Vec<Record>> {
        observe("list_by_fields", &self.entity_key, BACKEND, async {
            let filter = match plan(criteria, query.sort.as_ref(), self.mapper.as_ref())? {
                QueryPlan::Vacuous => {
                    log_op_vacuous!("list_by_fields", entity_key = self.entity_key.as_str(), backend = BACKEND);
                    return Ok(Vec::new());
                }
                QueryPlan::Filter(c) => to_filter(c, self.mapper.as_ref()),
            };
            self.ensure_indexes().await?;
            let options = find_options(
                query.sort.as_ref(),
                query.offset,
                query.limit,
                self.mapper.as_ref(),
            );
            let docs = self.collection.find(&filter, &options).await?;
            self.load(docs)
        })
        .await
    }
}
