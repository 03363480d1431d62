//! In-memory repository for development and tests

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::config::Backend;
use crate::criteria::{plan, sort_records, validate_sort, Criteria, MemoryFilter, QueryPlan};
use crate::errors::{PersistError, Result};
use crate::log_op_vacuous;
use crate::logging_facility::observe;
use crate::mapper::Mapper;
use crate::registry::EntityConfig;
use crate::repository::{ListQuery, Repository};
use crate::value::{field_value, value_key, EntityId, Record};

const BACKEND: &str = "memory";

/// Repository over a process-local map with unique indexes
///
/// `list` and `list_by_fields` keep insertion order unless a sort is given.
pub struct MemoryRepository {
    entity_key: String,
    mapper: Arc<dyn Mapper>,
    data: Arc<RwLock<MemoryStore>>,
}

#[derive(Default)]
struct MemoryStore {
    /// Identity key → (insertion sequence, stored record)
    items: HashMap<String, (u64, Record)>,

    /// Insertion sequence → identity key
    order: BTreeMap<u64, String>,

    /// Index name → indexed value key → identity key
    indexes: HashMap<String, HashMap<String, String>>,

    next_seq: u64,
}

impl MemoryStore {
    fn index_entries(&self, mapper: &dyn Mapper, record: &Record) -> Vec<(String, String)> {
        mapper
            .unique_fields()
            .iter()
            .filter_map(|(name, attr)| {
                value_key(field_value(record, attr)).map(|k| (name.clone(), k))
            })
            .collect()
    }

    /// First unique index whose value is held by a different identity
    fn collision(&self, entries: &[(String, String)], id_key: &str) -> Option<String> {
        entries.iter().find_map(|(name, k)| {
            self.indexes
                .get(name)
                .and_then(|idx| idx.get(k))
                .filter(|owner| owner.as_str() != id_key)
                .map(|_| name.clone())
        })
    }

    fn unindex(&mut self, entries: &[(String, String)], id_key: &str) {
        for (name, k) in entries {
            if let Some(idx) = self.indexes.get_mut(name) {
                if idx.get(k).map(String::as_str) == Some(id_key) {
                    idx.remove(k);
                }
            }
        }
    }

    fn index(&mut self, entries: Vec<(String, String)>, id_key: &str) {
        for (name, k) in entries {
            self.indexes
                .entry(name)
                .or_default()
                .insert(k, id_key.to_string());
        }
    }

    fn ordered(&self) -> Vec<Record> {
        self.order
            .values()
            .filter_map(|id_key| self.items.get(id_key).map(|(_, r)| r.clone()))
            .collect()
    }
}

impl MemoryRepository {
    pub fn new(entity_key: impl Into<String>, mapper: Arc<dyn Mapper>) -> Self {
        Self {
            entity_key: entity_key.into(),
            mapper,
            data: Arc::new(RwLock::new(MemoryStore::default())),
        }
    }

    pub fn from_config(entity_key: impl Into<String>, config: &EntityConfig) -> Self {
        Self::new(entity_key, Arc::new(config.mapper()))
    }

    /// Number of stored entities
    pub async fn len(&self) -> usize {
        self.data.read().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn identity_key(&self, id: &EntityId) -> Option<String> {
        value_key(id)
    }

    fn violation(&self, constraint: &str, message: String) -> PersistError {
        PersistError::ConstraintViolation {
            entity: self.entity_key.clone(),
            constraint: constraint.to_string(),
            message,
        }
    }

    fn load(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        records
            .into_iter()
            .map(|r| self.mapper.from_storage(r))
            .collect()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    fn entity_key(&self) -> &str {
        &self.entity_key
    }

    fn backend(&self) -> Backend {
        Backend::Memory
    }

    async fn add(&self, entity: Record) -> Result<()> {
        observe("add", &self.entity_key, BACKEND, async {
            let id = self.mapper.identity_of(&entity)?;
            let record = self.mapper.to_storage(&entity)?;
            let id_key = self.identity_key(&id).unwrap_or_default();

            let mut store = self.data.write().await;
            if store.items.contains_key(&id_key) {
                return Err(self.violation("primary key", format!("duplicate identity {}", id)));
            }
            let entries = store.index_entries(self.mapper.as_ref(), &record);
            if let Some(name) = store.collision(&entries, &id_key) {
                return Err(self.violation(&name, "duplicate value for unique index".to_string()));
            }

            let seq = store.next_seq;
            store.next_seq += 1;
            store.index(entries, &id_key);
            store.order.insert(seq, id_key.clone());
            store.items.insert(id_key, (seq, record));
            Ok(())
        })
        .await
    }

    async fn get(&self, id: &EntityId) -> Result<Option<Record>> {
        observe("get", &self.entity_key, BACKEND, async {
            let Some(id_key) = self.identity_key(id) else {
                return Ok(None);
            };
            let store = self.data.read().await;
            store
                .items
                .get(&id_key)
                .map(|(_, r)| self.mapper.from_storage(r.clone()))
                .transpose()
        })
        .await
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<Record>> {
        observe("list", &self.entity_key, BACKEND, async {
            validate_sort(query.sort.as_ref(), self.mapper.as_ref())?;
            let mut records = self.data.read().await.ordered();
            if let Some(sort) = &query.sort {
                sort_records(&mut records, sort);
            }
            self.load(query.window(records))
        })
        .await
    }

    async fn update(&self, entity: Record) -> Result<()> {
        observe("update", &self.entity_key, BACKEND, async {
            let id = self.mapper.identity_of(&entity)?;
            let record = self.mapper.to_storage(&entity)?;
            let id_key = self.identity_key(&id).unwrap_or_default();

            let mut store = self.data.write().await;
            let Some((seq, previous)) = store.items.get(&id_key).cloned() else {
                return Ok(());
            };
            let entries = store.index_entries(self.mapper.as_ref(), &record);
            if let Some(name) = store.collision(&entries, &id_key) {
                return Err(self.violation(&name, "duplicate value for unique index".to_string()));
            }

            let stale = store.index_entries(self.mapper.as_ref(), &previous);
            store.unindex(&stale, &id_key);
            store.index(entries, &id_key);
            store.items.insert(id_key, (seq, record));
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &EntityId) -> Result<()> {
        observe("delete", &self.entity_key, BACKEND, async {
            let Some(id_key) = self.identity_key(id) else {
                return Ok(());
            };
            let mut store = self.data.write().await;
            if let Some((seq, previous)) = store.items.remove(&id_key) {
                let stale = store.index_entries(self.mapper.as_ref(), &previous);
                store.unindex(&stale, &id_key);
                store.order.remove(&seq);
            }
            Ok(())
        })
        .await
    }

    async fn get_by_index(&self, index: &str, value: &Value) -> Result<Option<Record>> {
        observe("get_by_index", &self.entity_key, BACKEND, async {
            let Some(k) = value_key(value) else {
                return Ok(None);
            };
            let store = self.data.read().await;
            store
                .indexes
                .get(index)
                .and_then(|idx| idx.get(&k))
                .and_then(|id_key| store.items.get(id_key))
                .map(|(_, r)| self.mapper.from_storage(r.clone()))
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
                QueryPlan::Filter(c) => MemoryFilter::compile(c),
            };
            let mut matched: Vec<Record> = self
                .data
                .read()
                .await
                .ordered()
                .into_iter()
                .filter(|r| filter.matches(r))
                .collect();
            if let Some(sort) = &query.sort {
                sort_records(&mut matched, sort);
            }
            self.load(query.window(matched))
        })
        .await
    }
}
