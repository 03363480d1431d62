//! In-process document database for development and tests
//!
//! Collections keep documents in insertion order behind an async RwLock.
//! Every driver call is counted so callers can assert that a query never
//! reached storage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use persistkit_core::errors::PersistError;
use persistkit_core::value::{compare_values, value_key};
use serde_json::Value;
use tokio::sync::RwLock;

use super::driver::{Document, DocumentCollection, DocumentDatabase, FindOptions, DOCUMENT_ID};
use super::evaluator;
use crate::errors::Result;

#[derive(Debug, Clone)]
struct IndexSpec {
    name: String,
    field: String,
    unique: bool,
}

#[derive(Default)]
struct CollectionState {
    docs: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

impl CollectionState {
    fn id_taken(&self, id: &Value, except: Option<usize>) -> bool {
        let key = value_key(id);
        self.docs
            .iter()
            .enumerate()
            .any(|(i, d)| Some(i) != except && value_key(d.get(DOCUMENT_ID).unwrap_or(&Value::Null)) == key)
    }

    /// First unique index `doc` would violate; null and missing values are not indexed
    fn unique_violation(&self, doc: &Document, except: Option<usize>) -> Option<&IndexSpec> {
        self.indexes.iter().filter(|ix| ix.unique).find(|ix| {
            let Some(key) = doc.get(&ix.field).and_then(value_key) else {
                return false;
            };
            self.docs.iter().enumerate().any(|(i, other)| {
                Some(i) != except
                    && other.get(&ix.field).and_then(value_key).as_deref() == Some(key.as_str())
            })
        })
    }

    fn position(&self, filter: &Document) -> Result<Option<usize>> {
        for (i, doc) in self.docs.iter().enumerate() {
            if evaluator::matches(filter, doc)? {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }
}

/// One in-process collection
pub struct InProcessCollection {
    name: String,
    state: RwLock<CollectionState>,
    calls: Arc<AtomicU64>,
}

impl InProcessCollection {
    fn new(name: &str, calls: Arc<AtomicU64>) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(CollectionState::default()),
            calls,
        }
    }

    fn count_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn duplicate(&self, constraint: &str, message: String) -> PersistError {
        PersistError::ConstraintViolation {
            entity: self.name.clone(),
            constraint: constraint.to_string(),
            message,
        }
    }

    /// Names of the indexes created so far
    pub async fn index_names(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .indexes
            .iter()
            .map(|ix| ix.name.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.docs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl DocumentCollection for InProcessCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_index(&self, field: &str, name: &str, unique: bool) -> Result<()> {
        self.count_call();
        let mut state = self.state.write().await;
        if state.indexes.iter().any(|ix| ix.name == name) {
            return Ok(());
        }
        let spec = IndexSpec {
            name: name.to_string(),
            field: field.to_string(),
            unique,
        };
        if unique {
            let mut seen = std::collections::HashSet::new();
            for doc in &state.docs {
                if let Some(key) = doc.get(field).and_then(value_key) {
                    if !seen.insert(key) {
                        return Err(self.duplicate(name, format!("existing documents repeat '{}'", field)));
                    }
                }
            }
        }
        state.indexes.push(spec);
        Ok(())
    }

    async fn insert_one(&self, doc: Document) -> Result<()> {
        self.count_call();
        let mut state = self.state.write().await;
        let id = doc.get(DOCUMENT_ID).cloned().unwrap_or(Value::Null);
        if id.is_null() {
            return Err(PersistError::backend("insert_one", "document has no _id"));
        }
        if state.id_taken(&id, None) {
            return Err(self.duplicate(DOCUMENT_ID, format!("duplicate _id {}", id)));
        }
        if let Some(ix) = state.unique_violation(&doc, None) {
            return Err(self.duplicate(&ix.name, format!("duplicate key for '{}'", ix.field)));
        }
        state.docs.push(doc);
        Ok(())
    }

    async fn find_one(&self, filter: &Document) -> Result<Option<Document>> {
        self.count_call();
        let state = self.state.read().await;
        Ok(state.position(filter)?.map(|i| state.docs[i].clone()))
    }

    async fn find(&self, filter: &Document, options: &FindOptions) -> Result<Vec<Document>> {
        self.count_call();
        let state = self.state.read().await;
        let mut hits = Vec::new();
        for doc in &state.docs {
            if evaluator::matches(filter, doc)? {
                hits.push(doc.clone());
            }
        }
        drop(state);

        if let Some((field, descending)) = &options.sort {
            hits.sort_by(|a, b| {
                let ord = compare_values(
                    a.get(field).unwrap_or(&Value::Null),
                    b.get(field).unwrap_or(&Value::Null),
                );
                if *descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        let take = options.limit.unwrap_or(usize::MAX);
        Ok(hits.into_iter().skip(options.skip).take(take).collect())
    }

    async fn replace_one(&self, filter: &Document, doc: Document) -> Result<u64> {
        self.count_call();
        let mut state = self.state.write().await;
        let Some(i) = state.position(filter)? else {
            return Ok(0);
        };
        let id = doc.get(DOCUMENT_ID).cloned().unwrap_or(Value::Null);
        if !id.is_null() && state.id_taken(&id, Some(i)) {
            return Err(self.duplicate(DOCUMENT_ID, format!("duplicate _id {}", id)));
        }
        if let Some(ix) = state.unique_violation(&doc, Some(i)) {
            return Err(self.duplicate(&ix.name, format!("duplicate key for '{}'", ix.field)));
        }
        state.docs[i] = doc;
        Ok(1)
    }

    async fn delete_one(&self, filter: &Document) -> Result<u64> {
        self.count_call();
        let mut state = self.state.write().await;
        match state.position(filter)? {
            Some(i) => {
                state.docs.remove(i);
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

/// Named in-process database holding any number of collections
pub struct InProcessDatabase {
    name: String,
    collections: Mutex<HashMap<String, Arc<InProcessCollection>>>,
    calls: Arc<AtomicU64>,
}

impl InProcessDatabase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: Mutex::new(HashMap::new()),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Concrete handle, for inspecting indexes in tests and tooling
    pub fn in_process_collection(&self, name: &str) -> Arc<InProcessCollection> {
        let mut collections = match self.collections.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(InProcessCollection::new(name, self.calls.clone())))
            .clone()
    }

    /// Driver calls made against any collection of this database
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DocumentDatabase for InProcessDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self, name: &str) -> Arc<dyn DocumentCollection> {
        self.in_process_collection(name)
    }
}
