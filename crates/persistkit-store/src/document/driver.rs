//! Document database capability
//!
//! Filter documents use the Mongo operator vocabulary
//! (`$eq/$ne/$gt/$gte/$lt/$lte/$in`); a field mapped to a non-object value
//! means equality. Any driver exposing these operations can back the
//! document repository.

use std::sync::Arc;

use async_trait::async_trait;
use persistkit_core::value::Record;

use crate::errors::Result;

/// A stored document; identity lives under `_id`
pub type Document = Record;

/// Storage key of the document identity
pub const DOCUMENT_ID: &str = "_id";

/// Sort direction, skip and limit for `find`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// `(storage key, descending)`
    pub sort: Option<(String, bool)>,
    pub skip: usize,
    /// `None` returns every remaining document
    pub limit: Option<usize>,
}

/// One collection of documents
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    fn name(&self) -> &str;

    /// Create an ascending index on `field`; repeating an existing name is a no-op
    async fn create_index(&self, field: &str, name: &str, unique: bool) -> Result<()>;

    /// Duplicate `_id` or unique-index values fail with `ConstraintViolation`
    async fn insert_one(&self, doc: Document) -> Result<()>;

    async fn find_one(&self, filter: &Document) -> Result<Option<Document>>;

    async fn find(&self, filter: &Document, options: &FindOptions) -> Result<Vec<Document>>;

    /// Replace the first match without upserting; returns the matched count
    async fn replace_one(&self, filter: &Document, doc: Document) -> Result<u64>;

    /// Returns the deleted count
    async fn delete_one(&self, filter: &Document) -> Result<u64>;
}

/// A connected document database
pub trait DocumentDatabase: Send + Sync {
    fn name(&self) -> &str;

    /// Handle to a collection, created on first use
    fn collection(&self, name: &str) -> Arc<dyn DocumentCollection>;
}
