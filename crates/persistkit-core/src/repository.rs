//! Uniform async repository contract
//!
//! Entities cross this boundary as [`Record`]s in attribute space. Absence
//! is `Ok(None)`, never an error.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::Backend;
use crate::criteria::Criteria;
use crate::errors::Result;
use crate::value::{EntityId, Record};

/// Page size used when the caller does not pick one
pub const DEFAULT_LIMIT: usize = 50;

/// Single-attribute ordering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub descending: bool,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// Paging and ordering for `list` and `list_by_fields`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub offset: usize,
    /// `None` returns everything from `offset`
    pub limit: Option<usize>,
    pub sort: Option<SortSpec>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: Some(DEFAULT_LIMIT),
            sort: None,
        }
    }
}

impl ListQuery {
    /// Everything, unsorted
    pub fn all() -> Self {
        Self {
            limit: None,
            ..Self::default()
        }
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn unbounded(mut self) -> Self {
        self.limit = None;
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>) -> Self {
        self.sort = Some(SortSpec::asc(field));
        self
    }

    pub fn sort_desc(mut self, field: impl Into<String>) -> Self {
        self.sort = Some(SortSpec::desc(field));
        self
    }

    /// Apply offset and limit to an already ordered sequence
    pub fn window<T>(&self, items: Vec<T>) -> Vec<T> {
        let take = self.limit.unwrap_or(usize::MAX);
        items.into_iter().skip(self.offset).take(take).collect()
    }
}

/// Storage-agnostic entity repository
///
/// # Errors
///
/// Every operation fails with a validation kind for bad input (raised before
/// storage is touched), `ConstraintViolation` for identity or unique-index
/// conflicts, and `BackendFailure` for driver errors, which are never retried.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Registry key this repository serves
    fn entity_key(&self) -> &str;

    fn backend(&self) -> Backend;

    /// Idempotent index/table setup; runs at most once per instance
    async fn init_indexes(&self) -> Result<()> {
        Ok(())
    }

    async fn add(&self, entity: Record) -> Result<()>;

    async fn get(&self, id: &EntityId) -> Result<Option<Record>>;

    async fn list(&self, query: &ListQuery) -> Result<Vec<Record>>;

    /// Full replace by identity; a missing identity is a no-op
    async fn update(&self, entity: Record) -> Result<()>;

    /// Idempotent
    async fn delete(&self, id: &EntityId) -> Result<()>;

    /// Unknown index names resolve to `None`
    async fn get_by_index(&self, index: &str, value: &Value) -> Result<Option<Record>>;

    async fn list_by_fields(&self, criteria: &Criteria, query: &ListQuery) -> Result<Vec<Record>>;
}

/// Hands out repositories by entity key
///
/// Implemented by the persistence context; the population engine uses it to
/// reach related entities on whatever backend they live.
pub trait RepositoryResolver: Send + Sync {
    /// # Errors
    ///
    /// `UnknownEntity`, `BackendUnavailable` or `ContextShutdown`.
    fn resolve(&self, entity_key: &str) -> Result<Arc<dyn Repository>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_page() {
        let q = ListQuery::default();
        assert_eq!(q.limit, Some(DEFAULT_LIMIT));
        assert_eq!(q.offset, 0);
        assert!(q.sort.is_none());
    }

    #[test]
    fn test_window() {
        let items: Vec<i32> = (0..10).collect();
        assert_eq!(ListQuery::default().offset(8).window(items.clone()), vec![8, 9]);
        assert_eq!(ListQuery::default().offset(2).limit(3).window(items.clone()), vec![2, 3, 4]);
        assert_eq!(ListQuery::all().window(items.clone()).len(), 10);
        assert!(ListQuery::default().offset(20).window(items).is_empty());
    }
}
