//! Typed adapter over a type-erased repository

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::criteria::Criteria;
use crate::errors::{PersistError, Result};
use crate::repository::{ListQuery, Repository};
use crate::value::Record;

/// Serialize an entity into a record
///
/// # Errors
///
/// `Serialization` if `T` does not serialize to a JSON object.
pub fn to_record<T: Serialize>(entity: &T) -> Result<Record> {
    match serde_json::to_value(entity)? {
        Value::Object(map) => Ok(map),
        other => Err(PersistError::Serialization {
            message: format!("entity must serialize to an object, got {}", other),
        }),
    }
}

/// # Errors
///
/// `Serialization` if the record does not deserialize into `T`.
pub fn from_record<T: DeserializeOwned>(record: Record) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(record))?)
}

/// Repository operations over a concrete entity type
///
/// Entities go through `serde_json`, so `#[serde(rename_all = ...)]` on `T`
/// decides the attribute names the registry schema must declare.
pub struct TypedRepository<T> {
    inner: Arc<dyn Repository>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedRepository<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T> TypedRepository<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    pub fn new(inner: Arc<dyn Repository>) -> Self {
        Self {
            inner,
            _entity: PhantomData,
        }
    }

    /// Underlying type-erased repository
    pub fn inner(&self) -> &Arc<dyn Repository> {
        &self.inner
    }

    /// # Errors
    ///
    /// Serialization failures plus anything [`Repository::add`] raises.
    pub async fn add(&self, entity: &T) -> Result<()> {
        self.inner.add(to_record(entity)?).await
    }

    /// # Errors
    ///
    /// Serialization failures plus anything [`Repository::get`] raises.
    pub async fn get(&self, id: impl Into<Value>) -> Result<Option<T>> {
        self.inner.get(&id.into()).await?.map(from_record).transpose()
    }

    /// # Errors
    ///
    /// Serialization failures plus anything [`Repository::list`] raises.
    pub async fn list(&self, query: &ListQuery) -> Result<Vec<T>> {
        self.inner
            .list(query)
            .await?
            .into_iter()
            .map(from_record)
            .collect()
    }

    /// # Errors
    ///
    /// Serialization failures plus anything [`Repository::update`] raises.
    pub async fn update(&self, entity: &T) -> Result<()> {
        self.inner.update(to_record(entity)?).await
    }

    /// # Errors
    ///
    /// Anything [`Repository::delete`] raises.
    pub async fn delete(&self, id: impl Into<Value>) -> Result<()> {
        self.inner.delete(&id.into()).await
    }

    /// # Errors
    ///
    /// Serialization failures plus anything [`Repository::get_by_index`] raises.
    pub async fn get_by_index(&self, index: &str, value: impl Into<Value>) -> Result<Option<T>> {
        self.inner
            .get_by_index(index, &value.into())
            .await?
            .map(from_record)
            .transpose()
    }

    /// # Errors
    ///
    /// Serialization failures plus anything [`Repository::list_by_fields`] raises.
    pub async fn list_by_fields(&self, criteria: &Criteria, query: &ListQuery) -> Result<Vec<T>> {
        self.inner
            .list_by_fields(criteria, query)
            .await?
            .into_iter()
            .map(from_record)
            .collect()
    }
}
