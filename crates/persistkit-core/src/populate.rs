//! Relation population: dotted include paths resolved into nested records
//!
//! Given a root record and includes such as `["customer", "items.product"]`,
//! each declared relation is looked up through the repository of its target
//! entity (whatever backend that lives on) and written into the output under
//! the relation name.
//!
//! - many-valued relations: unresolved references are dropped, order kept
//! - single-valued relations: an unresolved reference becomes `null`
//! - include roots the entity does not declare are ignored
//!
//! There is no cycle detection; depth is bounded by the include paths,
//! which are capped at [`MAX_INCLUDE_DEPTH`] segments.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;

use crate::config::Backend;
use crate::criteria::Criteria;
use crate::errors::{PersistError, Result};
use crate::logging_facility::observe;
use crate::registry::{EntityRegistry, Relation};
use crate::repository::{ListQuery, Repository, RepositoryResolver};
use crate::value::{EntityId, Record};

/// Longest accepted include path, in segments
pub const MAX_INCLUDE_DEPTH: usize = 32;

/// Include paths grouped by root so each root is resolved once
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludeTree {
    children: BTreeMap<String, IncludeTree>,
}

impl IncludeTree {
    /// Group dotted include paths
    ///
    /// Empty segments (`"author..company"`, `""`) are skipped.
    ///
    /// ```
    /// use persistkit_core::populate::IncludeTree;
    ///
    /// let tree = IncludeTree::parse(["author.company", "author", "tags"]).unwrap();
    /// assert_eq!(tree.roots().collect::<Vec<_>>(), vec!["author", "tags"]);
    /// assert_eq!(tree.child("author").unwrap().roots().collect::<Vec<_>>(), vec!["company"]);
    /// ```
    ///
    /// # Errors
    ///
    /// `InvalidInclude` when a path has more than [`MAX_INCLUDE_DEPTH`] segments.
    pub fn parse<I, S>(includes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tree = IncludeTree::default();
        for include in includes {
            let path = include.as_ref();
            let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
            if segments.len() > MAX_INCLUDE_DEPTH {
                return Err(PersistError::InvalidInclude {
                    path: path.to_string(),
                    reason: format!(
                        "{} segments exceeds the maximum of {}",
                        segments.len(),
                        MAX_INCLUDE_DEPTH
                    ),
                });
            }
            let mut node = &mut tree;
            for segment in segments {
                node = node.children.entry(segment.to_string()).or_default();
            }
        }
        Ok(tree)
    }

    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }

    /// Remainder tree under `root`
    pub fn child(&self, root: &str) -> Option<&IncludeTree> {
        self.children.get(root)
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of segments on the longest path
    pub fn depth(&self) -> usize {
        self.children
            .values()
            .map(|c| 1 + c.depth())
            .max()
            .unwrap_or(0)
    }
}

async fn lookup(repo: &dyn Repository, relation: &Relation, reference: &Value) -> Result<Option<Record>> {
    if relation.by_identity() {
        repo.get(reference).await
    } else {
        repo.get_by_index(&relation.by, reference).await
    }
}

/// Resolve `tree` against `record`, an entity of `entity_key`
///
/// # Errors
///
/// `UnknownEntity` if `entity_key` is not registered, plus anything the
/// resolver or a target repository raises. Unresolved references are not
/// errors.
pub fn populate<'a>(
    entity_key: &'a str,
    record: Record,
    tree: &'a IncludeTree,
    registry: &'a EntityRegistry,
    resolver: &'a dyn RepositoryResolver,
) -> BoxFuture<'a, Result<Record>> {
    async move {
        if tree.is_empty() {
            return Ok(record);
        }
        let relations = registry.relations(entity_key)?;
        let mut out = record.clone();

        for (name, sub) in &tree.children {
            let Some(relation) = relations.get(name) else {
                continue;
            };
            let local = record.get(&relation.local_field).unwrap_or(&Value::Null);
            if local.is_null() {
                let empty = if relation.many {
                    Value::Array(Vec::new())
                } else {
                    Value::Null
                };
                out.insert(name.clone(), empty);
                continue;
            }

            let repo = resolver.resolve(&relation.target)?;
            if relation.many {
                let references = match local {
                    Value::Array(items) => items.clone(),
                    scalar => vec![scalar.clone()],
                };
                let mut resolved = Vec::with_capacity(references.len());
                for reference in &references {
                    if let Some(child) = lookup(repo.as_ref(), relation, reference).await? {
                        let child =
                            populate(&relation.target, child, sub, registry, resolver).await?;
                        resolved.push(Value::Object(child));
                    }
                }
                out.insert(name.clone(), Value::Array(resolved));
            } else {
                let value = match lookup(repo.as_ref(), relation, local).await? {
                    Some(child) => Value::Object(
                        populate(&relation.target, child, sub, registry, resolver).await?,
                    ),
                    None => Value::Null,
                };
                out.insert(name.clone(), value);
            }
        }
        Ok(out)
    }
    .boxed()
}

/// Repository wrapper adding `*_with` view operations
///
/// Plain repository operations delegate to the wrapped repository.
pub struct PopulatingRepository {
    entity_key: String,
    inner: Arc<dyn Repository>,
    registry: Arc<EntityRegistry>,
    resolver: Arc<dyn RepositoryResolver>,
}

impl PopulatingRepository {
    pub fn new(
        inner: Arc<dyn Repository>,
        registry: Arc<EntityRegistry>,
        resolver: Arc<dyn RepositoryResolver>,
    ) -> Self {
        Self {
            entity_key: inner.entity_key().to_string(),
            inner,
            registry,
            resolver,
        }
    }

    pub fn inner(&self) -> &Arc<dyn Repository> {
        &self.inner
    }

    async fn populate_all(&self, records: Vec<Record>, tree: &IncludeTree) -> Result<Vec<Record>> {
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            out.push(
                populate(
                    &self.entity_key,
                    record,
                    tree,
                    &self.registry,
                    self.resolver.as_ref(),
                )
                .await?,
            );
        }
        Ok(out)
    }

    /// Entity by identity with `includes` resolved
    ///
    /// # Errors
    ///
    /// `InvalidInclude` before any I/O, then anything the repositories raise.
    pub async fn get_with<S: AsRef<str>>(&self, id: &EntityId, includes: &[S]) -> Result<Option<Record>> {
        let tree = IncludeTree::parse(includes)?;
        observe("get_with", &self.entity_key, self.inner.backend().as_str(), async {
            match self.inner.get(id).await? {
                Some(record) => self.populate_all(vec![record], &tree).await.map(|mut v| v.pop()),
                None => Ok(None),
            }
        })
        .await
    }

    /// Entity by unique index with `includes` resolved
    ///
    /// # Errors
    ///
    /// `InvalidInclude` before any I/O, then anything the repositories raise.
    pub async fn get_by_index_with<S: AsRef<str>>(
        &self,
        index: &str,
        value: &Value,
        includes: &[S],
    ) -> Result<Option<Record>> {
        let tree = IncludeTree::parse(includes)?;
        observe("get_by_index_with", &self.entity_key, self.inner.backend().as_str(), async {
            match self.inner.get_by_index(index, value).await? {
                Some(record) => self.populate_all(vec![record], &tree).await.map(|mut v| v.pop()),
                None => Ok(None),
            }
        })
        .await
    }

    /// # Errors
    ///
    /// `InvalidInclude` before any I/O, then anything the repositories raise.
    pub async fn list_with<S: AsRef<str>>(&self, query: &ListQuery, includes: &[S]) -> Result<Vec<Record>> {
        let tree = IncludeTree::parse(includes)?;
        observe("list_with", &self.entity_key, self.inner.backend().as_str(), async {
            let records = self.inner.list(query).await?;
            self.populate_all(records, &tree).await
        })
        .await
    }

    /// # Errors
    ///
    /// `InvalidInclude` before any I/O, then anything the repositories raise.
    pub async fn list_by_fields_with<S: AsRef<str>>(
        &self,
        criteria: &Criteria,
        query: &ListQuery,
        includes: &[S],
    ) -> Result<Vec<Record>> {
        let tree = IncludeTree::parse(includes)?;
        observe("list_by_fields_with", &self.entity_key, self.inner.backend().as_str(), async {
            let records = self.inner.list_by_fields(criteria, query).await?;
            self.populate_all(records, &tree).await
        })
        .await
    }
}

#[async_trait]
impl Repository for PopulatingRepository {
    fn entity_key(&self) -> &str {
        &self.entity_key
    }

    fn backend(&self) -> Backend {
        self.inner.backend()
    }

    async fn init_indexes(&self) -> Result<()> {
        self.inner.init_indexes().await
    }

    async fn add(&self, entity: Record) -> Result<()> {
        self.inner.add(entity).await
    }

    async fn get(&self, id: &EntityId) -> Result<Option<Record>> {
        self.inner.get(id).await
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<Record>> {
        self.inner.list(query).await
    }

    async fn update(&self, entity: Record) -> Result<()> {
        self.inner.update(entity).await
    }

    async fn delete(&self, id: &EntityId) -> Result<()> {
        self.inner.delete(id).await
    }

    async fn get_by_index(&self, index: &str, value: &Value) -> Result<Option<Record>> {
        self.inner.get_by_index(index, value).await
    }

    async fn list_by_fields(&self, criteria: &Criteria, query: &ListQuery) -> Result<Vec<Record>> {
        self.inner.list_by_fields(criteria, query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_sharing_a_root_are_grouped() {
        let tree = IncludeTree::parse(["author.company", "author.posts", "editor"]).unwrap();
        assert_eq!(tree.roots().collect::<Vec<_>>(), vec!["author", "editor"]);
        let author = tree.child("author").unwrap();
        assert_eq!(author.roots().collect::<Vec<_>>(), vec!["company", "posts"]);
        assert!(tree.child("editor").unwrap().is_empty());
        assert_eq!(tree.depth(), 2);
    }

    #[test]
    fn test_empty_segments_ignored() {
        let tree = IncludeTree::parse(["", "author..company."]).unwrap();
        assert_eq!(tree.roots().collect::<Vec<_>>(), vec!["author"]);
        assert_eq!(tree.depth(), 2);
    }

    #[test]
    fn test_depth_bound() {
        let ok = vec!["a"; MAX_INCLUDE_DEPTH].join(".");
        assert!(IncludeTree::parse([ok.as_str()]).is_ok());

        let deep = vec!["a"; MAX_INCLUDE_DEPTH + 1].join(".");
        let err = IncludeTree::parse([deep.as_str()]).unwrap_err();
        assert!(matches!(err, PersistError::InvalidInclude { .. }));
    }
}
