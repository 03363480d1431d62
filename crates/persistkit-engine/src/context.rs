//! Persistence context: repository factory, cache and resolver

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use persistkit_core::config::{Backend, RepoSettings};
use persistkit_core::errors::{PersistError, Result};
use persistkit_core::logging_facility::observe;
use persistkit_core::memory_repo::MemoryRepository;
use persistkit_core::populate::PopulatingRepository;
use persistkit_core::registry::{EntityConfig, EntityRegistry};
use persistkit_core::repository::{Repository, RepositoryResolver};
use persistkit_core::typed::TypedRepository;
use persistkit_store::document::DocumentRepository;
use persistkit_store::relational::RelationalRepository;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::handles::BackendHandles;

type RepoCache = HashMap<(String, Backend), Arc<dyn Repository>>;

struct ContextInner {
    registry: Arc<EntityRegistry>,
    settings: RepoSettings,
    handles: BackendHandles,
    cache: Mutex<RepoCache>,
    shut_down: AtomicBool,
}

/// Owns the registry, settings and backend handles for one process
///
/// Cloning is cheap and every clone shares the same repository cache.
/// Each entity key gets one repository per resolved backend for the
/// lifetime of the context.
#[derive(Clone)]
pub struct PersistenceContext {
    inner: Arc<ContextInner>,
}

impl PersistenceContext {
    pub fn new(registry: EntityRegistry, settings: RepoSettings, handles: BackendHandles) -> Self {
        tracing::debug!(
            entities = registry.len(),
            backend = %settings.backend,
            handles = ?handles,
            "persistence context created"
        );
        Self {
            inner: Arc::new(ContextInner {
                registry: Arc::new(registry),
                settings,
                handles,
                cache: Mutex::new(HashMap::new()),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.inner.registry
    }

    pub fn settings(&self) -> &RepoSettings {
        &self.inner.settings
    }

    pub fn handles(&self) -> &BackendHandles {
        &self.inner.handles
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    fn cache(&self) -> MutexGuard<'_, RepoCache> {
        match self.inner.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Number of repositories built so far
    pub fn cached_repositories(&self) -> usize {
        self.cache().len()
    }

    /// Backend an entity resolves to: its override, else the process default
    ///
    /// # Errors
    ///
    /// `UnknownEntity` if `entity_key` was never registered.
    pub fn backend_for(&self, entity_key: &str) -> Result<Backend> {
        let config = self.inner.registry.get_config(entity_key)?;
        Ok(self.inner.settings.resolve_backend(config.backend))
    }

    /// Foreign keys for single-valued relations whose target also lives on
    /// the relational backend
    fn relational_foreign_keys(&self, entity_key: &str) -> Result<BTreeMap<String, (String, String)>> {
        let registry = &self.inner.registry;
        let mut fks = registry.foreign_keys(entity_key)?;
        for relation in registry.relations(entity_key)?.values() {
            if relation.many {
                continue;
            }
            if self.backend_for(&relation.target)? != Backend::Relational {
                fks.remove(&relation.local_field);
            }
        }
        Ok(fks)
    }

    fn build(&self, entity_key: &str, config: &EntityConfig, backend: Backend) -> Result<Arc<dyn Repository>> {
        let unavailable = || PersistError::BackendUnavailable {
            entity_key: entity_key.to_string(),
            backend: backend.to_string(),
        };
        let repo: Arc<dyn Repository> = match backend {
            Backend::Memory => Arc::new(MemoryRepository::from_config(entity_key, config)),
            Backend::Document => {
                let db = self.inner.handles.document.as_ref().ok_or_else(unavailable)?;
                Arc::new(DocumentRepository::from_config(entity_key, config, db.as_ref()))
            }
            Backend::Relational => {
                let engine = self.inner.handles.relational.as_ref().ok_or_else(unavailable)?;
                let fks = self.relational_foreign_keys(entity_key)?;
                Arc::new(RelationalRepository::new(entity_key, config, engine.clone()).with_foreign_keys(fks))
            }
        };
        tracing::debug!(entity_key, backend = %backend, "repository created");
        Ok(repo)
    }

    /// Cached repository for `entity_key` on its resolved backend
    ///
    /// # Errors
    ///
    /// `ContextShutdown`, `UnknownEntity` or `BackendUnavailable`.
    pub fn repository(&self, entity_key: &str) -> Result<Arc<dyn Repository>> {
        if self.is_shut_down() {
            return Err(PersistError::ContextShutdown);
        }
        let config = self.inner.registry.get_config(entity_key)?;
        let backend = self.inner.settings.resolve_backend(config.backend);
        let cache_key = (entity_key.to_string(), backend);

        if let Some(repo) = self.cache().get(&cache_key) {
            return Ok(repo.clone());
        }

        let built = self.build(entity_key, config, backend)?;
        let mut cache = self.cache();
        Ok(cache.entry(cache_key).or_insert(built).clone())
    }

    /// Repository with its indexes (or table) initialized
    ///
    /// # Errors
    ///
    /// Anything [`PersistenceContext::repository`] or index initialization raises.
    pub async fn ready_repository(&self, entity_key: &str) -> Result<Arc<dyn Repository>> {
        let repo = self.repository(entity_key)?;
        repo.init_indexes().await?;
        Ok(repo)
    }

    /// Repository that also resolves include paths
    ///
    /// # Errors
    ///
    /// Same as [`PersistenceContext::repository`].
    pub fn populating_repository(&self, entity_key: &str) -> Result<PopulatingRepository> {
        let inner = self.repository(entity_key)?;
        let resolver: Arc<dyn RepositoryResolver> = Arc::new(self.clone());
        Ok(PopulatingRepository::new(
            inner,
            self.inner.registry.clone(),
            resolver,
        ))
    }

    /// Typed view over the repository for `entity_key`
    ///
    /// # Errors
    ///
    /// Same as [`PersistenceContext::repository`].
    pub fn typed<T>(&self, entity_key: &str) -> Result<TypedRepository<T>>
    where
        T: Serialize + DeserializeOwned + Send,
    {
        Ok(TypedRepository::new(self.repository(entity_key)?))
    }

    /// Build and initialize the repository of every registered entity
    ///
    /// # Errors
    ///
    /// The first failure; entities after it are left uninitialized.
    pub async fn initialize(&self) -> Result<()> {
        observe("initialize", "*", "context", async {
            for key in self.inner.registry.keys() {
                self.ready_repository(key).await?;
            }
            tracing::info!(entities = self.inner.registry.len(), "persistence context initialized");
            Ok(())
        })
        .await
    }

    /// Drop cached repositories and refuse further resolution
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        let dropped = {
            let mut cache = self.cache();
            let n = cache.len();
            cache.clear();
            n
        };
        tracing::info!(repositories = dropped, "persistence context shut down");
    }
}

impl RepositoryResolver for PersistenceContext {
    fn resolve(&self, entity_key: &str) -> Result<Arc<dyn Repository>> {
        self.repository(entity_key)
    }
}

impl std::fmt::Debug for PersistenceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceContext")
            .field("entities", &self.inner.registry.len())
            .field("backend", &self.inner.settings.backend)
            .field("handles", &self.inner.handles)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistkit_core::mapper::{EntitySchema, FieldKind};
    use persistkit_core::registry::Relation;
    use persistkit_store::relational::SqliteEngine;

    fn registry() -> EntityRegistry {
        EntityRegistry::builder()
            .register(
                "customer",
                EntityConfig::new(EntitySchema::new("Customer").field("name", FieldKind::Text), "customers"),
            )
            .register(
                "order",
                EntityConfig::new(
                    EntitySchema::new("Order").field("customerId", FieldKind::Integer),
                    "orders",
                )
                .backend(Backend::Relational)
                .relation("customer", Relation::one("customerId", "customer")),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_foreign_keys_only_toward_relational_targets() {
        let handles = BackendHandles::none().with_relational(SqliteEngine::open_in_memory(true).unwrap());
        let ctx = PersistenceContext::new(registry(), RepoSettings::default(), handles.clone());
        assert!(ctx.relational_foreign_keys("order").unwrap().is_empty());

        let settings = RepoSettings {
            backend: Backend::Relational,
            ..RepoSettings::default()
        };
        let ctx = PersistenceContext::new(registry(), settings, handles);
        let fks = ctx.relational_foreign_keys("order").unwrap();
        assert_eq!(
            fks.get("customerId"),
            Some(&("customers".to_string(), "id".to_string()))
        );
    }

    #[test]
    fn test_backend_override_wins() {
        let ctx = PersistenceContext::new(registry(), RepoSettings::default(), BackendHandles::none());
        assert_eq!(ctx.backend_for("customer").unwrap(), Backend::Memory);
        assert_eq!(ctx.backend_for("order").unwrap(), Backend::Relational);
    }
}
