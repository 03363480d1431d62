//! Connected backend handles supplied to a context

use std::sync::Arc;

use persistkit_core::config::{Backend, RepoSettings};
use persistkit_core::errors::Result;
use persistkit_store::document::{DocumentDatabase, InProcessDatabase};
use persistkit_store::relational::SqliteEngine;

/// Document database and SQLite engine, either of which may be absent
///
/// The memory backend needs no handle. Resolving an entity onto a backend
/// whose handle is missing fails with `BackendUnavailable`.
#[derive(Clone, Default)]
pub struct BackendHandles {
    pub document: Option<Arc<dyn DocumentDatabase>>,
    pub relational: Option<SqliteEngine>,
}

impl BackendHandles {
    /// No handles; only memory-backed entities resolve
    pub fn none() -> Self {
        Self::default()
    }

    /// In-process document database plus a SQLite engine, both from settings
    ///
    /// # Errors
    ///
    /// `BackendFailure` if the SQLite database cannot be opened.
    pub fn in_process(settings: &RepoSettings) -> Result<Self> {
        let document: Arc<dyn DocumentDatabase> =
            Arc::new(InProcessDatabase::new(settings.document.database.clone()));
        let relational = SqliteEngine::from_settings(&settings.relational)?;
        Ok(Self {
            document: Some(document),
            relational: Some(relational),
        })
    }

    pub fn with_document(mut self, db: Arc<dyn DocumentDatabase>) -> Self {
        self.document = Some(db);
        self
    }

    pub fn with_relational(mut self, engine: SqliteEngine) -> Self {
        self.relational = Some(engine);
        self
    }

    pub fn supports(&self, backend: Backend) -> bool {
        match backend {
            Backend::Memory => true,
            Backend::Document => self.document.is_some(),
            Backend::Relational => self.relational.is_some(),
        }
    }
}

impl std::fmt::Debug for BackendHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendHandles")
            .field("document", &self.document.as_ref().map(|db| db.name().to_string()))
            .field("relational", &self.relational)
            .finish()
    }
}
