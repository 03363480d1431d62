//! SQLite connection management
//!
//! One connection per engine, shared behind a mutex. Statements run on
//! tokio's blocking pool so repository futures never block the runtime.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use persistkit_core::config::RelationalSettings;
use persistkit_core::errors::PersistError;
use rusqlite::Connection;

use crate::errors::{join_error, Result};

/// Shared SQLite handle
#[derive(Clone)]
pub struct SqliteEngine {
    conn: Arc<Mutex<Connection>>,
    calls: Arc<AtomicU64>,
    foreign_keys: bool,
}

impl SqliteEngine {
    /// Open (or create) a database file
    pub fn open<P: AsRef<Path>>(path: P, foreign_keys: bool) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| PersistError::backend("open", e))?;
        configure(&conn, foreign_keys, true)?;
        tracing::debug!(path = %path.as_ref().display(), foreign_keys, "sqlite database opened");
        Ok(Self::wrap(conn, foreign_keys))
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory(foreign_keys: bool) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| PersistError::backend("open", e))?;
        configure(&conn, foreign_keys, false)?;
        Ok(Self::wrap(conn, foreign_keys))
    }

    pub fn from_settings(settings: &RelationalSettings) -> Result<Self> {
        match &settings.path {
            Some(path) => Self::open(path, settings.foreign_keys),
            None => Self::open_in_memory(settings.foreign_keys),
        }
    }

    fn wrap(conn: Connection, foreign_keys: bool) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            calls: Arc::new(AtomicU64::new(0)),
            foreign_keys,
        }
    }

    pub fn foreign_keys_enabled(&self) -> bool {
        self.foreign_keys
    }

    /// Statements dispatched through [`SqliteEngine::run`] so far
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Run `f` against the connection on the blocking pool
    ///
    /// # Errors
    ///
    /// Whatever `f` returns, or `BackendFailure` if the blocking task dies.
    pub async fn run<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = match conn.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            f(&guard)
        })
        .await
        .map_err(|e| join_error(op, e))?
    }
}

impl std::fmt::Debug for SqliteEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEngine")
            .field("foreign_keys", &self.foreign_keys)
            .field("calls", &self.call_count())
            .finish()
    }
}

/// Connection pragmas: foreign keys as configured, WAL for file databases
fn configure(conn: &Connection, foreign_keys: bool, file_backed: bool) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", foreign_keys)
        .map_err(|e| PersistError::backend("configure", e))?;

    if file_backed {
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(|e| PersistError::backend("configure", e))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_foreign_keys_pragma_follows_flag() {
        for flag in [true, false] {
            let engine = SqliteEngine::open_in_memory(flag).unwrap();
            let enabled: i64 = engine
                .run("pragma", |conn| {
                    conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))
                        .map_err(|e| PersistError::backend("pragma", e))
                })
                .await
                .unwrap();
            assert_eq!(enabled == 1, flag);
        }
    }

    #[tokio::test]
    async fn test_run_counts_calls() {
        let engine = SqliteEngine::open_in_memory(true).unwrap();
        assert_eq!(engine.call_count(), 0);
        engine
            .run("create", |conn| {
                conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY)")
                    .map_err(|e| PersistError::backend("create", e))
            })
            .await
            .unwrap();
        assert_eq!(engine.call_count(), 1);
        assert_eq!(engine.clone().call_count(), 1);
    }

    #[tokio::test]
    async fn test_file_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SqliteEngine::open(dir.path().join("app.db"), true).unwrap();
        let mode: String = engine
            .run("pragma", |conn| {
                conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))
                    .map_err(|e| PersistError::backend("pragma", e))
            })
            .await
            .unwrap();
        assert_eq!(mode.to_ascii_lowercase(), "wal");
    }
}
