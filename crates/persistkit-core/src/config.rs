//! Process settings: default backend and backend connection options
//!
//! Settings come from an optional file plus `PERSISTKIT__*` environment
//! variables (`PERSISTKIT__BACKEND=relational`,
//! `PERSISTKIT__RELATIONAL__PATH=/var/lib/app.db`, ...).

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::{PersistError, Result};

/// Storage engine an entity lives on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Memory,
    #[serde(alias = "mongo")]
    Document,
    #[serde(alias = "postgres", alias = "sqlite")]
    Relational,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Memory => "memory",
            Backend::Document => "document",
            Backend::Relational => "relational",
        }
    }

    /// Parse a backend name, falling back to `default` for anything unknown
    pub fn parse_or(value: &str, default: Backend) -> Backend {
        value.parse().unwrap_or(default)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = PersistError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Backend::Memory),
            "document" | "mongo" => Ok(Backend::Document),
            "relational" | "postgres" | "sqlite" => Ok(Backend::Relational),
            other => Err(PersistError::Configuration {
                message: format!("unknown backend '{}'", other),
            }),
        }
    }
}

fn lenient_backend<'de, D>(deserializer: D) -> std::result::Result<Backend, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(Backend::parse_or(&raw, Backend::default()))
}

fn default_foreign_keys() -> bool {
    true
}

fn default_database_name() -> String {
    "persistkit".to_string()
}

/// SQLite options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationalSettings {
    /// Database file; `None` opens an in-memory database
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_foreign_keys")]
    pub foreign_keys: bool,
}

impl Default for RelationalSettings {
    fn default() -> Self {
        Self {
            path: None,
            foreign_keys: default_foreign_keys(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSettings {
    #[serde(default = "default_database_name")]
    pub database: String,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            database: default_database_name(),
        }
    }
}

/// Repository settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoSettings {
    /// Backend for entities without an override; unknown names mean `memory`
    #[serde(default, deserialize_with = "lenient_backend")]
    pub backend: Backend,
    #[serde(default)]
    pub relational: RelationalSettings,
    #[serde(default)]
    pub document: DocumentSettings,
}

impl RepoSettings {
    /// Backend for an entity: its own override, else the process default
    pub fn resolve_backend(&self, entity_override: Option<Backend>) -> Backend {
        entity_override.unwrap_or(self.backend)
    }
}

/// Load settings from an optional file and the environment
///
/// A missing file is not an error; environment variables win over the file.
///
/// # Errors
///
/// `Configuration` if a source cannot be read or does not deserialize.
pub fn load(path: Option<&Path>) -> Result<RepoSettings> {
    let mut builder = ConfigBuilder::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(false));
    }
    builder
        .add_source(Environment::with_prefix("PERSISTKIT").separator("__"))
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| PersistError::Configuration {
            message: e.to_string(),
        })
}

/// Like [`load`], after reading a `.env` file from the working directory if present
///
/// # Errors
///
/// Same as [`load`].
pub fn load_with_dotenv(path: Option<&Path>) -> Result<RepoSettings> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(PersistError::Configuration {
                message: format!("failed to read .env: {}", e),
            });
        }
    }
    load(path)
}
