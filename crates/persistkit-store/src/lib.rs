//! persistkit Store - document-store and relational backends
//!
//! Provides:
//! - Document-store driver contract, filter translator and an in-process
//!   document database
//! - SQLite engine, table builder, schema evolution and WHERE translator
//! - Repositories for both backends with one-shot index initialization

pub mod document;
pub mod errors;
pub mod relational;

// Re-export key types
pub use document::{DocumentDatabase, DocumentRepository, InProcessDatabase};
pub use relational::{RelationalRepository, SqliteEngine};
