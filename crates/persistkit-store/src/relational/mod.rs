//! Relational backend on SQLite

pub mod convert;
pub mod engine;
pub mod repository;
pub mod schema_evolve;
pub mod table;
pub mod where_clause;

pub use engine::SqliteEngine;
pub use repository::RelationalRepository;
pub use table::TableSpec;
pub use where_clause::{build_where, WhereClause};
