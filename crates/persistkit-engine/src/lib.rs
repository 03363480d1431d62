//! persistkit Engine - repository factory and relation resolver
//!
//! Provides the `PersistenceContext`, which owns the entity registry, the
//! process settings and the backend handles, hands out one cached
//! repository per entity key and resolved backend, and serves as the
//! resolver the population engine calls back into.

pub mod context;
pub mod handles;

pub use context::PersistenceContext;
pub use handles::BackendHandles;
