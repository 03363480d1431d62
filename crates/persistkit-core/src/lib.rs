//! persistkit Core - storage-agnostic repository contract and population
//!
//! This crate provides the backend-neutral half of persistkit:
//! - Criteria model with JSON parsing, shared validation and the in-memory translator
//! - Entity schema and mapper contract used by every backend
//! - Entity registry with relation declarations and foreign-key derivation
//! - Async repository contract plus the in-memory repository
//! - Typed adapter over any `serde` entity type
//! - Relation-population engine resolving dotted include paths
//! - Settings loading and the structured logging facility

pub mod config;
pub mod criteria;
pub mod errors;
pub mod logging_facility;
pub mod mapper;
pub mod memory_repo;
pub mod populate;
pub mod registry;
pub mod repository;
pub mod typed;
pub mod value;

// Re-export commonly used types
pub use config::{Backend, RepoSettings};
pub use criteria::{Criteria, Criterion, Predicate, RangeOp};
pub use errors::{ExError, ExErrorKind, PersistError, Result};
pub use mapper::{EntitySchema, FieldDef, FieldKind, Mapper, SchemaMapper};
pub use memory_repo::MemoryRepository;
pub use populate::{IncludeTree, PopulatingRepository};
pub use registry::{EntityConfig, EntityRegistry, Relation, RegistryBuilder};
pub use repository::{ListQuery, Repository, RepositoryResolver, SortSpec};
pub use typed::TypedRepository;
pub use value::{EntityId, Record};
