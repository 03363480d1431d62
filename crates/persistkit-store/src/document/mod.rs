//! Document-store backend

pub mod driver;
pub mod evaluator;
pub mod filter;
pub mod in_process;
pub mod repository;

pub use driver::{Document, DocumentCollection, DocumentDatabase, FindOptions, DOCUMENT_ID};
pub use in_process::{InProcessCollection, InProcessDatabase};
pub use repository::DocumentRepository;
