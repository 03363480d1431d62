//! Structured logging facility for persistkit
//!
//! - Single initialization point via `init(profile)`
//! - Operation boundary macros (`log_op_start!`, `log_op_end!`, `log_op_error!`)
//! - `observe` wrapper that brackets an async repository call with
//!   start/end/end_error events and its duration
//! - Test capture mode for deterministic assertions
//!
//! # Usage
//!
//! ```rust
//! use persistkit_core::logging_facility::{init, Profile};
//!
//! init(Profile::Development);
//! ```

pub mod init;
pub mod macros;
pub mod observe;
pub mod test_capture;

pub use init::{init, Profile};
pub use persistkit_core_types::schema;
pub use observe::observe;
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
