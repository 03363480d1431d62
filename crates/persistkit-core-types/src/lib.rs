//! Types shared by the persistkit error and logging facilities
//!
//! Canonical structured-log field keys and event names live in [`schema`];
//! both the logging macros and the test capture layer key off them.

pub mod schema;
