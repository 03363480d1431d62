//! Boundary wrapper for async repository operations

use std::future::Future;
use std::time::Instant;

use crate::errors::Result;
use crate::{log_op_end, log_op_error, log_op_start};

/// Run `fut` between a start event and an end (or end_error) event
///
/// Every repository implementation routes its public operations through
/// this so the event stream has one start and one terminal event per call.
pub async fn observe<T, F>(op: &'static str, entity_key: &str, backend: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let started = Instant::now();
    log_op_start!(op, entity_key = entity_key, backend = backend);

    let result = fut.await;
    let duration_ms = started.elapsed().as_millis() as u64;

    match &result {
        Ok(_) => {
            log_op_end!(op, duration_ms = duration_ms, entity_key = entity_key, backend = backend);
        }
        Err(err) => {
            log_op_error!(op, err, duration_ms = duration_ms, entity_key = entity_key, backend = backend);
        }
    }

    result
}
