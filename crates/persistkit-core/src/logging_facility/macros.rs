//! Canonical logging macros
//!
//! Field names come from `persistkit_core_types::schema`, re-exported as
//! `logging_facility::schema` so the macros work from any crate.

/// Log the start of an operation
///
/// ```
/// # use persistkit_core::log_op_start;
/// log_op_start!("populate");
/// log_op_start!("populate", entity_key = "order");
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::logging_facility::schema::EVENT_START,
        );
    };
    ($op:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::logging_facility::schema::EVENT_START,
            $($field)*
        );
    };
}

/// Log the successful end of an operation
///
/// ```
/// # use persistkit_core::log_op_end;
/// log_op_end!("populate", duration_ms = 3);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::logging_facility::schema::EVENT_END,
            duration_ms = $duration,
        );
    };
    ($op:expr, duration_ms = $duration:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::logging_facility::schema::EVENT_END,
            duration_ms = $duration,
            $($field)*
        );
    };
}

/// Log an operation error with its canonical kind and code
///
/// ```
/// # use persistkit_core::{log_op_error, errors::PersistError};
/// let err = PersistError::UnknownEntity { entity_key: "invoice".to_string() };
/// log_op_error!("resolve", err, duration_ms = 0);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr) => {{
        let ex_err: $crate::errors::ExError = $err.into();
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::logging_facility::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err.kind = ?ex_err.kind(),
            err.code = ex_err.code(),
        );
    }};
    ($op:expr, $err:expr, duration_ms = $duration:expr, $($field:tt)*) => {{
        let ex_err: $crate::errors::ExError = $err.into();
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::logging_facility::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err.kind = ?ex_err.kind(),
            err.code = ex_err.code(),
            $($field)*
        );
    }};
}

/// Log that a query short-circuited on a vacuous criteria set
///
/// ```
/// # use persistkit_core::log_op_vacuous;
/// log_op_vacuous!("list_by_fields", entity_key = "order", backend = "memory");
/// ```
#[macro_export]
macro_rules! log_op_vacuous {
    ($op:expr, $($field:tt)*) => {
        tracing::debug!(
            component = module_path!(),
            op = $op,
            event = $crate::logging_facility::schema::EVENT_VACUOUS,
            $($field)*
        );
    };
}
