//! Error helpers for the store backends
//!
//! Driver errors are folded into `persistkit_core::errors::PersistError`:
//! constraint failures become `ConstraintViolation`, everything else
//! `BackendFailure`.

use persistkit_core::errors::PersistError;
use rusqlite::ErrorCode;

pub use persistkit_core::errors::Result;

/// Map a rusqlite error raised while running `op` for `entity`
pub fn from_rusqlite(op: &str, entity: &str, err: rusqlite::Error) -> PersistError {
    match &err {
        rusqlite::Error::SqliteFailure(code, message) if code.code == ErrorCode::ConstraintViolation => {
            let message = message.clone().unwrap_or_else(|| err.to_string());
            PersistError::ConstraintViolation {
                entity: entity.to_string(),
                constraint: constraint_name(&message),
                message,
            }
        }
        _ => PersistError::backend(op, err),
    }
}

/// Closure form of [`from_rusqlite`] for `map_err`
pub fn sql_err<'a>(op: &'a str, entity: &'a str) -> impl Fn(rusqlite::Error) -> PersistError + 'a {
    move |err| from_rusqlite(op, entity, err)
}

/// Blocking task panicked or was cancelled
pub fn join_error(op: &str, err: tokio::task::JoinError) -> PersistError {
    PersistError::backend(op, format!("blocking task failed: {}", err))
}

/// Constraint named in a SQLite message
///
/// `"UNIQUE constraint failed: users.email"` → `"users.email"`,
/// `"FOREIGN KEY constraint failed"` → `"foreign key"`.
fn constraint_name(message: &str) -> String {
    if let Some((kind, rest)) = message.split_once(" constraint failed") {
        let target = rest.trim_start_matches(':').trim();
        if target.is_empty() {
            kind.to_ascii_lowercase()
        } else {
            target.to_string()
        }
    } else {
        "constraint".to_string()
    }
}

/// Rewrite a constraint violation reported against a collection so it names
/// the entity key instead
pub fn for_entity(err: PersistError, entity_key: &str) -> PersistError {
    match err {
        PersistError::ConstraintViolation {
            constraint,
            message,
            ..
        } => PersistError::ConstraintViolation {
            entity: entity_key.to_string(),
            constraint,
            message,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistkit_core::errors::ExErrorKind;
    use rusqlite::Connection;

    #[test]
    fn test_unique_failure_is_constraint_violation() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, email TEXT UNIQUE)")
            .unwrap();
        conn.execute("INSERT INTO t VALUES (1, 'a')", []).unwrap();
        let err = conn
            .execute("INSERT INTO t VALUES (2, 'a')", [])
            .unwrap_err();

        let mapped = from_rusqlite("add", "user", err);
        assert_eq!(mapped.kind(), ExErrorKind::ConstraintViolation);
        assert!(matches!(mapped, PersistError::ConstraintViolation { ref constraint, .. } if constraint == "t.email"));
    }

    #[test]
    fn test_other_failures_are_backend() {
        let conn = Connection::open_in_memory().unwrap();
        let err = conn.execute("SELECT * FROM missing", []).unwrap_err();
        assert_eq!(from_rusqlite("list", "user", err).kind(), ExErrorKind::BackendFailure);
    }

    #[test]
    fn test_constraint_names() {
        assert_eq!(constraint_name("UNIQUE constraint failed: users.email"), "users.email");
        assert_eq!(constraint_name("FOREIGN KEY constraint failed"), "foreign key");
        assert_eq!(constraint_name("something odd"), "constraint");
    }

    #[test]
    fn test_for_entity_rewrites_only_constraints() {
        let err = PersistError::ConstraintViolation {
            entity: "users".into(),
            constraint: "uniq_email".into(),
            message: "dup".into(),
        };
        assert!(matches!(for_entity(err, "user"), PersistError::ConstraintViolation { ref entity, .. } if entity == "user"));

        let other = PersistError::backend("find", "boom");
        assert_eq!(for_entity(other.clone(), "user"), other);
    }
}
