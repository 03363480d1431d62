//! JSON values ↔ SQLite values, driven by the declared field kind
//!
//! Booleans are stored as 0/1, `Json` and `UuidList` as JSON text. An
//! untyped column (an identity without a declared kind) stores strings as
//! TEXT and numbers as INTEGER or REAL.

use persistkit_core::errors::{PersistError, Result};
use persistkit_core::mapper::FieldKind;
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::{Number, Value};

fn mismatch(column: &str, kind: &str, value: &Value) -> PersistError {
    PersistError::Serialization {
        message: format!("column '{}' expects {}, got {}", column, kind, value),
    }
}

fn number_to_sql(n: &Number) -> SqlValue {
    match n.as_i64() {
        Some(i) => SqlValue::Integer(i),
        None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
    }
}

fn untyped_to_sql(column: &str, value: &Value) -> Result<SqlValue> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => Ok(number_to_sql(n)),
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        other => Err(mismatch(column, "a scalar", other)),
    }
}

/// Convert a record value for storage in `column`
///
/// # Errors
///
/// `Serialization` when the value cannot be stored as `kind` and read back
/// unchanged. Numbers are never coerced to text, nor booleans to integers.
pub fn to_sql(column: &str, kind: Option<FieldKind>, value: &Value) -> Result<SqlValue> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }
    let Some(kind) = kind else {
        return untyped_to_sql(column, value);
    };
    match kind {
        FieldKind::Text | FieldKind::Uuid | FieldKind::Timestamp => match value {
            Value::String(s) => Ok(SqlValue::Text(s.clone())),
            other => Err(mismatch(column, "text", other)),
        },
        FieldKind::Integer => match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(SqlValue::Integer(i)),
                None => match n.as_f64() {
                    Some(f) if f.fract() == 0.0 => Ok(SqlValue::Integer(f as i64)),
                    _ => Err(mismatch(column, "an integer", value)),
                },
            },
            other => Err(mismatch(column, "an integer", other)),
        },
        FieldKind::Real => match value {
            Value::Number(n) => Ok(SqlValue::Real(n.as_f64().unwrap_or(f64::NAN))),
            other => Err(mismatch(column, "a number", other)),
        },
        FieldKind::Boolean => match value {
            Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
            other => Err(mismatch(column, "a boolean", other)),
        },
        FieldKind::Json | FieldKind::UuidList => Ok(SqlValue::Text(serde_json::to_string(value)?)),
    }
}

/// Convert a stored column value back into a record value
///
/// # Errors
///
/// `Serialization` for unparseable JSON text or BLOB values.
pub fn from_sql(column: &str, kind: Option<FieldKind>, raw: ValueRef<'_>) -> Result<Value> {
    let value = match raw {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => match kind {
            Some(FieldKind::Boolean) => Value::Bool(i != 0),
            Some(FieldKind::Real) => float(i as f64),
            _ => Value::from(i),
        },
        ValueRef::Real(f) => float(f),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            match kind {
                Some(FieldKind::Json | FieldKind::UuidList) => serde_json::from_str(&text)?,
                _ => Value::String(text.into_owned()),
            }
        }
        ValueRef::Blob(_) => {
            return Err(PersistError::Serialization {
                message: format!("column '{}' holds a BLOB", column),
            })
        }
    };
    Ok(value)
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_booleans_are_integers() {
        assert_eq!(
            to_sql("active", Some(FieldKind::Boolean), &json!(true)).unwrap(),
            SqlValue::Integer(1)
        );
        assert_eq!(
            from_sql("active", Some(FieldKind::Boolean), ValueRef::Integer(0)).unwrap(),
            json!(false)
        );
    }

    #[test]
    fn test_json_columns_hold_text() {
        let ids = json!(["p1", "p2"]);
        let stored = to_sql("productIds", Some(FieldKind::UuidList), &ids).unwrap();
        assert_eq!(stored, SqlValue::Text("[\"p1\",\"p2\"]".to_string()));
        let back = from_sql(
            "productIds",
            Some(FieldKind::UuidList),
            ValueRef::Text(b"[\"p1\",\"p2\"]"),
        )
        .unwrap();
        assert_eq!(back, ids);
    }

    #[test]
    fn test_real_columns_read_back_as_floats() {
        assert_eq!(
            from_sql("total", Some(FieldKind::Real), ValueRef::Integer(10)).unwrap(),
            json!(10.0)
        );
        assert_eq!(
            from_sql("total", Some(FieldKind::Real), ValueRef::Real(9.99)).unwrap(),
            json!(9.99)
        );
    }

    #[test]
    fn test_untyped_identity() {
        assert_eq!(to_sql("id", None, &json!("u1")).unwrap(), SqlValue::Text("u1".into()));
        assert_eq!(to_sql("id", None, &json!(7)).unwrap(), SqlValue::Integer(7));
        assert!(to_sql("id", None, &json!([1])).is_err());
    }

    #[test]
    fn test_kind_mismatch_is_serialization_error() {
        let err = to_sql("total", Some(FieldKind::Real), &json!("lots")).unwrap_err();
        assert!(matches!(err, PersistError::Serialization { .. }));
        assert_eq!(to_sql("note", Some(FieldKind::Text), &Value::Null).unwrap(), SqlValue::Null);
    }

    #[test]
    fn test_scalars_are_not_coerced_across_kinds() {
        for (kind, value) in [
            (FieldKind::Text, json!(42)),
            (FieldKind::Uuid, json!(true)),
            (FieldKind::Timestamp, json!(1.5)),
            (FieldKind::Integer, json!(true)),
            (FieldKind::Boolean, json!(1)),
        ] {
            let err = to_sql("col", Some(kind), &value).unwrap_err();
            assert!(matches!(err, PersistError::Serialization { .. }), "{:?} accepted {}", kind, value);
        }
        assert_eq!(
            to_sql("col", Some(FieldKind::Text), &json!("42")).unwrap(),
            SqlValue::Text("42".into())
        );
    }
}
