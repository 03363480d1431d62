//! Record representation and value ordering shared by in-process backends
//!
//! Entities travel through the type-erased layer as JSON objects. Ordering
//! is total so sorting never panics on mixed or missing values:
//! null < bool < number < string < array < object.

use std::cmp::Ordering;

use serde_json::{Map, Value};

/// An entity in attribute space (or a backend row/document in storage space)
pub type Record = Map<String, Value>;

/// Identity value of an entity; always a JSON scalar
pub type EntityId = Value;

/// Name of the identity attribute on every entity
pub const ID_FIELD: &str = "id";

fn rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_numbers(a: &serde_json::Number, b: &serde_json::Number) -> Ordering {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x.cmp(&y);
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x.cmp(&y);
    }
    let x = a.as_f64().unwrap_or(f64::NAN);
    let y = b.as_f64().unwrap_or(f64::NAN);
    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
}

/// Total order over JSON values, used for sorting
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Ordering for range predicates: only defined between non-null values of
/// the same kind, so `"10" > 5` is simply false rather than true by rank
pub fn comparable(a: &Value, b: &Value) -> Option<Ordering> {
    if a.is_null() || b.is_null() || rank(a) != rank(b) {
        return None;
    }
    Some(compare_values(a, b))
}

/// Equality with numeric normalisation (`1 == 1.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y) == Ordering::Equal,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| values_equal(l, r))
        }
        _ => a == b,
    }
}

/// Canonical hashable key for an identity or indexed value
///
/// Returns `None` for null: null values are never indexed.
pub fn value_key(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::Bool(b) => Some(format!("b:{}", b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(format!("n:{}", i))
            } else if let Some(u) = n.as_u64() {
                Some(format!("n:{}", u))
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    Some(format!("n:{}", f as i64))
                } else {
                    Some(format!("n:{}", f))
                }
            }
        }
        Value::String(s) => Some(format!("s:{}", s)),
        other => Some(format!("j:{}", other)),
    }
}

/// Field value of a record; absent fields read as null
pub fn field_value<'a>(record: &'a Record, field: &str) -> &'a Value {
    record.get(field).unwrap_or(&Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numbers_compare_across_representations() {
        assert_eq!(compare_values(&json!(10), &json!(10.0)), Ordering::Equal);
        assert_eq!(compare_values(&json!(9.99), &json!(10)), Ordering::Less);
        assert!(values_equal(&json!(1), &json!(1.0)));
    }

    #[test]
    fn test_null_sorts_first() {
        assert_eq!(compare_values(&Value::Null, &json!(false)), Ordering::Less);
        assert_eq!(compare_values(&json!("a"), &Value::Null), Ordering::Greater);
    }

    #[test]
    fn test_comparable_rejects_mixed_kinds() {
        assert_eq!(comparable(&json!("10"), &json!(5)), None);
        assert_eq!(comparable(&Value::Null, &json!(5)), None);
        assert_eq!(comparable(&json!(15), &json!(10)), Some(Ordering::Greater));
    }

    #[test]
    fn test_value_key_normalises_integral_floats() {
        assert_eq!(value_key(&json!(42)), value_key(&json!(42.0)));
        assert_ne!(value_key(&json!(42)), value_key(&json!("42")));
        assert_eq!(value_key(&Value::Null), None);
    }
}
