//! Filter document evaluation for the in-process document database
//!
//! Follows document-store semantics rather than SQL ones: a missing field
//! reads as null, `$eq: null` matches missing fields, `$ne` matches them,
//! and ordering operators never match across value kinds.

use std::cmp::Ordering;

use persistkit_core::errors::{PersistError, Result};
use persistkit_core::value::{comparable, values_equal};
use serde_json::Value;

use super::driver::Document;
use super::filter::AND;

fn ordered(stored: &Value, operand: &Value, accept: fn(Ordering) -> bool) -> bool {
    comparable(stored, operand).map(accept).unwrap_or(false)
}

fn operator_matches(op: &str, operand: &Value, stored: &Value) -> Result<bool> {
    Ok(match op {
        "$eq" => values_equal(stored, operand),
        "$ne" => !values_equal(stored, operand),
        "$gt" => ordered(stored, operand, Ordering::is_gt),
        "$gte" => ordered(stored, operand, Ordering::is_ge),
        "$lt" => ordered(stored, operand, Ordering::is_lt),
        "$lte" => ordered(stored, operand, Ordering::is_le),
        "$in" => match operand {
            Value::Array(values) => values.iter().any(|v| values_equal(stored, v)),
            _ => return Err(PersistError::backend("find", "$in needs an array")),
        },
        other => {
            return Err(PersistError::backend(
                "find",
                format!("unsupported filter operator '{}'", other),
            ))
        }
    })
}

fn condition_matches(condition: &Value, stored: &Value) -> Result<bool> {
    match condition {
        Value::Object(ops) if ops.keys().all(|k| k.starts_with('$')) && !ops.is_empty() => {
            for (op, operand) in ops {
                if !operator_matches(op, operand, stored)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        literal => Ok(values_equal(stored, literal)),
    }
}

fn all_match(conjuncts: &Value, doc: &Document) -> Result<bool> {
    let Value::Array(items) = conjuncts else {
        return Err(PersistError::backend("find", "$and needs an array"));
    };
    for item in items {
        let Value::Object(sub) = item else {
            return Err(PersistError::backend("find", "$and entries must be documents"));
        };
        if !matches(sub, doc)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// True when `doc` satisfies every field condition of `filter`
///
/// # Errors
///
/// `BackendFailure` for operators outside the supported set.
pub fn matches(filter: &Document, doc: &Document) -> Result<bool> {
    for (field, condition) in filter {
        if field == AND {
            if !all_match(condition, doc)? {
                return Ok(false);
            }
            continue;
        }
        let stored = doc.get(field).unwrap_or(&Value::Null);
        if !condition_matches(condition, stored)? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(matches(&Document::new(), &doc(json!({"_id": 1}))).unwrap());
    }

    #[test]
    fn test_missing_field_semantics() {
        let d = doc(json!({"_id": 1}));
        assert!(matches(&doc(json!({"note": {"$eq": null}})), &d).unwrap());
        assert!(matches(&doc(json!({"note": {"$ne": "x"}})), &d).unwrap());
        assert!(!matches(&doc(json!({"note": {"$gte": 0}})), &d).unwrap());
    }

    #[test]
    fn test_range_and_membership() {
        let d = doc(json!({"_id": 1, "total": 15}));
        assert!(matches(&doc(json!({"total": {"$gte": 10, "$lte": 20}})), &d).unwrap());
        assert!(!matches(&doc(json!({"total": {"$gt": 15}})), &d).unwrap());
        assert!(matches(&doc(json!({"total": {"$in": [1, 15.0]}})), &d).unwrap());
        assert!(matches(&doc(json!({"total": 15})), &d).unwrap());
    }

    #[test]
    fn test_and_requires_every_conjunct() {
        let filter = doc(json!({"total": {"$gte": 10, "$lte": 20}, "$and": [{"total": {"$gte": 12}}]}));
        assert!(matches(&filter, &doc(json!({"_id": 1, "total": 15}))).unwrap());
        assert!(!matches(&filter, &doc(json!({"_id": 2, "total": 11}))).unwrap());
        assert!(matches(&doc(json!({"$and": 1})), &doc(json!({"_id": 1}))).is_err());
    }

    #[test]
    fn test_unknown_operator_is_backend_failure() {
        let d = doc(json!({"_id": 1}));
        let err = matches(&doc(json!({"_id": {"$regex": "a"}})), &d).unwrap_err();
        assert!(matches!(err, PersistError::Backend { .. }));
    }
}
