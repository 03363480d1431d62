//! In-memory translator: criteria compiled to a record predicate

use std::cmp::Ordering;

use serde_json::Value;

use crate::criteria::{Criteria, Criterion, Predicate, RangeOp};
use crate::repository::SortSpec;
use crate::value::{comparable, compare_values, field_value, values_equal, Record};

/// Compiled predicate over records in attribute space
///
/// A null stored value matches only `Null`, `Equals(null)` and `eq: null`.
/// Ordering comparisons against null or a value of another kind are false.
#[derive(Debug, Clone)]
pub struct MemoryFilter {
    criteria: Vec<Criterion>,
}

impl MemoryFilter {
    pub fn compile(criteria: &Criteria) -> Self {
        Self {
            criteria: criteria.iter().cloned().collect(),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.criteria
            .iter()
            .all(|c| predicate_matches(&c.predicate, field_value(record, &c.field)))
    }
}

fn member(val: &Value, set: &[Value]) -> bool {
    !val.is_null() && set.iter().any(|v| values_equal(val, v))
}

fn ordered(val: &Value, operand: &Value, accept: fn(Ordering) -> bool) -> bool {
    comparable(val, operand).map(accept).unwrap_or(false)
}

fn range_op_matches(op: &RangeOp, val: &Value) -> bool {
    match op {
        RangeOp::Gte(v) => ordered(val, v, Ordering::is_ge),
        RangeOp::Gt(v) => ordered(val, v, Ordering::is_gt),
        RangeOp::Lte(v) => ordered(val, v, Ordering::is_le),
        RangeOp::Lt(v) => ordered(val, v, Ordering::is_lt),
        RangeOp::Between(lo, hi) => {
            ordered(val, lo, Ordering::is_ge) && ordered(val, hi, Ordering::is_le)
        }
        RangeOp::In(set) => member(val, set),
        RangeOp::Eq(v) => values_equal(val, v),
        RangeOp::Ne(v) => !val.is_null() && !values_equal(val, v),
    }
}

fn predicate_matches(predicate: &Predicate, val: &Value) -> bool {
    match predicate {
        Predicate::Null => val.is_null(),
        Predicate::Equals(v) => values_equal(val, v),
        Predicate::NotEquals(v) => !val.is_null() && !values_equal(val, v),
        Predicate::MultiValue(set) => member(val, set),
        Predicate::Range(ops) => !ops.is_empty() && ops.iter().all(|op| range_op_matches(op, val)),
    }
}

/// Stable sort by one attribute; descending reverses the comparator
pub fn sort_records(records: &mut [Record], sort: &SortSpec) {
    records.sort_by(|a, b| {
        let ord = compare_values(field_value(a, &sort.field), field_value(b, &sort.field));
        if sort.descending {
            ord.reverse()
        } else {
            ord
        }
    });
}
