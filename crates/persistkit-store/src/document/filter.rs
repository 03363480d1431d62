//! Criteria → document filter translation

use persistkit_core::criteria::{Criteria, Predicate, RangeOp};
use persistkit_core::mapper::Mapper;
use persistkit_core::repository::SortSpec;
use serde_json::{json, Map, Value};

use super::driver::{Document, FindOptions};

/// Top-level conjunction key
pub const AND: &str = "$and";

fn op_object(pairs: impl IntoIterator<Item = (&'static str, Value)>) -> Value {
    let mut ops = Map::new();
    for (op, v) in pairs {
        ops.insert(op.to_string(), v);
    }
    Value::Object(ops)
}

fn range_pairs(ops: &[RangeOp]) -> Vec<(&'static str, Value)> {
    let mut pairs = Vec::with_capacity(ops.len());
    for op in ops {
        match op {
            RangeOp::Between(lo, hi) => {
                pairs.push(("$gte", lo.clone()));
                pairs.push(("$lte", hi.clone()));
            }
            RangeOp::Gte(v) => pairs.push(("$gte", v.clone())),
            RangeOp::Gt(v) => pairs.push(("$gt", v.clone())),
            RangeOp::Lte(v) => pairs.push(("$lte", v.clone())),
            RangeOp::Lt(v) => pairs.push(("$lt", v.clone())),
            RangeOp::In(values) => pairs.push(("$in", Value::Array(values.clone()))),
            RangeOp::Eq(v) => pairs.push(("$eq", v.clone())),
            RangeOp::Ne(v) => pairs.push(("$ne", v.clone())),
        }
    }
    pairs
}

/// Operator objects for one range predicate
///
/// Operators repeat when `between` meets an explicit bound or a range is
/// built with the same operator twice. A repeated operator opens a new
/// object so no bound is overwritten; every object must hold.
fn range_to_filter(ops: &[RangeOp]) -> Vec<Map<String, Value>> {
    let mut groups: Vec<Map<String, Value>> = Vec::new();
    for (op, operand) in range_pairs(ops) {
        match groups.iter_mut().find(|g| !g.contains_key(op)) {
            Some(group) => {
                group.insert(op.to_string(), operand);
            }
            None => {
                let mut group = Map::new();
                group.insert(op.to_string(), operand);
                groups.push(group);
            }
        }
    }
    groups
}

/// Translate validated criteria into a filter document
///
/// Field names go through the mapper, so `id` becomes `_id`. Callers must
/// run `persistkit_core::criteria::plan` first; vacuous criteria never
/// reach this function.
pub fn to_filter(criteria: &Criteria, mapper: &dyn Mapper) -> Document {
    let mut filter = Document::new();
    let mut conjuncts = Vec::new();
    for criterion in criteria.iter() {
        let key = mapper.attribute_to_storage_key(&criterion.field);
        let condition = match &criterion.predicate {
            Predicate::Null => op_object([("$eq", Value::Null)]),
            Predicate::Equals(v) => op_object([("$eq", v.clone())]),
            Predicate::NotEquals(v) => op_object([("$ne", v.clone())]),
            Predicate::MultiValue(values) => op_object([("$in", Value::Array(values.clone()))]),
            Predicate::Range(ops) => {
                let mut groups = range_to_filter(ops).into_iter();
                let first = groups.next().unwrap_or_default();
                for extra in groups {
                    let mut conjunct = Document::new();
                    conjunct.insert(key.clone(), Value::Object(extra));
                    conjuncts.push(Value::Object(conjunct));
                }
                Value::Object(first)
            }
        };
        filter.insert(key, condition);
    }
    if !conjuncts.is_empty() {
        filter.insert(AND.to_string(), Value::Array(conjuncts));
    }
    filter
}

/// Equality filter on one storage key
pub fn eq_filter(key: &str, value: &Value) -> Document {
    let mut filter = Document::new();
    filter.insert(key.to_string(), json!({ "$eq": value }));
    filter
}

/// Find options for a list window
pub fn find_options(
    sort: Option<&SortSpec>,
    offset: usize,
    limit: Option<usize>,
    mapper: &dyn Mapper,
) -> FindOptions {
    FindOptions {
        sort: sort.map(|s| (mapper.attribute_to_storage_key(&s.field), s.descending)),
        skip: offset,
        limit,
    }
}
