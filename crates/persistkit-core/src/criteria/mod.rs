//! Backend-neutral filter model
//!
//! A [`Criteria`] set maps field names to predicates, ANDed together. It is
//! built programmatically or parsed from the JSON wire shape:
//!
//! - `null` ⇒ [`Predicate::Null`]
//! - array ⇒ [`Predicate::MultiValue`]
//! - object ⇒ [`Predicate::Range`] over `gte/gt/lte/lt/between/in/eq/ne`
//! - any other scalar ⇒ [`Predicate::Equals`]
//!
//! Shape errors (`between` without exactly two values, `in` without a list,
//! unknown operator keys) are raised while parsing, before any backend sees
//! the criteria.

pub mod memory;
pub mod validate;

use serde_json::Value;

use crate::errors::{PersistError, Result};

pub use memory::{sort_records, MemoryFilter};
pub use validate::{plan, validate_sort, QueryPlan};

/// One comparison inside a range object
#[derive(Debug, Clone, PartialEq)]
pub enum RangeOp {
    Gte(Value),
    Gt(Value),
    Lte(Value),
    Lt(Value),
    /// Inclusive on both ends
    Between(Value, Value),
    In(Vec<Value>),
    Eq(Value),
    Ne(Value),
}

impl RangeOp {
    /// Wire name of the operator
    pub fn name(&self) -> &'static str {
        match self {
            RangeOp::Gte(_) => "gte",
            RangeOp::Gt(_) => "gt",
            RangeOp::Lte(_) => "lte",
            RangeOp::Lt(_) => "lt",
            RangeOp::Between(..) => "between",
            RangeOp::In(_) => "in",
            RangeOp::Eq(_) => "eq",
            RangeOp::Ne(_) => "ne",
        }
    }

    /// Parse one `op: operand` pair of a range object
    ///
    /// # Errors
    ///
    /// `InvalidOperator` for keys outside the operator set, `InvalidOperand`
    /// when `between` is not a two-element list or `in` is not a list.
    pub fn parse(field: &str, op: &str, operand: &Value) -> Result<Self> {
        let bad_operand = |reason: &str| PersistError::InvalidOperand {
            field: field.to_string(),
            op: op.to_string(),
            reason: reason.to_string(),
        };
        match op {
            "gte" => Ok(RangeOp::Gte(operand.clone())),
            "gt" => Ok(RangeOp::Gt(operand.clone())),
            "lte" => Ok(RangeOp::Lte(operand.clone())),
            "lt" => Ok(RangeOp::Lt(operand.clone())),
            "eq" => Ok(RangeOp::Eq(operand.clone())),
            "ne" => Ok(RangeOp::Ne(operand.clone())),
            "between" => match operand {
                Value::Array(bounds) if bounds.len() == 2 => {
                    Ok(RangeOp::Between(bounds[0].clone(), bounds[1].clone()))
                }
                _ => Err(bad_operand("between expects a list with exactly two values")),
            },
            "in" => match operand {
                Value::Array(values) => Ok(RangeOp::In(values.clone())),
                _ => Err(bad_operand("in expects a list")),
            },
            other => Err(PersistError::InvalidOperator {
                field: field.to_string(),
                op: other.to_string(),
            }),
        }
    }
}

/// Field-level predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Field absent or null
    Null,
    Equals(Value),
    NotEquals(Value),
    /// Membership; an empty set never matches
    MultiValue(Vec<Value>),
    /// All operators must hold; an empty list or an empty `in` never matches
    Range(Vec<RangeOp>),
}

impl Predicate {
    /// True when this predicate can match nothing, making the whole set vacuous
    pub fn is_never_match(&self) -> bool {
        match self {
            Predicate::MultiValue(values) => values.is_empty(),
            Predicate::Range(ops) => {
                ops.is_empty()
                    || ops
                        .iter()
                        .any(|op| matches!(op, RangeOp::In(values) if values.is_empty()))
            }
            _ => false,
        }
    }

    fn parse(field: &str, value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Predicate::Null),
            Value::Array(values) => Ok(Predicate::MultiValue(values.clone())),
            Value::Object(ops) => ops
                .iter()
                .map(|(op, operand)| RangeOp::parse(field, op, operand))
                .collect::<Result<Vec<_>>>()
                .map(Predicate::Range),
            scalar => Ok(Predicate::Equals(scalar.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Criterion {
    pub field: String,
    pub predicate: Predicate,
}

/// Conjunction of field criteria, one per field, in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    items: Vec<Criterion>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the JSON wire shape
    ///
    /// ```
    /// use persistkit_core::criteria::{Criteria, Predicate, RangeOp};
    /// use serde_json::json;
    ///
    /// let criteria = Criteria::from_json(&json!({"total": {"gte": 10, "lte": 20}})).unwrap();
    /// assert_eq!(
    ///     criteria.get("total"),
    ///     Some(&Predicate::Range(vec![RangeOp::Gte(json!(10)), RangeOp::Lte(json!(20))]))
    /// );
    /// ```
    ///
    /// # Errors
    ///
    /// `InvalidOperand` if the payload is not an object or a range operand is
    /// malformed, `InvalidOperator` for an unknown range key.
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| PersistError::InvalidOperand {
            field: String::new(),
            op: "criteria".to_string(),
            reason: "criteria must be a JSON object".to_string(),
        })?;
        let mut criteria = Criteria::new();
        for (field, v) in obj {
            criteria.set(field, Predicate::parse(field, v)?);
        }
        Ok(criteria)
    }

    /// Set the predicate for `field`, replacing any previous one
    pub fn set(&mut self, field: impl Into<String>, predicate: Predicate) {
        let field = field.into();
        match self.items.iter_mut().find(|c| c.field == field) {
            Some(existing) => existing.predicate = predicate,
            None => self.items.push(Criterion { field, predicate }),
        }
    }

    pub fn with(mut self, field: impl Into<String>, predicate: Predicate) -> Self {
        self.set(field, predicate);
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Predicate::Equals(value.into()))
    }

    pub fn ne(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Predicate::NotEquals(value.into()))
    }

    pub fn is_null(self, field: impl Into<String>) -> Self {
        self.with(field, Predicate::Null)
    }

    pub fn any_of<I, V>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.with(
            field,
            Predicate::MultiValue(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn range(self, field: impl Into<String>, ops: Vec<RangeOp>) -> Self {
        self.with(field, Predicate::Range(ops))
    }

    pub fn between(self, field: impl Into<String>, lo: impl Into<Value>, hi: impl Into<Value>) -> Self {
        self.range(field, vec![RangeOp::Between(lo.into(), hi.into())])
    }

    pub fn get(&self, field: &str) -> Option<&Predicate> {
        self.items
            .iter()
            .find(|c| c.field == field)
            .map(|c| &c.predicate)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Criterion> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True if any criterion can never match
    pub fn is_vacuous(&self) -> bool {
        self.items.iter().any(|c| c.predicate.is_never_match())
    }
}
