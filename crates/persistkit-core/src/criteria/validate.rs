//! Validation shared by every backend translator

use crate::criteria::Criteria;
use crate::errors::{PersistError, Result};
use crate::mapper::Mapper;
use crate::repository::SortSpec;

/// Outcome of validating a criteria set against an entity
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueryPlan<'a> {
    /// Nothing can match; answer with an empty result and touch no storage
    Vacuous,
    /// Criteria are valid and must be translated for the backend
    Filter(&'a Criteria),
}

impl QueryPlan<'_> {
    pub fn is_vacuous(&self) -> bool {
        matches!(self, QueryPlan::Vacuous)
    }
}

/// Validate `criteria` (and the optional sort) before any backend call
///
/// Order matters and is the same for every backend:
/// 1. an empty set is vacuous (never "match all")
/// 2. every field and the sort attribute must be declared
/// 3. any never-match sentinel makes the set vacuous
///
/// # Errors
///
/// `InvalidField` for an undeclared criteria field, `InvalidSort` for an
/// undeclared sort attribute.
pub fn plan<'a>(
    criteria: &'a Criteria,
    sort: Option<&SortSpec>,
    mapper: &dyn Mapper,
) -> Result<QueryPlan<'a>> {
    if criteria.is_empty() {
        return Ok(QueryPlan::Vacuous);
    }

    for criterion in criteria.iter() {
        if !mapper.has_attribute(&criterion.field) {
            return Err(PersistError::InvalidField {
                entity: mapper.entity_name().to_string(),
                field: criterion.field.clone(),
            });
        }
    }
    validate_sort(sort, mapper)?;

    if criteria.is_vacuous() {
        return Ok(QueryPlan::Vacuous);
    }
    Ok(QueryPlan::Filter(criteria))
}

/// # Errors
///
/// `InvalidSort` if the sort attribute is not declared by the entity.
pub fn validate_sort(sort: Option<&SortSpec>, mapper: &dyn Mapper) -> Result<()> {
    match sort {
        Some(spec) if !mapper.has_attribute(&spec.field) => Err(PersistError::InvalidSort {
            entity: mapper.entity_name().to_string(),
            field: spec.field.clone(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::RangeOp;
    use crate::mapper::{EntitySchema, FieldKind, SchemaMapper};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn mapper() -> SchemaMapper {
        let schema = EntitySchema::new("Order").field("total", FieldKind::Real);
        SchemaMapper::new(Arc::new(schema), "orders", BTreeMap::new())
    }

    #[test]
    fn test_empty_set_is_vacuous() {
        let criteria = Criteria::new();
        assert!(plan(&criteria, None, &mapper()).unwrap().is_vacuous());
    }

    #[test]
    fn test_unknown_field_checked_before_sentinel() {
        // Sentinel on a bad field still reports the bad field
        let criteria = Criteria::new().any_of("colour", Vec::<String>::new());
        let err = plan(&criteria, None, &mapper()).unwrap_err();
        assert!(matches!(err, PersistError::InvalidField { ref field, .. } if field == "colour"));
    }

    #[test]
    fn test_empty_in_is_vacuous() {
        let criteria = Criteria::new()
            .eq("total", 10)
            .range("id", vec![RangeOp::In(vec![])]);
        assert!(plan(&criteria, None, &mapper()).unwrap().is_vacuous());
    }

    #[test]
    fn test_valid_criteria_pass_through() {
        let criteria = Criteria::new().eq("total", 10);
        assert_eq!(
            plan(&criteria, None, &mapper()).unwrap(),
            QueryPlan::Filter(&criteria)
        );
    }

    #[test]
    fn test_sort_attribute_must_exist() {
        let criteria = Criteria::new().eq("total", 10);
        let sort = SortSpec::asc("placedAt");
        let err = plan(&criteria, Some(&sort), &mapper()).unwrap_err();
        assert!(matches!(err, PersistError::InvalidSort { .. }));

        assert!(validate_sort(Some(&SortSpec::desc("id")), &mapper()).is_ok());
        assert!(validate_sort(None, &mapper()).is_ok());
    }
}
