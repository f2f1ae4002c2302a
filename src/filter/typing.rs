//! Operator / type compatibility
//!
//! `coerce_operand` is the single rule table: it decides whether an operator
//! applies to a field and interprets the operand against the field type.
//! `evaluate_types` re-applies it to an already-built tree.

use regex::Regex;

use crate::schema::FieldRef;
use crate::value::{FieldType, Value};

use super::ast::Filter;
use super::errors::FilterError;
use super::operator::{Arity, Operator, OperatorFamily};

/// What a filter leaf needs to know about the field it references
pub trait TypedField {
    fn name(&self) -> &str;
    fn field_type(&self) -> &FieldType;
    fn is_nullable(&self) -> bool;
}

impl TypedField for FieldRef {
    fn name(&self) -> &str {
        &self.field_name
    }

    fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    fn is_nullable(&self) -> bool {
        self.nullable
    }
}

/// Validates `operator` against `field` and coerces the operand.
///
/// Returns the operand as it should appear in the canonical tree.
pub fn coerce_operand<F: TypedField + ?Sized>(
    field: &F,
    operator: Operator,
    value: Option<&Value>,
) -> Result<Option<Value>, FilterError> {
    let name = field.name();
    let field_type = field.field_type();
    check_applicable(field, operator)?;

    match (operator.arity(), value) {
        (Arity::None, None) => Ok(None),
        (Arity::None, Some(_)) => Err(FilterError::invalid_arity(
            name,
            format!("{} takes no operand", operator),
        )),
        (_, None) => Err(FilterError::invalid_arity(
            name,
            format!("{} requires an operand", operator),
        )),
        (Arity::One, Some(value)) => {
            let target = operand_type(operator, field_type);
            if value.is_array() && !target.is_array() {
                return Err(FilterError::invalid_arity(
                    name,
                    format!("{} takes a single value, got a list", operator),
                ));
            }
            let coerced = coerce(name, operator, value, &target)?;
            match (operator, &coerced) {
                (Operator::Matches, Value::String(pattern)) => {
                    Regex::new(pattern).map_err(|e| {
                        FilterError::invalid_pattern(name, format!("invalid MATCHES pattern: {}", e))
                    })?;
                }
                (Operator::ArrayLengthEq | Operator::ArrayLengthGt, Value::Int(n)) if *n < 0 => {
                    return Err(FilterError::type_mismatch(
                        name,
                        format!("{} requires a non-negative length", operator),
                    ));
                }
                _ => {}
            }
            Ok(Some(coerced))
        }
        (Arity::List, Some(Value::Array(items))) => {
            if items.is_empty() {
                return Err(FilterError::invalid_arity(
                    name,
                    format!("{} requires a non-empty list", operator),
                ));
            }
            let target = operand_type(operator, field_type);
            items
                .iter()
                .map(|item| coerce(name, operator, item, &target))
                .collect::<Result<Vec<_>, _>>()
                .map(|items| Some(Value::Array(items)))
        }
        (Arity::List, Some(_)) => Err(FilterError::invalid_arity(
            name,
            format!("{} requires a list of values", operator),
        )),
        (Arity::Pair, Some(Value::Array(bounds))) if bounds.len() == 2 => {
            let low = coerce(name, operator, &bounds[0], field_type)?;
            let high = coerce(name, operator, &bounds[1], field_type)?;
            if low.compare(&high) == Some(std::cmp::Ordering::Greater) {
                return Err(FilterError::invalid_arity(
                    name,
                    format!("{} bounds are reversed: {} > {}", operator, low, high),
                ));
            }
            Ok(Some(Value::Array(vec![low, high])))
        }
        (Arity::Pair, Some(_)) => Err(FilterError::invalid_arity(
            name,
            format!("{} requires exactly two bounds", operator),
        )),
    }
}

fn check_applicable<F: TypedField + ?Sized>(field: &F, operator: Operator) -> Result<(), FilterError> {
    let name = field.name();
    let field_type = field.field_type();
    let reject = |what: &str| {
        Err(FilterError::type_mismatch(
            name,
            format!("{} requires {}, field is {}", operator, what, field_type),
        ))
    };

    match operator.family() {
        OperatorFamily::Equality if matches!(field_type, FieldType::Map(_) | FieldType::Object) => {
            reject("a comparable field")
        }
        OperatorFamily::Ordering | OperatorFamily::Range if !field_type.is_orderable() => {
            reject("an orderable field")
        }
        OperatorFamily::Membership if field_type.is_container() => reject("a scalar field"),
        OperatorFamily::Text if !field_type.is_string() => reject("a string field"),
        OperatorFamily::Array if !field_type.is_array() => reject("an array field"),
        OperatorFamily::Null if !field.is_nullable() => Err(FilterError::type_mismatch(
            name,
            format!("{} on non-nullable field", operator),
        )),
        _ => Ok(()),
    }
}

/// Type a single operand (or list element) must have
fn operand_type(operator: Operator, field_type: &FieldType) -> FieldType {
    match operator {
        Operator::ArrayContains | Operator::ArrayContainsAny | Operator::ArrayContainsAll => {
            field_type.element_type().cloned().unwrap_or(FieldType::String)
        }
        Operator::ArrayLengthEq | Operator::ArrayLengthGt => FieldType::Int64,
        _ if operator.family() == OperatorFamily::Text => FieldType::String,
        _ => field_type.clone(),
    }
}

fn coerce(name: &str, operator: Operator, value: &Value, target: &FieldType) -> Result<Value, FilterError> {
    value
        .coerce_to(target)
        .map_err(|e| FilterError::type_mismatch(name, format!("{} operand: {}", operator, e)))
}

/// Validates every leaf of a typed tree, collecting all failures
pub fn evaluate_types<F: TypedField>(filter: &Filter<F>) -> Result<(), Vec<FilterError>> {
    let errors: Vec<FilterError> = filter
        .conditions()
        .into_iter()
        .filter_map(|c| coerce_operand(&c.field, c.operator, c.value.as_ref()).err())
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Structural limits: nesting depth and leaf count
pub fn check_limits<F>(filter: &Filter<F>, max_depth: usize, max_conditions: usize) -> Result<(), FilterError> {
    let depth = filter.depth();
    if depth > max_depth {
        return Err(FilterError::limit_exceeded(format!(
            "filter depth {} exceeds maximum {}",
            depth, max_depth
        )));
    }
    let count = filter.condition_count();
    if count > max_conditions {
        return Err(FilterError::limit_exceeded(format!(
            "filter has {} conditions, maximum is {}",
            count, max_conditions
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterErrorCode;
    use crate::schema::FieldId;

    fn field(name: &str, field_type: FieldType, nullable: bool) -> FieldRef {
        FieldRef {
            field_name: name.into(),
            field_id: FieldId(name.into()),
            entity: "t".into(),
            relation: None,
            field_type,
            nullable,
            indexed: false,
            is_pii: false,
        }
    }

    #[test]
    fn test_ordering_needs_orderable_field() {
        let flag = field("active", FieldType::Bool, false);
        let err = coerce_operand(&flag, Operator::Gt, Some(&Value::Bool(true))).unwrap_err();
        assert_eq!(err.code, FilterErrorCode::TypeMismatch);

        let created = field("created_at", FieldType::Timestamp, false);
        let v = coerce_operand(&created, Operator::Gte, Some(&Value::from("2024-01-01T00:00:00Z")))
            .unwrap()
            .unwrap();
        assert!(matches!(v, Value::Timestamp(_)));
    }

    #[test]
    fn test_no_silent_coercion() {
        let total = field("total", FieldType::Float64, false);
        let err = coerce_operand(&total, Operator::Eq, Some(&Value::from("12.5"))).unwrap_err();
        assert_eq!(err.code, FilterErrorCode::TypeMismatch);
    }

    #[test]
    fn test_membership_and_range_arity() {
        let qty = field("qty", FieldType::Int32, false);
        assert_eq!(
            coerce_operand(&qty, Operator::In, Some(&Value::Int(1))).unwrap_err().code,
            FilterErrorCode::InvalidArity
        );
        assert_eq!(
            coerce_operand(&qty, Operator::In, Some(&Value::from(vec![1, 2]))).unwrap(),
            Some(Value::from(vec![1, 2]))
        );
        assert_eq!(
            coerce_operand(&qty, Operator::Between, Some(&Value::from(vec![1, 2, 3])))
                .unwrap_err()
                .code,
            FilterErrorCode::InvalidArity
        );
        assert!(coerce_operand(&qty, Operator::Between, Some(&Value::from(vec![9, 2]))).is_err());
    }

    #[test]
    fn test_null_checks_need_nullable() {
        let id = field("id", FieldType::Identifier, false);
        assert!(coerce_operand(&id, Operator::IsNull, None).is_err());
        let note = field("note", FieldType::String, true);
        assert_eq!(coerce_operand(&note, Operator::IsNull, None).unwrap(), None);
        assert_eq!(
            coerce_operand(&note, Operator::IsNotNull, Some(&Value::Int(1)))
                .unwrap_err()
                .code,
            FilterErrorCode::InvalidArity
        );
    }

    #[test]
    fn test_array_operators() {
        let tags = field("tags", FieldType::array(FieldType::String), false);
        assert!(coerce_operand(&tags, Operator::ArrayContains, Some(&Value::from("x"))).is_ok());
        assert!(coerce_operand(&tags, Operator::ArrayContainsAll, Some(&Value::from(vec!["a", "b"]))).is_ok());
        assert!(coerce_operand(&tags, Operator::ArrayLengthGt, Some(&Value::Int(-1))).is_err());

        let name = field("name", FieldType::String, false);
        assert!(coerce_operand(&name, Operator::ArrayIsEmpty, None).is_err());
    }

    #[test]
    fn test_matches_pattern_compiles() {
        let name = field("name", FieldType::String, false);
        assert!(coerce_operand(&name, Operator::Matches, Some(&Value::from("^a.*z$"))).is_ok());
        assert_eq!(
            coerce_operand(&name, Operator::Matches, Some(&Value::from("(")))
                .unwrap_err()
                .code,
            FilterErrorCode::InvalidPattern
        );
    }

    #[test]
    fn test_evaluate_types_collects_all() {
        let f = Filter::And(vec![
            Filter::condition(field("a", FieldType::Bool, false), Operator::Lt, true),
            Filter::condition(field("b", FieldType::Int64, false), Operator::Contains, "x"),
            Filter::condition(field("c", FieldType::Int64, false), Operator::Eq, 1),
        ]);
        assert_eq!(evaluate_types(&f).unwrap_err().len(), 2);
    }

    #[test]
    fn test_limits() {
        let mut f = Filter::condition("a".to_string(), Operator::Eq, 1);
        for _ in 0..5 {
            f = f.negate();
        }
        assert!(check_limits(&f, 6, 10).is_ok());
        assert_eq!(
            check_limits(&f, 5, 10).unwrap_err().code,
            FilterErrorCode::LimitExceeded
        );
    }
}
