//! Row-level filter evaluation
//!
//! Two-valued logic: a leaf over an absent field is false, except `IS_NULL`
//! and `ARRAY_IS_EMPTY` which are true. `NOT` inverts.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use regex::Regex;

use crate::value::Value;

use super::ast::{Condition, Filter};
use super::operator::Operator;
use super::typing::TypedField;

/// A materialized row keyed by field name; absent keys are nulls
pub type Row = BTreeMap<String, Value>;

pub fn evaluate<F: TypedField>(filter: &Filter<F>, row: &Row) -> bool {
    match filter {
        Filter::And(children) => children.iter().all(|c| evaluate(c, row)),
        Filter::Or(children) => children.iter().any(|c| evaluate(c, row)),
        Filter::Not(inner) => !evaluate(inner, row),
        Filter::Condition(condition) => evaluate_condition(condition, row),
    }
}

fn evaluate_condition<F: TypedField>(condition: &Condition<F>, row: &Row) -> bool {
    let Some(actual) = row.get(condition.field.name()) else {
        return condition.operator.accepts_missing();
    };
    let operand = condition.value.as_ref();
    let ci = !condition.case_sensitive;

    match condition.operator {
        Operator::IsNull => false,
        Operator::IsNotNull => true,
        Operator::Eq => operand.map_or(false, |v| equals(actual, v, ci)),
        Operator::Ne => operand.map_or(false, |v| !equals(actual, v, ci)),
        Operator::Lt => ordered(actual, operand, |o| o == Ordering::Less),
        Operator::Lte => ordered(actual, operand, |o| o != Ordering::Greater),
        Operator::Gt => ordered(actual, operand, |o| o == Ordering::Greater),
        Operator::Gte => ordered(actual, operand, |o| o != Ordering::Less),
        Operator::In => list(operand).iter().any(|v| equals(actual, v, ci)),
        Operator::NotIn => !list(operand).iter().any(|v| equals(actual, v, ci)),
        Operator::Between => between(actual, operand).unwrap_or(false),
        Operator::NotBetween => between(actual, operand).map_or(false, |inside| !inside),
        Operator::Contains => text(actual, operand, ci, |a, b| a.contains(b)),
        Operator::NotContains => text(actual, operand, ci, |a, b| !a.contains(b)),
        Operator::StartsWith => text(actual, operand, ci, |a, b| a.starts_with(b)),
        Operator::EndsWith => text(actual, operand, ci, |a, b| a.ends_with(b)),
        Operator::Matches => match (actual.as_str(), operand.and_then(Value::as_str)) {
            (Some(a), Some(pattern)) => regex_matches(pattern, a, ci),
            _ => false,
        },
        Operator::Like => match (actual.as_str(), operand.and_then(Value::as_str)) {
            (Some(a), Some(pattern)) => regex_matches(&like_to_regex(pattern), a, ci),
            _ => false,
        },
        Operator::ArrayContains => match (actual.as_array(), operand) {
            (Some(items), Some(v)) => items.iter().any(|i| equals(i, v, ci)),
            _ => false,
        },
        Operator::ArrayContainsAny => match actual.as_array() {
            Some(items) => list(operand)
                .iter()
                .any(|v| items.iter().any(|i| equals(i, v, ci))),
            None => false,
        },
        Operator::ArrayContainsAll => match actual.as_array() {
            Some(items) => list(operand)
                .iter()
                .all(|v| items.iter().any(|i| equals(i, v, ci))),
            None => false,
        },
        Operator::ArrayIsEmpty => actual.as_array().map_or(false, <[Value]>::is_empty),
        Operator::ArrayIsNotEmpty => actual.as_array().map_or(false, |items| !items.is_empty()),
        Operator::ArrayLengthEq => length(actual, operand).map_or(false, |(len, n)| len == n),
        Operator::ArrayLengthGt => length(actual, operand).map_or(false, |(len, n)| len > n),
    }
}

fn equals(actual: &Value, expected: &Value, ci: bool) -> bool {
    match (ci, actual.as_str(), expected.as_str()) {
        (true, Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
        _ => actual.equals(expected),
    }
}

fn ordered(actual: &Value, operand: Option<&Value>, test: impl Fn(Ordering) -> bool) -> bool {
    operand
        .and_then(|v| actual.compare(v))
        .map_or(false, test)
}

fn list(operand: Option<&Value>) -> &[Value] {
    operand.and_then(Value::as_array).unwrap_or(&[])
}

/// `Some(inside)` when the bounds are comparable with the value
fn between(actual: &Value, operand: Option<&Value>) -> Option<bool> {
    let bounds = operand?.as_array()?;
    let (low, high) = (bounds.first()?, bounds.get(1)?);
    let above = actual.compare(low)? != Ordering::Less;
    let below = actual.compare(high)? != Ordering::Greater;
    Some(above && below)
}

fn text(actual: &Value, operand: Option<&Value>, ci: bool, test: impl Fn(&str, &str) -> bool) -> bool {
    match (actual.as_str(), operand.and_then(Value::as_str)) {
        (Some(a), Some(b)) if ci => test(&a.to_lowercase(), &b.to_lowercase()),
        (Some(a), Some(b)) => test(a, b),
        _ => false,
    }
}

fn length(actual: &Value, operand: Option<&Value>) -> Option<(i64, i64)> {
    let len = i64::try_from(actual.as_array()?.len()).ok()?;
    Some((len, operand?.as_i64()?))
}

fn regex_matches(pattern: &str, text: &str, ci: bool) -> bool {
    let pattern = if ci {
        format!("(?i){}", pattern)
    } else {
        pattern.to_string()
    };
    Regex::new(&pattern).map_or(false, |re| re.is_match(text))
}

/// Translates a SQL `LIKE` pattern (`%`, `_`) into an anchored regex
pub fn like_to_regex(pattern: &str) -> String {
    let mut out = String::from("(?s)^");
    for c in pattern.chars() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldId, FieldRef};
    use crate::value::FieldType;

    fn field(name: &str) -> FieldRef {
        FieldRef {
            field_name: name.into(),
            field_id: FieldId(name.into()),
            entity: "t".into(),
            relation: None,
            field_type: FieldType::String,
            nullable: true,
            indexed: false,
            is_pii: false,
        }
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_missing_field_semantics() {
        let r = row(&[]);
        assert!(evaluate(&Filter::unary(field("x"), Operator::IsNull), &r));
        assert!(!evaluate(&Filter::condition(field("x"), Operator::Ne, 1), &r));
        assert!(evaluate(&Filter::condition(field("x"), Operator::Ne, 1).negate(), &r));
    }

    #[test]
    fn test_string_operators() {
        let r = row(&[("name", Value::from("Widget Pro"))]);
        let mut c = Condition::new(field("name"), Operator::StartsWith, Some(Value::from("widget")));
        assert!(!evaluate(&Filter::Condition(c.clone()), &r));
        c.case_sensitive = false;
        assert!(evaluate(&Filter::Condition(c), &r));

        assert!(evaluate(&Filter::condition(field("name"), Operator::Like, "W_dget%"), &r));
        assert!(evaluate(&Filter::condition(field("name"), Operator::Matches, "Pro$"), &r));
    }

    #[test]
    fn test_range_and_membership() {
        let r = row(&[("qty", Value::Int(5))]);
        assert!(evaluate(&Filter::condition(field("qty"), Operator::Between, vec![1, 5]), &r));
        assert!(!evaluate(&Filter::condition(field("qty"), Operator::NotBetween, vec![1, 5]), &r));
        assert!(evaluate(&Filter::condition(field("qty"), Operator::In, vec![3, 5]), &r));
        assert!(evaluate(&Filter::condition(field("qty"), Operator::Gt, 4.5), &r));
    }

    #[test]
    fn test_array_operators() {
        let r = row(&[("tags", Value::from(vec!["a", "b"]))]);
        assert!(evaluate(&Filter::condition(field("tags"), Operator::ArrayContains, "a"), &r));
        assert!(evaluate(&Filter::condition(field("tags"), Operator::ArrayContainsAll, vec!["a", "b"]), &r));
        assert!(!evaluate(&Filter::condition(field("tags"), Operator::ArrayContainsAny, vec!["z"]), &r));
        assert!(evaluate(&Filter::condition(field("tags"), Operator::ArrayLengthGt, 1), &r));
        assert!(evaluate(&Filter::unary(field("none"), Operator::ArrayIsEmpty), &r));
    }

    #[test]
    fn test_like_escapes_regex_metacharacters() {
        assert_eq!(like_to_regex("a.b%"), "(?s)^a\\.b.*$");
    }
}
