//! Filter tree

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::value::Value;

use super::operator::Operator;

/// Boolean expression over leaf conditions.
///
/// Generic over the field reference: client filters carry raw path text,
/// canonical filters carry resolved `FieldRef`s, having clauses carry
/// aggregate outputs. Each node owns its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter<F> {
    #[serde(alias = "and_")]
    And(Vec<Filter<F>>),
    #[serde(alias = "or_")]
    Or(Vec<Filter<F>>),
    #[serde(alias = "not_")]
    Not(Box<Filter<F>>),
    Condition(Condition<F>),
}

/// A leaf comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition<F> {
    pub field: F,
    pub operator: Operator,
    /// Operand; list operators take a `Value::Array`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    pub case_sensitive: bool,
}

fn default_case_sensitive() -> bool {
    true
}

#[derive(Deserialize)]
struct ConditionWire<F> {
    field: F,
    operator: Operator,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    values: Option<Vec<Value>>,
    #[serde(default = "default_case_sensitive")]
    case_sensitive: bool,
}

impl<'de, F: Deserialize<'de>> Deserialize<'de> for Condition<F> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = ConditionWire::<F>::deserialize(deserializer)?;
        let value = match (wire.value, wire.values) {
            (Some(_), Some(_)) => {
                return Err(D::Error::custom(
                    "condition may carry 'value' or 'values', not both",
                ))
            }
            (Some(value), None) => Some(value),
            (None, Some(values)) => Some(Value::Array(values)),
            (None, None) => None,
        };
        Ok(Condition {
            field: wire.field,
            operator: wire.operator,
            value,
            case_sensitive: wire.case_sensitive,
        })
    }
}

impl<F> Condition<F> {
    pub fn new(field: F, operator: Operator, value: Option<Value>) -> Self {
        Self {
            field,
            operator,
            value,
            case_sensitive: true,
        }
    }
}

impl<F> Filter<F> {
    pub fn condition(field: F, operator: Operator, value: impl Into<Value>) -> Self {
        Filter::Condition(Condition::new(field, operator, Some(value.into())))
    }

    /// A leaf without operand (`IS_NULL`, `ARRAY_IS_EMPTY`, ...)
    pub fn unary(field: F, operator: Operator) -> Self {
        Filter::Condition(Condition::new(field, operator, None))
    }

    pub fn negate(self) -> Self {
        Filter::Not(Box::new(self))
    }

    /// AND of all filters; `None` for an empty input, the filter itself for one
    pub fn all(mut filters: Vec<Filter<F>>) -> Option<Self> {
        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(Filter::And(filters)),
        }
    }

    /// Nesting depth; a lone leaf has depth 1
    pub fn depth(&self) -> usize {
        match self {
            Filter::And(children) | Filter::Or(children) => {
                1 + children.iter().map(Filter::depth).max().unwrap_or(0)
            }
            Filter::Not(inner) => 1 + inner.depth(),
            Filter::Condition(_) => 1,
        }
    }

    pub fn condition_count(&self) -> usize {
        match self {
            Filter::And(children) | Filter::Or(children) => {
                children.iter().map(Filter::condition_count).sum()
            }
            Filter::Not(inner) => inner.condition_count(),
            Filter::Condition(_) => 1,
        }
    }

    /// Every leaf, left to right
    pub fn conditions(&self) -> Vec<&Condition<F>> {
        let mut out = Vec::new();
        self.collect_conditions(&mut out);
        out
    }

    fn collect_conditions<'a>(&'a self, out: &mut Vec<&'a Condition<F>>) {
        match self {
            Filter::And(children) | Filter::Or(children) => {
                for child in children {
                    child.collect_conditions(out);
                }
            }
            Filter::Not(inner) => inner.collect_conditions(out),
            Filter::Condition(c) => out.push(c),
        }
    }

    /// Every referenced field, left to right (may repeat)
    pub fn fields(&self) -> Vec<&F> {
        self.conditions().into_iter().map(|c| &c.field).collect()
    }

    /// Top-level conjuncts: the children of a root AND, or the filter itself
    pub fn into_conjuncts(self) -> Vec<Filter<F>> {
        match self {
            Filter::And(children) => children,
            other => vec![other],
        }
    }
}

impl<F: fmt::Display> fmt::Display for Condition<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.operator)?;
        if let Some(value) = &self.value {
            write!(f, " {}", value)?;
        }
        if !self.case_sensitive {
            write!(f, " (ci)")?;
        }
        Ok(())
    }
}

impl<F: fmt::Display> fmt::Display for Filter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Condition(c) => write!(f, "{}", c),
            Filter::Not(inner) => write!(f, "NOT ({})", inner),
            Filter::And(children) | Filter::Or(children) => {
                let joiner = if matches!(self, Filter::And(_)) {
                    " AND "
                } else {
                    " OR "
                };
                if children.is_empty() {
                    return f.write_str(if matches!(self, Filter::And(_)) {
                        "TRUE"
                    } else {
                        "FALSE"
                    });
                }
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(joiner)?;
                    }
                    match child {
                        Filter::And(_) | Filter::Or(_) => write!(f, "({})", child)?,
                        _ => write!(f, "{}", child)?,
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_value_or_values() {
        let json = r#"{"and": [
            {"condition": {"field": "status", "operator": "EQ", "value": "completed"}},
            {"condition": {"field": "tier", "operator": "IN", "values": ["gold", "silver"]}},
            {"not_": {"condition": {"field": "deleted_at", "operator": "IS_NULL"}}}
        ]}"#;
        let filter: Filter<String> = serde_json::from_str(json).unwrap();
        let conditions = filter.conditions();
        assert_eq!(conditions.len(), 3);
        assert_eq!(conditions[1].value, Some(Value::from(vec!["gold", "silver"])));
        assert_eq!(conditions[2].value, None);
        assert!(conditions[0].case_sensitive);
    }

    #[test]
    fn test_both_value_and_values_rejected() {
        let json = r#"{"condition": {"field": "a", "operator": "IN", "value": 1, "values": [1]}}"#;
        let err = serde_json::from_str::<Filter<String>>(json).unwrap_err();
        assert!(err.to_string().contains("not both"));
    }

    #[test]
    fn test_depth_and_count() {
        let f = Filter::And(vec![
            Filter::condition("a".to_string(), Operator::Eq, 1),
            Filter::Or(vec![
                Filter::condition("b".to_string(), Operator::Eq, 2),
                Filter::unary("c".to_string(), Operator::IsNull).negate(),
            ]),
        ]);
        assert_eq!(f.depth(), 4);
        assert_eq!(f.condition_count(), 3);
        assert_eq!(f.to_string(), "a EQ 1 AND (b EQ 2 OR NOT (c IS_NULL))");
    }
}
