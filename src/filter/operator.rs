//! Filter operators and their families

use std::fmt;

use serde::{Deserialize, Serialize};

/// Comparison operators understood by filter leaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
    Between,
    NotBetween,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Matches,
    Like,
    IsNull,
    IsNotNull,
    ArrayContains,
    ArrayContainsAny,
    ArrayContainsAll,
    ArrayIsEmpty,
    ArrayIsNotEmpty,
    ArrayLengthEq,
    ArrayLengthGt,
}

/// Operator families, each with its own operand/type rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorFamily {
    /// Any field type
    Equality,
    /// Numeric, temporal, string or identifier fields
    Ordering,
    /// Scalar against a list of the field's type
    Membership,
    /// Two orderable bounds
    Range,
    /// String fields only
    Text,
    /// Nullable fields, no operand
    Null,
    /// Array fields only
    Array,
}

/// Shape of the operand an operator takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    None,
    One,
    List,
    Pair,
}

impl Operator {
    pub const ALL: [Operator; 25] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Lt,
        Operator::Lte,
        Operator::Gt,
        Operator::Gte,
        Operator::In,
        Operator::NotIn,
        Operator::Between,
        Operator::NotBetween,
        Operator::Contains,
        Operator::NotContains,
        Operator::StartsWith,
        Operator::EndsWith,
        Operator::Matches,
        Operator::Like,
        Operator::IsNull,
        Operator::IsNotNull,
        Operator::ArrayContains,
        Operator::ArrayContainsAny,
        Operator::ArrayContainsAll,
        Operator::ArrayIsEmpty,
        Operator::ArrayIsNotEmpty,
        Operator::ArrayLengthEq,
        Operator::ArrayLengthGt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "EQ",
            Operator::Ne => "NE",
            Operator::Lt => "LT",
            Operator::Lte => "LTE",
            Operator::Gt => "GT",
            Operator::Gte => "GTE",
            Operator::In => "IN",
            Operator::NotIn => "NOT_IN",
            Operator::Between => "BETWEEN",
            Operator::NotBetween => "NOT_BETWEEN",
            Operator::Contains => "CONTAINS",
            Operator::NotContains => "NOT_CONTAINS",
            Operator::StartsWith => "STARTS_WITH",
            Operator::EndsWith => "ENDS_WITH",
            Operator::Matches => "MATCHES",
            Operator::Like => "LIKE",
            Operator::IsNull => "IS_NULL",
            Operator::IsNotNull => "IS_NOT_NULL",
            Operator::ArrayContains => "ARRAY_CONTAINS",
            Operator::ArrayContainsAny => "ARRAY_CONTAINS_ANY",
            Operator::ArrayContainsAll => "ARRAY_CONTAINS_ALL",
            Operator::ArrayIsEmpty => "ARRAY_IS_EMPTY",
            Operator::ArrayIsNotEmpty => "ARRAY_IS_NOT_EMPTY",
            Operator::ArrayLengthEq => "ARRAY_LENGTH_EQ",
            Operator::ArrayLengthGt => "ARRAY_LENGTH_GT",
        }
    }

    pub fn family(&self) -> OperatorFamily {
        match self {
            Operator::Eq | Operator::Ne => OperatorFamily::Equality,
            Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => OperatorFamily::Ordering,
            Operator::In | Operator::NotIn => OperatorFamily::Membership,
            Operator::Between | Operator::NotBetween => OperatorFamily::Range,
            Operator::Contains
            | Operator::NotContains
            | Operator::StartsWith
            | Operator::EndsWith
            | Operator::Matches
            | Operator::Like => OperatorFamily::Text,
            Operator::IsNull | Operator::IsNotNull => OperatorFamily::Null,
            Operator::ArrayContains
            | Operator::ArrayContainsAny
            | Operator::ArrayContainsAll
            | Operator::ArrayIsEmpty
            | Operator::ArrayIsNotEmpty
            | Operator::ArrayLengthEq
            | Operator::ArrayLengthGt => OperatorFamily::Array,
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            Operator::IsNull
            | Operator::IsNotNull
            | Operator::ArrayIsEmpty
            | Operator::ArrayIsNotEmpty => Arity::None,
            Operator::In
            | Operator::NotIn
            | Operator::ArrayContainsAny
            | Operator::ArrayContainsAll => Arity::List,
            Operator::Between | Operator::NotBetween => Arity::Pair,
            _ => Arity::One,
        }
    }

    /// True when the leaf can hold for a row where the field is absent.
    ///
    /// Every other operator is false on a missing field, which is what lets
    /// the planner turn an implicit outer join into an inner one.
    pub fn accepts_missing(&self) -> bool {
        matches!(self, Operator::IsNull | Operator::ArrayIsEmpty)
    }

    /// Can a storage index on the field serve this predicate
    pub fn is_index_friendly(&self) -> bool {
        matches!(
            self,
            Operator::Eq
                | Operator::Lt
                | Operator::Lte
                | Operator::Gt
                | Operator::Gte
                | Operator::In
                | Operator::Between
                | Operator::StartsWith
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_match_as_str() {
        for op in Operator::ALL {
            let json = serde_json::to_string(&op).unwrap();
            assert_eq!(json, format!("\"{}\"", op.as_str()));
        }
    }

    #[test]
    fn test_arity() {
        assert_eq!(Operator::IsNull.arity(), Arity::None);
        assert_eq!(Operator::In.arity(), Arity::List);
        assert_eq!(Operator::Between.arity(), Arity::Pair);
        assert_eq!(Operator::ArrayLengthGt.arity(), Arity::One);
    }
}
