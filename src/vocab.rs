//! Vocabulary shared by the client and canonical layers
//!
//! Plain enums only. Both `query` and `cqm::canonical` name these, so they
//! live outside either to keep the pipeline one-way.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::FieldType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NullOrdering {
    /// Executor default: nulls last for ASC, first for DESC
    #[default]
    Default,
    First,
    Last,
}

/// Aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateFunction {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
    Percentile,
    Stddev,
    Variance,
}

impl AggregateFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::CountDistinct => "COUNT_DISTINCT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Percentile => "PERCENTILE",
            AggregateFunction::Stddev => "STDDEV",
            AggregateFunction::Variance => "VARIANCE",
        }
    }

    /// Only plain `COUNT` may omit its input field
    pub fn requires_field(&self) -> bool {
        !matches!(self, AggregateFunction::Count)
    }

    pub fn requires_numeric(&self) -> bool {
        matches!(
            self,
            AggregateFunction::Sum
                | AggregateFunction::Avg
                | AggregateFunction::Percentile
                | AggregateFunction::Stddev
                | AggregateFunction::Variance
        )
    }

    pub fn requires_orderable(&self) -> bool {
        matches!(self, AggregateFunction::Min | AggregateFunction::Max)
    }

    /// Output type given the input field type (if any)
    pub fn result_type(&self, input: Option<&FieldType>) -> FieldType {
        match self {
            AggregateFunction::Count | AggregateFunction::CountDistinct => FieldType::Int64,
            AggregateFunction::Sum => match input {
                Some(t) if t.is_integer() => FieldType::Int64,
                _ => FieldType::Float64,
            },
            AggregateFunction::Min | AggregateFunction::Max => {
                input.cloned().unwrap_or(FieldType::Float64)
            }
            AggregateFunction::Avg
            | AggregateFunction::Percentile
            | AggregateFunction::Stddev
            | AggregateFunction::Variance => FieldType::Float64,
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinType {
    Inner,
    #[serde(alias = "LEFT_OUTER")]
    Left,
    #[serde(alias = "RIGHT_OUTER")]
    Right,
    #[serde(alias = "FULL_OUTER")]
    Full,
}

impl JoinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER",
            JoinType::Left => "LEFT",
            JoinType::Right => "RIGHT",
            JoinType::Full => "FULL",
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchMode {
    #[default]
    FullText,
    Semantic,
    Hybrid,
}

impl SearchMode {
    pub fn needs_text_index(&self) -> bool {
        matches!(self, SearchMode::FullText | SearchMode::Hybrid)
    }

    pub fn needs_vector(&self) -> bool {
        matches!(self, SearchMode::Semantic | SearchMode::Hybrid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsistencyLevel {
    #[default]
    Eventual,
    Strong,
    Linearizable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_result_types() {
        assert_eq!(AggregateFunction::Count.result_type(None), FieldType::Int64);
        assert_eq!(
            AggregateFunction::Sum.result_type(Some(&FieldType::Int32)),
            FieldType::Int64
        );
        assert_eq!(
            AggregateFunction::Sum.result_type(Some(&FieldType::Float32)),
            FieldType::Float64
        );
        assert_eq!(
            AggregateFunction::Max.result_type(Some(&FieldType::Timestamp)),
            FieldType::Timestamp
        );
    }

    #[test]
    fn test_wire_names() {
        let j: JoinType = serde_json::from_str("\"LEFT_OUTER\"").unwrap();
        assert_eq!(j, JoinType::Left);
        let f: AggregateFunction = serde_json::from_str("\"COUNT_DISTINCT\"").unwrap();
        assert_eq!(f, AggregateFunction::CountDistinct);
        assert_eq!(
            serde_json::to_string(&SearchMode::FullText).unwrap(),
            "\"FULL_TEXT\""
        );
    }
}
