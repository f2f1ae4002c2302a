//! Executor failures
//!
//! Error codes:
//! - EXECUTION_FAILED
//! - UNKNOWN_ENTITY
//! - UNSUPPORTED_OPERATOR
//!
//! The compiler never inspects these beyond wrapping them in an
//! `ExecutionError` with the query and correlation ids.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::planner::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorFailureCode {
    /// Generic failure reported by the executor
    ExecutionFailed,
    /// A scan named an entity the executor holds no data for
    UnknownEntity,
    /// The executor does not implement a physical operator
    UnsupportedOperator,
}

impl ExecutorFailureCode {
    pub fn code(&self) -> &'static str {
        match self {
            ExecutorFailureCode::ExecutionFailed => "EXECUTION_FAILED",
            ExecutorFailureCode::UnknownEntity => "UNKNOWN_ENTITY",
            ExecutorFailureCode::UnsupportedOperator => "UNSUPPORTED_OPERATOR",
        }
    }
}

impl fmt::Display for ExecutorFailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Terminal failure raised by an `Executor`
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorFailure {
    code: ExecutorFailureCode,
    message: String,
    /// Physical node being evaluated, when known
    node: Option<NodeId>,
}

impl ExecutorFailure {
    pub fn new(code: ExecutorFailureCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            node: None,
        }
    }

    pub fn execution_failed(reason: impl Into<String>) -> Self {
        Self::new(ExecutorFailureCode::ExecutionFailed, reason)
    }

    pub fn unknown_entity(entity: &str) -> Self {
        Self::new(
            ExecutorFailureCode::UnknownEntity,
            format!("no data for entity '{}'", entity),
        )
    }

    pub fn unsupported(operator: &str) -> Self {
        Self::new(
            ExecutorFailureCode::UnsupportedOperator,
            format!("operator {} is not supported", operator),
        )
    }

    pub fn at(mut self, node: NodeId) -> Self {
        self.node.get_or_insert(node);
        self
    }

    pub fn code(&self) -> ExecutorFailureCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }
}

impl fmt::Display for ExecutorFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(node) = self.node {
            write!(f, " at node {}", node)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExecutorFailure {}

/// An executor failure tagged with the query it belongs to
#[derive(Debug, Clone, PartialEq, Error)]
#[error("execution of query {query_id} (correlation {correlation_id}) failed: {source}")]
pub struct ExecutionError {
    pub query_id: Uuid,
    pub correlation_id: String,
    #[source]
    pub source: ExecutorFailure,
}

impl ExecutionError {
    pub fn code(&self) -> &'static str {
        "EXECUTION_ERROR"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(ExecutorFailureCode::ExecutionFailed.code(), "EXECUTION_FAILED");
        assert_eq!(ExecutorFailureCode::UnknownEntity.code(), "UNKNOWN_ENTITY");
        assert_eq!(
            ExecutorFailureCode::UnsupportedOperator.code(),
            "UNSUPPORTED_OPERATOR"
        );
    }

    #[test]
    fn test_first_node_sticks() {
        let failure = ExecutorFailure::unsupported("VectorScan").at(NodeId(3)).at(NodeId(0));
        assert_eq!(failure.node(), Some(NodeId(3)));
        assert_eq!(
            failure.to_string(),
            "[UNSUPPORTED_OPERATOR] operator VectorScan is not supported at node #3"
        );
    }

    #[test]
    fn test_execution_error_keeps_source() {
        use std::error::Error as _;

        let err = ExecutionError {
            query_id: Uuid::nil(),
            correlation_id: "req-7".into(),
            source: ExecutorFailure::execution_failed("disk gone"),
        };
        assert!(err.to_string().contains("req-7"));
        assert!(err.to_string().contains("disk gone"));
        assert_eq!(err.code(), "EXECUTION_ERROR");
        assert!(err.source().is_some());
    }
}
