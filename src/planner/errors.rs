//! Planner error types
//!
//! Planning never rejects a well-formed canonical query on semantic grounds;
//! the only failures are an expired deadline and a plan whose relations do
//! not line up (a builder bug surfaced as an error instead of a panic).

use std::fmt;

use crate::deadline::DeadlineExceeded;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerErrorCode {
    /// Compile deadline passed during planning or optimization
    PlanningTimeout,
    /// Canonical query is internally inconsistent
    InvalidPlan,
}

impl PlannerErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            PlannerErrorCode::PlanningTimeout => "PLANNING_TIMEOUT",
            PlannerErrorCode::InvalidPlan => "INVALID_PLAN",
        }
    }
}

impl fmt::Display for PlannerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannerError {
    code: PlannerErrorCode,
    message: String,
    /// Pipeline stage that failed
    stage: &'static str,
}

impl PlannerError {
    pub fn invalid_plan(stage: &'static str, reason: impl Into<String>) -> Self {
        Self {
            code: PlannerErrorCode::InvalidPlan,
            message: reason.into(),
            stage,
        }
    }

    pub fn code(&self) -> PlannerErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn is_timeout(&self) -> bool {
        self.code == PlannerErrorCode::PlanningTimeout
    }
}

impl From<DeadlineExceeded> for PlannerError {
    fn from(e: DeadlineExceeded) -> Self {
        Self {
            code: PlannerErrorCode::PlanningTimeout,
            message: e.to_string(),
            stage: e.stage,
        }
    }
}

impl fmt::Display for PlannerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.code, self.message, self.stage)
    }
}

impl std::error::Error for PlannerError {}

pub type PlannerResult<T> = Result<T, PlannerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_conversion() {
        let err: PlannerError = DeadlineExceeded { stage: "optimize" }.into();
        assert!(err.is_timeout());
        assert_eq!(err.stage(), "optimize");
        assert_eq!(
            err.to_string(),
            "[PLANNING_TIMEOUT] planning deadline exceeded during optimize (optimize)"
        );
    }

    #[test]
    fn test_invalid_plan() {
        let err = PlannerError::invalid_plan("logical", "relation 'x' has no parent");
        assert_eq!(err.code().code(), "INVALID_PLAN");
        assert!(!err.is_timeout());
    }
}
