//! Compilation failures

use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::cqm::{BuildError, BuildErrorCode};
use crate::planner::PlannerError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// Validation failed; every problem found is listed
    #[error("query rejected with {} error(s)", .0.len())]
    Rejected(Vec<BuildError>),

    /// The deadline passed before a plan was produced. `query_id` is absent
    /// when the canonical query was never completed.
    #[error("planning deadline exceeded during {stage}")]
    PlanningTimeout { stage: String, query_id: Option<Uuid> },

    #[error("planner failed: {0}")]
    Planner(PlannerError),
}

impl CompileError {
    pub(crate) fn from_build(errors: Vec<BuildError>) -> Self {
        match errors.as_slice() {
            [only] if only.code == BuildErrorCode::PlanningTimeout => CompileError::PlanningTimeout {
                stage: only.target.clone(),
                query_id: None,
            },
            _ => CompileError::Rejected(errors),
        }
    }

    pub(crate) fn from_planner(err: PlannerError, query_id: Uuid) -> Self {
        if err.is_timeout() {
            CompileError::PlanningTimeout {
                stage: err.stage().to_string(),
                query_id: Some(query_id),
            }
        } else {
            CompileError::Planner(err)
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CompileError::PlanningTimeout { .. })
    }

    /// The ordered error list returned to clients
    pub fn to_response(&self) -> serde_json::Value {
        match self {
            CompileError::Rejected(errors) => json!(errors),
            CompileError::PlanningTimeout { stage, .. } => json!([{
                "error_code": BuildErrorCode::PlanningTimeout.code(),
                "pattern_or_field": stage,
                "message": self.to_string(),
            }]),
            CompileError::Planner(err) => json!([{
                "error_code": err.code().code(),
                "pattern_or_field": err.stage(),
                "message": err.message(),
            }]),
        }
    }
}
