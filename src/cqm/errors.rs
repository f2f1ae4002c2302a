//! Build errors
//!
//! Error codes:
//! - SYNTAX_ERROR
//! - UNKNOWN_FIELD
//! - TYPE_MISMATCH
//! - INVALID_TRAVERSAL
//! - LIMIT_EXCEEDED
//! - PERMISSION_DENIED
//! - UNRESOLVABLE_RELATION
//! - PLANNING_TIMEOUT
//! - EXECUTION_ERROR
//!
//! The builder never stops at the first problem; every error is collected and
//! returned together, in the order the build steps found them.

use std::fmt;

use serde::Serialize;

use crate::filter::{FilterError, FilterErrorCode};
use crate::path::PathError;
use crate::psl::{PslError, PslErrorCode};
use crate::schema::{SchemaError, SchemaErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildErrorCode {
    /// Malformed path or pattern
    SyntaxError,
    /// Path names no field in the schema
    UnknownField,
    /// Operator, operand or aggregate incompatible with the field type
    TypeMismatch,
    /// Index marker applied to the wrong kind of field
    InvalidTraversal,
    /// Structural limit exceeded
    LimitExceeded,
    /// Field explicitly referenced but not readable by the caller
    PermissionDenied,
    /// Relation target entity or join key missing
    UnresolvableRelation,
    /// Compilation deadline passed
    PlanningTimeout,
    /// Failure surfaced by the executor
    ExecutionError,
}

impl BuildErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            BuildErrorCode::SyntaxError => "SYNTAX_ERROR",
            BuildErrorCode::UnknownField => "UNKNOWN_FIELD",
            BuildErrorCode::TypeMismatch => "TYPE_MISMATCH",
            BuildErrorCode::InvalidTraversal => "INVALID_TRAVERSAL",
            BuildErrorCode::LimitExceeded => "LIMIT_EXCEEDED",
            BuildErrorCode::PermissionDenied => "PERMISSION_DENIED",
            BuildErrorCode::UnresolvableRelation => "UNRESOLVABLE_RELATION",
            BuildErrorCode::PlanningTimeout => "PLANNING_TIMEOUT",
            BuildErrorCode::ExecutionError => "EXECUTION_ERROR",
        }
    }
}

impl fmt::Display for BuildErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One entry of the error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildError {
    #[serde(rename = "error_code")]
    pub code: BuildErrorCode,
    /// Where in the query: `filter`, `sorts[1]`, `include[0]`, `aggregation.group_by[0]`
    #[serde(rename = "pattern_or_field")]
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
}

impl BuildError {
    pub fn new(code: BuildErrorCode, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            target: target.into(),
            message: message.into(),
            position: None,
        }
    }

    pub fn at(mut self, position: Option<usize>) -> Self {
        self.position = position;
        self
    }

    pub fn syntax(target: impl Into<String>, err: &PathError) -> Self {
        Self::new(BuildErrorCode::SyntaxError, target, err.message.clone()).at(Some(err.position))
    }

    pub fn from_schema(target: impl Into<String>, err: &SchemaError) -> Self {
        let code = match err.code() {
            SchemaErrorCode::UnknownEntity | SchemaErrorCode::UnknownField => BuildErrorCode::UnknownField,
            SchemaErrorCode::UnresolvableRelation => BuildErrorCode::UnresolvableRelation,
            SchemaErrorCode::NotConcrete => BuildErrorCode::SyntaxError,
            SchemaErrorCode::InvalidTraversal | SchemaErrorCode::MalformedSchema => {
                BuildErrorCode::InvalidTraversal
            }
        };
        Self::new(code, target, err.message()).at(err.segment())
    }

    pub fn from_filter(target: impl Into<String>, err: &FilterError) -> Self {
        let code = match err.code {
            FilterErrorCode::TypeMismatch | FilterErrorCode::InvalidArity => BuildErrorCode::TypeMismatch,
            FilterErrorCode::InvalidPattern => BuildErrorCode::SyntaxError,
            FilterErrorCode::LimitExceeded => BuildErrorCode::LimitExceeded,
        };
        let message = if err.field.is_empty() {
            err.message.clone()
        } else {
            format!("{}: {}", err.field, err.message)
        };
        Self::new(code, target, message)
    }

    pub fn from_psl(err: &PslError) -> Self {
        let code = match err.code {
            PslErrorCode::Syntax => BuildErrorCode::SyntaxError,
            PslErrorCode::UnknownField => BuildErrorCode::UnknownField,
            PslErrorCode::InvalidTraversal => BuildErrorCode::InvalidTraversal,
            PslErrorCode::UnresolvableRelation => BuildErrorCode::UnresolvableRelation,
            PslErrorCode::LimitExceeded => BuildErrorCode::LimitExceeded,
        };
        let target = if err.pattern.is_empty() {
            err.target()
        } else {
            format!("{} '{}'", err.target(), err.pattern)
        };
        Self::new(code, target, err.message.clone()).at(err.position)
    }

    pub fn permission_denied(target: impl Into<String>, field: &str) -> Self {
        Self::new(
            BuildErrorCode::PermissionDenied,
            target,
            format!("field '{}' is not readable", field),
        )
    }

    pub fn type_mismatch(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(BuildErrorCode::TypeMismatch, target, message)
    }

    pub fn limit_exceeded(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(BuildErrorCode::LimitExceeded, target, message)
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.code, self.target, self.message)?;
        if let Some(position) = self.position {
            write!(f, " (position {})", position)?;
        }
        Ok(())
    }
}

impl std::error::Error for BuildError {}
