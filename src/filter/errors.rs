//! Filter validation errors

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterErrorCode {
    /// Operator not applicable to the field's type, or operand of the wrong type
    TypeMismatch,
    /// Missing, superfluous or wrongly shaped operand
    InvalidArity,
    /// `MATCHES` pattern does not compile
    InvalidPattern,
    /// Depth or condition count over the configured limit
    LimitExceeded,
}

impl FilterErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            FilterErrorCode::TypeMismatch => "FILTER_TYPE_MISMATCH",
            FilterErrorCode::InvalidArity => "FILTER_INVALID_ARITY",
            FilterErrorCode::InvalidPattern => "FILTER_INVALID_PATTERN",
            FilterErrorCode::LimitExceeded => "FILTER_LIMIT_EXCEEDED",
        }
    }
}

/// A rejected filter leaf (or the whole tree, for limit errors)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterError {
    pub code: FilterErrorCode,
    /// Field the failing leaf references; empty for tree-level errors
    pub field: String,
    pub message: String,
}

impl FilterError {
    pub fn type_mismatch(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: FilterErrorCode::TypeMismatch,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invalid_arity(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: FilterErrorCode::InvalidArity,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invalid_pattern(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: FilterErrorCode::InvalidPattern,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn limit_exceeded(message: impl Into<String>) -> Self {
        Self {
            code: FilterErrorCode::LimitExceeded,
            field: String::new(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "{}: {}", self.code.code(), self.message)
        } else {
            write!(f, "{}: '{}': {}", self.code.code(), self.field, self.message)
        }
    }
}

impl std::error::Error for FilterError {}
