//! PSL errors

use std::fmt;

use serde::Serialize;

use super::pattern::PatternKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PslErrorCode {
    /// Unmatched quotes, empty segments, misplaced wildcards
    Syntax,
    /// Literal segment names no field
    UnknownField,
    /// `[]` on a non-list, `[*]` on a non-map, member access on a scalar
    InvalidTraversal,
    /// Relation target missing from the schema
    UnresolvableRelation,
    /// Pattern count, segment count or recursive-wildcard count
    LimitExceeded,
}

impl PslErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            PslErrorCode::Syntax => "SYNTAX_ERROR",
            PslErrorCode::UnknownField => "UNKNOWN_FIELD",
            PslErrorCode::InvalidTraversal => "INVALID_TRAVERSAL",
            PslErrorCode::UnresolvableRelation => "UNRESOLVABLE_RELATION",
            PslErrorCode::LimitExceeded => "LIMIT_EXCEEDED",
        }
    }
}

/// A rejected pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PslError {
    pub code: PslErrorCode,
    /// `None` for errors about the pattern set as a whole
    pub kind: Option<PatternKind>,
    pub pattern_index: Option<usize>,
    pub pattern: String,
    /// Approximate character offset into the pattern
    pub position: Option<usize>,
    pub message: String,
}

impl PslError {
    pub fn new(
        code: PslErrorCode,
        kind: PatternKind,
        index: usize,
        pattern: &str,
        position: Option<usize>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            kind: Some(kind),
            pattern_index: Some(index),
            pattern: pattern.to_string(),
            position,
            message: message.into(),
        }
    }

    pub fn too_many_patterns(count: usize, max: usize) -> Self {
        Self {
            code: PslErrorCode::LimitExceeded,
            kind: None,
            pattern_index: None,
            pattern: String::new(),
            position: None,
            message: format!("{} patterns given, maximum is {}", count, max),
        }
    }

    /// `include[0]`, `exclude[3]`, or `projection`
    pub fn target(&self) -> String {
        match (self.kind, self.pattern_index) {
            (Some(kind), Some(index)) => format!("{}[{}]", kind.as_str(), index),
            _ => "projection".to_string(),
        }
    }
}

impl fmt::Display for PslError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.target())?;
        if !self.pattern.is_empty() {
            write!(f, " '{}'", self.pattern)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for PslError {}
