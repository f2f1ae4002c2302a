//! Schema resolution errors
//!
//! Error codes:
//! - UNKNOWN_ENTITY
//! - UNKNOWN_FIELD
//! - INVALID_TRAVERSAL
//! - NOT_CONCRETE
//! - UNRESOLVABLE_RELATION
//! - MALFORMED_SCHEMA

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaErrorCode {
    /// Entity not present in the catalog
    UnknownEntity,
    /// Literal segment names no field
    UnknownField,
    /// Index or member access on a field of the wrong shape
    InvalidTraversal,
    /// Wildcard where a single field is required
    NotConcrete,
    /// Relation target cannot be found
    UnresolvableRelation,
    /// Schema file unreadable or inconsistent
    MalformedSchema,
}

impl SchemaErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            SchemaErrorCode::UnknownEntity => "UNKNOWN_ENTITY",
            SchemaErrorCode::UnknownField => "UNKNOWN_FIELD",
            SchemaErrorCode::InvalidTraversal => "INVALID_TRAVERSAL",
            SchemaErrorCode::NotConcrete => "NOT_CONCRETE",
            SchemaErrorCode::UnresolvableRelation => "UNRESOLVABLE_RELATION",
            SchemaErrorCode::MalformedSchema => "MALFORMED_SCHEMA",
        }
    }
}

impl fmt::Display for SchemaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Schema error with the segment index where resolution stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    code: SchemaErrorCode,
    message: String,
    segment: Option<usize>,
}

impl SchemaError {
    pub fn unknown_entity(entity: &str) -> Self {
        Self {
            code: SchemaErrorCode::UnknownEntity,
            message: format!("entity '{}' not found", entity),
            segment: None,
        }
    }

    pub fn unknown_field(entity: &str, field: &str, segment: usize) -> Self {
        Self {
            code: SchemaErrorCode::UnknownField,
            message: format!("entity '{}' has no field '{}'", entity, field),
            segment: Some(segment),
        }
    }

    pub fn invalid_traversal(message: impl Into<String>, segment: usize) -> Self {
        Self {
            code: SchemaErrorCode::InvalidTraversal,
            message: message.into(),
            segment: Some(segment),
        }
    }

    pub fn not_concrete(path: impl fmt::Display) -> Self {
        Self {
            code: SchemaErrorCode::NotConcrete,
            message: format!("path '{}' contains wildcards", path),
            segment: None,
        }
    }

    pub fn unresolvable_relation(alias: &str, target: &str, segment: usize) -> Self {
        Self {
            code: SchemaErrorCode::UnresolvableRelation,
            message: format!("relation '{}' targets unknown entity '{}'", alias, target),
            segment: Some(segment),
        }
    }

    pub fn malformed_schema(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            code: SchemaErrorCode::MalformedSchema,
            message: format!("malformed schema '{}': {}", path.into(), reason.into()),
            segment: None,
        }
    }

    pub fn code(&self) -> SchemaErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Index of the offending path segment, when known
    pub fn segment(&self) -> Option<usize> {
        self.segment
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for SchemaError {}

pub type SchemaResult<T> = Result<T, SchemaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(SchemaErrorCode::UnknownField.code(), "UNKNOWN_FIELD");
        assert_eq!(SchemaErrorCode::InvalidTraversal.code(), "INVALID_TRAVERSAL");
        assert_eq!(
            SchemaErrorCode::UnresolvableRelation.code(),
            "UNRESOLVABLE_RELATION"
        );
    }

    #[test]
    fn test_display_includes_code() {
        let err = SchemaError::unknown_field("orders", "totl", 0);
        assert_eq!(
            err.to_string(),
            "UNKNOWN_FIELD: entity 'orders' has no field 'totl'"
        );
        assert_eq!(err.segment(), Some(0));
    }
}
