//! Field type taxonomy
//!
//! Supported types:
//! - bool
//! - int32, int64
//! - float32, float64
//! - string, bytes, identifier
//! - timestamp, date, time, duration
//! - array<T>, map<T>, object

use std::fmt;

use serde::{Deserialize, Serialize};

/// Field types as they appear in schema definitions.
///
/// Serialized in snake case; containers are externally tagged, e.g.
/// `"string"`, `{"array": "string"}`, `{"map": "int64"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    Bytes,
    Identifier,
    Timestamp,
    Date,
    Time,
    /// Milliseconds
    Duration,
    /// Homogeneous list with a single element type
    Array(Box<FieldType>),
    /// String-keyed map with a single value type
    Map(Box<FieldType>),
    /// Nested record; its fields live on the schema definition
    Object,
}

impl FieldType {
    pub fn array(element: FieldType) -> Self {
        FieldType::Array(Box::new(element))
    }

    pub fn map(value: FieldType) -> Self {
        FieldType::Map(Box::new(value))
    }

    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::Bool => "bool",
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::Float32 => "float32",
            FieldType::Float64 => "float64",
            FieldType::String => "string",
            FieldType::Bytes => "bytes",
            FieldType::Identifier => "identifier",
            FieldType::Timestamp => "timestamp",
            FieldType::Date => "date",
            FieldType::Time => "time",
            FieldType::Duration => "duration",
            FieldType::Array(_) => "array",
            FieldType::Map(_) => "map",
            FieldType::Object => "object",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, FieldType::Int32 | FieldType::Int64)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldType::Int32 | FieldType::Int64 | FieldType::Float32 | FieldType::Float64
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            FieldType::Timestamp | FieldType::Date | FieldType::Time | FieldType::Duration
        )
    }

    /// Numeric, temporal, string or identifier: usable with `<`, `>`, BETWEEN.
    pub fn is_orderable(&self) -> bool {
        self.is_numeric()
            || self.is_temporal()
            || matches!(self, FieldType::String | FieldType::Identifier)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, FieldType::String)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, FieldType::Array(_))
    }

    pub fn is_map(&self) -> bool {
        matches!(self, FieldType::Map(_))
    }

    pub fn is_container(&self) -> bool {
        matches!(
            self,
            FieldType::Array(_) | FieldType::Map(_) | FieldType::Object
        )
    }

    /// Element type of an array
    pub fn element_type(&self) -> Option<&FieldType> {
        match self {
            FieldType::Array(element) => Some(element),
            _ => None,
        }
    }

    /// Value type of a map
    pub fn value_type(&self) -> Option<&FieldType> {
        match self {
            FieldType::Map(value) => Some(value),
            _ => None,
        }
    }

    /// True for `array<float32>` / `array<float64>`, the only vector shape
    /// semantic search accepts.
    pub fn is_vector(&self) -> bool {
        matches!(
            self.element_type(),
            Some(FieldType::Float32) | Some(FieldType::Float64)
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Array(element) => write!(f, "array<{}>", element),
            FieldType::Map(value) => write!(f, "map<{}>", value),
            other => write!(f, "{}", other.type_name()),
        }
    }
}
