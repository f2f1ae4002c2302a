//! Resolved field references

use std::fmt;

use serde::Serialize;

use crate::value::FieldType;

/// Stable identifier of a field within its owning entity (e.g. `items[].sku`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FieldId(pub String);

impl FieldId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A field path resolved against the schema.
///
/// `field_name` is the path from the query's base entity and is what rows are
/// keyed by. `field_id` is the path inside `entity`, the entity that owns the
/// field (which differs from the base entity once a relation is crossed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FieldRef {
    pub field_name: String,
    pub field_id: FieldId,
    pub entity: String,
    /// Alias of the relation that brings the field in; `None` on the base entity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    pub field_type: FieldType,
    pub nullable: bool,
    pub indexed: bool,
    pub is_pii: bool,
}

impl FieldRef {
    pub fn is_base(&self) -> bool {
        self.relation.is_none()
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.field_name)
    }
}
