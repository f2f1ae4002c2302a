//! Field-level read permissions

use std::collections::BTreeSet;

use crate::schema::FieldRef;

/// Caller's read access, consulted once per resolved field
pub trait PermissionView: Send + Sync {
    fn can_read(&self, field: &FieldRef) -> bool;
}

/// Grants everything; used by tooling and tests
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionView for AllowAll {
    fn can_read(&self, _field: &FieldRef) -> bool {
        true
    }
}

/// PII gate plus an explicit deny list of field names
#[derive(Debug, Clone, Default)]
pub struct FieldAccess {
    pub allow_pii: bool,
    pub denied_fields: BTreeSet<String>,
}

impl FieldAccess {
    pub fn new(allow_pii: bool) -> Self {
        Self {
            allow_pii,
            denied_fields: BTreeSet::new(),
        }
    }

    pub fn deny(mut self, field_name: impl Into<String>) -> Self {
        self.denied_fields.insert(field_name.into());
        self
    }
}

impl PermissionView for FieldAccess {
    fn can_read(&self, field: &FieldRef) -> bool {
        if field.is_pii && !self.allow_pii {
            return false;
        }
        !self.denied_fields.contains(&field.field_name)
    }
}
