//! Schema registry view
//!
//! The compiler never owns schema metadata. It reads an immutable
//! `SchemaCatalog` snapshot through the `SchemaView` trait, so tests can pass
//! hand-built catalogs and services can swap catalogs under load.
//!
//! # Contract
//!
//! - `resolve(entity, path)`: a concrete path to one `FieldRef`
//! - `children(entity, prefix)`: direct members of an object-like prefix
//! - `relation(entity, field_id)`: relation declared on a top-level field

mod errors;
mod field_ref;
mod loader;
mod registry;
mod resolver;
mod types;

pub use errors::{SchemaError, SchemaErrorCode, SchemaResult};
pub use field_ref::{FieldId, FieldRef};
pub use loader::SchemaLoader;
pub use registry::SchemaRegistry;
pub use resolver::{Cursor, RelationHop, Resolution, Walker};
pub use types::{Cardinality, EntitySchema, FieldDef, RelationDef, SchemaCatalog};

use crate::path::FieldPath;

/// Read-only access to entity schemas
pub trait SchemaView: Send + Sync {
    fn entity(&self, name: &str) -> Option<&EntitySchema>;

    fn resolve(&self, entity: &str, path: &FieldPath) -> SchemaResult<FieldRef> {
        Walker::new(self).resolve(entity, path).map(|r| r.field)
    }

    fn children(&self, entity: &str, prefix: &FieldPath) -> SchemaResult<Vec<FieldRef>> {
        let walker = Walker::new(self);
        let mut cursor = walker.root(entity)?;
        for (i, segment) in prefix.segments().iter().enumerate() {
            cursor = walker.step(&cursor, segment, i)?;
        }
        Ok(walker
            .members(&cursor, true)
            .iter()
            .filter_map(Cursor::field_ref)
            .collect())
    }

    fn relation(&self, entity: &str, field_id: &str) -> Option<&RelationDef> {
        self.entity(entity)?.fields.get(field_id)?.relation.as_ref()
    }
}

impl SchemaView for SchemaCatalog {
    fn entity(&self, name: &str) -> Option<&EntitySchema> {
        self.get(name)
    }
}
