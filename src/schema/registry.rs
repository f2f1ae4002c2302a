//! Shared, swappable schema catalog

use std::sync::{Arc, PoisonError, RwLock};

use super::types::SchemaCatalog;

/// Holds the current catalog behind an atomic pointer swap.
///
/// Compilations take one `snapshot()` and read it for their whole lifetime;
/// `replace()` publishes a new catalog without disturbing them.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    current: RwLock<Arc<SchemaCatalog>>,
}

impl SchemaRegistry {
    pub fn new(catalog: SchemaCatalog) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalog)),
        }
    }

    pub fn snapshot(&self) -> Arc<SchemaCatalog> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn replace(&self, catalog: SchemaCatalog) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(catalog);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntitySchema, FieldDef};

    #[test]
    fn test_snapshot_survives_replace() {
        let registry = SchemaRegistry::new(SchemaCatalog::new(vec![
            EntitySchema::new("a").field("id", FieldDef::identifier()),
        ]));

        let before = registry.snapshot();
        registry.replace(SchemaCatalog::default());

        assert!(before.get("a").is_some());
        assert!(registry.snapshot().get("a").is_none());
    }
}
