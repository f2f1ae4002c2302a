//! Schema loading from disk
//!
//! A schema path is either a single catalog file
//! (`{"entities": [...]}`) or a directory holding one entity per `*.json`
//! file. Malformed or inconsistent schemas are rejected as a whole.

use std::fs;
use std::path::Path;

use super::errors::{SchemaError, SchemaResult};
use super::types::{EntitySchema, SchemaCatalog};

pub struct SchemaLoader;

impl SchemaLoader {
    /// Loads and validates a catalog from a file or directory
    pub fn load(path: &Path) -> SchemaResult<SchemaCatalog> {
        let catalog = if path.is_dir() {
            Self::load_dir(path)?
        } else {
            Self::load_file(path)?
        };

        catalog
            .validate()
            .map_err(|e| SchemaError::malformed_schema(path.display().to_string(), e))?;
        Ok(catalog)
    }

    fn load_file(path: &Path) -> SchemaResult<SchemaCatalog> {
        let content = read(path)?;
        serde_json::from_str(&content).map_err(|e| {
            SchemaError::malformed_schema(path.display().to_string(), format!("invalid JSON: {}", e))
        })
    }

    fn load_dir(dir: &Path) -> SchemaResult<SchemaCatalog> {
        let entries = fs::read_dir(dir).map_err(|e| {
            SchemaError::malformed_schema(
                dir.display().to_string(),
                format!("failed to read directory: {}", e),
            )
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                SchemaError::malformed_schema(
                    dir.display().to_string(),
                    format!("failed to read directory entry: {}", e),
                )
            })?;
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut entities = Vec::with_capacity(paths.len());
        for path in paths {
            let content = read(&path)?;
            let entity: EntitySchema = serde_json::from_str(&content).map_err(|e| {
                SchemaError::malformed_schema(path.display().to_string(), format!("invalid JSON: {}", e))
            })?;
            entities.push(entity);
        }
        Ok(SchemaCatalog::new(entities))
    }
}

fn read(path: &Path) -> SchemaResult<String> {
    fs::read_to_string(path).map_err(|e| {
        SchemaError::malformed_schema(path.display().to_string(), format!("failed to read file: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaErrorCode;
    use tempfile::TempDir;

    const USERS: &str = r#"{"name": "users", "fields": {
        "id": {"type": "identifier"},
        "email": {"type": "string", "pii": true}
    }}"#;

    #[test]
    fn test_load_catalog_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("schema.json");
        fs::write(&path, format!(r#"{{"entities": [{}]}}"#, USERS)).unwrap();

        let catalog = SchemaLoader::load(&path).unwrap();
        assert!(catalog.get("users").unwrap().fields["email"].pii);
    }

    #[test]
    fn test_load_directory() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("users.json"), USERS).unwrap();
        fs::write(temp_dir.path().join("README.txt"), "ignored").unwrap();

        let catalog = SchemaLoader::load(temp_dir.path()).unwrap();
        assert_eq!(catalog.entities().count(), 1);
    }

    #[test]
    fn test_malformed_schema_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("schema.json");
        fs::write(&path, r#"{"entities": [{"name": "x", "fields": {}}]}"#).unwrap();

        let err = SchemaLoader::load(&path).unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::MalformedSchema);
        assert!(err.message().contains("primary key"));
    }
}
