//! Schema definitions
//!
//! An entity is a named record type with a primary key and a tree of field
//! definitions. Object-like fields (`object`, `array<object>`,
//! `map<object>`) carry their member definitions in `fields`; relation fields
//! point at another entity.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::value::FieldType;

/// Cardinality of a relation as seen from the owning entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    #[default]
    One,
    Many,
}

fn default_foreign_key() -> String {
    "id".into()
}

/// A cross-entity link declared on a field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationDef {
    /// Target entity
    pub entity: String,
    /// Join column on the owning entity
    pub local_key: String,
    /// Join column on the target entity
    #[serde(default = "default_foreign_key")]
    pub foreign_key: String,
    #[serde(default)]
    pub cardinality: Cardinality,
}

impl RelationDef {
    pub fn new(
        entity: impl Into<String>,
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            entity: entity.into(),
            local_key: local_key.into(),
            foreign_key: foreign_key.into(),
            cardinality: Cardinality::One,
        }
    }

    pub fn many(mut self) -> Self {
        self.cardinality = Cardinality::Many;
        self
    }
}

/// Field definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub indexed: bool,
    /// Personally identifiable; readable only with PII access
    #[serde(default)]
    pub pii: bool,
    /// Members of an object-like field
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<RelationDef>,
}

impl FieldDef {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            nullable: false,
            indexed: false,
            pii: false,
            fields: BTreeMap::new(),
            relation: None,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn int() -> Self {
        Self::new(FieldType::Int64)
    }

    pub fn float() -> Self {
        Self::new(FieldType::Float64)
    }

    pub fn bool() -> Self {
        Self::new(FieldType::Bool)
    }

    pub fn identifier() -> Self {
        Self::new(FieldType::Identifier)
    }

    pub fn timestamp() -> Self {
        Self::new(FieldType::Timestamp)
    }

    pub fn array(element: FieldType) -> Self {
        Self::new(FieldType::array(element))
    }

    pub fn map(value: FieldType) -> Self {
        Self::new(FieldType::map(value))
    }

    /// An `object` field with the given members
    pub fn object<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, FieldDef)>,
        S: Into<String>,
    {
        let mut def = Self::new(FieldType::Object);
        def.fields = fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
        def
    }

    /// An `array<object>` field with the given element members
    pub fn object_array<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, FieldDef)>,
        S: Into<String>,
    {
        let mut def = Self::object(fields);
        def.field_type = FieldType::array(FieldType::Object);
        def
    }

    /// A relation field pointing at another entity
    pub fn relation(relation: RelationDef) -> Self {
        let mut def = Self::new(FieldType::Object);
        def.nullable = true;
        def.relation = Some(relation);
        def
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn pii(mut self) -> Self {
        self.pii = true;
        self
    }

    /// True when the field (or its element/value type) holds members
    pub fn has_members(&self) -> bool {
        innermost(&self.field_type) == &FieldType::Object
    }
}

fn innermost(field_type: &FieldType) -> &FieldType {
    match field_type {
        FieldType::Array(inner) | FieldType::Map(inner) => innermost(inner),
        other => other,
    }
}

fn default_primary_key() -> String {
    "id".into()
}

/// A named record type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub name: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    pub fields: BTreeMap<String, FieldDef>,
}

impl EntitySchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: default_primary_key(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field registration
    pub fn field(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        self.fields.insert(name.into(), def);
        self
    }

    /// Validates the entity definition itself
    pub fn validate_structure(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("entity name must not be empty".into());
        }
        if !self.fields.contains_key(&self.primary_key) {
            return Err(format!(
                "entity '{}' does not define its primary key '{}'",
                self.name, self.primary_key
            ));
        }
        for (name, def) in &self.fields {
            validate_field(&self.name, name, def, true)?;
            if let Some(relation) = &def.relation {
                if !self.fields.contains_key(&relation.local_key) {
                    return Err(format!(
                        "relation '{}.{}' uses unknown local key '{}'",
                        self.name, name, relation.local_key
                    ));
                }
            }
        }
        Ok(())
    }
}

fn validate_field(entity: &str, name: &str, def: &FieldDef, top_level: bool) -> Result<(), String> {
    if name.is_empty() {
        return Err(format!("entity '{}' has an empty field name", entity));
    }
    if def.relation.is_some() {
        if !top_level {
            return Err(format!(
                "relation field '{}.{}' must be declared at the top level",
                entity, name
            ));
        }
        if def.field_type != FieldType::Object || !def.fields.is_empty() {
            return Err(format!(
                "relation field '{}.{}' must be an object without members",
                entity, name
            ));
        }
        return Ok(());
    }
    if def.has_members() && def.fields.is_empty() {
        return Err(format!("object field '{}.{}' declares no members", entity, name));
    }
    if !def.has_members() && !def.fields.is_empty() {
        return Err(format!(
            "scalar field '{}.{}' must not declare members",
            entity, name
        ));
    }
    for (child, child_def) in &def.fields {
        validate_field(entity, child, child_def, false)?;
    }
    Ok(())
}

/// Wire shape of a schema file
#[derive(Serialize, Deserialize)]
struct CatalogFile {
    entities: Vec<EntitySchema>,
}

/// An immutable set of entity schemas
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "CatalogFile", into = "CatalogFile")]
pub struct SchemaCatalog {
    entities: BTreeMap<String, EntitySchema>,
}

impl From<CatalogFile> for SchemaCatalog {
    fn from(file: CatalogFile) -> Self {
        Self::new(file.entities)
    }
}

impl From<SchemaCatalog> for CatalogFile {
    fn from(catalog: SchemaCatalog) -> Self {
        Self {
            entities: catalog.entities.into_values().collect(),
        }
    }
}

impl SchemaCatalog {
    pub fn new(entities: impl IntoIterator<Item = EntitySchema>) -> Self {
        Self {
            entities: entities.into_iter().map(|e| (e.name.clone(), e)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&EntitySchema> {
        self.entities.get(name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntitySchema> {
        self.entities.values()
    }

    /// Validates every entity and every relation target
    pub fn validate(&self) -> Result<(), String> {
        for entity in self.entities.values() {
            entity.validate_structure()?;
            for (name, def) in &entity.fields {
                let Some(relation) = &def.relation else {
                    continue;
                };
                let target = self.entities.get(&relation.entity).ok_or_else(|| {
                    format!(
                        "relation '{}.{}' targets unknown entity '{}'",
                        entity.name, name, relation.entity
                    )
                })?;
                if !target.fields.contains_key(&relation.foreign_key) {
                    return Err(format!(
                        "relation '{}.{}' uses unknown foreign key '{}.{}'",
                        entity.name, name, relation.entity, relation.foreign_key
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> EntitySchema {
        EntitySchema::new("orders")
            .field("id", FieldDef::identifier())
            .field("customer_id", FieldDef::identifier())
            .field(
                "customer",
                FieldDef::relation(RelationDef::new("customers", "customer_id", "id")),
            )
    }

    #[test]
    fn test_entity_requires_primary_key() {
        let e = EntitySchema::new("x").field("name", FieldDef::string());
        assert!(e.validate_structure().unwrap_err().contains("primary key"));
    }

    #[test]
    fn test_object_needs_members() {
        let e = EntitySchema::new("x")
            .field("id", FieldDef::identifier())
            .field("meta", FieldDef::new(FieldType::Object));
        assert!(e.validate_structure().is_err());
    }

    #[test]
    fn test_catalog_checks_relation_targets() {
        let catalog = SchemaCatalog::new(vec![orders()]);
        assert!(catalog.validate().unwrap_err().contains("unknown entity"));

        let customers = EntitySchema::new("customers").field("id", FieldDef::identifier());
        let catalog = SchemaCatalog::new(vec![orders(), customers]);
        assert!(catalog.validate().is_ok());
    }

    #[test]
    fn test_catalog_wire_shape() {
        let json = r#"{
            "entities": [
                {"name": "tags", "fields": {
                    "id": {"type": "identifier"},
                    "labels": {"type": {"map": "string"}, "nullable": true}
                }}
            ]
        }"#;
        let catalog: SchemaCatalog = serde_json::from_str(json).unwrap();
        let tags = catalog.get("tags").unwrap();
        assert_eq!(tags.primary_key, "id");
        assert!(tags.fields["labels"].nullable);
        assert_eq!(tags.fields["labels"].field_type, FieldType::map(FieldType::String));
    }
}
