//! Path resolution against the schema tree
//!
//! A `Cursor` is a position in the schema: an entity root, a field, or the
//! element/value view of a list or map field. The `Walker` moves cursors one
//! concrete segment at a time and crosses relation fields into their target
//! entity, recording each crossing as a `RelationHop`. Wildcard expansion
//! (PSL) is built on the same primitives.

use std::collections::BTreeMap;

use crate::path::{FieldPath, Segment};
use crate::value::FieldType;

use super::errors::{SchemaError, SchemaResult};
use super::field_ref::{FieldId, FieldRef};
use super::types::{EntitySchema, FieldDef, RelationDef};
use super::SchemaView;

static NO_ALIASES: BTreeMap<String, RelationDef> = BTreeMap::new();

/// One relation crossed while resolving a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationHop {
    /// Path of the relation field from the base entity (`customer`, `customer.region`)
    pub alias: String,
    /// Alias of the enclosing hop, if nested
    pub parent: Option<String>,
    pub from_entity: String,
    pub relation: RelationDef,
    /// Declared by the query rather than by the schema
    pub explicit: bool,
}

/// Result of resolving one concrete path
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub field: FieldRef,
    pub hops: Vec<RelationHop>,
}

/// A position in the schema tree
#[derive(Debug, Clone)]
pub struct Cursor<'s> {
    entity: &'s EntitySchema,
    def: Option<&'s FieldDef>,
    view: Option<FieldType>,
    name: Vec<Segment>,
    id: Vec<Segment>,
    nullable: bool,
    pii: bool,
    hops: Vec<RelationHop>,
}

impl<'s> Cursor<'s> {
    fn root(entity: &'s EntitySchema) -> Self {
        Self {
            entity,
            def: None,
            view: None,
            name: Vec::new(),
            id: Vec::new(),
            nullable: false,
            pii: false,
            hops: Vec::new(),
        }
    }

    /// At an entity root (the base entity or an entered relation)
    pub fn is_root(&self) -> bool {
        self.def.is_none()
    }

    /// On a relation field that has not been entered yet
    pub fn is_relation(&self) -> bool {
        self.def.map_or(false, |d| d.relation.is_some()) && self.view == Some(FieldType::Object)
    }

    /// Type at this position; `None` at an entity root
    pub fn view(&self) -> Option<&FieldType> {
        self.view.as_ref()
    }

    /// Anything with structure beneath it: roots, relations, objects, lists, maps
    pub fn is_container(&self) -> bool {
        self.view.as_ref().map_or(true, FieldType::is_container)
    }

    /// Named members, if this position is an object or an entity root
    pub fn members(&self) -> Option<&'s BTreeMap<String, FieldDef>> {
        match (self.def, &self.view) {
            (None, _) => Some(&self.entity.fields),
            (Some(def), Some(FieldType::Object)) if def.relation.is_none() => Some(&def.fields),
            _ => None,
        }
    }

    pub fn path(&self) -> FieldPath {
        FieldPath::new(self.name.clone())
    }

    pub fn depth(&self) -> usize {
        self.name.len()
    }

    /// The field owning this position: trailing `[]`, `[*]` and `['key']` views removed
    pub fn owning_field(&self) -> Self {
        let mut owner = self.clone();
        while let Some(last) = owner.name.last() {
            let view = match (last, owner.view.take()) {
                (Segment::List, Some(inner)) => FieldType::Array(Box::new(inner)),
                (Segment::MapAny | Segment::MapKey(_), Some(inner)) => FieldType::Map(Box::new(inner)),
                (_, view) => {
                    owner.view = view;
                    break;
                }
            };
            owner.view = Some(view);
            owner.name.pop();
            owner.id.pop();
        }
        owner
    }

    pub fn hops(&self) -> &[RelationHop] {
        &self.hops
    }

    pub fn into_hops(self) -> Vec<RelationHop> {
        self.hops
    }

    fn child(&self, name: &str, def: &'s FieldDef) -> Self {
        let mut next = self.clone();
        next.name.push(Segment::Field(name.to_string()));
        next.id.push(Segment::Field(name.to_string()));
        next.view = Some(def.field_type.clone());
        next.def = Some(def);
        next.nullable |= def.nullable;
        next.pii |= def.pii;
        next
    }

    fn indexed(&self, segment: Segment, view: FieldType) -> Self {
        let mut next = self.clone();
        next.name.push(segment.clone());
        next.id.push(segment);
        next.view = Some(view);
        next
    }

    /// Field reference for this position; `None` at an entity root
    pub fn field_ref(&self) -> Option<FieldRef> {
        let def = self.def?;
        let view = self.view.clone()?;
        Some(FieldRef {
            field_name: self.path().to_string(),
            field_id: FieldId(FieldPath::new(self.id.clone()).to_string()),
            entity: self.entity.name.clone(),
            relation: self.hops.last().map(|h| h.alias.clone()),
            field_type: view,
            nullable: self.nullable,
            indexed: def.indexed && !self.id.iter().any(Segment::is_index),
            is_pii: self.pii,
        })
    }

    fn describe(&self) -> String {
        match &self.view {
            None => format!("entity '{}'", self.entity.name),
            Some(view) => format!("'{}' ({})", self.path(), view),
        }
    }
}

/// Moves cursors through a schema.
///
/// `aliases` are query-declared relations; a path whose first segment names
/// one resolves into that relation's entity.
pub struct Walker<'s, S: SchemaView + ?Sized> {
    schema: &'s S,
    aliases: &'s BTreeMap<String, RelationDef>,
}

impl<'s, S: SchemaView + ?Sized> Walker<'s, S> {
    pub fn new(schema: &'s S) -> Self {
        Self {
            schema,
            aliases: &NO_ALIASES,
        }
    }

    pub fn with_aliases(mut self, aliases: &'s BTreeMap<String, RelationDef>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn root(&self, entity: &str) -> SchemaResult<Cursor<'s>> {
        self.schema
            .entity(entity)
            .map(Cursor::root)
            .ok_or_else(|| SchemaError::unknown_entity(entity))
    }

    /// Moves one concrete segment. `index` is the segment position used in errors.
    pub fn step(&self, cursor: &Cursor<'s>, segment: &Segment, index: usize) -> SchemaResult<Cursor<'s>> {
        match segment {
            Segment::Field(name) => self.member(cursor, name, index),
            Segment::List => match cursor.view() {
                Some(FieldType::Array(element)) => {
                    Ok(cursor.indexed(Segment::List, (**element).clone()))
                }
                _ => Err(SchemaError::invalid_traversal(
                    format!("'[]' requires a list, {} is not one", cursor.describe()),
                    index,
                )),
            },
            Segment::MapAny | Segment::MapKey(_) => match cursor.view() {
                Some(FieldType::Map(value)) => Ok(cursor.indexed(segment.clone(), (**value).clone())),
                _ => Err(SchemaError::invalid_traversal(
                    format!("'{}' requires a map, {} is not one", map_marker(segment), cursor.describe()),
                    index,
                )),
            },
            Segment::Wildcard | Segment::RecursiveWildcard => {
                Err(SchemaError::not_concrete(FieldPath::new(vec![segment.clone()])))
            }
        }
    }

    fn member(&self, cursor: &Cursor<'s>, name: &str, index: usize) -> SchemaResult<Cursor<'s>> {
        if cursor.is_root() && cursor.hops.is_empty() && cursor.name.is_empty() {
            if let Some(relation) = self.aliases.get(name) {
                let mut alias = cursor.clone();
                alias.name.push(Segment::Field(name.to_string()));
                return self.cross(&alias, relation.clone(), true, index);
            }
        }

        let base = if cursor.is_relation() {
            self.enter(cursor, index)?
        } else {
            cursor.clone()
        };
        let members = base.members().ok_or_else(|| {
            SchemaError::invalid_traversal(
                format!("cannot select '{}' inside {}", name, base.describe()),
                index,
            )
        })?;
        let def = members
            .get(name)
            .ok_or_else(|| SchemaError::unknown_field(&base.entity.name, name, index))?;
        Ok(base.child(name, def))
    }

    /// Crosses a relation field into its target entity's root
    pub fn enter(&self, cursor: &Cursor<'s>, index: usize) -> SchemaResult<Cursor<'s>> {
        let relation = cursor
            .def
            .and_then(|d| d.relation.clone())
            .ok_or_else(|| {
                SchemaError::invalid_traversal(format!("{} is not a relation", cursor.describe()), index)
            })?;
        self.cross(cursor, relation, false, index)
    }

    fn cross(&self, cursor: &Cursor<'s>, relation: RelationDef, explicit: bool, index: usize) -> SchemaResult<Cursor<'s>> {
        let alias = cursor.path().to_string();
        let target = self
            .schema
            .entity(&relation.entity)
            .ok_or_else(|| SchemaError::unresolvable_relation(&alias, &relation.entity, index))?;

        let mut next = Cursor::root(target);
        next.name = cursor.name.clone();
        next.nullable = true;
        next.pii = cursor.pii;
        next.hops = cursor.hops.clone();
        next.hops.push(RelationHop {
            parent: cursor.hops.last().map(|h| h.alias.clone()),
            alias,
            from_entity: cursor.entity.name.clone(),
            relation,
            explicit,
        });
        Ok(next)
    }

    /// Named children of an object-like position.
    ///
    /// Relation fields are entered only when `cross_relations` is set.
    pub fn members(&self, cursor: &Cursor<'s>, cross_relations: bool) -> Vec<Cursor<'s>> {
        let base = if cursor.is_relation() {
            if !cross_relations {
                return Vec::new();
            }
            match self.enter(cursor, cursor.depth()) {
                Ok(entered) => entered,
                Err(_) => return Vec::new(),
            }
        } else {
            cursor.clone()
        };
        match base.members() {
            Some(members) => members
                .iter()
                .map(|(name, def)| base.child(name, def))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Resolves a concrete path to a single field
    pub fn resolve(&self, entity: &str, path: &FieldPath) -> SchemaResult<Resolution> {
        if !path.is_concrete() {
            return Err(SchemaError::not_concrete(path));
        }
        let mut cursor = self.root(entity)?;
        for (i, segment) in path.segments().iter().enumerate() {
            cursor = self.step(&cursor, segment, i)?;
        }
        let field = cursor.field_ref().ok_or_else(|| {
            SchemaError::invalid_traversal(
                format!("'{}' names a relation, not a field", path),
                path.len().saturating_sub(1),
            )
        })?;
        Ok(Resolution {
            field,
            hops: cursor.into_hops(),
        })
    }
}

fn map_marker(segment: &Segment) -> String {
    match segment {
        Segment::MapKey(key) => format!("['{}']", key),
        _ => "[*]".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::parse_path;
    use crate::schema::{SchemaCatalog, SchemaErrorCode};

    fn catalog() -> SchemaCatalog {
        let orders = EntitySchema::new("orders")
            .field("id", FieldDef::identifier())
            .field("customer_id", FieldDef::identifier().indexed())
            .field(
                "items",
                FieldDef::object_array([("sku", FieldDef::string()), ("qty", FieldDef::int())]),
            )
            .field("attrs", FieldDef::map(FieldType::String))
            .field(
                "customer",
                FieldDef::relation(RelationDef::new("customers", "customer_id", "id")),
            );
        let customers = EntitySchema::new("customers")
            .field("id", FieldDef::identifier())
            .field("email", FieldDef::string().pii())
            .field("tier", FieldDef::string().indexed());
        SchemaCatalog::new(vec![orders, customers])
    }

    #[test]
    fn test_resolve_through_list() {
        let catalog = catalog();
        let walker = Walker::new(&catalog);
        let r = walker.resolve("orders", &parse_path("items[].sku").unwrap()).unwrap();
        assert_eq!(r.field.field_name, "items[].sku");
        assert_eq!(r.field.field_type, FieldType::String);
        assert!(r.hops.is_empty());
    }

    #[test]
    fn test_resolve_across_relation() {
        let catalog = catalog();
        let walker = Walker::new(&catalog);
        let r = walker.resolve("orders", &parse_path("customer.tier").unwrap()).unwrap();
        assert_eq!(r.field.field_name, "customer.tier");
        assert_eq!(r.field.field_id.as_str(), "tier");
        assert_eq!(r.field.entity, "customers");
        assert_eq!(r.field.relation.as_deref(), Some("customer"));
        assert!(r.field.indexed);
        assert!(r.field.nullable);
        assert_eq!(r.hops.len(), 1);
        assert_eq!(r.hops[0].relation.local_key, "customer_id");
    }

    #[test]
    fn test_explicit_alias() {
        let catalog = catalog();
        let mut aliases = BTreeMap::new();
        aliases.insert("buyer".to_string(), RelationDef::new("customers", "customer_id", "id"));
        let walker = Walker::new(&catalog).with_aliases(&aliases);
        let r = walker.resolve("orders", &parse_path("buyer.email").unwrap()).unwrap();
        assert!(r.field.is_pii);
        assert!(r.hops[0].explicit);
    }

    #[test]
    fn test_resolution_errors() {
        let catalog = catalog();
        let walker = Walker::new(&catalog);

        let err = walker.resolve("orders", &parse_path("totl").unwrap()).unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::UnknownField);

        let err = walker.resolve("orders", &parse_path("attrs[]").unwrap()).unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::InvalidTraversal);
        assert_eq!(err.segment(), Some(1));

        let err = walker.resolve("orders", &parse_path("id.x").unwrap()).unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::InvalidTraversal);

        let err = walker.resolve("orders", &parse_path("items.*").unwrap()).unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::NotConcrete);

        let err = walker.resolve("nope", &parse_path("id").unwrap()).unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::UnknownEntity);
    }

    #[test]
    fn test_members_do_not_cross_relations_unless_asked() {
        let catalog = catalog();
        let walker = Walker::new(&catalog);
        let root = walker.root("orders").unwrap();
        let customer = walker
            .step(&root, &Segment::Field("customer".into()), 0)
            .unwrap();
        assert!(walker.members(&customer, false).is_empty());
        assert_eq!(walker.members(&customer, true).len(), 3);
    }
}
