//! Projection resolution
//!
//! Include patterns are expanded against the schema to a candidate set of
//! leaf fields; exclude patterns are expanded the same way. A `[]`, `[*]` or
//! `['key']` marker on scalar elements selects the owning list or map field,
//! so `tags` and `tags[]` compete for one candidate. A field matched
//! by both keeps the best score from each side and is dropped when the
//! exclude score is at least the include score.
//!
//! Schema errors (unknown field, bad traversal) are only reported on
//! branches reached through literal segments. Once a wildcard has been
//! consumed a non-fitting branch is simply pruned, so `**.password` never
//! complains about objects without a `password` member.

use std::collections::{BTreeMap, BTreeSet};

use crate::path::{FieldPath, Segment};
use crate::schema::{
    Cursor, FieldRef, RelationDef, RelationHop, SchemaError, SchemaErrorCode, SchemaView, Walker,
};
use crate::value::FieldType;

use super::errors::{PslError, PslErrorCode};
use super::pattern::{compile_all, CompiledPattern, PslLimits};

/// The explicit outcome of a projection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectionSet {
    /// Selected leaf fields, ordered by field name
    pub fields: Vec<FieldRef>,
    /// Containers kept because something beneath them is selected
    pub retained_containers: Vec<String>,
    /// Relations crossed by selected fields
    pub hops: Vec<RelationHop>,
}

#[derive(Debug)]
struct Candidate {
    field: FieldRef,
    containers: Vec<String>,
    hops: Vec<RelationHop>,
    include: Option<u32>,
    exclude: Option<u32>,
}

impl Candidate {
    fn selected(&self) -> bool {
        match (self.include, self.exclude) {
            (Some(include), Some(exclude)) => include > exclude,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

pub struct ProjectionMatcher<'s> {
    schema: &'s dyn SchemaView,
    limits: PslLimits,
    aliases: Option<&'s BTreeMap<String, RelationDef>>,
}

impl<'s> ProjectionMatcher<'s> {
    pub fn new(schema: &'s dyn SchemaView, limits: PslLimits) -> Self {
        Self {
            schema,
            limits,
            aliases: None,
        }
    }

    /// Query-declared relations, addressable by alias through literal segments
    pub fn with_aliases(mut self, aliases: &'s BTreeMap<String, RelationDef>) -> Self {
        self.aliases = Some(aliases);
        self
    }

    /// Resolves include/exclude patterns for `entity`
    pub fn resolve(&self, entity: &str, include: &[String], exclude: &[String]) -> Result<ProjectionSet, Vec<PslError>> {
        let (mut includes, excludes) = compile_all(include, exclude, &self.limits)?;
        if includes.is_empty() {
            includes.push(CompiledPattern::select_all());
        }

        let mut walker = Walker::new(self.schema);
        if let Some(aliases) = self.aliases {
            walker = walker.with_aliases(aliases);
        }
        let root = walker.root(entity).map_err(|e| {
            vec![PslError {
                code: PslErrorCode::UnknownField,
                kind: None,
                pattern_index: None,
                pattern: String::new(),
                position: None,
                message: e.message().to_string(),
            }]
        })?;

        let mut errors = Vec::new();
        let mut candidates: BTreeMap<String, Candidate> = BTreeMap::new();

        for pattern in &includes {
            let leaves = self.expand_pattern(&walker, &root, pattern, &mut errors);
            for leaf in leaves {
                let leaf = leaf.owning_field();
                let Some(field) = leaf.field_ref() else { continue };
                let entry = candidates
                    .entry(field.field_name.clone())
                    .or_insert_with(|| Candidate {
                        containers: containers_of(&leaf.path()),
                        hops: leaf.hops().to_vec(),
                        field,
                        include: None,
                        exclude: None,
                    });
                entry.include = entry.include.max(Some(pattern.score));
            }
        }

        for pattern in &excludes {
            let leaves = self.expand_pattern(&walker, &root, pattern, &mut errors);
            for leaf in leaves {
                let Some(field) = leaf.owning_field().field_ref() else { continue };
                if let Some(entry) = candidates.get_mut(&field.field_name) {
                    entry.exclude = entry.exclude.max(Some(pattern.score));
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let mut result = ProjectionSet::default();
        let mut containers = BTreeSet::new();
        let mut aliases = BTreeSet::new();
        for candidate in candidates.into_values().filter(Candidate::selected) {
            containers.extend(candidate.containers);
            for hop in candidate.hops {
                if aliases.insert(hop.alias.clone()) {
                    result.hops.push(hop);
                }
            }
            result.fields.push(candidate.field);
        }
        result.retained_containers = containers.into_iter().collect();
        Ok(result)
    }

    fn expand_pattern<S: SchemaView + ?Sized>(
        &self,
        walker: &Walker<'s, S>,
        root: &Cursor<'s>,
        pattern: &CompiledPattern,
        errors: &mut Vec<PslError>,
    ) -> Vec<Cursor<'s>> {
        let mut expansion = Expansion {
            walker,
            leaves: Vec::new(),
            error: None,
        };
        expansion.expand(root.clone(), pattern.path.segments(), 0, true);

        if let Some(err) = expansion.error {
            let position = err
                .segment()
                .map(|i| approximate_offset(&pattern.path, i));
            let code = match err.code() {
                SchemaErrorCode::UnknownField | SchemaErrorCode::UnknownEntity => {
                    PslErrorCode::UnknownField
                }
                SchemaErrorCode::UnresolvableRelation => PslErrorCode::UnresolvableRelation,
                _ => PslErrorCode::InvalidTraversal,
            };
            errors.push(PslError::new(
                code,
                pattern.kind,
                pattern.index,
                &pattern.text,
                position,
                err.message(),
            ));
            return Vec::new();
        }
        expansion.leaves
    }
}

struct Expansion<'w, 's, S: SchemaView + ?Sized> {
    walker: &'w Walker<'s, S>,
    leaves: Vec<Cursor<'s>>,
    /// First error on a literal-only branch
    error: Option<SchemaError>,
}

impl<'w, 's, S: SchemaView + ?Sized> Expansion<'w, 's, S> {
    /// `literal` stays true while every consumed segment was concrete
    fn expand(&mut self, cursor: Cursor<'s>, rest: &[Segment], index: usize, literal: bool) {
        let Some((segment, tail)) = rest.split_first() else {
            self.terminal(cursor, literal);
            return;
        };

        match segment {
            Segment::Wildcard => {
                for child in self.walker.members(&cursor, false) {
                    if !child.is_relation() {
                        self.expand(child, tail, index + 1, false);
                    }
                }
            }
            Segment::RecursiveWildcard => {
                if tail.is_empty() {
                    self.terminal(cursor, false);
                    return;
                }
                for descendant in self.descendants(cursor) {
                    self.expand(descendant, tail, index + 1, false);
                }
            }
            Segment::Field(_) | Segment::List | Segment::MapAny | Segment::MapKey(_) => {
                if cursor.is_relation() && !literal {
                    return;
                }
                match self.walker.step(&cursor, segment, index) {
                    Ok(next) => {
                        let next = if next.is_relation() && literal {
                            match self.walker.enter(&next, index) {
                                Ok(entered) => entered,
                                Err(e) => return self.fail(e),
                            }
                        } else {
                            next
                        };
                        let literal = literal && !matches!(segment, Segment::MapAny);
                        self.expand(next, tail, index + 1, literal);
                    }
                    Err(e) if literal => self.fail(e),
                    Err(_) => {}
                }
            }
        }
    }

    fn fail(&mut self, error: SchemaError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// The cursor itself plus everything beneath it, without crossing relations
    fn descendants(&self, cursor: Cursor<'s>) -> Vec<Cursor<'s>> {
        let mut out = Vec::new();
        let mut stack = vec![cursor];
        while let Some(next) = stack.pop() {
            stack.extend(self.structural_children(&next));
            out.push(next);
        }
        out
    }

    /// Members of objects, plus the element/value view of object-bearing lists and maps
    fn structural_children(&self, cursor: &Cursor<'s>) -> Vec<Cursor<'s>> {
        if cursor.is_relation() {
            return Vec::new();
        }
        let implicit = match cursor.view() {
            Some(FieldType::Array(inner)) if holds_members(inner) => Some(Segment::List),
            Some(FieldType::Map(inner)) if holds_members(inner) => Some(Segment::MapAny),
            _ => None,
        };
        match implicit {
            Some(segment) => self
                .walker
                .step(cursor, &segment, cursor.depth())
                .map(|c| vec![c])
                .unwrap_or_default(),
            None => self
                .walker
                .members(cursor, false)
                .into_iter()
                .filter(|c| !c.is_relation())
                .collect(),
        }
    }

    /// A pattern ended here: select the field, or every leaf beneath a container
    fn terminal(&mut self, cursor: Cursor<'s>, literal: bool) {
        if cursor.is_relation() && !literal {
            return;
        }
        let structured = cursor.is_root()
            || cursor.view().map_or(false, holds_members);
        if !structured {
            self.leaves.push(cursor);
            return;
        }
        for child in self.structural_children(&cursor) {
            self.terminal(child, false);
        }
    }
}

/// Object, or a list/map that eventually holds objects
fn holds_members(field_type: &FieldType) -> bool {
    match field_type {
        FieldType::Object => true,
        FieldType::Array(inner) | FieldType::Map(inner) => holds_members(inner),
        _ => false,
    }
}

/// Names of the field-terminated proper prefixes of a path
fn containers_of(path: &FieldPath) -> Vec<String> {
    let segments = path.segments();
    (1..segments.len())
        .filter(|&end| matches!(segments[end - 1], Segment::Field(_)))
        .map(|end| FieldPath::new(segments[..end].to_vec()).to_string())
        .collect()
}

/// Character offset of segment `index` in the rendered pattern
fn approximate_offset(path: &FieldPath, index: usize) -> usize {
    if index == 0 {
        return 0;
    }
    let prefix = FieldPath::new(path.segments()[..index.min(path.len())].to_vec()).to_string();
    match path.segments().get(index) {
        Some(segment) if segment.is_index() => prefix.chars().count(),
        _ => prefix.chars().count() + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntitySchema, FieldDef, SchemaCatalog};

    fn catalog() -> SchemaCatalog {
        let accounts = EntitySchema::new("accounts")
            .field("id", FieldDef::identifier())
            .field("owner_id", FieldDef::identifier())
            .field(
                "user",
                FieldDef::object([
                    ("name", FieldDef::string()),
                    ("password", FieldDef::string()),
                    (
                        "profile",
                        FieldDef::object([("bio", FieldDef::string()), ("password", FieldDef::string())]),
                    ),
                ]),
            )
            .field(
                "sessions",
                FieldDef::object_array([("token", FieldDef::string()), ("ip", FieldDef::string())]),
            )
            .field("tags", FieldDef::array(FieldType::String))
            .field("labels", FieldDef::map(FieldType::String))
            .field(
                "owner",
                FieldDef::relation(RelationDef::new("people", "owner_id", "id")),
            );
        let people = EntitySchema::new("people")
            .field("id", FieldDef::identifier())
            .field("email", FieldDef::string().pii())
            .field("password", FieldDef::string());
        SchemaCatalog::new(vec![accounts, people])
    }

    fn names(set: &ProjectionSet) -> Vec<&str> {
        set.fields.iter().map(|f| f.field_name.as_str()).collect()
    }

    fn run(include: &[&str], exclude: &[&str]) -> Result<ProjectionSet, Vec<PslError>> {
        let catalog = catalog();
        let inc: Vec<String> = include.iter().map(|s| s.to_string()).collect();
        let exc: Vec<String> = exclude.iter().map(|s| s.to_string()).collect();
        ProjectionMatcher::new(&catalog, PslLimits::default()).resolve("accounts", &inc, &exc)
    }

    #[test]
    fn test_more_specific_exclude_wins() {
        let set = run(&["user.*"], &["user.password"]).unwrap();
        assert_eq!(names(&set), vec!["user.name", "user.profile.bio", "user.profile.password"]);
    }

    #[test]
    fn test_more_specific_include_wins() {
        let set = run(&["user.password"], &["**.password"]).unwrap();
        assert_eq!(names(&set), vec!["user.password"]);
    }

    #[test]
    fn test_default_include_with_recursive_exclude() {
        let set = run(&[], &["**.password"]).unwrap();
        assert_eq!(
            names(&set),
            vec![
                "id",
                "labels",
                "owner_id",
                "sessions[].ip",
                "sessions[].token",
                "tags",
                "user.name",
                "user.profile.bio",
            ]
        );
        assert_eq!(set.retained_containers, vec!["sessions", "user", "user.profile"]);
        assert!(set.hops.is_empty());
    }

    #[test]
    fn test_equal_scores_exclude_wins() {
        let set = run(&["user.name"], &["user.name"]).unwrap();
        assert!(set.fields.is_empty());
    }

    #[test]
    fn test_relation_only_through_literal() {
        let set = run(&["owner.email", "id"], &[]).unwrap();
        assert_eq!(names(&set), vec!["id", "owner.email"]);
        assert_eq!(set.hops.len(), 1);
        assert_eq!(set.hops[0].alias, "owner");

        let set = run(&["owner"], &["owner.password"]).unwrap();
        assert_eq!(names(&set), vec!["owner.email", "owner.id"]);
    }

    #[test]
    fn test_literal_errors_reported_wildcard_branches_pruned() {
        let errors = run(&["user.nme", "*.bio", "tags[*]"], &["id[]"]).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].code, PslErrorCode::UnknownField);
        assert_eq!(errors[0].target(), "include[0]");
        assert_eq!(errors[0].position, Some(5));
        assert_eq!(errors[1].code, PslErrorCode::InvalidTraversal);
        assert_eq!(errors[1].target(), "include[2]");
        assert_eq!(errors[2].target(), "exclude[0]");
    }

    #[test]
    fn test_list_and_map_markers() {
        let set = run(&["sessions[].token", "labels[*]"], &[]).unwrap();
        assert_eq!(names(&set), vec!["labels", "sessions[].token"]);
        assert_eq!(set.fields[0].field_type, FieldType::Map(Box::new(FieldType::String)));
    }

    #[test]
    fn test_scalar_markers_compete_with_owning_field() {
        // tags[] scores 4, tags scores 3
        assert!(run(&["tags"], &["tags[]"]).unwrap().fields.is_empty());
        assert!(run(&["labels"], &["labels[*]"]).unwrap().fields.is_empty());
        assert_eq!(names(&run(&["tags[]"], &["tags"]).unwrap()), vec!["tags"]);
    }

    #[test]
    fn test_scalar_marker_and_field_select_once() {
        let set = run(&["tags[]", "tags"], &[]).unwrap();
        assert_eq!(names(&set), vec!["tags"]);
        assert_eq!(set.fields[0].field_type, FieldType::Array(Box::new(FieldType::String)));
        assert!(set.retained_containers.is_empty());
    }

    #[test]
    fn test_order_independent() {
        let a = run(&["user.*", "tags", "id"], &["user.profile"]).unwrap();
        let b = run(&["id", "tags", "user.*"], &["user.profile"]).unwrap();
        assert_eq!(a, b);
    }
}
