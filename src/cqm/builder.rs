//! CQM builder
//!
//! Turns a client `Query` into a `CanonicalQuery`. Steps run in a fixed
//! order and all of them append to one error list:
//!
//! 1. resolve every referenced path to a `FieldRef`
//! 2. type-check and coerce operands, aggregates and search options
//! 3. expand the projection and drop unreadable fields
//! 4. normalize filters
//! 5. collect relations crossed by any path
//! 6. stamp the query id
//!
//! Nothing is returned unless the list is empty.

use std::collections::{BTreeMap, BTreeSet};

use uuid::Uuid;

use crate::config::CompilerConfig;
use crate::deadline::Deadline;
use crate::filter::{check_limits, coerce_operand, normalize, Condition, Filter, TypedField};
use crate::path::{parse_path, FieldPath, Segment};
use crate::psl::ProjectionMatcher;
use crate::query::{Aggregation, Query, Search, Sort};
use crate::schema::{Cardinality, FieldRef, RelationDef, RelationHop, SchemaView, Walker};
use crate::value::FieldType;
use crate::vocab::{AggregateFunction, JoinType};

use super::canonical::{
    CanonicalAggregate, CanonicalAggregation, CanonicalPagination, CanonicalQuery,
    CanonicalRelation, CanonicalSearch, CanonicalSort, OutputRef, SortTarget,
};
use super::errors::{BuildError, BuildErrorCode};
use super::permissions::PermissionView;

pub struct CqmBuilder<'a> {
    schema: &'a dyn SchemaView,
    permissions: &'a dyn PermissionView,
    config: &'a CompilerConfig,
    deadline: Deadline,
}

impl<'a> CqmBuilder<'a> {
    pub fn new(
        schema: &'a dyn SchemaView,
        permissions: &'a dyn PermissionView,
        config: &'a CompilerConfig,
    ) -> Self {
        Self {
            schema,
            permissions,
            config,
            deadline: Deadline::none(),
        }
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn build(&self, query: &Query) -> Result<CanonicalQuery, Vec<BuildError>> {
        if self.schema.entity(&query.entity).is_none() {
            return Err(vec![BuildError::new(
                BuildErrorCode::UnknownField,
                "entity",
                format!("unknown entity '{}'", query.entity),
            )]);
        }

        let mut preliminary = Vec::new();
        if query.tenant_id.trim().is_empty() {
            preliminary.push(BuildError::new(
                BuildErrorCode::SyntaxError,
                "tenant_id",
                "tenant_id is required",
            ));
        }
        let (aliases, declared) = self.declare_relations(query, &mut preliminary);

        let mut session = Session {
            entity: &query.entity,
            schema: self.schema,
            walker: Walker::new(self.schema).with_aliases(&aliases),
            aliases: &aliases,
            permissions: self.permissions,
            config: self.config,
            relations: Vec::new(),
            errors: preliminary,
        };
        for relation in declared {
            session.declare(relation);
        }

        // Resolution errors land in session.errors as they are found; type
        // errors are held back so the list follows step order.
        let mut type_errors = Vec::new();
        let filter = query
            .filter
            .as_ref()
            .and_then(|f| session.filter(f, &mut type_errors));
        let aggregation = query
            .aggregation
            .as_ref()
            .and_then(|a| session.aggregation(a, &mut type_errors));
        let sorts = match (&query.aggregation, &aggregation) {
            (Some(requested), None) => {
                session.sort_names(&query.sorts, &declared_outputs(requested));
                Vec::new()
            }
            _ => session.sorts(&query.sorts, aggregation.as_ref(), &mut type_errors),
        };
        let search = query
            .search
            .as_ref()
            .and_then(|s| session.search(s, &mut type_errors));
        session.errors.append(&mut type_errors);
        self.checkpoint("cqm.resolve")?;

        let pagination = self.pagination(query, &mut session.errors);

        let (projection, retained_containers) =
            session.projection(&query.projection.include, &query.projection.exclude, aggregation.as_ref());
        self.checkpoint("cqm.projection")?;

        if !session.errors.is_empty() {
            return Err(session.errors);
        }

        let filter = filter.map(|f| normalize(&f));
        let aggregation = aggregation.map(|mut a| {
            a.having = a.having.map(|h| normalize(&h));
            a
        });

        let query_id = Uuid::new_v4();
        let correlation_id = query
            .options
            .correlation_id
            .clone()
            .unwrap_or_else(|| query_id.to_string());

        Ok(CanonicalQuery {
            query_id,
            correlation_id,
            entity: query.entity.clone(),
            tenant_id: query.tenant_id.clone(),
            filter,
            sorts,
            projection,
            retained_containers,
            aggregation,
            search,
            relations: session.relations,
            pagination,
            explain: query.options.explain,
            count_total: query.options.count_total,
            consistency: query.options.consistency,
        })
    }

    fn checkpoint(&self, stage: &'static str) -> Result<(), Vec<BuildError>> {
        self.deadline.check(stage).map_err(|e| {
            vec![BuildError::new(
                BuildErrorCode::PlanningTimeout,
                e.stage,
                e.to_string(),
            )]
        })
    }

    /// Validates explicit relations and registers their aliases
    fn declare_relations(
        &self,
        query: &Query,
        errors: &mut Vec<BuildError>,
    ) -> (BTreeMap<String, RelationDef>, Vec<DeclaredRelation>) {
        let walker = Walker::new(self.schema);
        let mut aliases = BTreeMap::new();
        let mut declared = Vec::new();

        for (i, relation) in query.relations.iter().enumerate() {
            let target = format!("relations[{}]", i);
            let alias = relation.alias().to_string();
            let unresolvable = |message: String| {
                BuildError::new(BuildErrorCode::UnresolvableRelation, target.clone(), message)
            };

            if aliases.contains_key(&alias) {
                errors.push(unresolvable(format!("duplicate relation alias '{}'", alias)));
                continue;
            }
            if self.schema.entity(&relation.entity).is_none() {
                errors.push(unresolvable(format!("unknown entity '{}'", relation.entity)));
                continue;
            }

            let mut key = |entity: &str, text: &str, side: &str| -> Option<FieldRef> {
                let path = match parse_path(text) {
                    Ok(path) => path,
                    Err(e) => {
                        errors.push(BuildError::syntax(format!("{}.on.{}", target, side), &e));
                        return None;
                    }
                };
                match walker.resolve(entity, &path) {
                    Ok(resolution) if resolution.hops.is_empty() && !resolution.field.field_type.is_container() => {
                        Some(resolution.field)
                    }
                    Ok(_) => {
                        errors.push(unresolvable(format!(
                            "{} '{}' must be a scalar field of '{}'",
                            side, text, entity
                        )));
                        None
                    }
                    Err(e) => {
                        errors.push(unresolvable(format!("{} '{}': {}", side, text, e.message())));
                        None
                    }
                }
            };
            let local = key(&query.entity, &relation.on.local_field, "local_field");
            let foreign = key(&relation.entity, &relation.on.foreign_field, "foreign_field");
            let (Some(local), Some(foreign)) = (local, foreign) else { continue };

            if !keys_compatible(&local.field_type, &foreign.field_type) {
                errors.push(BuildError::type_mismatch(
                    target.clone(),
                    format!(
                        "join keys differ in type: {} is {}, {} is {}",
                        local, local.field_type, foreign, foreign.field_type
                    ),
                ));
                continue;
            }

            let def = RelationDef::new(
                relation.entity.as_str(),
                local.field_id.as_str(),
                foreign.field_id.as_str(),
            );
            declared.push(DeclaredRelation {
                alias: alias.clone(),
                join_type: relation.join_type,
                eager: relation.eager,
            });
            aliases.insert(alias, def);
        }
        (aliases, declared)
    }

    fn pagination(&self, query: &Query, errors: &mut Vec<BuildError>) -> Option<CanonicalPagination> {
        let Some(page) = &query.pagination else {
            if query.aggregation.is_some() {
                return None;
            }
            return Some(CanonicalPagination {
                page_size: self.config.default_page_size,
                cursor: None,
                offset: None,
            });
        };

        if page.cursor.is_some() && page.offset.is_some() {
            errors.push(BuildError::new(
                BuildErrorCode::SyntaxError,
                "pagination",
                "cursor and offset are mutually exclusive",
            ));
        }
        let page_size = page.page_size.unwrap_or(self.config.default_page_size);
        if page_size == 0 {
            errors.push(BuildError::limit_exceeded("pagination.page_size", "page_size must be > 0"));
        } else if page_size > self.config.max_page_size {
            errors.push(BuildError::limit_exceeded(
                "pagination.page_size",
                format!("page_size {} exceeds maximum {}", page_size, self.config.max_page_size),
            ));
        }
        Some(CanonicalPagination {
            page_size,
            cursor: page.cursor.clone(),
            offset: page.offset,
        })
    }
}

fn keys_compatible(a: &FieldType, b: &FieldType) -> bool {
    let textual = |t: &FieldType| matches!(t, FieldType::String | FieldType::Identifier);
    a == b || (textual(a) && textual(b)) || (a.is_numeric() && b.is_numeric())
}

struct DeclaredRelation {
    alias: String,
    join_type: JoinType,
    eager: bool,
}

/// State for one build
struct Session<'b> {
    entity: &'b str,
    schema: &'b dyn SchemaView,
    walker: Walker<'b, dyn SchemaView + 'b>,
    aliases: &'b BTreeMap<String, RelationDef>,
    permissions: &'b dyn PermissionView,
    config: &'b CompilerConfig,
    relations: Vec<CanonicalRelation>,
    errors: Vec<BuildError>,
}

impl<'b> Session<'b> {
    /// Resolves an explicitly referenced path; unreadable fields are denied
    fn resolve(&mut self, text: &str, target: &str) -> Option<FieldRef> {
        let path = match parse_path(text) {
            Ok(path) => path,
            Err(e) => {
                self.errors.push(BuildError::syntax(target, &e));
                return None;
            }
        };
        match self.walker.resolve(self.entity, &path) {
            Ok(resolution) => {
                if !self.permissions.can_read(&resolution.field) {
                    self.errors
                        .push(BuildError::permission_denied(target, &resolution.field.field_name));
                    return None;
                }
                for hop in resolution.hops {
                    self.record_hop(hop);
                }
                Some(resolution.field)
            }
            Err(e) => {
                self.errors.push(BuildError::from_schema(target, &e));
                None
            }
        }
    }

    /// Registers a query-declared relation; its keys resolve through the alias
    fn declare(&mut self, declared: DeclaredRelation) {
        let aliases = self.aliases;
        let Some(def) = aliases.get(&declared.alias) else { return };
        let Some((local_field, foreign_field)) = self.join_keys(&declared.alias, None, def) else {
            return;
        };
        self.relations.push(CanonicalRelation {
            alias: declared.alias,
            parent: None,
            entity: def.entity.clone(),
            from_entity: self.entity.to_string(),
            local_field,
            foreign_field,
            join_type: Some(declared.join_type),
            implicit: false,
            eager: declared.eager,
            cardinality: Cardinality::One,
        });
    }

    fn record_hop(&mut self, hop: RelationHop) {
        if self.relations.iter().any(|r| r.alias == hop.alias) {
            return;
        }
        let Some((local_field, foreign_field)) =
            self.join_keys(&hop.alias, hop.parent.as_deref(), &hop.relation)
        else {
            return;
        };
        let RelationDef { entity, cardinality, .. } = hop.relation;
        self.relations.push(CanonicalRelation {
            alias: hop.alias,
            parent: hop.parent,
            entity,
            from_entity: hop.from_entity,
            local_field,
            foreign_field,
            join_type: None,
            implicit: !hop.explicit,
            eager: false,
            cardinality,
        });
    }

    /// Resolves both join keys as seen from the base entity
    fn join_keys(
        &mut self,
        alias: &str,
        parent: Option<&str>,
        relation: &RelationDef,
    ) -> Option<(FieldRef, FieldRef)> {
        let key_path = |prefix: Option<&str>, key: &str| -> Option<FieldPath> {
            let mut segments = match prefix {
                Some(prefix) => parse_path(prefix).ok()?.segments().to_vec(),
                None => Vec::new(),
            };
            segments.push(Segment::Field(key.to_string()));
            Some(FieldPath::new(segments))
        };
        let keys = key_path(parent, &relation.local_key)
            .zip(key_path(Some(alias), &relation.foreign_key))
            .and_then(|(local, foreign)| {
                let local = self.walker.resolve(self.entity, &local).ok()?.field;
                let foreign = self.walker.resolve(self.entity, &foreign).ok()?.field;
                Some((local, foreign))
            });
        if keys.is_none() {
            self.errors.push(BuildError::new(
                BuildErrorCode::UnresolvableRelation,
                alias,
                format!(
                    "cannot resolve join keys {} = {}.{}",
                    relation.local_key, relation.entity, relation.foreign_key
                ),
            ));
        }
        keys
    }

    fn filter(&mut self, filter: &Filter<String>, type_errors: &mut Vec<BuildError>) -> Option<Filter<FieldRef>> {
        if let Err(e) = check_limits(filter, self.config.max_filter_depth, self.config.max_filter_conditions) {
            self.errors.push(BuildError::from_filter("filter", &e));
            return None;
        }
        let mut resolve = |text: &str, target: &str| self.resolve(text, target);
        convert(filter, "filter", &mut resolve, type_errors)
    }

    fn sorts(
        &mut self,
        sorts: &[Sort],
        aggregation: Option<&CanonicalAggregation>,
        type_errors: &mut Vec<BuildError>,
    ) -> Vec<CanonicalSort> {
        let outputs = aggregation.map(CanonicalAggregation::outputs);
        let mut canonical = Vec::new();
        for (i, sort) in sorts.iter().enumerate() {
            let target = format!("sorts[{}] '{}'", i, sort.field);
            let sort_target = match &outputs {
                Some(outputs) => match outputs.iter().find(|o| o.name == sort.field) {
                    Some(output) => SortTarget::Output(output.clone()),
                    None => {
                        self.errors.push(unknown_sort_output(target));
                        continue;
                    }
                },
                None => {
                    let Some(field) = self.resolve(&sort.field, &target) else { continue };
                    if !(field.field_type.is_orderable() || field.field_type == FieldType::Bool) {
                        type_errors.push(BuildError::type_mismatch(
                            target,
                            format!("cannot sort by {} field", field.field_type),
                        ));
                        continue;
                    }
                    SortTarget::Field(field)
                }
            };
            canonical.push(CanonicalSort {
                target: sort_target,
                direction: sort.direction,
                nulls: sort.nulls,
            });
        }
        canonical
    }

    /// Sort names checked against the requested outputs of an aggregation that failed to resolve
    fn sort_names(&mut self, sorts: &[Sort], declared: &BTreeSet<String>) {
        for (i, sort) in sorts.iter().enumerate() {
            if !declared.contains(&sort.field) {
                self.errors
                    .push(unknown_sort_output(format!("sorts[{}] '{}'", i, sort.field)));
            }
        }
    }

    fn aggregation(
        &mut self,
        aggregation: &Aggregation,
        type_errors: &mut Vec<BuildError>,
    ) -> Option<CanonicalAggregation> {
        if aggregation.group_by.is_empty() && aggregation.aggregates.is_empty() {
            self.errors.push(BuildError::new(
                BuildErrorCode::SyntaxError,
                "aggregation",
                "aggregation needs a group_by field or an aggregate",
            ));
            return None;
        }

        let mut ok = true;
        let mut group_by = Vec::new();
        for (i, text) in aggregation.group_by.iter().enumerate() {
            let target = format!("aggregation.group_by[{}] '{}'", i, text);
            match self.resolve(text, &target) {
                Some(field) if field.field_type.is_container() => {
                    type_errors.push(BuildError::type_mismatch(
                        target,
                        format!("cannot group by {} field", field.field_type),
                    ));
                    ok = false;
                }
                Some(field) => group_by.push(field),
                None => ok = false,
            }
        }

        let mut names: BTreeSet<String> = group_by.iter().map(|f| f.field_name.clone()).collect();
        let mut aggregates = Vec::new();
        for (i, aggregate) in aggregation.aggregates.iter().enumerate() {
            let target = format!("aggregation.aggregates[{}]", i);
            let function = aggregate.function;
            let field = match &aggregate.field {
                Some(text) => match self.resolve(text, &format!("{} '{}'", target, text)) {
                    Some(field) => Some(field),
                    None => {
                        ok = false;
                        continue;
                    }
                },
                None => None,
            };

            if let Err(message) = check_aggregate(function, field.as_ref(), aggregate.percentile) {
                type_errors.push(BuildError::type_mismatch(target, message));
                ok = false;
                continue;
            }

            let alias = aggregate
                .alias
                .clone()
                .unwrap_or_else(|| default_alias(function, field.as_ref().map(|f| f.field_name.as_str())));
            if alias.is_empty() || !names.insert(alias.clone()) {
                self.errors.push(BuildError::new(
                    BuildErrorCode::SyntaxError,
                    target,
                    format!("output name '{}' is empty or already used", alias),
                ));
                ok = false;
                continue;
            }

            aggregates.push(CanonicalAggregate {
                function,
                result_type: function.result_type(field.as_ref().map(|f| &f.field_type)),
                field,
                alias,
                percentile: aggregate.percentile,
            });
        }

        let mut canonical = CanonicalAggregation {
            group_by,
            aggregates,
            having: None,
        };

        if let Some(having) = &aggregation.having {
            if let Err(e) = check_limits(having, self.config.max_filter_depth, self.config.max_filter_conditions) {
                self.errors.push(BuildError::from_filter("aggregation.having", &e));
                return None;
            }
            // Outputs that were requested but failed already carry their own error
            let outputs = canonical.outputs();
            let failed = if ok { BTreeSet::new() } else { declared_outputs(aggregation) };
            let errors = &mut self.errors;
            let mut resolve = |text: &str, target: &str| -> Option<OutputRef> {
                let found = outputs.iter().find(|o| o.name == text).cloned();
                if found.is_none() && !failed.contains(text) {
                    errors.push(BuildError::new(
                        BuildErrorCode::UnknownField,
                        target,
                        format!("'{}' is neither a group-by field nor an aggregate alias", text),
                    ));
                }
                found
            };
            canonical.having = convert(having, "aggregation.having", &mut resolve, type_errors);
            ok &= canonical.having.is_some();
        }
        ok.then_some(canonical)
    }

    fn search(&mut self, search: &Search, type_errors: &mut Vec<BuildError>) -> Option<CanonicalSearch> {
        let mut ok = true;
        let syntax = |errors: &mut Vec<BuildError>, target: &str, message: &str| {
            errors.push(BuildError::new(BuildErrorCode::SyntaxError, target, message));
        };

        if search.mode.needs_text_index() {
            if search.query.trim().is_empty() {
                syntax(&mut self.errors, "search.query", "full-text search requires query text");
                ok = false;
            }
            if search.fields.is_empty() {
                syntax(&mut self.errors, "search.fields", "full-text search requires at least one field");
                ok = false;
            }
        }

        let mut fields = Vec::new();
        let mut by_text = BTreeMap::new();
        for (i, text) in search.fields.iter().enumerate() {
            let target = format!("search.fields[{}] '{}'", i, text);
            let Some(field) = self.resolve(text, &target) else {
                ok = false;
                continue;
            };
            let searchable = field.field_type.is_string()
                || field.field_type.element_type().map_or(false, FieldType::is_string);
            if !searchable {
                type_errors.push(BuildError::type_mismatch(
                    target,
                    format!("full-text search needs a string field, found {}", field.field_type),
                ));
                ok = false;
                continue;
            }
            by_text.insert(text.clone(), field.field_name.clone());
            fields.push(field);
        }

        let mut vector_field = None;
        if search.mode.needs_vector() {
            match &search.vector_field {
                None => {
                    syntax(&mut self.errors, "search.vector_field", "vector search requires a vector_field");
                    ok = false;
                }
                Some(text) => {
                    let target = format!("search.vector_field '{}'", text);
                    match self.resolve(text, &target) {
                        Some(field) if field.field_type.is_vector() => vector_field = Some(field),
                        Some(field) => {
                            type_errors.push(BuildError::type_mismatch(
                                target,
                                format!("vector_field must be an array of floats, found {}", field.field_type),
                            ));
                            ok = false;
                        }
                        None => ok = false,
                    }
                }
            }
            if search.embedding.is_empty() && search.query.trim().is_empty() {
                syntax(&mut self.errors, "search.embedding", "vector search requires an embedding or query text");
                ok = false;
            }
        }

        if search.embedding.iter().any(|x| !x.is_finite()) {
            type_errors.push(BuildError::type_mismatch("search.embedding", "embedding values must be finite"));
            ok = false;
        }
        if search.min_score.map_or(false, |s| !s.is_finite()) {
            type_errors.push(BuildError::type_mismatch("search.min_score", "min_score must be finite"));
            ok = false;
        }

        let mut boost = BTreeMap::new();
        for (text, weight) in &search.boost {
            let target = format!("search.boost '{}'", text);
            let Some(name) = by_text.get(text) else {
                self.errors.push(BuildError::new(
                    BuildErrorCode::UnknownField,
                    target,
                    "boosted field is not one of the search fields",
                ));
                ok = false;
                continue;
            };
            if !weight.is_finite() || *weight < 0.0 {
                type_errors.push(BuildError::type_mismatch(target, "boost must be a non-negative number"));
                ok = false;
                continue;
            }
            boost.insert(name.clone(), *weight);
        }

        ok.then(|| CanonicalSearch {
            query: search.query.clone(),
            mode: search.mode,
            fields,
            vector_field,
            embedding: search.embedding.clone(),
            min_score: search.min_score,
            boost,
        })
    }

    /// Explicit projection set and retained containers.
    ///
    /// Patterns are always validated. Aggregation queries project the
    /// aggregate inputs instead of the pattern result.
    fn projection(
        &mut self,
        include: &[String],
        exclude: &[String],
        aggregation: Option<&CanonicalAggregation>,
    ) -> (Vec<FieldRef>, Vec<String>) {
        let matcher = ProjectionMatcher::new(self.schema, self.config.psl).with_aliases(self.aliases);
        let resolved = match matcher.resolve(self.entity, include, exclude) {
            Ok(resolved) => resolved,
            Err(errors) => {
                self.errors.extend(errors.iter().map(BuildError::from_psl));
                return (Vec::new(), Vec::new());
            }
        };

        if let Some(aggregation) = aggregation {
            let mut fields: Vec<FieldRef> = aggregation.input_fields().cloned().collect();
            fields.sort();
            fields.dedup_by(|a, b| a.field_name == b.field_name);
            return (fields, Vec::new());
        }

        let fields: Vec<FieldRef> = resolved
            .fields
            .into_iter()
            .filter(|f| self.permissions.can_read(f))
            .collect();
        let retained = resolved
            .retained_containers
            .into_iter()
            .filter(|c| fields.iter().any(|f| is_beneath(&f.field_name, c)))
            .collect();
        for hop in resolved.hops {
            let used = fields.iter().any(|f| {
                f.relation
                    .as_deref()
                    .map_or(false, |r| r == hop.alias || is_beneath(r, &hop.alias))
            });
            if used {
                self.record_hop(hop);
            }
        }
        (fields, retained)
    }
}

/// Converts a client filter, resolving each leaf's field with `resolve`.
///
/// Every leaf is visited even after a failure so all errors are reported.
fn convert<G: TypedField>(
    filter: &Filter<String>,
    clause: &str,
    resolve: &mut dyn FnMut(&str, &str) -> Option<G>,
    type_errors: &mut Vec<BuildError>,
) -> Option<Filter<G>> {
    match filter {
        Filter::And(items) => convert_all(items, clause, resolve, type_errors).map(Filter::And),
        Filter::Or(items) => convert_all(items, clause, resolve, type_errors).map(Filter::Or),
        Filter::Not(inner) => convert(inner, clause, resolve, type_errors).map(|f| Filter::Not(Box::new(f))),
        Filter::Condition(condition) => {
            let target = format!("{} '{}'", clause, condition.field);
            let field = resolve(&condition.field, &target)?;
            match coerce_operand(&field, condition.operator, condition.value.as_ref()) {
                Ok(value) => Some(Filter::Condition(Condition {
                    field,
                    operator: condition.operator,
                    value,
                    case_sensitive: condition.case_sensitive,
                })),
                Err(e) => {
                    type_errors.push(BuildError::from_filter(target, &e));
                    None
                }
            }
        }
    }
}

fn convert_all<G: TypedField>(
    items: &[Filter<String>],
    clause: &str,
    resolve: &mut dyn FnMut(&str, &str) -> Option<G>,
    type_errors: &mut Vec<BuildError>,
) -> Option<Vec<Filter<G>>> {
    let converted: Vec<Option<Filter<G>>> = items
        .iter()
        .map(|item| convert(item, clause, resolve, type_errors))
        .collect();
    converted.into_iter().collect()
}

fn check_aggregate(function: AggregateFunction, field: Option<&FieldRef>, percentile: Option<f64>) -> Result<(), String> {
    match field {
        None if function.requires_field() => return Err(format!("{} requires a field", function)),
        Some(field) if function.requires_numeric() && !field.field_type.is_numeric() => {
            return Err(format!("{} requires a numeric field, {} is {}", function, field, field.field_type))
        }
        Some(field) if function.requires_orderable() && !field.field_type.is_orderable() => {
            return Err(format!("{} requires an orderable field, {} is {}", function, field, field.field_type))
        }
        Some(field) if matches!(field.field_type, FieldType::Object | FieldType::Map(_)) => {
            return Err(format!("cannot aggregate {} field {}", field.field_type, field))
        }
        _ => {}
    }
    match (function, percentile) {
        (AggregateFunction::Percentile, Some(p)) if p > 0.0 && p <= 100.0 => Ok(()),
        (AggregateFunction::Percentile, _) => Err("PERCENTILE requires 0 < percentile <= 100".to_string()),
        (_, Some(_)) => Err(format!("percentile does not apply to {}", function)),
        _ => Ok(()),
    }
}

fn default_alias(function: AggregateFunction, field: Option<&str>) -> String {
    let name = function.as_str().to_lowercase();
    match field {
        Some(field) => format!("{}_{}", name, field.replace(['.', '[', ']', '\''], "_")),
        None => name,
    }
}

/// Output names an aggregation asks for, whether or not they resolve
fn declared_outputs(aggregation: &Aggregation) -> BTreeSet<String> {
    aggregation
        .group_by
        .iter()
        .cloned()
        .chain(aggregation.aggregates.iter().map(|aggregate| {
            aggregate
                .alias
                .clone()
                .unwrap_or_else(|| default_alias(aggregate.function, aggregate.field.as_deref()))
        }))
        .collect()
}

fn unknown_sort_output(target: String) -> BuildError {
    BuildError::new(
        BuildErrorCode::UnknownField,
        target,
        "aggregation queries sort by a group-by field or an aggregate alias",
    )
}

/// `name` lies strictly under the container path `prefix`
fn is_beneath(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .map_or(false, |rest| rest.starts_with('.') || rest.starts_with('['))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cqm::{AllowAll, FieldAccess};
    use crate::filter::Operator;
    use crate::query::QueryBuilder;
    use crate::schema::{EntitySchema, FieldDef, SchemaCatalog};
    use crate::value::Value;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::new(vec![
            EntitySchema::new("orders")
                .field("id", FieldDef::identifier())
                .field("status", FieldDef::string().indexed())
                .field("total_amount", FieldDef::float())
                .field("quantity", FieldDef::int())
                .field("customer_id", FieldDef::identifier().indexed())
                .field("tags", FieldDef::array(FieldType::String))
                .field("notes", FieldDef::string().nullable())
                .field(
                    "customer",
                    FieldDef::relation(RelationDef::new("customers", "customer_id", "id")),
                ),
            EntitySchema::new("customers")
                .field("id", FieldDef::identifier())
                .field("name", FieldDef::string())
                .field("email", FieldDef::string().pii())
                .field("tier", FieldDef::string()),
        ])
    }

    fn build(query: &Query) -> Result<CanonicalQuery, Vec<BuildError>> {
        let catalog = catalog();
        let config = CompilerConfig::default();
        CqmBuilder::new(&catalog, &AllowAll, &config).build(query)
    }

    fn codes(errors: &[BuildError]) -> Vec<BuildErrorCode> {
        errors.iter().map(|e| e.code).collect()
    }

    #[test]
    fn test_resolves_and_coerces_filter() {
        let query = QueryBuilder::new("orders")
            .tenant("acme")
            .filter_eq("status", "completed")
            .filter_gte("total_amount", 100)
            .build();
        let cq = build(&query).unwrap();
        let filter = cq.filter.unwrap();
        let conditions = filter.conditions();
        assert_eq!(conditions[0].field.field_name, "status");
        assert_eq!(conditions[1].value, Some(Value::Float(100.0)));
        assert_eq!(cq.pagination.unwrap().page_size, 50);
    }

    #[test]
    fn test_accumulates_all_errors() {
        let query = QueryBuilder::new("orders")
            .tenant("acme")
            .filter_eq("nope", 1)
            .filter_gt("status", Value::from(vec![1, 2]))
            .sort_asc("tags")
            .include(&["missing.*"])
            .build();
        let errors = build(&query).unwrap_err();
        assert_eq!(
            codes(&errors),
            vec![
                BuildErrorCode::UnknownField,
                BuildErrorCode::TypeMismatch,
                BuildErrorCode::TypeMismatch,
                BuildErrorCode::UnknownField,
            ]
        );
        assert_eq!(errors[0].target, "filter 'nope'");
        assert_eq!(errors[3].target, "include[0] 'missing.*'");
    }

    #[test]
    fn test_failed_aggregation_still_checks_having_and_sorts() {
        let query = QueryBuilder::new("orders")
            .tenant("acme")
            .group_by(&["nope"])
            .count("n")
            .having(Filter::condition("missing_alias".to_string(), Operator::Gte, 5))
            .sort_asc("also_missing")
            .build();
        let errors = build(&query).unwrap_err();
        let targets: Vec<&str> = errors.iter().map(|e| e.target.as_str()).collect();
        assert_eq!(
            targets,
            vec![
                "aggregation.group_by[0] 'nope'",
                "aggregation.having 'missing_alias'",
                "sorts[0] 'also_missing'",
            ]
        );
        assert!(errors.iter().all(|e| e.code == BuildErrorCode::UnknownField));
    }

    #[test]
    fn test_failed_outputs_are_not_reported_twice() {
        let query = QueryBuilder::new("orders")
            .tenant("acme")
            .group_by(&["nope"])
            .count("n")
            .having(Filter::condition("nope".to_string(), Operator::Eq, "x"))
            .sort_desc("n")
            .build();
        let errors = build(&query).unwrap_err();
        assert_eq!(codes(&errors), vec![BuildErrorCode::UnknownField]);
        assert_eq!(errors[0].target, "aggregation.group_by[0] 'nope'");
    }

    #[test]
    fn test_missing_tenant_and_entity() {
        let errors = build(&QueryBuilder::new("orders").build()).unwrap_err();
        assert_eq!(errors[0].target, "tenant_id");

        let errors = build(&QueryBuilder::new("ghosts").tenant("t").build()).unwrap_err();
        assert_eq!(codes(&errors), vec![BuildErrorCode::UnknownField]);
    }

    #[test]
    fn test_implicit_relation_from_filter_and_projection() {
        let query = QueryBuilder::new("orders")
            .tenant("acme")
            .filter_eq("customer.tier", "gold")
            .include(&["id", "customer.name"])
            .build();
        let cq = build(&query).unwrap();
        assert_eq!(cq.relations.len(), 1);
        let relation = &cq.relations[0];
        assert_eq!(relation.alias, "customer");
        assert!(relation.implicit);
        assert_eq!(relation.join_type, None);
        assert_eq!(relation.foreign_field.field_name, "customer.id");
        assert_eq!(relation.foreign_field.entity, "customers");
        let names: Vec<_> = cq.projection.iter().map(|f| f.field_name.as_str()).collect();
        assert_eq!(names, vec!["customer.name", "id"]);
    }

    #[test]
    fn test_explicit_relation_keeps_join_type() {
        let query = QueryBuilder::new("orders")
            .tenant("acme")
            .join("customers", "buyer", JoinType::Left, "customer_id", "id")
            .filter_eq("buyer.name", "Ada")
            .build();
        let cq = build(&query).unwrap();
        let buyer = cq.relation("buyer").unwrap();
        assert!(!buyer.implicit);
        assert_eq!(buyer.join_type, Some(JoinType::Left));
        assert_eq!(buyer.local_field.field_name, "customer_id");
        assert_eq!(buyer.foreign_field.field_name, "buyer.id");
        assert_eq!(buyer.foreign_field.relation.as_deref(), Some("buyer"));
        let field = cq.filter.unwrap().conditions()[0].field.clone();
        assert_eq!(field.relation.as_deref(), Some("buyer"));
        assert!(field.nullable);
    }

    #[test]
    fn test_bad_explicit_relation() {
        let query = QueryBuilder::new("orders")
            .tenant("acme")
            .join("suppliers", "s", JoinType::Inner, "customer_id", "id")
            .join("customers", "c", JoinType::Inner, "quantity", "name")
            .build();
        let errors = build(&query).unwrap_err();
        assert_eq!(
            codes(&errors),
            vec![BuildErrorCode::UnresolvableRelation, BuildErrorCode::TypeMismatch]
        );
    }

    #[test]
    fn test_pii_dropped_from_projection_but_denied_in_filter() {
        let catalog = catalog();
        let config = CompilerConfig::default();
        let access = FieldAccess::new(false);
        let builder = CqmBuilder::new(&catalog, &access, &config);

        let query = QueryBuilder::new("orders").tenant("t").include(&["customer.*"]).build();
        let cq = builder.build(&query).unwrap();
        let names: Vec<_> = cq.projection.iter().map(|f| f.field_name.as_str()).collect();
        assert_eq!(names, vec!["customer.id", "customer.name", "customer.tier"]);

        let query = QueryBuilder::new("orders")
            .tenant("t")
            .filter_eq("customer.email", "a@b.c")
            .build();
        let errors = builder.build(&query).unwrap_err();
        assert_eq!(codes(&errors), vec![BuildErrorCode::PermissionDenied]);
    }

    #[test]
    fn test_aggregation_projection_and_having() {
        let query = QueryBuilder::new("orders")
            .tenant("acme")
            .filter_eq("status", "completed")
            .group_by(&["customer_id"])
            .count("order_count")
            .sum("total_amount", "revenue")
            .having(Filter::condition("order_count".to_string(), Operator::Gte, 5))
            .sort_desc("revenue")
            .build();
        let cq = build(&query).unwrap();
        let names: Vec<_> = cq.projection.iter().map(|f| f.field_name.as_str()).collect();
        assert_eq!(names, vec!["customer_id", "total_amount"]);
        assert!(cq.pagination.is_none());
        let aggregation = cq.aggregation.unwrap();
        let having = aggregation.having.unwrap();
        assert_eq!(having.conditions()[0].value, Some(Value::Int(5)));
        assert!(matches!(cq.sorts[0].target, SortTarget::Output(_)));
    }

    #[test]
    fn test_aggregate_type_rules() {
        let query = QueryBuilder::new("orders")
            .tenant("acme")
            .sum("status", "s")
            .percentile("total_amount", 120.0, "p")
            .having(Filter::condition("unknown".to_string(), Operator::Eq, 1))
            .build();
        let errors = build(&query).unwrap_err();
        assert_eq!(
            codes(&errors),
            vec![BuildErrorCode::TypeMismatch, BuildErrorCode::TypeMismatch]
        );
    }

    #[test]
    fn test_aggregate_alias_rules() {
        assert_eq!(default_alias(AggregateFunction::Count, None), "count");
        let cq = build(
            &QueryBuilder::new("orders")
                .tenant("t")
                .aggregate(AggregateFunction::Avg, Some("quantity"), "")
                .build(),
        );
        assert!(cq.is_err());
    }

    #[test]
    fn test_pagination_rules() {
        let query = QueryBuilder::new("orders").tenant("t").limit(5000).build();
        assert_eq!(codes(&build(&query).unwrap_err()), vec![BuildErrorCode::LimitExceeded]);

        let query = QueryBuilder::new("orders").tenant("t").cursor("c").offset(10).build();
        assert_eq!(codes(&build(&query).unwrap_err()), vec![BuildErrorCode::SyntaxError]);
    }

    #[test]
    fn test_search_validation() {
        let query = QueryBuilder::new("orders")
            .tenant("t")
            .search_fulltext("red shoes", &["status", "quantity"])
            .build();
        assert_eq!(codes(&build(&query).unwrap_err()), vec![BuildErrorCode::TypeMismatch]);

        let query = QueryBuilder::new("orders")
            .tenant("t")
            .search_fulltext("red shoes", &["status", "tags"])
            .boost("status", 2.0)
            .build();
        let search = build(&query).unwrap().search.unwrap();
        assert_eq!(search.boost.get("status"), Some(&2.0));
    }

    #[test]
    fn test_filter_is_normalized() {
        let inner = Filter::condition("status".to_string(), Operator::Eq, "a");
        let query = QueryBuilder::new("orders")
            .tenant("t")
            .filter(inner.negate().negate())
            .build();
        let cq = build(&query).unwrap();
        assert!(matches!(cq.filter, Some(Filter::Condition(_))));
    }

    #[test]
    fn test_expired_deadline() {
        let catalog = catalog();
        let config = CompilerConfig::default();
        let query = QueryBuilder::new("orders").tenant("t").build();
        let errors = CqmBuilder::new(&catalog, &AllowAll, &config)
            .with_deadline(Deadline::after(std::time::Duration::ZERO))
            .build(&query)
            .unwrap_err();
        assert_eq!(codes(&errors), vec![BuildErrorCode::PlanningTimeout]);
    }

    #[test]
    fn test_beneath() {
        assert!(is_beneath("customer.name", "customer"));
        assert!(is_beneath("items[].sku", "items"));
        assert!(!is_beneath("customers", "customer"));
    }
}
