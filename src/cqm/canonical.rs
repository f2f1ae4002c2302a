//! Canonical query model
//!
//! The schema-resolved form of a query. Every field is a `FieldRef`, every
//! operand has been coerced to its field's type, and the projection is an
//! explicit field list. Planning consumes only these types.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::filter::{Filter, TypedField};
use crate::schema::{Cardinality, FieldRef};
use crate::value::FieldType;
use crate::vocab::{
    AggregateFunction, ConsistencyLevel, JoinType, NullOrdering, SearchMode, SortDirection,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalQuery {
    pub query_id: Uuid,
    pub correlation_id: String,
    pub entity: String,
    pub tenant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter<FieldRef>>,
    pub sorts: Vec<CanonicalSort>,
    /// Selected leaf fields, ordered by field name
    pub projection: Vec<FieldRef>,
    /// Containers kept because something beneath them is projected
    pub retained_containers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<CanonicalAggregation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<CanonicalSearch>,
    /// Parents always precede nested relations
    pub relations: Vec<CanonicalRelation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<CanonicalPagination>,
    pub explain: bool,
    pub count_total: bool,
    pub consistency: ConsistencyLevel,
}

impl CanonicalQuery {
    pub fn relation(&self, alias: &str) -> Option<&CanonicalRelation> {
        self.relations.iter().find(|r| r.alias == alias)
    }

    pub fn is_aggregate(&self) -> bool {
        self.aggregation.is_some()
    }

    /// Every schema field the query touches, deduplicated
    pub fn referenced_fields(&self) -> Vec<&FieldRef> {
        let mut seen = BTreeSet::new();
        let mut fields = Vec::new();
        let candidates = self
            .filter
            .iter()
            .flat_map(|f| f.fields())
            .chain(self.sorts.iter().filter_map(|s| s.target.field()))
            .chain(self.aggregation.iter().flat_map(|a| a.input_fields()))
            .chain(self.search.iter().flat_map(|s| s.fields()))
            .chain(self.projection.iter());
        for field in candidates {
            if seen.insert(&field.field_name) {
                fields.push(field);
            }
        }
        fields
    }
}

/// A name produced by aggregation: a group key or an aggregate alias
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OutputRef {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
}

impl TypedField for OutputRef {
    fn name(&self) -> &str {
        &self.name
    }

    fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    fn is_nullable(&self) -> bool {
        self.nullable
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortTarget {
    Field(FieldRef),
    /// Group key or aggregate alias of an aggregation query
    Output(OutputRef),
}

impl SortTarget {
    pub fn name(&self) -> &str {
        match self {
            SortTarget::Field(field) => &field.field_name,
            SortTarget::Output(output) => &output.name,
        }
    }

    pub fn field(&self) -> Option<&FieldRef> {
        match self {
            SortTarget::Field(field) => Some(field),
            SortTarget::Output(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalSort {
    pub target: SortTarget,
    pub direction: SortDirection,
    pub nulls: NullOrdering,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalAggregate {
    pub function: AggregateFunction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<FieldRef>,
    pub alias: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentile: Option<f64>,
    pub result_type: FieldType,
}

impl CanonicalAggregate {
    pub fn output(&self) -> OutputRef {
        OutputRef {
            name: self.alias.clone(),
            field_type: self.result_type.clone(),
            nullable: !matches!(
                self.function,
                AggregateFunction::Count | AggregateFunction::CountDistinct
            ),
        }
    }
}

impl fmt::Display for CanonicalAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.field, self.percentile) {
            (Some(field), Some(p)) => write!(f, "{}({}, {}) AS {}", self.function, field, p, self.alias),
            (Some(field), None) => write!(f, "{}({}) AS {}", self.function, field, self.alias),
            (None, _) => write!(f, "{}(*) AS {}", self.function, self.alias),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalAggregation {
    pub group_by: Vec<FieldRef>,
    pub aggregates: Vec<CanonicalAggregate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub having: Option<Filter<OutputRef>>,
}

impl CanonicalAggregation {
    /// Names and types of the rows the aggregate emits
    pub fn outputs(&self) -> Vec<OutputRef> {
        self.group_by
            .iter()
            .map(|field| OutputRef {
                name: field.field_name.clone(),
                field_type: field.field_type.clone(),
                nullable: field.nullable,
            })
            .chain(self.aggregates.iter().map(CanonicalAggregate::output))
            .collect()
    }

    /// Fields read by the aggregate: group keys then aggregate inputs
    pub fn input_fields(&self) -> impl Iterator<Item = &FieldRef> {
        self.group_by
            .iter()
            .chain(self.aggregates.iter().filter_map(|a| a.field.as_ref()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalSearch {
    pub query: String,
    pub mode: SearchMode,
    pub fields: Vec<FieldRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_field: Option<FieldRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,
    /// Field name to weight
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub boost: BTreeMap<String, f64>,
}

impl CanonicalSearch {
    pub fn fields(&self) -> impl Iterator<Item = &FieldRef> {
        self.fields.iter().chain(self.vector_field.iter())
    }
}

/// A join against another entity, declared or inferred from a path
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRelation {
    /// Path prefix that addresses the related entity (`customer`, `customer.region`)
    pub alias: String,
    /// Enclosing relation for nested hops
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub entity: String,
    pub from_entity: String,
    /// Join key on the parent side
    pub local_field: FieldRef,
    /// Join key on the related entity, addressed through `alias`
    pub foreign_field: FieldRef,
    /// `None` for inferred relations; the planner decides
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_type: Option<JoinType>,
    pub implicit: bool,
    pub eager: bool,
    pub cardinality: Cardinality,
}

impl CanonicalRelation {
    /// Whether `relation` (a FieldRef's relation alias) is this one or nested under it
    pub fn covers(&self, relation: &str) -> bool {
        relation == self.alias
            || relation
                .strip_prefix(self.alias.as_str())
                .map_or(false, |rest| rest.starts_with('.'))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalPagination {
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}
