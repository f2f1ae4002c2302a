//! Client-facing query wire model
//!
//! Everything here is loosely typed: field paths are raw strings, values are
//! uninterpreted, projections are unexpanded patterns.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::filter::Filter;
use crate::vocab::{
    AggregateFunction, ConsistencyLevel, JoinType, NullOrdering, SearchMode, SortDirection,
};

/// A query as received from a client
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Query {
    pub entity: String,
    /// Isolation key; required
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter<String>>,
    #[serde(default, alias = "sort", skip_serializing_if = "Vec::is_empty")]
    pub sorts: Vec<Sort>,
    #[serde(flatten)]
    pub projection: Projection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<Aggregation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<Search>,
    #[serde(default, alias = "relation", skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<Relation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub options: QueryOptions,
}

impl Query {
    pub fn new(entity: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            tenant_id: tenant_id.into(),
            ..Default::default()
        }
    }

    /// Top-level `timeout_ms`, else the one under `options`
    pub fn effective_timeout_ms(&self) -> Option<u64> {
        self.timeout_ms.or(self.options.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Projection {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
    #[serde(default)]
    pub nulls: NullOrdering,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Aggregation {
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub aggregates: Vec<Aggregate>,
    /// Post-aggregation filter over aliases and group keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub having: Option<Filter<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub function: AggregateFunction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// `PERCENTILE` only, in (0, 100]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentile: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Search {
    #[serde(default)]
    pub query: String,
    #[serde(default, alias = "type")]
    pub mode: SearchMode,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_field: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,
    /// Per-field score weights
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub boost: BTreeMap<String, f64>,
}

/// An explicit join
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub entity: String,
    /// Defaults to the entity name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default = "default_join_type", alias = "type")]
    pub join_type: JoinType,
    pub on: JoinOn,
    #[serde(default)]
    pub eager: bool,
}

fn default_join_type() -> JoinType {
    JoinType::Inner
}

impl Relation {
    pub fn alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.entity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinOn {
    /// Path on the base entity
    pub local_field: String,
    /// Field on the joined entity
    pub foreign_field: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub explain: bool,
    #[serde(default)]
    pub count_total: bool,
    #[serde(default)]
    pub consistency: ConsistencyLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Operator;

    #[test]
    fn test_deserialize_full_query() {
        let json = r#"{
            "entity": "orders",
            "tenant_id": "acme",
            "filter": {"condition": {"field": "status", "operator": "EQ", "value": "completed"}},
            "sort": [{"field": "created_at", "direction": "DESC", "nulls": "LAST"}],
            "include": ["id", "customer.*"],
            "exclude": ["**.password"],
            "aggregation": {
                "group_by": ["customer_id"],
                "aggregates": [{"function": "COUNT", "alias": "order_count"}]
            },
            "relations": [{
                "entity": "customers",
                "alias": "buyer",
                "type": "LEFT_OUTER",
                "on": {"local_field": "customer_id", "foreign_field": "id"}
            }],
            "pagination": {"page_size": 20, "cursor": "abc"},
            "options": {"timeout_ms": 250, "consistency": "STRONG"}
        }"#;
        let q: Query = serde_json::from_str(json).unwrap();
        assert_eq!(q.entity, "orders");
        assert_eq!(q.sorts[0].direction, SortDirection::Desc);
        assert_eq!(q.sorts[0].nulls, NullOrdering::Last);
        assert_eq!(q.projection.include, vec!["id", "customer.*"]);
        assert_eq!(q.relations[0].join_type, JoinType::Left);
        assert_eq!(q.relations[0].alias(), "buyer");
        assert_eq!(q.effective_timeout_ms(), Some(250));
        assert_eq!(q.options.consistency, ConsistencyLevel::Strong);
        match q.filter {
            Some(Filter::Condition(c)) => assert_eq!(c.operator, Operator::Eq),
            other => panic!("unexpected filter {:?}", other),
        }
    }

    #[test]
    fn test_minimal_query() {
        let q: Query = serde_json::from_str(r#"{"entity": "users"}"#).unwrap();
        assert!(q.tenant_id.is_empty());
        assert!(q.projection.include.is_empty());
        assert_eq!(q.effective_timeout_ms(), None);
    }
}
