//! Fluent query construction

use crate::filter::{Condition, Filter, Operator};
use crate::value::Value;
use crate::vocab::{
    AggregateFunction, ConsistencyLevel, JoinType, NullOrdering, SearchMode, SortDirection,
};

use super::model::{
    Aggregate, Aggregation, JoinOn, Pagination, Query, Relation, Search, Sort,
};

/// Builds a `Query` step by step. Filters added separately are ANDed.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    query: Query,
    filters: Vec<Filter<String>>,
}

impl QueryBuilder {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            query: Query::new(entity, ""),
            filters: Vec::new(),
        }
    }

    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.query.tenant_id = tenant_id.into();
        self
    }

    // Filters

    pub fn filter(mut self, filter: Filter<String>) -> Self {
        self.filters.push(filter);
        self
    }

    fn condition(self, field: &str, operator: Operator, value: Option<Value>) -> Self {
        self.filter(Filter::Condition(Condition::new(field.to_string(), operator, value)))
    }

    pub fn filter_eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.condition(field, Operator::Eq, Some(value.into()))
    }

    pub fn filter_ne(self, field: &str, value: impl Into<Value>) -> Self {
        self.condition(field, Operator::Ne, Some(value.into()))
    }

    pub fn filter_lt(self, field: &str, value: impl Into<Value>) -> Self {
        self.condition(field, Operator::Lt, Some(value.into()))
    }

    pub fn filter_lte(self, field: &str, value: impl Into<Value>) -> Self {
        self.condition(field, Operator::Lte, Some(value.into()))
    }

    pub fn filter_gt(self, field: &str, value: impl Into<Value>) -> Self {
        self.condition(field, Operator::Gt, Some(value.into()))
    }

    pub fn filter_gte(self, field: &str, value: impl Into<Value>) -> Self {
        self.condition(field, Operator::Gte, Some(value.into()))
    }

    pub fn filter_in<V: Into<Value>>(self, field: &str, values: Vec<V>) -> Self {
        self.condition(field, Operator::In, Some(Value::from(values)))
    }

    pub fn filter_not_in<V: Into<Value>>(self, field: &str, values: Vec<V>) -> Self {
        self.condition(field, Operator::NotIn, Some(Value::from(values)))
    }

    pub fn filter_between(self, field: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        let bounds = Value::Array(vec![low.into(), high.into()]);
        self.condition(field, Operator::Between, Some(bounds))
    }

    pub fn filter_contains(self, field: &str, value: &str, case_sensitive: bool) -> Self {
        let mut condition = Condition::new(field.to_string(), Operator::Contains, Some(value.into()));
        condition.case_sensitive = case_sensitive;
        self.filter(Filter::Condition(condition))
    }

    pub fn filter_starts_with(self, field: &str, value: &str) -> Self {
        self.condition(field, Operator::StartsWith, Some(value.into()))
    }

    pub fn filter_ends_with(self, field: &str, value: &str) -> Self {
        self.condition(field, Operator::EndsWith, Some(value.into()))
    }

    pub fn filter_matches(self, field: &str, pattern: &str) -> Self {
        self.condition(field, Operator::Matches, Some(pattern.into()))
    }

    pub fn filter_is_null(self, field: &str) -> Self {
        self.condition(field, Operator::IsNull, None)
    }

    pub fn filter_is_not_null(self, field: &str) -> Self {
        self.condition(field, Operator::IsNotNull, None)
    }

    pub fn filter_array_contains(self, field: &str, value: impl Into<Value>) -> Self {
        self.condition(field, Operator::ArrayContains, Some(value.into()))
    }

    // Sorting and projection

    pub fn sort(mut self, field: &str, direction: SortDirection, nulls: NullOrdering) -> Self {
        self.query.sorts.push(Sort {
            field: field.to_string(),
            direction,
            nulls,
        });
        self
    }

    pub fn sort_asc(self, field: &str) -> Self {
        self.sort(field, SortDirection::Asc, NullOrdering::Default)
    }

    pub fn sort_desc(self, field: &str) -> Self {
        self.sort(field, SortDirection::Desc, NullOrdering::Default)
    }

    pub fn include(mut self, patterns: &[&str]) -> Self {
        self.query
            .projection
            .include
            .extend(patterns.iter().map(|p| p.to_string()));
        self
    }

    pub fn exclude(mut self, patterns: &[&str]) -> Self {
        self.query
            .projection
            .exclude
            .extend(patterns.iter().map(|p| p.to_string()));
        self
    }

    // Pagination

    fn pagination(&mut self) -> &mut Pagination {
        self.query.pagination.get_or_insert_with(Pagination::default)
    }

    pub fn limit(mut self, page_size: u32) -> Self {
        self.pagination().page_size = Some(page_size);
        self
    }

    pub fn cursor(mut self, cursor: &str) -> Self {
        self.pagination().cursor = Some(cursor.to_string());
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.pagination().offset = Some(offset);
        self
    }

    // Search

    pub fn search_fulltext(mut self, query: &str, fields: &[&str]) -> Self {
        self.query.search = Some(Search {
            query: query.to_string(),
            mode: SearchMode::FullText,
            fields: fields.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        });
        self
    }

    pub fn search_semantic(mut self, vector_field: &str, embedding: Vec<f32>, min_score: Option<f64>) -> Self {
        self.query.search = Some(Search {
            mode: SearchMode::Semantic,
            vector_field: Some(vector_field.to_string()),
            embedding,
            min_score,
            ..Default::default()
        });
        self
    }

    pub fn search_hybrid(mut self, query: &str, fields: &[&str], vector_field: &str, embedding: Vec<f32>) -> Self {
        self.query.search = Some(Search {
            query: query.to_string(),
            mode: SearchMode::Hybrid,
            fields: fields.iter().map(|f| f.to_string()).collect(),
            vector_field: Some(vector_field.to_string()),
            embedding,
            ..Default::default()
        });
        self
    }

    pub fn boost(mut self, field: &str, weight: f64) -> Self {
        if let Some(search) = self.query.search.as_mut() {
            search.boost.insert(field.to_string(), weight);
        }
        self
    }

    // Aggregation

    fn aggregation(&mut self) -> &mut Aggregation {
        self.query.aggregation.get_or_insert_with(Aggregation::default)
    }

    pub fn group_by(mut self, fields: &[&str]) -> Self {
        self.aggregation()
            .group_by
            .extend(fields.iter().map(|f| f.to_string()));
        self
    }

    pub fn aggregate(mut self, function: AggregateFunction, field: Option<&str>, alias: &str) -> Self {
        self.aggregation().aggregates.push(Aggregate {
            function,
            field: field.map(str::to_string),
            alias: Some(alias.to_string()),
            percentile: None,
        });
        self
    }

    pub fn count(self, alias: &str) -> Self {
        self.aggregate(AggregateFunction::Count, None, alias)
    }

    pub fn count_distinct(self, field: &str, alias: &str) -> Self {
        self.aggregate(AggregateFunction::CountDistinct, Some(field), alias)
    }

    pub fn sum(self, field: &str, alias: &str) -> Self {
        self.aggregate(AggregateFunction::Sum, Some(field), alias)
    }

    pub fn avg(self, field: &str, alias: &str) -> Self {
        self.aggregate(AggregateFunction::Avg, Some(field), alias)
    }

    pub fn min(self, field: &str, alias: &str) -> Self {
        self.aggregate(AggregateFunction::Min, Some(field), alias)
    }

    pub fn max(self, field: &str, alias: &str) -> Self {
        self.aggregate(AggregateFunction::Max, Some(field), alias)
    }

    pub fn percentile(mut self, field: &str, percentile: f64, alias: &str) -> Self {
        self.aggregation().aggregates.push(Aggregate {
            function: AggregateFunction::Percentile,
            field: Some(field.to_string()),
            alias: Some(alias.to_string()),
            percentile: Some(percentile),
        });
        self
    }

    /// Adds a post-aggregation condition; repeated calls are ANDed
    pub fn having(mut self, filter: Filter<String>) -> Self {
        let aggregation = self.aggregation();
        aggregation.having = match aggregation.having.take() {
            None => Some(filter),
            Some(existing) => Filter::all(vec![existing, filter]),
        };
        self
    }

    // Relations

    pub fn join(mut self, entity: &str, alias: &str, join_type: JoinType, local_field: &str, foreign_field: &str) -> Self {
        self.query.relations.push(Relation {
            entity: entity.to_string(),
            alias: Some(alias.to_string()),
            join_type,
            on: JoinOn {
                local_field: local_field.to_string(),
                foreign_field: foreign_field.to_string(),
            },
            eager: false,
        });
        self
    }

    // Options

    pub fn timeout(mut self, timeout_ms: u64) -> Self {
        self.query.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn explain(mut self, enabled: bool) -> Self {
        self.query.options.explain = enabled;
        self
    }

    pub fn count_total(mut self, enabled: bool) -> Self {
        self.query.options.count_total = enabled;
        self
    }

    pub fn consistency(mut self, level: ConsistencyLevel) -> Self {
        self.query.options.consistency = level;
        self
    }

    pub fn correlation_id(mut self, id: &str) -> Self {
        self.query.options.correlation_id = Some(id.to_string());
        self
    }

    pub fn build(self) -> Query {
        let mut query = self.query;
        query.filter = Filter::all(self.filters);
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_are_anded() {
        let q = QueryBuilder::new("orders")
            .tenant("acme")
            .filter_eq("status", "completed")
            .filter_gte("total", 100)
            .build();
        match q.filter {
            Some(Filter::And(children)) => assert_eq!(children.len(), 2),
            other => panic!("expected AND, got {:?}", other),
        }
    }

    #[test]
    fn test_single_filter_not_wrapped() {
        let q = QueryBuilder::new("orders").filter_is_null("deleted_at").build();
        assert!(matches!(q.filter, Some(Filter::Condition(_))));
    }

    #[test]
    fn test_aggregation_helpers() {
        let q = QueryBuilder::new("orders")
            .group_by(&["customer_id"])
            .count("order_count")
            .sum("total_amount", "revenue")
            .having(Filter::condition("order_count".to_string(), Operator::Gte, 5))
            .build();
        let agg = q.aggregation.unwrap();
        assert_eq!(agg.group_by, vec!["customer_id"]);
        assert_eq!(agg.aggregates.len(), 2);
        assert_eq!(agg.aggregates[1].field.as_deref(), Some("total_amount"));
        assert!(agg.having.is_some());
    }

    #[test]
    fn test_pagination_and_options() {
        let q = QueryBuilder::new("users")
            .limit(25)
            .cursor("c1")
            .timeout(500)
            .consistency(ConsistencyLevel::Linearizable)
            .build();
        let page = q.pagination.unwrap();
        assert_eq!(page.page_size, Some(25));
        assert_eq!(page.cursor.as_deref(), Some("c1"));
        assert_eq!(q.timeout_ms, Some(500));
    }
}
