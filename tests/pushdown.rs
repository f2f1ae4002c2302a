//! Predicate placement must not change results
//!
//! Runs filtered queries through the in-memory executor and compares them
//! with the unfiltered query's rows filtered afterwards.

mod common;

use querycraft::compiler::QueryCompiler;
use querycraft::config::CompilerConfig;
use querycraft::cqm::AllowAll;
use querycraft::executor::InMemoryExecutor;
use querycraft::filter::{evaluate, Filter, Operator, Row};
use querycraft::planner::InMemoryStatistics;
use querycraft::query::QueryBuilder;
use querycraft::schema::FieldRef;
use querycraft::value::Value;
use serde_json::json;

use common::{catalog, field, query};

// =============================================================================
// Helpers
// =============================================================================

fn executor() -> InMemoryExecutor {
    InMemoryExecutor::from_json(json!({
        "acme": {
            "orders": [
                {"id": "o1", "status": "completed", "total_amount": 10.0, "customer_id": "c1"},
                {"id": "o2", "status": "completed", "total_amount": 30.0, "customer_id": "c1"},
                {"id": "o3", "status": "pending", "total_amount": 5.0, "customer_id": "c2"},
                {"id": "o4", "status": "completed", "total_amount": 7.5, "customer_id": "c3"},
                {"id": "o5", "status": "cancelled", "total_amount": 99.0, "customer_id": "c2"}
            ],
            "customers": [
                {"id": "c1", "name": "Ada", "tier": "gold", "region_id": "r1"},
                {"id": "c2", "name": "Lin", "tier": "silver", "region_id": "r2"}
            ],
            "regions": [
                {"id": "r1", "name": "north"}
            ]
        },
        "globex": {
            "orders": [
                {"id": "g1", "status": "completed", "total_amount": 1.0, "customer_id": "c1"}
            ]
        }
    }))
    .unwrap()
}

const COLUMNS: [&str; 4] = ["id", "status", "customer.tier", "customer.region.name"];

fn run(builder: QueryBuilder) -> Vec<Row> {
    let compiler = QueryCompiler::new(catalog(), InMemoryStatistics::new(), CompilerConfig::default());
    let compiled = compiler
        .compile(&query(builder.include(&COLUMNS)), &AllowAll)
        .unwrap();
    let (mut rows, _) = compiler.execute(&compiled, &executor()).unwrap().collect_rows();
    rows.sort_by(|a, b| a["id"].as_str().cmp(&b["id"].as_str()));
    rows
}

fn assert_pushdown_safe(predicate: Filter<FieldRef>, wire: Filter<String>) {
    let filtered = run(QueryBuilder::new("orders").filter(wire));
    let expected: Vec<Row> = run(QueryBuilder::new("orders"))
        .into_iter()
        .filter(|row| evaluate(&predicate, row))
        .collect();
    assert_eq!(filtered, expected);
}

// =============================================================================
// Equivalence
// =============================================================================

/// Base-entity predicate below an outer join.
#[test]
fn test_base_predicate() {
    assert_pushdown_safe(
        Filter::condition(field("orders", "status"), Operator::Eq, "completed"),
        Filter::condition("status".to_string(), Operator::Eq, "completed"),
    );
}

/// Predicate on the joined side.
#[test]
fn test_relation_predicate() {
    assert_pushdown_safe(
        Filter::condition(field("orders", "customer.tier"), Operator::Eq, "gold"),
        Filter::condition("customer.tier".to_string(), Operator::Eq, "gold"),
    );
}

/// IS_NULL on the joined side must keep unmatched rows.
#[test]
fn test_null_check_on_relation() {
    assert_pushdown_safe(
        Filter::unary(field("orders", "customer.tier"), Operator::IsNull),
        Filter::unary("customer.tier".to_string(), Operator::IsNull),
    );
}

/// Two-hop predicate combined with a base predicate.
#[test]
fn test_mixed_conjunction() {
    assert_pushdown_safe(
        Filter::And(vec![
            Filter::condition(field("orders", "customer.region.name"), Operator::Eq, "north"),
            Filter::condition(field("orders", "status"), Operator::Ne, "pending"),
        ]),
        Filter::And(vec![
            Filter::condition("customer.region.name".to_string(), Operator::Eq, "north"),
            Filter::condition("status".to_string(), Operator::Ne, "pending"),
        ]),
    );
}

/// A disjunction spanning both sides stays above the join.
#[test]
fn test_cross_side_disjunction() {
    assert_pushdown_safe(
        Filter::Or(vec![
            Filter::condition(field("orders", "customer.tier"), Operator::Eq, "silver"),
            Filter::condition(field("orders", "status"), Operator::Eq, "completed"),
        ]),
        Filter::Or(vec![
            Filter::condition("customer.tier".to_string(), Operator::Eq, "silver"),
            Filter::condition("status".to_string(), Operator::Eq, "completed"),
        ]),
    );
}

/// Rows from another tenant are never visible.
#[test]
fn test_tenant_isolation() {
    let rows = run(QueryBuilder::new("orders"));
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| r["id"] != Value::String("g1".into())));
}
