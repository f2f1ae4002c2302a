//! Optimization without statistics
//!
//! Missing statistics never fail a compile: the optimizer falls back to
//! table scans, hash joins and hash aggregation and marks the plan uncosted.

mod common;

use querycraft::filter::{Filter, Operator};
use querycraft::planner::{
    BuildSide, InMemoryStatistics, LogicalPlan, NoStatistics, Optimizer, OptimizerConfig, PhysicalOperator,
    PhysicalPlan, StatisticsView,
};
use querycraft::query::QueryBuilder;

use common::canonical;

fn optimize(builder: QueryBuilder, stats: &dyn StatisticsView) -> PhysicalPlan {
    let logical = LogicalPlan::from_canonical(&canonical(builder)).unwrap();
    Optimizer::new(stats, &OptimizerConfig::default())
        .optimize(&logical)
        .unwrap()
}

fn operators(plan: &PhysicalPlan) -> Vec<&'static str> {
    plan.nodes().iter().map(|n| n.operator.as_str()).collect()
}

fn heavy_query() -> QueryBuilder {
    QueryBuilder::new("orders")
        .filter_eq("status", "completed")
        .filter_eq("customer.region.name", "north")
        .group_by(&["customer.tier"])
        .count("order_count")
        .avg("total_amount", "avg_total")
        .having(Filter::condition("order_count".to_string(), Operator::Gt, 1))
}

// =============================================================================
// Fallback choices
// =============================================================================

/// Every scan is a table scan, every join a hash join, aggregation hashed.
#[test]
fn test_no_statistics_uses_safe_operators() {
    let plan = optimize(heavy_query(), &NoStatistics);
    assert!(!plan.costed);

    for node in plan.nodes() {
        match &node.operator {
            PhysicalOperator::IndexScan { .. }
            | PhysicalOperator::MergeJoin { .. }
            | PhysicalOperator::NestedLoopJoin { .. }
            | PhysicalOperator::SortAggregate { .. } => {
                panic!("unexpected {} without statistics", node.operator.as_str())
            }
            PhysicalOperator::HashJoin { build_side, .. } => assert_eq!(*build_side, BuildSide::Right),
            _ => {}
        }
    }
    let names = operators(&plan);
    assert_eq!(names.iter().filter(|n| **n == "HashJoin").count(), 2);
    assert_eq!(names.iter().filter(|n| **n == "TableScan").count(), 3);
    assert!(names.contains(&"HashAggregate"));
}

/// One warning per entity lacking statistics.
#[test]
fn test_uncosted_warnings_name_each_entity_once() {
    let plan = optimize(heavy_query(), &NoStatistics);
    for entity in ["orders", "customers", "regions"] {
        let mentions = plan
            .warnings
            .iter()
            .filter(|w| w.contains(&format!("'{}'", entity)))
            .count();
        assert_eq!(mentions, 1, "warnings: {:?}", plan.warnings);
    }
}

/// An empty statistics catalog behaves like no statistics at all.
#[test]
fn test_empty_statistics_match_no_statistics() {
    let empty = InMemoryStatistics::new();
    assert_eq!(
        operators(&optimize(heavy_query(), &empty)),
        operators(&optimize(heavy_query(), &NoStatistics))
    );
}

/// Simple queries still optimize and keep Limit at the root.
#[test]
fn test_plain_query_without_statistics() {
    let plan = optimize(
        QueryBuilder::new("orders").sort_desc("created_at").limit(10),
        &NoStatistics,
    );
    assert_eq!(operators(&plan), vec!["Limit", "Project", "Sort", "TableScan"]);
    assert!(plan.root.estimated_rows <= 10.0);
}
