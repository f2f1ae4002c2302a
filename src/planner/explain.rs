//! Explain reports
//!
//! Renders a physical plan with its estimates and, when runtime counts are
//! supplied, compares estimated against actual rows per node. Output is
//! deterministic for a given plan and runtime.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::filter::Filter;

use super::physical::{NodeId, PhysicalNode, PhysicalOperator, PhysicalPlan};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainConfig {
    /// Flag a node when actual/estimated rows differ by more than this factor
    pub misestimate_ratio: f64,
    /// A residual filter keeping less than this share of a table scan suggests an index
    pub missing_index_selectivity: f64,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            misestimate_ratio: 10.0,
            missing_index_selectivity: 0.15,
        }
    }
}

/// Row counts observed while executing a plan, keyed by node id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    #[serde(default)]
    pub node_rows: BTreeMap<u32, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

impl ExecutionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(mut self, node: NodeId, rows: u64) -> Self {
        self.node_rows.insert(node.0, rows);
        self
    }

    pub fn actual_rows(&self, node: NodeId) -> Option<u64> {
        self.node_rows.get(&node.0).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recommendation {
    CardinalityMisestimate {
        node: NodeId,
        operator: String,
        estimated_rows: f64,
        actual_rows: u64,
    },
    MissingIndex {
        entity: String,
        field: String,
    },
    StaleStatistics {
        entity: String,
    },
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::CardinalityMisestimate { node, operator, estimated_rows, actual_rows } => write!(
                f,
                "{} {} estimated {:.0} rows but produced {}",
                node, operator, estimated_rows, actual_rows
            ),
            Recommendation::MissingIndex { entity, field } => {
                write!(f, "consider an index on {}.{}", entity, field)
            }
            Recommendation::StaleStatistics { entity } => {
                write!(f, "statistics for '{}' look stale; refresh them", entity)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplainNode {
    pub id: NodeId,
    pub depth: usize,
    pub operator: String,
    pub detail: String,
    pub estimated_rows: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_rows: Option<u64>,
    pub cost: f64,
    pub total_cost: f64,
    pub costed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplainReport {
    pub query_id: Uuid,
    pub correlation_id: String,
    pub costed: bool,
    pub total_cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    pub nodes: Vec<ExplainNode>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<Recommendation>,
}

/// Builds the report for `plan`, annotated with `runtime` when available
pub fn explain(plan: &PhysicalPlan, runtime: Option<&ExecutionStats>, config: &ExplainConfig) -> ExplainReport {
    let mut nodes = Vec::new();
    flatten(&plan.root, 0, runtime, &mut nodes);

    let mut recommendations: Vec<Recommendation> = Vec::new();
    if let Some(runtime) = runtime {
        for node in plan.nodes() {
            let Some(actual) = runtime.actual_rows(node.id) else { continue };
            let estimated = node.estimated_rows;
            let (high, low) = if actual as f64 > estimated {
                (actual as f64, estimated)
            } else {
                (estimated, actual as f64)
            };
            if high / low.max(1.0) <= config.misestimate_ratio {
                continue;
            }
            recommendations.push(Recommendation::CardinalityMisestimate {
                node: node.id,
                operator: node.operator.as_str().to_string(),
                estimated_rows: estimated,
                actual_rows: actual,
            });
            let diagnosis = missing_index(node, actual, runtime, config).or_else(|| {
                first_entity(node).map(|entity| Recommendation::StaleStatistics {
                    entity: entity.to_string(),
                })
            });
            if let Some(diagnosis) = diagnosis {
                if !recommendations.contains(&diagnosis) {
                    recommendations.push(diagnosis);
                }
            }
        }
    }

    ExplainReport {
        query_id: plan.query_id,
        correlation_id: plan.correlation_id.clone(),
        costed: plan.costed,
        total_cost: plan.total_cost(),
        elapsed_ms: runtime.and_then(|r| r.elapsed_ms),
        nodes,
        warnings: plan.warnings.clone(),
        recommendations,
    }
}

fn flatten(node: &PhysicalNode, depth: usize, runtime: Option<&ExecutionStats>, out: &mut Vec<ExplainNode>) {
    out.push(ExplainNode {
        id: node.id,
        depth,
        operator: node.operator.as_str().to_string(),
        detail: node.operator.detail(),
        estimated_rows: node.estimated_rows,
        actual_rows: runtime.and_then(|r| r.actual_rows(node.id)),
        cost: node.cost,
        total_cost: node.total_cost,
        costed: node.costed,
    });
    for child in &node.children {
        flatten(child, depth + 1, runtime, out);
    }
}

/// A filter over a table scan that discarded most rows
fn missing_index(
    node: &PhysicalNode,
    actual: u64,
    runtime: &ExecutionStats,
    config: &ExplainConfig,
) -> Option<Recommendation> {
    let PhysicalOperator::Filter { predicate } = &node.operator else { return None };
    let scan = node.children.first()?;
    let PhysicalOperator::TableScan { entity, alias, .. } = &scan.operator else { return None };

    let scanned = runtime
        .actual_rows(scan.id)
        .map_or(scan.estimated_rows, |rows| rows as f64);
    if scanned <= 0.0 || actual as f64 / scanned >= config.missing_index_selectivity {
        return None;
    }

    let conjuncts: Vec<&Filter<_>> = match predicate {
        Filter::And(children) => children.iter().collect(),
        other => vec![other],
    };
    conjuncts
        .into_iter()
        .filter_map(|conjunct| match conjunct {
            Filter::Condition(c)
                if c.operator.is_index_friendly() && &c.field.entity == entity && &c.field.relation == alias =>
            {
                Some(c.field.field_id.as_str())
            }
            _ => None,
        })
        .min()
        .map(|field| Recommendation::MissingIndex {
            entity: entity.clone(),
            field: field.to_string(),
        })
}

fn first_entity(node: &PhysicalNode) -> Option<&str> {
    node.preorder()
        .into_iter()
        .find_map(|n| n.operator.scanned_entity())
}

impl fmt::Display for ExplainReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== EXPLAIN PLAN ===")?;
        writeln!(f, "Query: {} (correlation {})", self.query_id, self.correlation_id)?;
        writeln!(f, "Costed: {}", if self.costed { "yes" } else { "no (default statistics)" })?;
        writeln!(f, "Total Cost: {:.2}", self.total_cost)?;
        if let Some(elapsed) = self.elapsed_ms {
            writeln!(f, "Elapsed: {} ms", elapsed)?;
        }

        writeln!(f, "Plan:")?;
        for node in &self.nodes {
            write!(f, "  {:indent$}{} {}", "", node.id, node.operator, indent = node.depth * 2)?;
            if !node.detail.is_empty() {
                write!(f, " {}", node.detail)?;
            }
            write!(f, " (rows={:.0}", node.estimated_rows)?;
            if let Some(actual) = node.actual_rows {
                write!(f, " actual={}", actual)?;
            }
            writeln!(f, " cost={:.2})", node.total_cost)?;
        }

        if !self.warnings.is_empty() {
            writeln!(f, "Warnings:")?;
            for warning in &self.warnings {
                writeln!(f, "  - {}", warning)?;
            }
        }
        if !self.recommendations.is_empty() {
            writeln!(f, "Recommendations:")?;
            for recommendation in &self.recommendations {
                writeln!(f, "  - {}", recommendation)?;
            }
        }
        Ok(())
    }
}
