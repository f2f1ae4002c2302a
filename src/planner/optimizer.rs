//! Physical optimizer
//!
//! Walks a logical plan bottom-up and picks one algorithm per node:
//!
//! - scans: `IndexScan` when a conjunct directly above the scan targets an
//!   indexed field with an index-friendly operator and known selectivity
//!   under the threshold; the most selective wins, ties broken
//!   lexicographically by field name. Otherwise `TableScan`.
//! - joins: `MergeJoin` when both inputs are ordered on their join keys,
//!   `NestedLoopJoin` when one input is tiny, `HashJoin` otherwise
//!   (building on the smaller input).
//! - aggregates: `SortAggregate` over input ordered by the group keys,
//!   `HashAggregate` otherwise.
//!
//! An entity without statistics gets the default cardinality, every node
//! reading it is marked uncosted, and those nodes keep the default
//! algorithms (`TableScan`, `HashJoin`, `HashAggregate`).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::deadline::Deadline;
use crate::filter::{Condition, Filter};
use crate::schema::{Cardinality, FieldRef};
use crate::vocab::JoinType;

use super::cost;
use super::errors::PlannerResult;
use super::logical::{JoinSpec, LogicalNode, LogicalPlan, ScanAccess, ScanNode};
use super::physical::{BuildSide, PhysicalNode, PhysicalOperator, PhysicalPlan};
use super::stats::StatisticsView;

const STAGE: &str = "optimize";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// An index is used only below this estimated selectivity
    pub index_selectivity_threshold: f64,
    /// Nested loops are chosen when an input has fewer rows than this
    pub nested_loop_max_rows: u64,
    /// Warn when a hash join would build a table larger than this
    pub hash_build_warning_rows: u64,
    /// Row count assumed for an entity without statistics
    pub default_cardinality: u64,
    /// Selectivity assumed for a predicate without statistics
    pub default_selectivity: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            index_selectivity_threshold: 0.15,
            nested_loop_max_rows: 16,
            hash_build_warning_rows: 1_000_000,
            default_cardinality: 1_000,
            default_selectivity: 0.1,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<(), String> {
        let fraction = |name: &str, value: f64| {
            if value > 0.0 && value <= 1.0 {
                Ok(())
            } else {
                Err(format!("optimizer.{} must be in (0, 1], got {}", name, value))
            }
        };
        fraction("index_selectivity_threshold", self.index_selectivity_threshold)?;
        fraction("default_selectivity", self.default_selectivity)?;
        if self.default_cardinality == 0 {
            return Err("optimizer.default_cardinality must be > 0".into());
        }
        if self.hash_build_warning_rows == 0 {
            return Err("optimizer.hash_build_warning_rows must be > 0".into());
        }
        Ok(())
    }
}

pub struct Optimizer<'a> {
    stats: &'a dyn StatisticsView,
    config: &'a OptimizerConfig,
    deadline: Deadline,
}

impl<'a> Optimizer<'a> {
    pub fn new(stats: &'a dyn StatisticsView, config: &'a OptimizerConfig) -> Self {
        Self {
            stats,
            config,
            deadline: Deadline::none(),
        }
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn optimize(&self, plan: &LogicalPlan) -> PlannerResult<PhysicalPlan> {
        let mut pass = Pass {
            stats: self.stats,
            config: self.config,
            deadline: self.deadline,
            uncosted: BTreeSet::new(),
            warnings: Vec::new(),
        };
        let mut root = pass.node(&plan.root)?;
        let mut next = 0;
        root.number(&mut next);

        Ok(PhysicalPlan {
            query_id: plan.query_id,
            correlation_id: plan.correlation_id.clone(),
            tenant_id: plan.tenant_id.clone(),
            entity: plan.entity.clone(),
            costed: pass.uncosted.is_empty(),
            warnings: pass.warnings,
            root,
        })
    }
}

/// State for one optimization
struct Pass<'a> {
    stats: &'a dyn StatisticsView,
    config: &'a OptimizerConfig,
    deadline: Deadline,
    /// Entities that had no statistics
    uncosted: BTreeSet<String>,
    warnings: Vec<String>,
}

impl<'a> Pass<'a> {
    fn node(&mut self, logical: &LogicalNode) -> PlannerResult<PhysicalNode> {
        self.deadline.check(STAGE)?;
        let node = match logical {
            LogicalNode::Scan(scan) => self.scan(scan, None),
            LogicalNode::Filter { predicate, input } => {
                let child = match input.as_ref() {
                    LogicalNode::Scan(scan) => self.scan(scan, Some(predicate)),
                    other => self.node(other)?,
                };
                self.filter(predicate, child)
            }
            LogicalNode::Project { fields, retained_containers, input } => {
                let child = self.node(input)?;
                let rows = child.estimated_rows;
                PhysicalNode::new(
                    PhysicalOperator::Project {
                        fields: fields.clone(),
                        retained_containers: retained_containers.clone(),
                    },
                    rows,
                    rows * cost::PROJECT_ROW,
                    true,
                    vec![child],
                )
            }
            LogicalNode::Sort { keys, input } => {
                let child = self.node(input)?;
                let rows = child.estimated_rows;
                PhysicalNode::new(
                    PhysicalOperator::Sort { keys: keys.clone() },
                    rows,
                    cost::sort(rows),
                    true,
                    vec![child],
                )
            }
            LogicalNode::Limit { page_size, offset, cursor, input } => {
                let child = self.node(input)?;
                let rows = match page_size {
                    Some(size) => child.estimated_rows.min(f64::from(*size)),
                    None => child.estimated_rows,
                };
                let cost = child.estimated_rows * cost::LIMIT_ROW;
                PhysicalNode::new(
                    PhysicalOperator::Limit {
                        page_size: *page_size,
                        offset: *offset,
                        cursor: cursor.clone(),
                    },
                    rows,
                    cost,
                    true,
                    vec![child],
                )
            }
            LogicalNode::Aggregate { group_by, aggregates, having, input } => {
                let child = self.node(input)?;
                let input_rows = child.estimated_rows;
                let mut rows = if group_by.is_empty() {
                    1.0
                } else {
                    (input_rows * cost::GROUP_RATIO).max(1.0)
                };
                if having.is_some() {
                    rows = (rows * self.config.default_selectivity).max(1.0);
                }

                let keys: Vec<&FieldRef> = group_by.iter().collect();
                let streamable = child.costed && !keys.is_empty() && self.is_ordered_on(&child, &keys);
                let (operator, cost) = if streamable {
                    (
                        PhysicalOperator::SortAggregate {
                            group_by: group_by.clone(),
                            aggregates: aggregates.clone(),
                            having: having.clone(),
                        },
                        input_rows * cost::SORT_AGGREGATE_ROW,
                    )
                } else {
                    (
                        PhysicalOperator::HashAggregate {
                            group_by: group_by.clone(),
                            aggregates: aggregates.clone(),
                            having: having.clone(),
                        },
                        input_rows * cost::HASH_AGGREGATE_ROW,
                    )
                };
                PhysicalNode::new(operator, rows, cost, true, vec![child])
            }
            LogicalNode::Join { join, left, right } => {
                let left = self.node(left)?;
                let right = self.node(right)?;
                self.join(join, left, right)
            }
            LogicalNode::Union { inputs } => {
                let children = inputs
                    .iter()
                    .map(|input| self.node(input))
                    .collect::<PlannerResult<Vec<_>>>()?;
                let rows: f64 = children.iter().map(|c| c.estimated_rows).sum();
                PhysicalNode::new(PhysicalOperator::Union, rows, rows * cost::UNION_ROW, true, children)
            }
            LogicalNode::Distinct { input } => {
                let child = self.node(input)?;
                let input_rows = child.estimated_rows;
                let rows = match child.operator {
                    PhysicalOperator::Union => input_rows * cost::DISTINCT_RATIO,
                    _ => input_rows,
                };
                PhysicalNode::new(
                    PhysicalOperator::Distinct,
                    rows,
                    input_rows * cost::DISTINCT_ROW,
                    true,
                    vec![child],
                )
            }
        };
        Ok(node)
    }

    /// Row count and whether it came from statistics
    fn cardinality(&mut self, entity: &str) -> (f64, bool) {
        match self.stats.cardinality(entity) {
            Some(rows) => (rows as f64, true),
            None => {
                if self.uncosted.insert(entity.to_string()) {
                    self.warnings.push(format!(
                        "no statistics for entity '{}'; assuming {} rows",
                        entity, self.config.default_cardinality
                    ));
                }
                (self.config.default_cardinality as f64, false)
            }
        }
    }

    fn scan(&mut self, scan: &ScanNode, filter: Option<&Filter<FieldRef>>) -> PhysicalNode {
        let (rows, costed) = self.cardinality(&scan.entity);
        match &scan.access {
            ScanAccess::Table => {
                let index = filter
                    .filter(|_| costed)
                    .and_then(|filter| self.pick_index(scan, filter));
                match index {
                    Some((predicate, selectivity)) => {
                        let matched = rows * selectivity;
                        PhysicalNode::new(
                            PhysicalOperator::IndexScan {
                                entity: scan.entity.clone(),
                                alias: scan.alias.clone(),
                                columns: scan.columns.clone(),
                                predicate,
                            },
                            matched,
                            cost::index_scan(matched),
                            costed,
                            Vec::new(),
                        )
                    }
                    None => PhysicalNode::new(
                        PhysicalOperator::TableScan {
                            entity: scan.entity.clone(),
                            alias: scan.alias.clone(),
                            columns: scan.columns.clone(),
                        },
                        rows,
                        rows * cost::SEQ_SCAN_ROW,
                        costed,
                        Vec::new(),
                    ),
                }
            }
            ScanAccess::FullText { query, fields, boost, min_score } => PhysicalNode::new(
                PhysicalOperator::FullTextScan {
                    entity: scan.entity.clone(),
                    columns: scan.columns.clone(),
                    query: query.clone(),
                    fields: fields.clone(),
                    boost: boost.clone(),
                    min_score: *min_score,
                },
                rows * self.config.default_selectivity,
                rows * cost::FULL_TEXT_ROW,
                costed,
                Vec::new(),
            ),
            ScanAccess::Vector { field, embedding, query, min_score } => PhysicalNode::new(
                PhysicalOperator::VectorScan {
                    entity: scan.entity.clone(),
                    columns: scan.columns.clone(),
                    field: field.clone(),
                    embedding: embedding.clone(),
                    query: query.clone(),
                    min_score: *min_score,
                },
                rows * self.config.default_selectivity,
                rows * cost::VECTOR_ROW,
                costed,
                Vec::new(),
            ),
        }
    }

    /// Most selective indexable conjunct for this scan, if any beats the threshold
    fn pick_index(&self, scan: &ScanNode, filter: &Filter<FieldRef>) -> Option<(Condition<FieldRef>, f64)> {
        let conjuncts: Vec<&Filter<FieldRef>> = match filter {
            Filter::And(children) => children.iter().collect(),
            other => vec![other],
        };
        let mut candidates: Vec<(&Condition<FieldRef>, f64)> = conjuncts
            .into_iter()
            .filter_map(|conjunct| match conjunct {
                Filter::Condition(condition) => Some(condition),
                _ => None,
            })
            .filter(|c| {
                c.operator.is_index_friendly()
                    && c.field.entity == scan.entity
                    && c.field.relation == scan.alias
            })
            .filter(|c| {
                self.stats
                    .has_index(&c.field.entity, c.field.field_id.as_str())
                    .unwrap_or(c.field.indexed)
            })
            .filter_map(|c| {
                let selectivity = self.stats.selectivity(
                    &c.field.entity,
                    c.field.field_id.as_str(),
                    c.operator,
                    c.value.as_ref(),
                )?;
                (selectivity < self.config.index_selectivity_threshold).then_some((c, selectivity))
            })
            .collect();
        candidates.sort_by(|a, b| {
            a.1.total_cmp(&b.1)
                .then_with(|| a.0.field.field_name.cmp(&b.0.field.field_name))
        });
        candidates
            .into_iter()
            .next()
            .map(|(condition, selectivity)| (condition.clone(), selectivity))
    }

    fn filter(&mut self, predicate: &Filter<FieldRef>, child: PhysicalNode) -> PhysicalNode {
        let served = match &child.operator {
            PhysicalOperator::IndexScan { predicate, .. } => Some(predicate),
            _ => None,
        };
        let conjuncts: Vec<&Filter<FieldRef>> = match predicate {
            Filter::And(children) => children.iter().collect(),
            other => vec![other],
        };
        let selectivity: f64 = conjuncts
            .into_iter()
            .filter(|conjunct| match (conjunct, served) {
                (Filter::Condition(condition), Some(served)) => condition != served,
                _ => true,
            })
            .map(|conjunct| self.selectivity(conjunct))
            .product();
        let input_rows = child.estimated_rows;
        PhysicalNode::new(
            PhysicalOperator::Filter {
                predicate: predicate.clone(),
            },
            input_rows * selectivity,
            input_rows * cost::FILTER_ROW,
            true,
            vec![child],
        )
    }

    fn selectivity(&self, filter: &Filter<FieldRef>) -> f64 {
        match filter {
            Filter::Condition(c) => self
                .stats
                .selectivity(&c.field.entity, c.field.field_id.as_str(), c.operator, c.value.as_ref())
                .unwrap_or(self.config.default_selectivity),
            Filter::Not(inner) => 1.0 - self.selectivity(inner),
            Filter::And(children) => children.iter().map(|c| self.selectivity(c)).product(),
            Filter::Or(children) => {
                1.0 - children
                    .iter()
                    .map(|c| 1.0 - self.selectivity(c))
                    .product::<f64>()
            }
        }
    }

    fn join(&mut self, join: &JoinSpec, left: PhysicalNode, right: PhysicalNode) -> PhysicalNode {
        let (left_rows, right_rows) = (left.estimated_rows, right.estimated_rows);
        let rows = match (join.cardinality, join.join_type) {
            (Cardinality::One, JoinType::Inner | JoinType::Left) => left_rows,
            (Cardinality::One, JoinType::Right) => right_rows,
            _ => left_rows.max(right_rows),
        };

        let (operator, cost) = if !(left.costed && right.costed) {
            (
                PhysicalOperator::HashJoin {
                    join: join.clone(),
                    build_side: BuildSide::Right,
                },
                cost::hash_join(right_rows, left_rows),
            )
        } else if self.is_ordered_on(&left, &[&join.local_field])
            && self.is_ordered_on(&right, &[&join.foreign_field])
        {
            (
                PhysicalOperator::MergeJoin { join: join.clone() },
                cost::merge_join(left_rows, right_rows),
            )
        } else if left_rows.min(right_rows) < self.config.nested_loop_max_rows as f64 {
            (
                PhysicalOperator::NestedLoopJoin { join: join.clone() },
                cost::nested_loop_join(left_rows, right_rows),
            )
        } else {
            let (build_side, build_rows, probe_rows) = if left_rows < right_rows {
                (BuildSide::Left, left_rows, right_rows)
            } else {
                (BuildSide::Right, right_rows, left_rows)
            };
            if build_rows > self.config.hash_build_warning_rows as f64 {
                self.warnings.push(format!(
                    "hash join on '{}' builds a table of ~{:.0} rows",
                    join.alias, build_rows
                ));
            }
            (
                PhysicalOperator::HashJoin {
                    join: join.clone(),
                    build_side,
                },
                cost::hash_join(build_rows, probe_rows),
            )
        };
        PhysicalNode::new(operator, rows, cost, true, vec![left, right])
    }

    /// Whether `node` emits rows ordered by `fields`
    fn is_ordered_on(&self, node: &PhysicalNode, fields: &[&FieldRef]) -> bool {
        match &node.operator {
            PhysicalOperator::TableScan { entity, alias, .. } => {
                let owned = fields
                    .iter()
                    .all(|f| &f.entity == entity && &f.relation == alias);
                let ids: Vec<&str> = fields.iter().map(|f| f.field_id.as_str()).collect();
                owned && self.stats.is_sorted(entity, &ids)
            }
            PhysicalOperator::IndexScan { predicate, .. } => {
                fields.len() == 1 && fields[0].field_name == predicate.field.field_name
            }
            PhysicalOperator::Sort { keys } => {
                keys.len() >= fields.len()
                    && keys
                        .iter()
                        .zip(fields)
                        .all(|(key, field)| key.target.name() == field.field_name)
            }
            PhysicalOperator::MergeJoin { join } => {
                fields.len() == 1
                    && (fields[0].field_name == join.local_field.field_name
                        || fields[0].field_name == join.foreign_field.field_name)
            }
            PhysicalOperator::Filter { .. }
            | PhysicalOperator::Project { .. }
            | PhysicalOperator::Limit { .. } => node
                .children
                .first()
                .map_or(false, |child| self.is_ordered_on(child, fields)),
            _ => false,
        }
    }
}
