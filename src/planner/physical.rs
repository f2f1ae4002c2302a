//! Physical plans
//!
//! Each physical node implements exactly one logical node with a concrete
//! algorithm and carries the optimizer's estimates. Node ids are assigned in
//! preorder, so the root is always `#0`.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::cqm::{CanonicalAggregate, CanonicalSort, OutputRef};
use crate::filter::{Condition, Filter};
use crate::schema::FieldRef;

use super::logical::{describe_sort_keys, JoinSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which join input is loaded into the hash table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildSide {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "operator", rename_all = "snake_case")]
pub enum PhysicalOperator {
    TableScan {
        entity: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
        columns: Vec<FieldRef>,
    },
    IndexScan {
        entity: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
        columns: Vec<FieldRef>,
        /// Leaf served by the index; the parent filter still re-checks it
        predicate: Condition<FieldRef>,
    },
    FullTextScan {
        entity: String,
        columns: Vec<FieldRef>,
        query: String,
        fields: Vec<FieldRef>,
        #[serde(skip_serializing_if = "BTreeMap::is_empty")]
        boost: BTreeMap<String, f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        min_score: Option<f64>,
    },
    VectorScan {
        entity: String,
        columns: Vec<FieldRef>,
        field: FieldRef,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        embedding: Vec<f32>,
        #[serde(skip_serializing_if = "String::is_empty")]
        query: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        min_score: Option<f64>,
    },
    Filter {
        predicate: Filter<FieldRef>,
    },
    Project {
        fields: Vec<FieldRef>,
        retained_containers: Vec<String>,
    },
    Sort {
        keys: Vec<CanonicalSort>,
    },
    Limit {
        #[serde(skip_serializing_if = "Option::is_none")]
        page_size: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        offset: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        cursor: Option<String>,
    },
    HashAggregate {
        group_by: Vec<FieldRef>,
        aggregates: Vec<CanonicalAggregate>,
        #[serde(skip_serializing_if = "Option::is_none")]
        having: Option<Filter<OutputRef>>,
    },
    /// Streams groups from input already ordered by the group keys
    SortAggregate {
        group_by: Vec<FieldRef>,
        aggregates: Vec<CanonicalAggregate>,
        #[serde(skip_serializing_if = "Option::is_none")]
        having: Option<Filter<OutputRef>>,
    },
    HashJoin {
        join: JoinSpec,
        build_side: BuildSide,
    },
    MergeJoin {
        join: JoinSpec,
    },
    NestedLoopJoin {
        join: JoinSpec,
    },
    Union,
    Distinct,
}

impl PhysicalOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhysicalOperator::TableScan { .. } => "TableScan",
            PhysicalOperator::IndexScan { .. } => "IndexScan",
            PhysicalOperator::FullTextScan { .. } => "FullTextScan",
            PhysicalOperator::VectorScan { .. } => "VectorScan",
            PhysicalOperator::Filter { .. } => "Filter",
            PhysicalOperator::Project { .. } => "Project",
            PhysicalOperator::Sort { .. } => "Sort",
            PhysicalOperator::Limit { .. } => "Limit",
            PhysicalOperator::HashAggregate { .. } => "HashAggregate",
            PhysicalOperator::SortAggregate { .. } => "SortAggregate",
            PhysicalOperator::HashJoin { .. } => "HashJoin",
            PhysicalOperator::MergeJoin { .. } => "MergeJoin",
            PhysicalOperator::NestedLoopJoin { .. } => "NestedLoopJoin",
            PhysicalOperator::Union => "Union",
            PhysicalOperator::Distinct => "Distinct",
        }
    }

    /// Entity read directly by a scan operator
    pub fn scanned_entity(&self) -> Option<&str> {
        match self {
            PhysicalOperator::TableScan { entity, .. }
            | PhysicalOperator::IndexScan { entity, .. }
            | PhysicalOperator::FullTextScan { entity, .. }
            | PhysicalOperator::VectorScan { entity, .. } => Some(entity),
            _ => None,
        }
    }

    /// Operator arguments, without the operator name
    pub fn detail(&self) -> String {
        let names = |fields: &[FieldRef]| {
            fields
                .iter()
                .map(|f| f.field_name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let target = |entity: &str, alias: &Option<String>| match alias {
            Some(alias) => format!("{} AS {}", entity, alias),
            None => entity.to_string(),
        };
        match self {
            PhysicalOperator::TableScan { entity, alias, columns } => {
                format!("{} [{}]", target(entity, alias), names(columns))
            }
            PhysicalOperator::IndexScan { entity, alias, columns, predicate } => {
                format!("{} USING {} [{}]", target(entity, alias), predicate, names(columns))
            }
            PhysicalOperator::FullTextScan { entity, query, fields, .. } => {
                format!("{} MATCH '{}' IN [{}]", entity, query, names(fields))
            }
            PhysicalOperator::VectorScan { entity, field, .. } => {
                format!("{} NEAREST ON {}", entity, field)
            }
            PhysicalOperator::Filter { predicate } => predicate.to_string(),
            PhysicalOperator::Project { fields, .. } => format!("[{}]", names(fields)),
            PhysicalOperator::Sort { keys } => describe_sort_keys(keys),
            PhysicalOperator::Limit { page_size, offset, cursor } => {
                let mut text = page_size.map_or_else(|| "ALL".to_string(), |n| n.to_string());
                if let Some(offset) = offset {
                    text.push_str(&format!(" OFFSET {}", offset));
                }
                if cursor.is_some() {
                    text.push_str(" AFTER CURSOR");
                }
                text
            }
            PhysicalOperator::HashAggregate { group_by, aggregates, having }
            | PhysicalOperator::SortAggregate { group_by, aggregates, having } => {
                let mut text = format!(
                    "GROUP BY [{}] COMPUTE [{}]",
                    names(group_by),
                    aggregates.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
                );
                if let Some(having) = having {
                    text.push_str(&format!(" HAVING {}", having));
                }
                text
            }
            PhysicalOperator::HashJoin { join, build_side } => format!(
                "{} {} AS {} ON {} = {} BUILD {}",
                join.join_type,
                join.entity,
                join.alias,
                join.local_field,
                join.foreign_field,
                match build_side {
                    BuildSide::Left => "LEFT",
                    BuildSide::Right => "RIGHT",
                }
            ),
            PhysicalOperator::MergeJoin { join } | PhysicalOperator::NestedLoopJoin { join } => format!(
                "{} {} AS {} ON {} = {}",
                join.join_type, join.entity, join.alias, join.local_field, join.foreign_field
            ),
            PhysicalOperator::Union | PhysicalOperator::Distinct => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhysicalNode {
    pub id: NodeId,
    pub operator: PhysicalOperator,
    pub estimated_rows: f64,
    /// Cost of this node alone
    pub cost: f64,
    /// Cost of this node and its subtree
    pub total_cost: f64,
    /// False when any estimate beneath relied on default statistics
    pub costed: bool,
    pub children: Vec<PhysicalNode>,
}

impl PhysicalNode {
    pub fn new(operator: PhysicalOperator, estimated_rows: f64, cost: f64, costed: bool, children: Vec<PhysicalNode>) -> Self {
        let total_cost = cost + children.iter().map(|c| c.total_cost).sum::<f64>();
        let costed = costed && children.iter().all(|c| c.costed);
        Self {
            id: NodeId(0),
            operator,
            estimated_rows,
            cost,
            total_cost,
            costed,
            children,
        }
    }

    /// Assigns preorder ids starting at `next`
    pub(crate) fn number(&mut self, next: &mut u32) {
        self.id = NodeId(*next);
        *next += 1;
        for child in &mut self.children {
            child.number(next);
        }
    }

    pub fn preorder(&self) -> Vec<&PhysicalNode> {
        let mut nodes = vec![self];
        for child in &self.children {
            nodes.extend(child.preorder());
        }
        nodes
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let detail = self.operator.detail();
        write!(f, "{:indent$}{} {}", "", self.id, self.operator.as_str(), indent = depth * 2)?;
        if !detail.is_empty() {
            write!(f, " {}", detail)?;
        }
        writeln!(f, " (rows={:.0} cost={:.2})", self.estimated_rows, self.total_cost)?;
        for child in &self.children {
            child.write_tree(f, depth + 1)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhysicalPlan {
    pub query_id: Uuid,
    pub correlation_id: String,
    pub tenant_id: String,
    pub entity: String,
    pub root: PhysicalNode,
    /// False when some entity had no statistics
    pub costed: bool,
    pub warnings: Vec<String>,
}

impl PhysicalPlan {
    pub fn total_cost(&self) -> f64 {
        self.root.total_cost
    }

    pub fn nodes(&self) -> Vec<&PhysicalNode> {
        self.root.preorder()
    }

    pub fn node(&self, id: NodeId) -> Option<&PhysicalNode> {
        self.nodes().into_iter().find(|n| n.id == id)
    }
}

impl fmt::Display for PhysicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.root.write_tree(f, 0)
    }
}
