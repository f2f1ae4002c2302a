//! Logical plans
//!
//! A logical plan is a tree of relational operators over a canonical query.
//! Construction is deterministic and follows one layout:
//!
//! ```text
//! Limit
//!   Sort            (aggregate queries: over outputs)
//!     Aggregate
//!       Project
//!         Filter    (conjuncts needing the last join)
//!           Join
//!             Filter  (conjuncts on the base entity)
//!               Scan
//!             Scan
//! ```
//!
//! Non-aggregate queries sort beneath the projection so sort keys need not
//! be projected. Each scan reads only the columns the query touches on its
//! entity. Hybrid search scans the base entity twice and merges the results
//! through `Distinct(Union(..))`.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::cqm::{
    CanonicalAggregate, CanonicalQuery, CanonicalRelation, CanonicalSearch, CanonicalSort,
    OutputRef,
};
use crate::filter::Filter;
use crate::schema::{Cardinality, FieldRef};
use crate::vocab::{JoinType, NullOrdering, SearchMode, SortDirection};

use super::errors::{PlannerError, PlannerResult};

const STAGE: &str = "logical";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogicalPlan {
    pub query_id: Uuid,
    pub correlation_id: String,
    pub tenant_id: String,
    pub entity: String,
    pub root: LogicalNode,
}

/// How a scan reaches its rows
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanAccess {
    Table,
    FullText {
        query: String,
        fields: Vec<FieldRef>,
        #[serde(skip_serializing_if = "BTreeMap::is_empty")]
        boost: BTreeMap<String, f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        min_score: Option<f64>,
    },
    Vector {
        field: FieldRef,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        embedding: Vec<f32>,
        /// Text to embed when no embedding was supplied
        #[serde(skip_serializing_if = "String::is_empty")]
        query: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        min_score: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanNode {
    pub entity: String,
    /// Relation alias; `None` for the base entity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Pruned column set, ordered by field name
    pub columns: Vec<FieldRef>,
    pub access: ScanAccess,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinSpec {
    pub alias: String,
    pub entity: String,
    pub join_type: JoinType,
    /// Join type was decided by the planner rather than declared
    pub inferred: bool,
    pub local_field: FieldRef,
    pub foreign_field: FieldRef,
    pub cardinality: Cardinality,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum LogicalNode {
    Scan(ScanNode),
    Filter {
        predicate: Filter<FieldRef>,
        input: Box<LogicalNode>,
    },
    Project {
        fields: Vec<FieldRef>,
        retained_containers: Vec<String>,
        input: Box<LogicalNode>,
    },
    Sort {
        keys: Vec<CanonicalSort>,
        input: Box<LogicalNode>,
    },
    Limit {
        #[serde(skip_serializing_if = "Option::is_none")]
        page_size: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        offset: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        cursor: Option<String>,
        input: Box<LogicalNode>,
    },
    Aggregate {
        group_by: Vec<FieldRef>,
        aggregates: Vec<CanonicalAggregate>,
        #[serde(skip_serializing_if = "Option::is_none")]
        having: Option<Filter<OutputRef>>,
        input: Box<LogicalNode>,
    },
    Join {
        join: JoinSpec,
        left: Box<LogicalNode>,
        right: Box<LogicalNode>,
    },
    Union {
        inputs: Vec<LogicalNode>,
    },
    Distinct {
        input: Box<LogicalNode>,
    },
}

impl LogicalNode {
    pub fn name(&self) -> &'static str {
        match self {
            LogicalNode::Scan(_) => "Scan",
            LogicalNode::Filter { .. } => "Filter",
            LogicalNode::Project { .. } => "Project",
            LogicalNode::Sort { .. } => "Sort",
            LogicalNode::Limit { .. } => "Limit",
            LogicalNode::Aggregate { .. } => "Aggregate",
            LogicalNode::Join { .. } => "Join",
            LogicalNode::Union { .. } => "Union",
            LogicalNode::Distinct { .. } => "Distinct",
        }
    }

    pub fn children(&self) -> Vec<&LogicalNode> {
        match self {
            LogicalNode::Scan(_) => Vec::new(),
            LogicalNode::Filter { input, .. }
            | LogicalNode::Project { input, .. }
            | LogicalNode::Sort { input, .. }
            | LogicalNode::Limit { input, .. }
            | LogicalNode::Aggregate { input, .. }
            | LogicalNode::Distinct { input } => vec![input.as_ref()],
            LogicalNode::Join { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            LogicalNode::Union { inputs } => inputs.iter().collect(),
        }
    }

    /// All nodes in preorder
    pub fn preorder(&self) -> Vec<&LogicalNode> {
        let mut nodes = vec![self];
        for child in self.children() {
            nodes.extend(child.preorder());
        }
        nodes
    }

    /// One-line summary without the children
    pub fn describe(&self) -> String {
        match self {
            LogicalNode::Scan(scan) => describe_scan(scan),
            LogicalNode::Filter { predicate, .. } => format!("Filter {}", predicate),
            LogicalNode::Project { fields, .. } => format!("Project [{}]", join_names(fields)),
            LogicalNode::Sort { keys, .. } => format!("Sort {}", describe_sort_keys(keys)),
            LogicalNode::Limit { page_size, offset, cursor, .. } => {
                let mut text = match page_size {
                    Some(size) => format!("Limit {}", size),
                    None => "Limit ALL".to_string(),
                };
                if let Some(offset) = offset {
                    text.push_str(&format!(" OFFSET {}", offset));
                }
                if cursor.is_some() {
                    text.push_str(" AFTER CURSOR");
                }
                text
            }
            LogicalNode::Aggregate { group_by, aggregates, having, .. } => {
                let mut text = format!(
                    "Aggregate GROUP BY [{}] COMPUTE [{}]",
                    join_names(group_by),
                    aggregates.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
                );
                if let Some(having) = having {
                    text.push_str(&format!(" HAVING {}", having));
                }
                text
            }
            LogicalNode::Join { join, .. } => format!(
                "Join {} {} AS {} ON {} = {}{}",
                join.join_type,
                join.entity,
                join.alias,
                join.local_field,
                join.foreign_field,
                if join.inferred { " (inferred)" } else { "" }
            ),
            LogicalNode::Union { inputs } => format!("Union ({} inputs)", inputs.len()),
            LogicalNode::Distinct { .. } => "Distinct".to_string(),
        }
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(f, "{:indent$}{}", "", self.describe(), indent = depth * 2)?;
        for child in self.children() {
            child.write_tree(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for LogicalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, 0)
    }
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}

fn join_names(fields: &[FieldRef]) -> String {
    fields
        .iter()
        .map(|f| f.field_name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_scan(scan: &ScanNode) -> String {
    let mut text = format!("Scan {}", scan.entity);
    if let Some(alias) = &scan.alias {
        text.push_str(&format!(" AS {}", alias));
    }
    match &scan.access {
        ScanAccess::Table => {}
        ScanAccess::FullText { query, fields, .. } => {
            text.push_str(&format!(" MATCH '{}' IN [{}]", query, join_names(fields)));
        }
        ScanAccess::Vector { field, .. } => {
            text.push_str(&format!(" NEAREST ON {}", field));
        }
    }
    text.push_str(&format!(" [{}]", join_names(&scan.columns)));
    text
}

pub(crate) fn describe_sort_keys(keys: &[CanonicalSort]) -> String {
    keys.iter()
        .map(|key| {
            let direction = match key.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            let nulls = match key.nulls {
                NullOrdering::Default => "",
                NullOrdering::First => " NULLS FIRST",
                NullOrdering::Last => " NULLS LAST",
            };
            format!("{} {}{}", key.target.name(), direction, nulls)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl LogicalPlan {
    /// Builds the logical plan for a canonical query
    pub fn from_canonical(query: &CanonicalQuery) -> PlannerResult<LogicalPlan> {
        let relations = &query.relations;
        for (i, relation) in relations.iter().enumerate() {
            if let Some(parent) = &relation.parent {
                if !relations[..i].iter().any(|r| &r.alias == parent) {
                    return Err(PlannerError::invalid_plan(
                        STAGE,
                        format!("relation '{}' precedes its parent '{}'", relation.alias, parent),
                    ));
                }
            }
        }

        let conjuncts = query
            .filter
            .clone()
            .map(Filter::into_conjuncts)
            .unwrap_or_default();
        let join_types: Vec<(JoinType, bool)> = relations
            .iter()
            .map(|relation| match relation.join_type {
                Some(declared) => (declared, false),
                None => (infer_join_type(relation, &conjuncts), true),
            })
            .collect();

        // Level 0 sits on the base input, level i+1 above the i-th join.
        // Nothing moves below a RIGHT or FULL join.
        let barrier = relations
            .iter()
            .zip(&join_types)
            .rposition(|(_, (join_type, _))| matches!(join_type, JoinType::Right | JoinType::Full))
            .map_or(0, |i| i + 1);
        let mut levels: Vec<Vec<Filter<FieldRef>>> = vec![Vec::new(); relations.len() + 1];
        for conjunct in conjuncts {
            let mut level = barrier;
            for field in conjunct.fields() {
                let Some(alias) = field.relation.as_deref() else { continue };
                let position = relations.iter().position(|r| r.alias == alias).ok_or_else(|| {
                    PlannerError::invalid_plan(
                        STAGE,
                        format!("field '{}' uses undeclared relation '{}'", field, alias),
                    )
                })?;
                level = level.max(position + 1);
            }
            levels[level].push(conjunct);
        }

        let mut columns = scan_columns(query);
        let mut levels = levels.into_iter();
        let base_columns = columns.remove(&None).unwrap_or_default();
        let mut node = with_filter(base_input(query, base_columns)?, levels.next().unwrap_or_default());

        for ((relation, (join_type, inferred)), filters) in relations.iter().zip(join_types).zip(levels) {
            let right = LogicalNode::Scan(ScanNode {
                entity: relation.entity.clone(),
                alias: Some(relation.alias.clone()),
                columns: columns.remove(&Some(relation.alias.clone())).unwrap_or_default(),
                access: ScanAccess::Table,
            });
            let join = JoinSpec {
                alias: relation.alias.clone(),
                entity: relation.entity.clone(),
                join_type,
                inferred,
                local_field: relation.local_field.clone(),
                foreign_field: relation.foreign_field.clone(),
                cardinality: relation.cardinality,
            };
            node = LogicalNode::Join {
                join,
                left: Box::new(node),
                right: Box::new(right),
            };
            node = with_filter(node, filters);
        }

        let project = |input: LogicalNode| LogicalNode::Project {
            fields: query.projection.clone(),
            retained_containers: query.retained_containers.clone(),
            input: Box::new(input),
        };
        let sort = |input: LogicalNode| {
            if query.sorts.is_empty() {
                input
            } else {
                LogicalNode::Sort {
                    keys: query.sorts.clone(),
                    input: Box::new(input),
                }
            }
        };

        node = match &query.aggregation {
            Some(aggregation) => sort(LogicalNode::Aggregate {
                group_by: aggregation.group_by.clone(),
                aggregates: aggregation.aggregates.clone(),
                having: aggregation.having.clone(),
                input: Box::new(project(node)),
            }),
            None => project(sort(node)),
        };

        let pagination = query.pagination.as_ref();
        node = LogicalNode::Limit {
            page_size: pagination.map(|p| p.page_size),
            offset: pagination.and_then(|p| p.offset),
            cursor: pagination.and_then(|p| p.cursor.clone()),
            input: Box::new(node),
        };

        Ok(LogicalPlan {
            query_id: query.query_id,
            correlation_id: query.correlation_id.clone(),
            tenant_id: query.tenant_id.clone(),
            entity: query.entity.clone(),
            root: node,
        })
    }
}

fn with_filter(node: LogicalNode, conjuncts: Vec<Filter<FieldRef>>) -> LogicalNode {
    match Filter::all(conjuncts) {
        Some(predicate) => LogicalNode::Filter {
            predicate,
            input: Box::new(node),
        },
        None => node,
    }
}

fn base_input(query: &CanonicalQuery, columns: Vec<FieldRef>) -> PlannerResult<LogicalNode> {
    let scan = |access: ScanAccess| {
        LogicalNode::Scan(ScanNode {
            entity: query.entity.clone(),
            alias: None,
            columns: columns.clone(),
            access,
        })
    };
    let Some(search) = &query.search else {
        return Ok(scan(ScanAccess::Table));
    };
    Ok(match search.mode {
        SearchMode::FullText => scan(full_text_access(search)),
        SearchMode::Semantic => scan(vector_access(search)?),
        SearchMode::Hybrid => LogicalNode::Distinct {
            input: Box::new(LogicalNode::Union {
                inputs: vec![scan(full_text_access(search)), scan(vector_access(search)?)],
            }),
        },
    })
}

fn full_text_access(search: &CanonicalSearch) -> ScanAccess {
    ScanAccess::FullText {
        query: search.query.clone(),
        fields: search.fields.clone(),
        boost: search.boost.clone(),
        min_score: search.min_score,
    }
}

fn vector_access(search: &CanonicalSearch) -> PlannerResult<ScanAccess> {
    let field = search
        .vector_field
        .clone()
        .ok_or_else(|| PlannerError::invalid_plan(STAGE, "vector search without a vector field"))?;
    Ok(ScanAccess::Vector {
        field,
        embedding: search.embedding.clone(),
        query: if search.embedding.is_empty() {
            search.query.clone()
        } else {
            String::new()
        },
        min_score: search.min_score,
    })
}

/// Columns each scan must produce, keyed by relation alias
fn scan_columns(query: &CanonicalQuery) -> BTreeMap<Option<String>, Vec<FieldRef>> {
    let mut columns: BTreeMap<Option<String>, BTreeMap<String, FieldRef>> = BTreeMap::new();
    let join_keys = query
        .relations
        .iter()
        .flat_map(|r| [&r.local_field, &r.foreign_field]);
    for field in query.referenced_fields().into_iter().chain(join_keys) {
        columns
            .entry(field.relation.clone())
            .or_default()
            .entry(field.field_name.clone())
            .or_insert_with(|| field.clone());
    }
    columns
        .into_iter()
        .map(|(owner, fields)| (owner, fields.into_values().collect()))
        .collect()
}

/// INNER when some top-level conjunct is false for rows lacking the relation
fn infer_join_type(relation: &CanonicalRelation, conjuncts: &[Filter<FieldRef>]) -> JoinType {
    if conjuncts.iter().any(|c| rejects_missing(c, relation)) {
        JoinType::Inner
    } else {
        JoinType::Left
    }
}

fn rejects_missing(filter: &Filter<FieldRef>, relation: &CanonicalRelation) -> bool {
    let covered = |field: &FieldRef| field.relation.as_deref().map_or(false, |r| relation.covers(r));
    match filter {
        Filter::Condition(c) => !c.operator.accepts_missing() && covered(&c.field),
        Filter::Not(inner) => match inner.as_ref() {
            Filter::Condition(c) => c.operator.accepts_missing() && covered(&c.field),
            _ => false,
        },
        Filter::And(children) => children.iter().any(|c| rejects_missing(c, relation)),
        Filter::Or(children) => {
            !children.is_empty() && children.iter().all(|c| rejects_missing(c, relation))
        }
    }
}
