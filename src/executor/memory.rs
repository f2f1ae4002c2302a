//! Reference executor over in-memory rows
//!
//! Evaluates a physical plan bottom-up against tables held in memory, one
//! set per tenant. Every join algorithm produces the same rows, so the
//! result depends only on the logical shape of the plan. Used by tests to
//! check that planning never changes a query's answer, and by the CLI to
//! collect runtime row counts for `explain`.
//!
//! Rows are flat maps keyed by field path. A scan over a relation alias
//! prefixes each stored key with the alias (`tier` becomes `customer.tier`).

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Instant;

use crate::cqm::{CanonicalAggregate, CanonicalSort};
use crate::filter::{evaluate, Filter, Row};
use crate::planner::{ExecutionStats, JoinSpec, PhysicalNode, PhysicalOperator, PhysicalPlan};
use crate::schema::FieldRef;
use crate::value::{FieldType, Value};
use crate::vocab::{AggregateFunction, JoinType, NullOrdering, SortDirection};

use super::errors::ExecutorFailure;
use super::executor::{ExecutionOutcome, Executor};

#[derive(Debug, Clone, Default)]
pub struct InMemoryExecutor {
    /// tenant -> entity -> rows
    tables: BTreeMap<String, BTreeMap<String, Vec<Row>>>,
}

impl InMemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, tenant_id: &str, entity: &str, rows: Vec<Row>) -> Self {
        self.tables
            .entry(tenant_id.to_string())
            .or_default()
            .insert(entity.to_string(), rows);
        self
    }

    /// Loads `{"tenant": {"entity": [{"field": value, ...}]}}`
    pub fn from_json(json: serde_json::Value) -> Result<Self, String> {
        let serde_json::Value::Object(tenants) = json else {
            return Err("expected an object of tenants".into());
        };
        let mut executor = Self::new();
        for (tenant, entities) in tenants {
            let serde_json::Value::Object(entities) = entities else {
                return Err(format!("tenant '{}': expected an object of entities", tenant));
            };
            for (entity, rows) in entities {
                let serde_json::Value::Array(rows) = rows else {
                    return Err(format!("{}.{}: expected an array of rows", tenant, entity));
                };
                let mut parsed = Vec::with_capacity(rows.len());
                for row in rows {
                    parsed.push(row_from_json(row).map_err(|e| format!("{}.{}: {}", tenant, entity, e))?);
                }
                executor = executor.with_table(&tenant, &entity, parsed);
            }
        }
        Ok(executor)
    }
}

fn row_from_json(json: serde_json::Value) -> Result<Row, String> {
    let serde_json::Value::Object(fields) = json else {
        return Err("row is not an object".into());
    };
    let mut row = Row::new();
    for (name, value) in fields {
        if value.is_null() {
            continue;
        }
        row.insert(name, Value::from_json(value)?);
    }
    Ok(row)
}

impl Executor for InMemoryExecutor {
    fn execute(&self, plan: &PhysicalPlan, tenant_id: &str) -> Result<ExecutionOutcome, ExecutorFailure> {
        let started = Instant::now();
        let empty = BTreeMap::new();
        let mut run = Run {
            tables: self.tables.get(tenant_id).unwrap_or(&empty),
            stats: ExecutionStats::new(),
        };
        let rows = run.node(&plan.root)?;
        let mut stats = run.stats;
        stats.elapsed_ms = Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));
        Ok(ExecutionOutcome::new(rows, Some(stats)))
    }
}

struct Run<'a> {
    tables: &'a BTreeMap<String, Vec<Row>>,
    stats: ExecutionStats,
}

impl Run<'_> {
    fn node(&mut self, node: &PhysicalNode) -> Result<Vec<Row>, ExecutorFailure> {
        let rows = self.evaluate(node).map_err(|failure| failure.at(node.id))?;
        self.stats.node_rows.insert(node.id.0, rows.len() as u64);
        Ok(rows)
    }

    fn input(&mut self, node: &PhysicalNode, index: usize) -> Result<Vec<Row>, ExecutorFailure> {
        match node.children.get(index) {
            Some(child) => self.node(child),
            None => Err(ExecutorFailure::execution_failed(format!(
                "{} is missing input {}",
                node.operator.as_str(),
                index
            ))),
        }
    }

    fn evaluate(&mut self, node: &PhysicalNode) -> Result<Vec<Row>, ExecutorFailure> {
        match &node.operator {
            PhysicalOperator::TableScan { entity, alias, columns } => self.scan(entity, alias.as_deref(), columns),
            PhysicalOperator::IndexScan {
                entity,
                alias,
                columns,
                predicate,
            } => {
                let predicate = Filter::Condition(predicate.clone());
                let rows = self.scan(entity, alias.as_deref(), columns)?;
                Ok(rows.into_iter().filter(|row| evaluate(&predicate, row)).collect())
            }
            PhysicalOperator::FullTextScan { .. } | PhysicalOperator::VectorScan { .. } => {
                Err(ExecutorFailure::unsupported(node.operator.as_str()))
            }
            PhysicalOperator::Filter { predicate } => {
                let rows = self.input(node, 0)?;
                Ok(rows.into_iter().filter(|row| evaluate(predicate, row)).collect())
            }
            PhysicalOperator::Project { fields, .. } => {
                let rows = self.input(node, 0)?;
                Ok(rows.into_iter().map(|row| project(row, fields)).collect())
            }
            PhysicalOperator::Sort { keys } => {
                let mut rows = self.input(node, 0)?;
                rows.sort_by(|a, b| compare_rows(a, b, keys));
                Ok(rows)
            }
            PhysicalOperator::Limit { page_size, offset, cursor } => {
                if cursor.is_some() {
                    return Err(ExecutorFailure::unsupported("Limit with cursor"));
                }
                let rows = self.input(node, 0)?;
                let skip = offset.map_or(0, |n| usize::try_from(n).unwrap_or(usize::MAX));
                let take = page_size.map_or(usize::MAX, |n| n as usize);
                Ok(rows.into_iter().skip(skip).take(take).collect())
            }
            PhysicalOperator::HashAggregate {
                group_by,
                aggregates,
                having,
            }
            | PhysicalOperator::SortAggregate {
                group_by,
                aggregates,
                having,
            } => {
                let rows = self.input(node, 0)?;
                let mut grouped = aggregate(rows, group_by, aggregates);
                if let Some(having) = having {
                    grouped.retain(|row| evaluate(having, row));
                }
                Ok(grouped)
            }
            PhysicalOperator::HashJoin { join, .. }
            | PhysicalOperator::MergeJoin { join }
            | PhysicalOperator::NestedLoopJoin { join } => {
                let left = self.input(node, 0)?;
                let right = self.input(node, 1)?;
                Ok(join_rows(join, left, right))
            }
            PhysicalOperator::Union => {
                let mut rows = Vec::new();
                for index in 0..node.children.len() {
                    rows.extend(self.input(node, index)?);
                }
                Ok(rows)
            }
            PhysicalOperator::Distinct => {
                let mut rows: Vec<Row> = Vec::new();
                for row in self.input(node, 0)? {
                    if !rows.iter().any(|seen| rows_equal(seen, &row)) {
                        rows.push(row);
                    }
                }
                Ok(rows)
            }
        }
    }

    fn scan(&self, entity: &str, alias: Option<&str>, columns: &[FieldRef]) -> Result<Vec<Row>, ExecutorFailure> {
        let table = self
            .tables
            .get(entity)
            .ok_or_else(|| ExecutorFailure::unknown_entity(entity))?;
        Ok(table
            .iter()
            .map(|stored| {
                let mut row = Row::new();
                for column in columns {
                    if let Some(value) = stored.get(stored_key(&column.field_name, alias)) {
                        row.insert(column.field_name.clone(), value.clone());
                    }
                }
                row
            })
            .collect())
    }
}

/// Key of `field_name` inside the related entity's own rows
fn stored_key<'a>(field_name: &'a str, alias: Option<&str>) -> &'a str {
    alias
        .and_then(|alias| field_name.strip_prefix(alias))
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(field_name)
}

fn project(mut row: Row, fields: &[FieldRef]) -> Row {
    row.retain(|key, _| fields.iter().any(|f| &f.field_name == key));
    row
}

fn rows_equal(a: &Row, b: &Row) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|((ka, va), (kb, vb))| ka == kb && va.equals(vb))
}

fn compare_rows(a: &Row, b: &Row, keys: &[CanonicalSort]) -> Ordering {
    for key in keys {
        let name = key.target.name();
        let ordering = compare_key(a.get(name), b.get(name), key);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn compare_key(a: Option<&Value>, b: Option<&Value>, key: &CanonicalSort) -> Ordering {
    let nulls_first = match key.nulls {
        NullOrdering::First => true,
        NullOrdering::Last => false,
        NullOrdering::Default => key.direction == SortDirection::Desc,
    };
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) if nulls_first => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) if nulls_first => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let ordering = a.compare(b).unwrap_or(Ordering::Equal);
            match key.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        }
    }
}

fn join_rows(join: &JoinSpec, left: Vec<Row>, right: Vec<Row>) -> Vec<Row> {
    let local = join.local_field.field_name.as_str();
    let foreign = join.foreign_field.field_name.as_str();
    let keep_left = matches!(join.join_type, JoinType::Left | JoinType::Full);
    let keep_right = matches!(join.join_type, JoinType::Right | JoinType::Full);

    let mut right_matched = vec![false; right.len()];
    let mut out = Vec::new();
    for l in left {
        let mut matched = false;
        if let Some(key) = l.get(local) {
            for (index, r) in right.iter().enumerate() {
                if r.get(foreign).map_or(false, |other| other.equals(key)) {
                    matched = true;
                    right_matched[index] = true;
                    let mut merged = l.clone();
                    merged.extend(r.iter().map(|(k, v)| (k.clone(), v.clone())));
                    out.push(merged);
                }
            }
        }
        if !matched && keep_left {
            out.push(l);
        }
    }
    if keep_right {
        out.extend(
            right
                .into_iter()
                .zip(right_matched)
                .filter(|(_, matched)| !matched)
                .map(|(row, _)| row),
        );
    }
    out
}

fn aggregate(rows: Vec<Row>, group_by: &[FieldRef], aggregates: &[CanonicalAggregate]) -> Vec<Row> {
    let mut groups: Vec<(Vec<Option<Value>>, Vec<Row>)> = Vec::new();
    for row in rows {
        let key: Vec<Option<Value>> = group_by.iter().map(|f| row.get(&f.field_name).cloned()).collect();
        match groups.iter_mut().find(|(existing, _)| same_key(existing, &key)) {
            Some((_, members)) => members.push(row),
            None => groups.push((key, vec![row])),
        }
    }
    // A global aggregate over no rows still yields one row
    if groups.is_empty() && group_by.is_empty() {
        groups.push((Vec::new(), Vec::new()));
    }

    groups
        .into_iter()
        .map(|(key, members)| {
            let mut out = Row::new();
            for (field, value) in group_by.iter().zip(key) {
                if let Some(value) = value {
                    out.insert(field.field_name.clone(), value);
                }
            }
            for aggregate in aggregates {
                if let Some(value) = compute(aggregate, &members) {
                    out.insert(aggregate.alias.clone(), value);
                }
            }
            out
        })
        .collect()
}

fn same_key(a: &[Option<Value>], b: &[Option<Value>]) -> bool {
    a.iter().zip(b).all(|(x, y)| match (x, y) {
        (None, None) => true,
        (Some(x), Some(y)) => x.equals(y),
        _ => false,
    })
}

fn compute(aggregate: &CanonicalAggregate, rows: &[Row]) -> Option<Value> {
    let inputs: Vec<&Value> = match &aggregate.field {
        Some(field) => rows.iter().filter_map(|row| row.get(&field.field_name)).collect(),
        None => Vec::new(),
    };
    let numbers = || inputs.iter().filter_map(|v| v.as_f64()).collect::<Vec<f64>>();

    match aggregate.function {
        AggregateFunction::Count => {
            let n = if aggregate.field.is_some() { inputs.len() } else { rows.len() };
            Some(Value::Int(n as i64))
        }
        AggregateFunction::CountDistinct => {
            let mut distinct: Vec<&Value> = Vec::new();
            for value in &inputs {
                if !distinct.iter().any(|seen| seen.equals(value)) {
                    distinct.push(value);
                }
            }
            Some(Value::Int(distinct.len() as i64))
        }
        AggregateFunction::Sum => {
            if aggregate.result_type == FieldType::Int64 {
                Some(Value::Int(inputs.iter().filter_map(|v| v.as_i64()).sum()))
            } else {
                Some(Value::Float(numbers().iter().sum()))
            }
        }
        AggregateFunction::Avg => {
            let values = numbers();
            (!values.is_empty()).then(|| Value::Float(values.iter().sum::<f64>() / values.len() as f64))
        }
        AggregateFunction::Min => extreme(&inputs, Ordering::Less),
        AggregateFunction::Max => extreme(&inputs, Ordering::Greater),
        AggregateFunction::Variance => variance(&numbers()).map(Value::Float),
        AggregateFunction::Stddev => variance(&numbers()).map(|v| Value::Float(v.sqrt())),
        AggregateFunction::Percentile => {
            let mut values = numbers();
            if values.is_empty() {
                return None;
            }
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            let p = aggregate.percentile.unwrap_or(50.0);
            // Nearest rank
            let rank = ((p / 100.0) * values.len() as f64).ceil() as usize;
            values.get(rank.max(1) - 1).copied().map(Value::Float)
        }
    }
}

fn extreme(values: &[&Value], wanted: Ordering) -> Option<Value> {
    let mut best: Option<&Value> = None;
    for value in values {
        best = match best {
            Some(current) if value.compare(current) != Some(wanted) => Some(current),
            _ => Some(value),
        };
    }
    best.cloned()
}

/// Population variance
fn variance(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    Some(values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n)
}
