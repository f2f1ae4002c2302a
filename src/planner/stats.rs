//! Statistics provider
//!
//! The optimizer reads statistics only through `StatisticsView`. Every lookup
//! returns `Option`: `None` means "not known", which the optimizer turns into
//! a default estimate and an uncosted plan rather than an error.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::filter::Operator;
use crate::value::Value;

pub trait StatisticsView: Send + Sync {
    /// Row count of an entity
    fn cardinality(&self, entity: &str) -> Option<u64>;

    /// Fraction of rows in `entity` satisfying `field_id <op> value`
    fn selectivity(&self, entity: &str, field_id: &str, op: Operator, value: Option<&Value>) -> Option<f64>;

    /// Whether rows of `entity` are stored in order of `field_ids`
    fn is_sorted(&self, entity: &str, field_ids: &[&str]) -> bool;

    /// Whether storage keeps an index on the field; `None` defers to the schema
    fn has_index(&self, _entity: &str, _field_id: &str) -> Option<bool> {
        None
    }
}

/// Knows nothing; every plan built against it is uncosted
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStatistics;

impl StatisticsView for NoStatistics {
    fn cardinality(&self, _entity: &str) -> Option<u64> {
        None
    }

    fn selectivity(&self, _entity: &str, _field_id: &str, _op: Operator, _value: Option<&Value>) -> Option<f64> {
        None
    }

    fn is_sorted(&self, _entity: &str, _field_ids: &[&str]) -> bool {
        false
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldStatistics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinct_values: Option<u64>,
    #[serde(default)]
    pub null_fraction: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed: Option<bool>,
    /// Measured selectivities that override the derived estimate
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selectivity: BTreeMap<Operator, f64>,
}

impl FieldStatistics {
    fn estimate(&self, op: Operator, value: Option<&Value>) -> Option<f64> {
        if let Some(measured) = self.selectivity.get(&op) {
            return Some(*measured);
        }
        let non_null = 1.0 - self.null_fraction;
        match op {
            Operator::IsNull => return Some(self.null_fraction),
            Operator::IsNotNull => return Some(non_null),
            _ => {}
        }

        let distinct = self.distinct_values.filter(|d| *d > 0)? as f64;
        let listed = value.and_then(Value::as_array).map_or(1.0, |items| items.len() as f64);
        let estimate = match op {
            Operator::Eq => non_null / distinct,
            Operator::Ne => non_null * (1.0 - 1.0 / distinct),
            Operator::In => non_null * (listed / distinct).min(1.0),
            Operator::NotIn => non_null * (1.0 - (listed / distinct).min(1.0)),
            Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => non_null / 3.0,
            Operator::Between => non_null / 4.0,
            Operator::NotBetween => non_null * 0.75,
            _ => return None,
        };
        Some(estimate.clamp(0.0, 1.0))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityStatistics {
    pub row_count: u64,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldStatistics>,
    /// Physical sort orders, each a list of field ids
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sorted_on: Vec<Vec<String>>,
}

impl EntityStatistics {
    pub fn new(row_count: u64) -> Self {
        Self {
            row_count,
            ..Self::default()
        }
    }

    pub fn field(mut self, field_id: impl Into<String>, stats: FieldStatistics) -> Self {
        self.fields.insert(field_id.into(), stats);
        self
    }

    pub fn sorted_on(mut self, field_ids: &[&str]) -> Self {
        self.sorted_on
            .push(field_ids.iter().map(|f| f.to_string()).collect());
        self
    }
}

/// Statistics held in memory, loadable from a JSON file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InMemoryStatistics {
    #[serde(default)]
    pub entities: BTreeMap<String, EntityStatistics>,
}

impl InMemoryStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(mut self, name: impl Into<String>, stats: EntityStatistics) -> Self {
        self.entities.insert(name.into(), stats);
        self
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let stats: InMemoryStatistics = serde_json::from_str(&content)?;
        for (name, entity) in &stats.entities {
            for (field, field_stats) in &entity.fields {
                let fractions = std::iter::once(field_stats.null_fraction)
                    .chain(field_stats.selectivity.values().copied());
                if fractions.into_iter().any(|f| !(0.0..=1.0).contains(&f)) {
                    return Err(ConfigError::Invalid(format!(
                        "statistics for {}.{} must be fractions in [0, 1]",
                        name, field
                    )));
                }
            }
        }
        Ok(stats)
    }
}

impl StatisticsView for InMemoryStatistics {
    fn cardinality(&self, entity: &str) -> Option<u64> {
        self.entities.get(entity).map(|e| e.row_count)
    }

    fn selectivity(&self, entity: &str, field_id: &str, op: Operator, value: Option<&Value>) -> Option<f64> {
        self.entities
            .get(entity)?
            .fields
            .get(field_id)?
            .estimate(op, value)
    }

    fn is_sorted(&self, entity: &str, field_ids: &[&str]) -> bool {
        if field_ids.is_empty() {
            return false;
        }
        self.entities.get(entity).map_or(false, |e| {
            e.sorted_on.iter().any(|order| {
                order.len() >= field_ids.len()
                    && order.iter().zip(field_ids).all(|(a, b)| a == b)
            })
        })
    }

    fn has_index(&self, entity: &str, field_id: &str) -> Option<bool> {
        self.entities.get(entity)?.fields.get(field_id)?.indexed
    }
}

/// Shared statistics, swapped atomically as new measurements arrive
#[derive(Debug, Default)]
pub struct StatisticsRegistry {
    current: RwLock<Arc<InMemoryStatistics>>,
}

impl StatisticsRegistry {
    pub fn new(stats: InMemoryStatistics) -> Self {
        Self {
            current: RwLock::new(Arc::new(stats)),
        }
    }

    pub fn snapshot(&self) -> Arc<InMemoryStatistics> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn replace(&self, stats: InMemoryStatistics) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(stats);
    }
}
