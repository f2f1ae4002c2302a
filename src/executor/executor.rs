//! The downstream executor contract
//!
//! An executor receives a finished `PhysicalPlan` and the tenant key and
//! either streams rows back or fails. The compiler treats failures as
//! opaque: `execute_plan` tags them with the query's identifiers and
//! returns them without retrying.

use crate::filter::Row;
use crate::observability::{log_event, Event};
use crate::planner::{ExecutionStats, PhysicalPlan};

use super::errors::{ExecutionError, ExecutorFailure};

/// Anything that can run a physical plan
pub trait Executor {
    fn execute(&self, plan: &PhysicalPlan, tenant_id: &str) -> Result<ExecutionOutcome, ExecutorFailure>;
}

/// Rows produced by an executor, plus optional per-node row counts
pub struct ExecutionOutcome {
    pub rows: Box<dyn Iterator<Item = Row>>,
    /// Feeds `planner::explain` when present
    pub stats: Option<ExecutionStats>,
}

impl ExecutionOutcome {
    pub fn new(rows: Vec<Row>, stats: Option<ExecutionStats>) -> Self {
        Self {
            rows: Box::new(rows.into_iter()),
            stats,
        }
    }

    /// Drains the row stream
    pub fn collect_rows(self) -> (Vec<Row>, Option<ExecutionStats>) {
        (self.rows.collect(), self.stats)
    }
}

impl std::fmt::Debug for ExecutionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionOutcome")
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Runs `plan` under its own tenant key
pub fn execute_plan(executor: &dyn Executor, plan: &PhysicalPlan) -> Result<ExecutionOutcome, ExecutionError> {
    executor.execute(plan, &plan.tenant_id).map_err(|source| {
        let query_id = plan.query_id.to_string();
        let reason = source.to_string();
        log_event(
            Event::ExecutionFailed,
            &[
                ("correlation_id", plan.correlation_id.as_str()),
                ("query_id", query_id.as_str()),
                ("reason", reason.as_str()),
            ],
        );
        ExecutionError {
            query_id: plan.query_id,
            correlation_id: plan.correlation_id.clone(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{PhysicalNode, PhysicalOperator};
    use std::cell::RefCell;
    use uuid::Uuid;

    struct Failing;

    impl Executor for Failing {
        fn execute(&self, _: &PhysicalPlan, _: &str) -> Result<ExecutionOutcome, ExecutorFailure> {
            Err(ExecutorFailure::execution_failed("connection reset"))
        }
    }

    #[derive(Default)]
    struct Recording {
        tenants: RefCell<Vec<String>>,
    }

    impl Executor for Recording {
        fn execute(&self, _: &PhysicalPlan, tenant_id: &str) -> Result<ExecutionOutcome, ExecutorFailure> {
            self.tenants.borrow_mut().push(tenant_id.to_string());
            Ok(ExecutionOutcome::new(vec![Row::new()], None))
        }
    }

    fn plan() -> PhysicalPlan {
        PhysicalPlan {
            query_id: Uuid::new_v4(),
            correlation_id: "req-42".into(),
            tenant_id: "acme".into(),
            entity: "orders".into(),
            root: PhysicalNode::new(PhysicalOperator::Distinct, 1.0, 1.0, true, Vec::new()),
            costed: true,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_failure_is_wrapped_with_ids() {
        let plan = plan();
        let err = execute_plan(&Failing, &plan).unwrap_err();
        assert_eq!(err.query_id, plan.query_id);
        assert_eq!(err.correlation_id, "req-42");
        assert_eq!(err.source.message(), "connection reset");
    }

    #[test]
    fn test_tenant_is_passed_through() {
        let executor = Recording::default();
        let (rows, stats) = execute_plan(&executor, &plan()).unwrap().collect_rows();
        assert_eq!(rows.len(), 1);
        assert!(stats.is_none());
        assert_eq!(*executor.tenants.borrow(), vec!["acme".to_string()]);
    }
}
