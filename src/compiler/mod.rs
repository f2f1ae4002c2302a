//! End-to-end compilation
//!
//! `QueryCompiler` owns the shared schema and statistics registries and runs
//! one query through CQM build, logical planning and physical optimization.
//! Each compilation takes one snapshot of each registry, so a concurrent
//! `replace()` never mixes two catalogs into one plan.
//!
//! The deadline comes from the query's `timeout_ms` (or the configured
//! default) and is checked between stages and inside the builder and the
//! optimizer. Execution is outside its reach.

mod errors;

use std::sync::Arc;

use serde::Serialize;

pub use errors::CompileError;

use crate::config::CompilerConfig;
use crate::cqm::{CanonicalQuery, CqmBuilder, PermissionView};
use crate::deadline::Deadline;
use crate::executor::{execute_plan, ExecutionError, ExecutionOutcome, Executor};
use crate::observability::{log_event, CompilerMetrics, Event};
use crate::planner::{
    explain, ExecutionStats, ExplainReport, InMemoryStatistics, LogicalPlan, Optimizer, PhysicalPlan,
    PlannerError, StatisticsRegistry,
};
use crate::query::Query;
use crate::schema::{SchemaCatalog, SchemaRegistry};

/// Every artifact of one compilation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub canonical: CanonicalQuery,
    pub logical: LogicalPlan,
    pub physical: PhysicalPlan,
    /// Present when the query asked for `explain`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<ExplainReport>,
}

pub struct QueryCompiler {
    schema: SchemaRegistry,
    statistics: StatisticsRegistry,
    config: CompilerConfig,
    metrics: CompilerMetrics,
}

impl QueryCompiler {
    pub fn new(catalog: SchemaCatalog, statistics: InMemoryStatistics, config: CompilerConfig) -> Self {
        Self {
            schema: SchemaRegistry::new(catalog),
            statistics: StatisticsRegistry::new(statistics),
            config,
            metrics: CompilerMetrics::new(),
        }
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn statistics(&self) -> &StatisticsRegistry {
        &self.statistics
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &CompilerMetrics {
        &self.metrics
    }

    pub fn compile(&self, query: &Query, permissions: &dyn PermissionView) -> Result<CompiledQuery, CompileError> {
        let deadline = Deadline::from_timeout_ms(query.effective_timeout_ms(), self.config.default_timeout_ms);
        self.compile_with_deadline(query, permissions, deadline)
    }

    pub fn compile_with_deadline(
        &self,
        query: &Query,
        permissions: &dyn PermissionView,
        deadline: Deadline,
    ) -> Result<CompiledQuery, CompileError> {
        log_event(
            Event::QueryCompileStart,
            &[("entity", query.entity.as_str()), ("tenant_id", query.tenant_id.as_str())],
        );

        let schema = self.schema.snapshot();
        let canonical = CqmBuilder::new(&*schema, permissions, &self.config)
            .with_deadline(deadline)
            .build(query)
            .map_err(|errors| self.failed(query, CompileError::from_build(errors)))?;

        let planned = self.plan(&canonical, deadline);
        let (logical, physical) = planned.map_err(|err| self.failed(query, err))?;

        let query_id = canonical.query_id.to_string();
        let total_cost = format!("{:.2}", physical.total_cost());
        let costed = physical.costed.to_string();
        log_event(
            Event::QueryPlanned,
            &[
                ("correlation_id", canonical.correlation_id.as_str()),
                ("costed", costed.as_str()),
                ("entity", canonical.entity.as_str()),
                ("query_id", query_id.as_str()),
                ("total_cost", total_cost.as_str()),
            ],
        );
        if !physical.costed {
            self.metrics.increment_uncosted();
            let warnings = physical.warnings.join("; ");
            log_event(
                Event::PlanUncosted,
                &[("query_id", query_id.as_str()), ("warnings", warnings.as_str())],
            );
        }
        self.metrics.increment_compiled();

        let report = canonical
            .explain
            .then(|| explain(&physical, None, &self.config.explain));
        Ok(CompiledQuery {
            canonical,
            logical,
            physical,
            explain: report,
        })
    }

    fn plan(&self, canonical: &CanonicalQuery, deadline: Deadline) -> Result<(LogicalPlan, PhysicalPlan), CompileError> {
        let fail = |err: PlannerError| CompileError::from_planner(err, canonical.query_id);

        deadline.check("logical").map_err(|e| fail(e.into()))?;
        let logical = LogicalPlan::from_canonical(canonical).map_err(fail)?;

        let statistics = self.statistics.snapshot();
        let physical = Optimizer::new(&*statistics, &self.config.optimizer)
            .with_deadline(deadline)
            .optimize(&logical)
            .map_err(fail)?;
        Ok((logical, physical))
    }

    fn failed(&self, query: &Query, err: CompileError) -> CompileError {
        match &err {
            CompileError::Rejected(errors) => {
                self.metrics.increment_rejected();
                let count = errors.len().to_string();
                let codes = errors
                    .iter()
                    .map(|e| e.code.code())
                    .collect::<Vec<_>>()
                    .join(",");
                log_event(
                    Event::QueryRejected,
                    &[
                        ("codes", codes.as_str()),
                        ("entity", query.entity.as_str()),
                        ("errors", count.as_str()),
                    ],
                );
            }
            CompileError::PlanningTimeout { stage, .. } => {
                self.metrics.increment_timeouts();
                log_event(
                    Event::PlanningTimeout,
                    &[("entity", query.entity.as_str()), ("stage", stage.as_str())],
                );
            }
            CompileError::Planner(planner) => {
                let reason = planner.to_string();
                log_event(
                    Event::QueryRejected,
                    &[("entity", query.entity.as_str()), ("reason", reason.as_str())],
                );
            }
        }
        err
    }

    /// Hands the plan to `executor`, counting failures
    pub fn execute(&self, compiled: &CompiledQuery, executor: &dyn Executor) -> Result<ExecutionOutcome, ExecutionError> {
        execute_plan(executor, &compiled.physical).map_err(|err| {
            self.metrics.increment_execution_failures();
            err
        })
    }

    /// Explain report annotated with the executor's row counts
    pub fn explain_with_runtime(&self, compiled: &CompiledQuery, runtime: &ExecutionStats) -> ExplainReport {
        explain(&compiled.physical, Some(runtime), &self.config.explain)
    }
}

/// Shares one compiler across threads
pub type SharedCompiler = Arc<QueryCompiler>;
