//! Executor boundary
//!
//! The compiler stops at a `PhysicalPlan`. Anything implementing `Executor`
//! can run it; `execute_plan` wraps executor failures with the query and
//! correlation ids. `InMemoryExecutor` is a reference implementation over
//! rows held in memory.

mod errors;
mod executor;
mod memory;

pub use errors::{ExecutionError, ExecutorFailure, ExecutorFailureCode};
pub use executor::{execute_plan, ExecutionOutcome, Executor};
pub use memory::InMemoryExecutor;

pub use crate::planner::ExecutionStats;
