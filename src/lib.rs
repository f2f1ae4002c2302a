//! querycraft - a storage-agnostic query compiler
//!
//! Compiles a loosely typed client `Query` into a schema-resolved
//! `CanonicalQuery`, a declarative `LogicalPlan` and finally a costed
//! `PhysicalPlan`:
//!
//! ```text
//! Query → CanonicalQuery → LogicalPlan → PhysicalPlan [→ executor]
//! ```
//!
//! No stage depends on a later stage's representation, and nothing past the
//! CQM builder sees the client-facing `query` types.

pub mod cli;
pub mod compiler;
pub mod config;
pub mod cqm;
pub mod deadline;
pub mod executor;
pub mod filter;
pub mod observability;
pub mod path;
pub mod planner;
pub mod psl;
pub mod query;
pub mod schema;
pub mod value;
pub mod vocab;
