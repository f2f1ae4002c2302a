//! Canonical Query Model
//!
//! `canonical` holds the resolved types that planning consumes and must not
//! depend on the client `query` module. `builder` is the only bridge between
//! the two layers.

mod builder;
pub mod canonical;
mod errors;
mod permissions;

pub use builder::CqmBuilder;
pub use canonical::{
    CanonicalAggregate, CanonicalAggregation, CanonicalPagination, CanonicalQuery,
    CanonicalRelation, CanonicalSearch, CanonicalSort, OutputRef, SortTarget,
};
pub use errors::{BuildError, BuildErrorCode};
pub use permissions::{AllowAll, FieldAccess, PermissionView};
