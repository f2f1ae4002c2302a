//! Client-facing query description
//!
//! This is the only layer that speaks the loosely typed wire shape. Nothing
//! downstream of the CQM builder imports it.

mod builder;
mod model;

pub use builder::QueryBuilder;
pub use model::{
    Aggregate, Aggregation, JoinOn, Pagination, Projection, Query, QueryOptions, Relation,
    Search, Sort,
};
