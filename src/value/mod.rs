//! Value & type system
//!
//! A closed tagged union of scalar and array values, plus the fixed field
//! type taxonomy every other subsystem is written against.
//!
//! # Boundary rule
//!
//! Client values arrive loosely typed (a timestamp is just a string on the
//! wire). `Value::coerce_to` is the only place that interprets them against a
//! field type; it runs once, inside the CQM builder. Every value downstream of
//! a `CanonicalQuery` is already consistent with its field.

mod coerce;
mod types;
mod value;

pub use coerce::CoercionError;
pub use types::FieldType;
pub use value::Value;
