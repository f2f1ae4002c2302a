//! Field paths
//!
//! A `FieldPath` is the parsed form of a client path or PSL pattern. Paths
//! are parsed once and never mutated; resolution against a schema happens in
//! `schema`.

mod parser;
mod segment;

pub use parser::{parse_path, PathError};
pub use segment::{FieldPath, Segment};
