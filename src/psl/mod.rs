//! Projection Selector Language
//!
//! Patterns select fields by path: literals, `*` (one level), `**` (any
//! depth), `[]` (list element), `[*]` / `['key']` (map values).
//!
//! # Specificity
//!
//! | segment   | score |
//! |-----------|-------|
//! | literal   | 3     |
//! | `['key']` | 2     |
//! | `[]`      | 1     |
//! | `[*]`     | 1     |
//! | `*`       | 1     |
//! | `**`      | 0     |
//!
//! A field matched by both lists is excluded when the best exclude score is
//! greater than or equal to the best include score.

mod errors;
mod matcher;
mod pattern;

pub use errors::{PslError, PslErrorCode};
pub use matcher::{ProjectionMatcher, ProjectionSet};
pub use pattern::{compile, compile_all, CompiledPattern, PatternKind, PslLimits};
