//! Filter algebra
//!
//! A recursive boolean tree (AND / OR / NOT over leaf comparisons) with 25
//! typed operators.
//!
//! - `typing`: operator/type legality and operand coercion
//! - `normalize`: De Morgan push-down, flattening, collapsing
//! - `eval`: reference evaluation against a row of values

mod ast;
mod errors;
mod eval;
mod normalize;
mod operator;
mod typing;

pub use ast::{Condition, Filter};
pub use errors::{FilterError, FilterErrorCode};
pub use eval::{evaluate, like_to_regex, Row};
pub use normalize::normalize;
pub use operator::{Arity, Operator, OperatorFamily};
pub use typing::{check_limits, coerce_operand, evaluate_types, TypedField};
