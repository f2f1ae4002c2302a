//! Filter normalization
//!
//! Output shape:
//! - `NOT` wraps leaves only (double negation removed, De Morgan applied)
//! - no compound has a child with its own operator (flattened)
//! - no compound has a single child (collapsed)
//! - no compound repeats a child (deduplicated)
//!
//! Applying `normalize` to its own output returns it unchanged.

use super::ast::Filter;

pub fn normalize<F: Clone + PartialEq>(filter: &Filter<F>) -> Filter<F> {
    push_down(filter.clone(), false)
}

fn push_down<F: PartialEq>(filter: Filter<F>, negated: bool) -> Filter<F> {
    match filter {
        Filter::Condition(condition) => {
            let leaf = Filter::Condition(condition);
            if negated {
                leaf.negate()
            } else {
                leaf
            }
        }
        Filter::Not(inner) => push_down(*inner, !negated),
        Filter::And(children) => {
            let children = children.into_iter().map(|c| push_down(c, negated)).collect();
            compound(!negated, children)
        }
        Filter::Or(children) => {
            let children = children.into_iter().map(|c| push_down(c, negated)).collect();
            compound(negated, children)
        }
    }
}

/// Builds a flattened, deduplicated compound; collapses a single child
fn compound<F: PartialEq>(is_and: bool, children: Vec<Filter<F>>) -> Filter<F> {
    let mut flat: Vec<Filter<F>> = Vec::with_capacity(children.len());
    for child in children {
        let nested = match child {
            Filter::And(grand) if is_and => grand,
            Filter::Or(grand) if !is_and => grand,
            other => vec![other],
        };
        for item in nested {
            if !flat.contains(&item) {
                flat.push(item);
            }
        }
    }

    if flat.len() == 1 {
        if let Some(only) = flat.pop() {
            return only;
        }
    }
    if is_and {
        Filter::And(flat)
    } else {
        Filter::Or(flat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Operator;

    fn leaf(name: &str) -> Filter<String> {
        Filter::condition(name.to_string(), Operator::Eq, 1)
    }

    #[test]
    fn test_flatten_nested_and() {
        let f = Filter::And(vec![Filter::And(vec![leaf("a"), leaf("b")]), leaf("c")]);
        assert_eq!(normalize(&f), Filter::And(vec![leaf("a"), leaf("b"), leaf("c")]));
    }

    #[test]
    fn test_single_child_collapses() {
        let f = Filter::Or(vec![Filter::And(vec![leaf("a")])]);
        assert_eq!(normalize(&f), leaf("a"));
    }

    #[test]
    fn test_double_negation() {
        let f = leaf("a").negate().negate();
        assert_eq!(normalize(&f), leaf("a"));
    }

    #[test]
    fn test_de_morgan() {
        let f = Filter::And(vec![leaf("a"), leaf("b")]).negate();
        assert_eq!(
            normalize(&f),
            Filter::Or(vec![leaf("a").negate(), leaf("b").negate()])
        );
    }

    #[test]
    fn test_duplicates_removed() {
        let f = Filter::Or(vec![leaf("a"), Filter::Or(vec![leaf("a"), leaf("b")])]);
        assert_eq!(normalize(&f), Filter::Or(vec![leaf("a"), leaf("b")]));
    }

    #[test]
    fn test_idempotent() {
        let f = Filter::And(vec![
            Filter::Or(vec![leaf("a"), Filter::Or(vec![leaf("b")]).negate()]).negate(),
            Filter::And(vec![leaf("c"), leaf("c")]),
        ]);
        let once = normalize(&f);
        assert_eq!(normalize(&once), once);
    }
}
