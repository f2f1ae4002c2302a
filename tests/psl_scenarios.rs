//! Projection conflict-resolution scenarios

mod common;

use querycraft::psl::{ProjectionMatcher, PslLimits};

use common::catalog;

fn selected(include: &[&str], exclude: &[&str]) -> Vec<String> {
    let catalog = catalog();
    let include: Vec<String> = include.iter().map(|s| s.to_string()).collect();
    let exclude: Vec<String> = exclude.iter().map(|s| s.to_string()).collect();
    ProjectionMatcher::new(&catalog, PslLimits::default())
        .resolve("accounts", &include, &exclude)
        .unwrap()
        .fields
        .into_iter()
        .map(|f| f.field_name)
        .collect()
}

/// `user.*` scores 4, `user.password` scores 6: the exclude wins.
#[test]
fn test_specific_exclude_beats_wildcard_include() {
    assert_eq!(
        selected(&["user.*"], &["user.password"]),
        vec!["user.email", "user.name"]
    );
}

/// `user.password` scores 6, `**.password` scores 3: the include wins.
#[test]
fn test_specific_include_beats_recursive_exclude() {
    assert_eq!(
        selected(&["user.password"], &["**.password"]),
        vec!["user.password"]
    );
}

/// No includes selects everything; `**.password` drops every password.
#[test]
fn test_recursive_exclude_at_any_depth() {
    assert_eq!(
        selected(&[], &["**.password"]),
        vec!["id", "settings.theme", "user.email", "user.name"]
    );
}

/// Equal scores go to the exclude.
#[test]
fn test_tie_excludes() {
    assert_eq!(selected(&["user.password"], &["user.password"]), Vec::<String>::new());
}

/// Pattern order never changes the result; `settings.*` (4) outranks `**.theme` (3).
#[test]
fn test_order_independent() {
    let a = selected(&["user.*", "id", "settings.*"], &["user.password", "**.theme"]);
    let b = selected(&["settings.*", "id", "user.*"], &["**.theme", "user.password"]);
    assert_eq!(a, b);
    assert_eq!(a, vec!["id", "settings.theme", "user.email", "user.name"]);
}
