//! Cost model
//!
//! Costs are abstract units: input cardinality times a per-row constant for
//! the operator's algorithm. Only relative order matters.

pub const SEQ_SCAN_ROW: f64 = 1.0;
pub const INDEX_SCAN_ROW: f64 = 1.5;
/// Fixed price of descending an index
pub const INDEX_PROBE: f64 = 10.0;
pub const FULL_TEXT_ROW: f64 = 0.5;
pub const VECTOR_ROW: f64 = 0.8;
pub const FILTER_ROW: f64 = 0.2;
pub const PROJECT_ROW: f64 = 0.05;
pub const SORT_ROW: f64 = 0.1;
pub const LIMIT_ROW: f64 = 0.01;
pub const HASH_BUILD_ROW: f64 = 1.5;
pub const HASH_PROBE_ROW: f64 = 1.0;
pub const MERGE_ROW: f64 = 0.5;
pub const NESTED_LOOP_PAIR: f64 = 0.1;
pub const HASH_AGGREGATE_ROW: f64 = 1.2;
pub const SORT_AGGREGATE_ROW: f64 = 0.6;
pub const UNION_ROW: f64 = 0.05;
pub const DISTINCT_ROW: f64 = 1.0;

/// Share of input rows surviving as groups when grouping keys are present
pub const GROUP_RATIO: f64 = 0.1;
/// Share of a hybrid union that is not a duplicate
pub const DISTINCT_RATIO: f64 = 0.8;

/// Comparison sort: n log n comparisons
pub fn sort(rows: f64) -> f64 {
    rows * rows.max(2.0).log2() * SORT_ROW
}

pub fn index_scan(matched_rows: f64) -> f64 {
    INDEX_PROBE + matched_rows * INDEX_SCAN_ROW
}

pub fn hash_join(build_rows: f64, probe_rows: f64) -> f64 {
    build_rows * HASH_BUILD_ROW + probe_rows * HASH_PROBE_ROW
}

pub fn merge_join(left_rows: f64, right_rows: f64) -> f64 {
    (left_rows + right_rows) * MERGE_ROW
}

pub fn nested_loop_join(left_rows: f64, right_rows: f64) -> f64 {
    left_rows * right_rows * NESTED_LOOP_PAIR
}
