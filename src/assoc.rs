//! Greedy one-to-one assignment shared by the tracker and the fusion stage.
//!
//! Both stages repeatedly take the globally best remaining (row, column)
//! pair. Sorting every acceptable candidate once in priority order and
//! walking the list gives the same result as repeated argmax over the
//! matrix, with a tie order the caller controls through the sort.

use std::collections::HashSet;

/// Result of an assignment
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentResult {
    /// Matched pairs as (row_index, column_index)
    pub matches: Vec<(usize, usize)>,
    /// Rows left without a partner, ascending
    pub unmatched_rows: Vec<usize>,
    /// Columns left without a partner, ascending
    pub unmatched_cols: Vec<usize>,
}

/// Accept candidates in the given order, skipping any whose row or column
/// is already taken.
///
/// `candidates` must only hold acceptable pairs and must already be sorted
/// best-first.
pub fn greedy_assignment(
    nrows: usize,
    ncols: usize,
    candidates: &[(usize, usize)],
) -> AssignmentResult {
    let mut used_rows = HashSet::new();
    let mut used_cols = HashSet::new();
    let mut matches = Vec::new();

    for &(row, col) in candidates {
        if used_rows.contains(&row) || used_cols.contains(&col) {
            continue;
        }
        used_rows.insert(row);
        used_cols.insert(col);
        matches.push((row, col));
    }

    AssignmentResult {
        matches,
        unmatched_rows: (0..nrows).filter(|r| !used_rows.contains(r)).collect(),
        unmatched_cols: (0..ncols).filter(|c| !used_cols.contains(c)).collect(),
    }
}
