//! Closest-first matching of ReID positions to IR beacons on the floor plane.

use crate::assoc::{greedy_assignment, AssignmentResult};
use crate::position::Position3D;
use nalgebra::DMatrix;

/// XY distance matrix of shape (num_reid, num_ir).
pub fn xy_distance_matrix(reid: &[Position3D], ir: &[Position3D]) -> DMatrix<f64> {
    DMatrix::from_fn(reid.len(), ir.len(), |i, j| reid[i].xy_distance_to(&ir[j]))
}

/// Greedy nearest-pair matching, accepting pairs up to `max_distance`.
///
/// Equal distances go to the lower row first, then the lower column.
/// Callers order rows by track id and columns by beacon id.
pub fn match_positions(distances: &DMatrix<f64>, max_distance: f64) -> AssignmentResult {
    let mut candidates: Vec<(usize, usize, f64)> = Vec::new();
    for i in 0..distances.nrows() {
        for j in 0..distances.ncols() {
            let d = distances[(i, j)];
            if d <= max_distance {
                candidates.push((i, j, d));
            }
        }
    }
    candidates.sort_by(|a, b| {
        a.2.total_cmp(&b.2)
            .then_with(|| a.0.cmp(&b.0))
            .then_with(|| a.1.cmp(&b.1))
    });

    let pairs: Vec<(usize, usize)> = candidates.iter().map(|&(i, j, _)| (i, j)).collect();
    greedy_assignment(distances.nrows(), distances.ncols(), &pairs)
}
