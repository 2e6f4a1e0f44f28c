//! Similarity terms for matching detections to ReID tracks
//!
//! The combined score is `0.6 * feature + 0.3 * geometric + 0.1 * temporal`.

use super::track::Track;
use crate::assoc::{greedy_assignment, AssignmentResult};
use nalgebra::{DMatrix, DVector, Vector3};

pub const FEATURE_WEIGHT: f64 = 0.6;
pub const GEOMETRIC_WEIGHT: f64 = 0.3;
pub const TEMPORAL_WEIGHT: f64 = 0.1;

/// Gap after which a track earns no temporal credit, seconds.
pub const MAX_TIME_GAP: f64 = 1.0;

/// Returned when a track has no position to compare against.
pub const NEUTRAL_GEOMETRIC_SIMILARITY: f64 = 0.5;

/// Cosine similarity of two embeddings, floored at 0.
///
/// Empty embeddings, or embeddings of different sizes, score 0.
pub fn feature_similarity(a: &DVector<f32>, b: &DVector<f32>) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let norm_a = a.norm() as f64 + 1e-8;
    let norm_b = b.norm() as f64 + 1e-8;
    let similarity = a.dot(b) as f64 / (norm_a * norm_b);
    similarity.max(0.0)
}

/// `1 - distance / max_distance` in (x_px, y_px, depth) space, clamped to
/// [0, 1] and 0 beyond `max_distance`.
pub fn geometric_similarity(
    position: &Vector3<f64>,
    last_position: Option<&Vector3<f64>>,
    max_distance: f64,
) -> f64 {
    let last_position = match last_position {
        Some(p) => p,
        None => return NEUTRAL_GEOMETRIC_SIMILARITY,
    };
    let distance = (position - last_position).norm();
    if distance > max_distance {
        return 0.0;
    }
    (1.0 - distance / max_distance).max(0.0).min(1.0)
}

/// Linear decay from 1 at `elapsed = 0` to 0 at `MAX_TIME_GAP`.
pub fn temporal_similarity(elapsed: f64) -> f64 {
    if elapsed > MAX_TIME_GAP {
        return 0.0;
    }
    (1.0 - elapsed / MAX_TIME_GAP).max(0.0).min(1.0)
}

pub fn combined_similarity(feature: f64, geometric: f64, temporal: f64) -> f64 {
    FEATURE_WEIGHT * feature + GEOMETRIC_WEIGHT * geometric + TEMPORAL_WEIGHT * temporal
}

/// Similarity matrix of shape (num_detections, num_tracks).
pub fn similarity_matrix(
    positions: &[Vector3<f64>],
    features: &[DVector<f32>],
    tracks: &[&Track],
    max_distance: f64,
    timestamp: f64,
) -> DMatrix<f64> {
    let num_dets = positions.len().min(features.len());
    let mut similarity = DMatrix::zeros(num_dets, tracks.len());

    for i in 0..num_dets {
        for (j, track) in tracks.iter().enumerate() {
            let feature = track
                .last_feature()
                .map(|f| feature_similarity(&features[i], f))
                .unwrap_or(0.0);
            let geometric =
                geometric_similarity(&positions[i], track.last_position(), max_distance);
            let temporal = temporal_similarity(timestamp - track.last_update());
            similarity[(i, j)] = combined_similarity(feature, geometric, temporal);
        }
    }
    similarity
}

/// Greedy highest-similarity-first matching.
///
/// Pairs below `threshold` (or with no similarity at all) are never formed.
/// Equal similarities go to the lower column first, then the lower row;
/// callers order columns by ascending track id so ties favor older tracks.
pub fn match_detections(similarity: &DMatrix<f64>, threshold: f64) -> AssignmentResult {
    let mut candidates: Vec<(usize, usize, f64)> = Vec::new();
    for i in 0..similarity.nrows() {
        for j in 0..similarity.ncols() {
            let s = similarity[(i, j)];
            if s > 0.0 && s >= threshold {
                candidates.push((i, j, s));
            }
        }
    }
    candidates.sort_by(|a, b| {
        b.2.total_cmp(&a.2)
            .then_with(|| a.1.cmp(&b.1))
            .then_with(|| a.0.cmp(&b.0))
    });

    let pairs: Vec<(usize, usize)> = candidates.iter().map(|&(i, j, _)| (i, j)).collect();
    greedy_assignment(similarity.nrows(), similarity.ncols(), &pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nearly_eq::assert_nearly_eq;

    #[test]
    fn test_feature_similarity_identical() {
        let a = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        assert_nearly_eq!(feature_similarity(&a, &a), 1.0, 1e-6);
    }

    #[test]
    fn test_feature_similarity_floored_at_zero() {
        let a = DVector::from_vec(vec![1.0, 0.0]);
        let b = DVector::from_vec(vec![-1.0, 0.0]);
        assert_eq!(feature_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_feature_similarity_size_mismatch() {
        let a = DVector::from_vec(vec![1.0, 0.0]);
        let b = DVector::from_vec(vec![1.0, 0.0, 0.0]);
        assert_eq!(feature_similarity(&a, &b), 0.0);
        assert_eq!(feature_similarity(&DVector::zeros(0), &DVector::zeros(0)), 0.0);
    }

    #[test]
    fn test_geometric_similarity() {
        let here = Vector3::new(0.0, 0.0, 5.0);
        let near = Vector3::new(0.0, 0.5, 5.0);
        let far = Vector3::new(0.0, 3.0, 5.0);

        assert_nearly_eq!(geometric_similarity(&here, Some(&near), 2.0), 0.75, 1e-12);
        assert_eq!(geometric_similarity(&here, Some(&far), 2.0), 0.0);
        assert_eq!(geometric_similarity(&here, None, 2.0), NEUTRAL_GEOMETRIC_SIMILARITY);
    }

    #[test]
    fn test_temporal_similarity() {
        assert_eq!(temporal_similarity(0.0), 1.0);
        assert_nearly_eq!(temporal_similarity(0.25), 0.75, 1e-12);
        assert_eq!(temporal_similarity(1.5), 0.0);
    }

    #[test]
    fn test_match_detections_highest_first() {
        let similarity = DMatrix::from_row_slice(
            2,
            2,
            &[
                0.9, 0.8, // det 0 prefers track 0
                0.95, 0.1, // det 1 prefers track 0 even more
            ],
        );
        let result = match_detections(&similarity, 0.5);

        assert_eq!(result.matches, vec![(1, 0), (0, 1)]);
        assert!(result.unmatched_rows.is_empty());
        assert!(result.unmatched_cols.is_empty());
    }

    #[test]
    fn test_match_detections_below_threshold() {
        let similarity = DMatrix::from_row_slice(2, 2, &[0.59, 0.2, 0.1, 0.3]);
        let result = match_detections(&similarity, 0.6);

        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_rows, vec![0, 1]);
        assert_eq!(result.unmatched_cols, vec![0, 1]);
    }

    #[test]
    fn test_match_detections_tie_prefers_lower_column() {
        let similarity = DMatrix::from_row_slice(1, 3, &[0.7, 0.7, 0.7]);
        let result = match_detections(&similarity, 0.6);

        assert_eq!(result.matches, vec![(0, 0)]);
        assert_eq!(result.unmatched_cols, vec![1, 2]);
    }

    #[test]
    fn test_match_detections_tie_then_lower_row() {
        let similarity = DMatrix::from_row_slice(2, 1, &[0.7, 0.7]);
        let result = match_detections(&similarity, 0.6);

        assert_eq!(result.matches, vec![(0, 0)]);
        assert_eq!(result.unmatched_rows, vec![1]);
    }

    #[test]
    fn test_match_detections_zero_threshold_ignores_zero_similarity() {
        let similarity = DMatrix::from_row_slice(1, 1, &[0.0]);
        let result = match_detections(&similarity, 0.0);
        assert!(result.matches.is_empty());
    }
}
