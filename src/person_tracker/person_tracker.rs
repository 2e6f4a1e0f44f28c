//! Main PersonTracker implementation
//!
//! Frame-to-frame tracking of people from ReID embeddings, detection
//! geometry and temporal continuity, with a greedy association step.

use super::assoc::{match_detections, similarity_matrix};
use super::track::{Observation, Track, TrackStatus};
use crate::config::ReidConfig;
use crate::detection::Detection;
use crate::error::TrackError;
use nalgebra::{DMatrix, DVector, Vector3};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, warn};

const TIMING_WINDOW_MAX: usize = 100;
const TIMING_WINDOW_KEEP: usize = 50;
const MIN_PREDICTION_CONFIDENCE: f64 = 0.1;

/// Lifetime counters of a tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackerStats {
    pub total_tracks_created: usize,
    pub total_tracks_lost: usize,
    pub total_tracks_removed: usize,
    pub active_tracks: usize,
    /// Mean matched-frame count over live tracks
    pub average_track_length: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerformanceStats {
    pub avg_processing_time_ms: f64,
    pub max_processing_time_ms: f64,
    pub frames_processed: usize,
    pub tracking_stats: TrackerStats,
}

/// Linear extrapolation of an active track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPrediction {
    /// (center_x_px, center_y_px, depth_m)
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub confidence: f64,
    pub time_delta: f64,
}

#[derive(Debug)]
pub struct PersonTracker {
    feature_similarity_threshold: f64,
    max_tracking_distance: f64,
    track_memory_frames: usize,
    new_track_confidence_threshold: f64,

    tracks: BTreeMap<usize, Track>,
    next_track_id: usize,
    frame_count: usize,
    last_timestamp: Option<f64>,
    processing_times: Vec<f64>,
    stats: TrackerStats,
}

impl PersonTracker {
    pub fn new(config: &ReidConfig) -> Result<Self, TrackError> {
        config.validate()?;
        let tracking = &config.tracking;
        info!(
            feature_similarity_threshold = tracking.feature_similarity_threshold,
            max_tracking_distance = tracking.max_tracking_distance,
            track_memory_frames = tracking.track_memory_frames,
            "person tracker initialized"
        );
        Ok(Self {
            feature_similarity_threshold: tracking.feature_similarity_threshold,
            max_tracking_distance: tracking.max_tracking_distance,
            track_memory_frames: tracking.track_memory_frames,
            new_track_confidence_threshold: tracking.new_track_confidence_threshold,
            tracks: BTreeMap::new(),
            next_track_id: 1,
            frame_count: 0,
            last_timestamp: None,
            processing_times: Vec::new(),
            stats: TrackerStats::default(),
        })
    }

    /// Advance the tracker by one frame.
    ///
    /// `reid_features` holds one embedding per row, aligned with
    /// `detections`, as are `depths`. If the three disagree in length the
    /// extra entries are ignored.
    ///
    /// # Returns
    /// The active tracks after the update, in ascending id order.
    pub fn update_tracks(
        &mut self,
        detections: &[Detection],
        reid_features: &DMatrix<f32>,
        depths: &[f64],
        frame_timestamp: f64,
    ) -> Result<Vec<&Track>, TrackError> {
        self.check_timestamp(frame_timestamp)?;
        let start = Instant::now();
        self.last_timestamp = Some(frame_timestamp);
        self.frame_count += 1;

        let num_dets = detections.len().min(reid_features.nrows()).min(depths.len());
        if detections.len() != reid_features.nrows() || detections.len() != depths.len() {
            warn!(
                detections = detections.len(),
                features = reid_features.nrows(),
                depths = depths.len(),
                "input lengths disagree, using the first {}",
                num_dets
            );
        }

        let positions: Vec<Vector3<f64>> = (0..num_dets)
            .map(|i| {
                let (cx, cy) = detections[i].get_rect().center();
                Vector3::new(cx, cy, depths[i])
            })
            .collect();
        let features: Vec<DVector<f32>> = (0..num_dets)
            .map(|i| reid_features.row(i).transpose())
            .collect();

        // Step 1: similarity against active tracks, ascending id order
        let active_ids: Vec<usize> = self
            .tracks
            .values()
            .filter(|t| t.is_active())
            .map(|t| t.track_id())
            .collect();
        let active: Vec<&Track> = active_ids
            .iter()
            .filter_map(|id| self.tracks.get(id))
            .collect();
        let similarity = similarity_matrix(
            &positions,
            &features,
            &active,
            self.max_tracking_distance,
            frame_timestamp,
        );

        // Step 2: greedy matching
        let assignment = match_detections(&similarity, self.feature_similarity_threshold);

        // Step 3: matched tracks
        let mut matched_ids = Vec::with_capacity(assignment.matches.len());
        for &(det_idx, col) in &assignment.matches {
            let track_id = active_ids[col];
            let observation = Observation {
                position: positions[det_idx],
                rect: detections[det_idx].get_rect().clone(),
                feature: features[det_idx].clone(),
                depth: depths[det_idx],
                timestamp: frame_timestamp,
                confidence: detections[det_idx].get_prob(),
            };
            if let Some(track) = self.tracks.get_mut(&track_id) {
                track.update(observation);
            }
            matched_ids.push(track_id);
        }

        // Step 4: new tracks from confident leftovers
        for &det_idx in &assignment.unmatched_rows {
            let confidence = detections[det_idx].get_prob();
            if !(confidence >= self.new_track_confidence_threshold) {
                continue;
            }
            let track_id = self.next_id();
            let observation = Observation {
                position: positions[det_idx],
                rect: detections[det_idx].get_rect().clone(),
                feature: features[det_idx].clone(),
                depth: depths[det_idx],
                timestamp: frame_timestamp,
                confidence,
            };
            self.tracks.insert(
                track_id,
                Track::new(track_id, observation, self.track_memory_frames),
            );
            matched_ids.push(track_id);
            self.stats.total_tracks_created += 1;
            debug!(track_id, confidence, "track created");
        }

        // Step 5: misses for everything not seen this frame
        for track in self.tracks.values_mut() {
            if matched_ids.contains(&track.track_id()) {
                continue;
            }
            if track.mark_missed(frame_timestamp) {
                self.stats.total_tracks_lost += 1;
                debug!(track_id = track.track_id(), "track lost");
            }
        }

        // Step 6: removal
        let expired: Vec<usize> = self
            .tracks
            .values()
            .filter(|t| t.is_expired(frame_timestamp))
            .map(|t| t.track_id())
            .collect();
        for track_id in expired {
            self.tracks.remove(&track_id);
            self.stats.total_tracks_removed += 1;
            debug!(track_id, "track removed");
        }

        self.refresh_stats();
        self.record_processing_time(start.elapsed().as_secs_f64());

        Ok(self.get_active_tracks())
    }

    /// Active tracks in ascending id order.
    /// Fails when `timestamp` is earlier than the last update, or NaN.
    pub fn check_timestamp(&self, timestamp: f64) -> Result<(), TrackError> {
        match self.last_timestamp {
            Some(previous) if !(timestamp >= previous) => Err(TrackError::NonMonotonicTimestamp {
                component: "person_tracker",
                previous,
                current: timestamp,
            }),
            _ => Ok(()),
        }
    }

    pub fn get_active_tracks(&self) -> Vec<&Track> {
        self.tracks.values().filter(|t| t.is_active()).collect()
    }

    /// All live tracks, active and lost.
    pub fn tracks(&self) -> &BTreeMap<usize, Track> {
        &self.tracks
    }

    pub fn get_track(&self, track_id: usize) -> Option<&Track> {
        self.tracks.get(&track_id)
    }

    /// Extrapolate every active track to `timestamp` using its average
    /// recent velocity.
    ///
    /// Tracks without a velocity sample, or last updated at or after
    /// `timestamp`, get no prediction.
    pub fn get_track_predictions(&self, timestamp: f64) -> BTreeMap<usize, TrackPrediction> {
        self.tracks
            .values()
            .filter(|t| t.is_active() && t.velocity_samples() > 0)
            .filter_map(|track| {
                let last = track.last_position()?;
                let time_delta = timestamp - track.last_update();
                if !(time_delta > 0.0) {
                    return None;
                }
                let velocity = track.average_velocity();
                let confidence =
                    track.confidence() * (1.0 - time_delta).max(MIN_PREDICTION_CONFIDENCE);
                Some((
                    track.track_id(),
                    TrackPrediction {
                        position: last + velocity * time_delta,
                        velocity,
                        confidence,
                        time_delta,
                    },
                ))
            })
            .collect()
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn performance_stats(&self) -> PerformanceStats {
        let (avg, max) = if self.processing_times.is_empty() {
            (0.0, 0.0)
        } else {
            let sum: f64 = self.processing_times.iter().sum();
            let max = self.processing_times.iter().cloned().fold(0.0, f64::max);
            (sum / self.processing_times.len() as f64, max)
        };
        PerformanceStats {
            avg_processing_time_ms: avg * 1000.0,
            max_processing_time_ms: max * 1000.0,
            frames_processed: self.frame_count,
            tracking_stats: self.stats,
        }
    }

    /// Drop every track and counter. Ids start over at 1.
    pub fn reset_tracks(&mut self) {
        self.tracks.clear();
        self.next_track_id = 1;
        self.frame_count = 0;
        self.last_timestamp = None;
        self.processing_times.clear();
        self.stats = TrackerStats::default();
        info!("all tracks reset");
    }

    fn next_id(&mut self) -> usize {
        let id = self.next_track_id;
        self.next_track_id += 1;
        id
    }

    fn refresh_stats(&mut self) {
        self.stats.active_tracks = self
            .tracks
            .values()
            .filter(|t| t.status() == TrackStatus::Active)
            .count();
        self.stats.average_track_length = if self.tracks.is_empty() {
            0.0
        } else {
            self.tracks.values().map(|t| t.age() as f64).sum::<f64>() / self.tracks.len() as f64
        };
    }

    fn record_processing_time(&mut self, seconds: f64) {
        self.processing_times.push(seconds);
        if self.processing_times.len() > TIMING_WINDOW_MAX {
            let drop = self.processing_times.len() - TIMING_WINDOW_KEEP;
            self.processing_times.drain(..drop);
        }
    }
}
