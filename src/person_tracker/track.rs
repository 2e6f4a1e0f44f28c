//! Single ReID track
//!
//! A `Track` keeps a sliding window of matched observations plus the
//! velocity and quality statistics derived from them.

use super::assoc::feature_similarity;
use crate::rect::Rect;
use nalgebra::{DVector, Vector3};
use std::collections::VecDeque;

/// Consecutive misses after which an active track is marked lost.
pub const LOST_AFTER_MISSES: usize = 5;
/// A lost track is removed once it has more misses than this.
pub const REMOVE_AFTER_MISSES: usize = 10;
/// A lost track is removed once it has been lost this long, seconds.
pub const LOST_TIMEOUT: f64 = 5.0;

const VELOCITY_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStatus {
    Active,
    Lost,
}

/// One matched detection as stored in a track's history.
#[derive(Debug, Clone)]
pub struct Observation {
    /// (center_x_px, center_y_px, depth_m)
    pub position: Vector3<f64>,
    pub rect: Rect<f64>,
    pub feature: DVector<f32>,
    pub depth: f64,
    pub timestamp: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct Track {
    track_id: usize,
    status: TrackStatus,
    created_at: f64,
    /// Timestamp of the last matched observation
    last_update: f64,
    lost_since: Option<f64>,
    /// Number of matched frames
    age: usize,
    consecutive_misses: usize,
    memory: usize,
    history: VecDeque<Observation>,
    velocity: Vector3<f64>,
    velocity_history: VecDeque<Vector3<f64>>,
    confidence: f64,
    max_confidence: f64,
    average_confidence: f64,
    feature_consistency: f64,
}

impl Track {
    pub(crate) fn new(track_id: usize, observation: Observation, memory: usize) -> Self {
        let confidence = observation.confidence;
        let timestamp = observation.timestamp;
        let mut history = VecDeque::with_capacity(memory.max(1));
        history.push_back(observation);
        Self {
            track_id,
            status: TrackStatus::Active,
            created_at: timestamp,
            last_update: timestamp,
            lost_since: None,
            age: 1,
            consecutive_misses: 0,
            memory: memory.max(1),
            history,
            velocity: Vector3::zeros(),
            velocity_history: VecDeque::with_capacity(VELOCITY_WINDOW),
            confidence,
            max_confidence: confidence,
            average_confidence: confidence,
            feature_consistency: 1.0,
        }
    }

    pub fn track_id(&self) -> usize {
        self.track_id
    }

    pub fn status(&self) -> TrackStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == TrackStatus::Active
    }

    pub fn created_at(&self) -> f64 {
        self.created_at
    }

    pub fn last_update(&self) -> f64 {
        self.last_update
    }

    pub fn lost_since(&self) -> Option<f64> {
        self.lost_since
    }

    pub fn age(&self) -> usize {
        self.age
    }

    pub fn consecutive_misses(&self) -> usize {
        self.consecutive_misses
    }

    pub fn history(&self) -> &VecDeque<Observation> {
        &self.history
    }

    pub fn last_observation(&self) -> Option<&Observation> {
        self.history.back()
    }

    pub fn last_position(&self) -> Option<&Vector3<f64>> {
        self.history.back().map(|o| &o.position)
    }

    pub fn last_feature(&self) -> Option<&DVector<f32>> {
        self.history.back().map(|o| &o.feature)
    }

    pub fn last_rect(&self) -> Option<&Rect<f64>> {
        self.history.back().map(|o| &o.rect)
    }

    pub fn velocity(&self) -> Vector3<f64> {
        self.velocity
    }

    pub fn velocity_samples(&self) -> usize {
        self.velocity_history.len()
    }

    /// Mean of the recent velocity samples, zero when there are none.
    pub fn average_velocity(&self) -> Vector3<f64> {
        if self.velocity_history.is_empty() {
            return Vector3::zeros();
        }
        let sum = self
            .velocity_history
            .iter()
            .fold(Vector3::zeros(), |acc, v| acc + v);
        sum / self.velocity_history.len() as f64
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn max_confidence(&self) -> f64 {
        self.max_confidence
    }

    pub fn average_confidence(&self) -> f64 {
        self.average_confidence
    }

    pub fn feature_consistency(&self) -> f64 {
        self.feature_consistency
    }

    /// Add a matched observation and reactivate the track.
    pub(crate) fn update(&mut self, observation: Observation) {
        if let Some(prev) = self.history.back() {
            let dt = observation.timestamp - prev.timestamp;
            if dt > 0.0 {
                self.velocity = (observation.position - prev.position) / dt;
                self.velocity_history.push_back(self.velocity);
                while self.velocity_history.len() > VELOCITY_WINDOW {
                    self.velocity_history.pop_front();
                }
            }
        }

        self.feature_consistency = self.consistency_with(&observation.feature);
        self.confidence = observation.confidence;
        self.max_confidence = self.max_confidence.max(observation.confidence);
        self.last_update = observation.timestamp;

        self.history.push_back(observation);
        while self.history.len() > self.memory {
            self.history.pop_front();
        }
        self.average_confidence = self.history.iter().map(|o| o.confidence).sum::<f64>()
            / self.history.len() as f64;

        self.age += 1;
        self.consecutive_misses = 0;
        self.status = TrackStatus::Active;
        self.lost_since = None;
    }

    /// Record a frame without a match. Returns `true` if this miss made the
    /// track lost.
    pub(crate) fn mark_missed(&mut self, timestamp: f64) -> bool {
        self.consecutive_misses += 1;
        if self.status == TrackStatus::Active && self.consecutive_misses >= LOST_AFTER_MISSES {
            self.status = TrackStatus::Lost;
            self.lost_since = Some(timestamp);
            return true;
        }
        false
    }

    /// Whether a lost track has timed out or missed too often.
    pub(crate) fn is_expired(&self, now: f64) -> bool {
        match (self.status, self.lost_since) {
            (TrackStatus::Lost, Some(since)) => {
                now - since > LOST_TIMEOUT || self.consecutive_misses > REMOVE_AFTER_MISSES
            }
            _ => false,
        }
    }

    /// Cosine similarity of `feature` against the mean embedding of the
    /// current window. A single-observation window counts as consistent.
    fn consistency_with(&self, feature: &DVector<f32>) -> f64 {
        let same_dims: Vec<&DVector<f32>> = self
            .history
            .iter()
            .map(|o| &o.feature)
            .filter(|f| f.len() == feature.len())
            .collect();
        if same_dims.len() < 2 {
            return 1.0;
        }
        let mut mean = DVector::<f32>::zeros(feature.len());
        for f in &same_dims {
            mean += *f;
        }
        mean /= same_dims.len() as f32;
        feature_similarity(feature, &mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nearly_eq::assert_nearly_eq;

    fn observation(x: f64, timestamp: f64, confidence: f64, feature: Vec<f32>) -> Observation {
        Observation {
            position: Vector3::new(x, 100.0, 5.0),
            rect: Rect::from_xyxy(x - 10.0, 50.0, x + 10.0, 150.0),
            feature: DVector::from_vec(feature),
            depth: 5.0,
            timestamp,
            confidence,
        }
    }

    #[test]
    fn test_new_track() {
        let track = Track::new(3, observation(0.0, 1.0, 0.8, vec![1.0, 0.0]), 30);

        assert_eq!(track.track_id(), 3);
        assert_eq!(track.status(), TrackStatus::Active);
        assert_eq!(track.age(), 1);
        assert_eq!(track.history().len(), 1);
        assert_eq!(track.velocity(), Vector3::zeros());
        assert_eq!(track.created_at(), 1.0);
    }

    #[test]
    fn test_update_velocity_and_history_trim() {
        let mut track = Track::new(1, observation(0.0, 0.0, 0.8, vec![1.0, 0.0]), 2);
        track.update(observation(10.0, 0.5, 0.6, vec![1.0, 0.0]));
        track.update(observation(20.0, 1.0, 0.7, vec![1.0, 0.0]));

        assert_eq!(track.history().len(), 2);
        assert_eq!(track.history()[0].timestamp, 0.5);
        assert_nearly_eq!(track.velocity().x, 20.0, 1e-12);
        assert_nearly_eq!(track.average_velocity().x, 20.0, 1e-12);
        assert_eq!(track.age(), 3);
        assert_eq!(track.last_update(), 1.0);
    }

    #[test]
    fn test_confidence_metrics() {
        let mut track = Track::new(1, observation(0.0, 0.0, 0.9, vec![1.0, 0.0]), 30);
        track.update(observation(1.0, 0.1, 0.5, vec![1.0, 0.0]));
        track.update(observation(2.0, 0.2, 0.7, vec![1.0, 0.0]));

        assert_eq!(track.confidence(), 0.7);
        assert_eq!(track.max_confidence(), 0.9);
        assert_nearly_eq!(track.average_confidence(), 0.7, 1e-12);
    }

    #[test]
    fn test_feature_consistency_drops_on_change() {
        let mut track = Track::new(1, observation(0.0, 0.0, 0.9, vec![1.0, 0.0]), 30);
        track.update(observation(1.0, 0.1, 0.9, vec![1.0, 0.0]));
        assert_nearly_eq!(track.feature_consistency(), 1.0, 1e-6);

        track.update(observation(2.0, 0.2, 0.9, vec![0.0, 1.0]));
        assert!(track.feature_consistency() < 0.9);
    }

    #[test]
    fn test_zero_dt_keeps_velocity() {
        let mut track = Track::new(1, observation(0.0, 1.0, 0.9, vec![1.0]), 30);
        track.update(observation(5.0, 1.0, 0.9, vec![1.0]));
        assert_eq!(track.velocity(), Vector3::zeros());
        assert_eq!(track.average_velocity(), Vector3::zeros());
    }

    #[test]
    fn test_lost_after_five_misses() {
        let mut track = Track::new(1, observation(0.0, 0.0, 0.9, vec![1.0]), 30);
        for i in 1..LOST_AFTER_MISSES {
            assert!(!track.mark_missed(i as f64 * 0.1));
            assert!(track.is_active());
        }
        assert!(track.mark_missed(0.5));
        assert_eq!(track.status(), TrackStatus::Lost);
        assert_eq!(track.lost_since(), Some(0.5));

        // further misses do not re-report the transition
        assert!(!track.mark_missed(0.6));
        assert_eq!(track.consecutive_misses(), 6);
    }

    #[test]
    fn test_expiry() {
        let mut track = Track::new(1, observation(0.0, 0.0, 0.9, vec![1.0]), 30);
        assert!(!track.is_expired(100.0));

        for i in 1..=LOST_AFTER_MISSES {
            track.mark_missed(i as f64);
        }
        assert!(!track.is_expired(10.0));
        assert!(track.is_expired(10.01));

        for i in 0..(REMOVE_AFTER_MISSES - LOST_AFTER_MISSES + 1) {
            track.mark_missed(5.0 + i as f64 * 0.01);
        }
        assert!(track.is_expired(5.2));
    }

    #[test]
    fn test_update_revives_lost_track() {
        let mut track = Track::new(1, observation(0.0, 0.0, 0.9, vec![1.0]), 30);
        for i in 1..=LOST_AFTER_MISSES {
            track.mark_missed(i as f64 * 0.1);
        }
        track.update(observation(1.0, 0.6, 0.9, vec![1.0]));

        assert!(track.is_active());
        assert_eq!(track.consecutive_misses(), 0);
        assert_eq!(track.lost_since(), None);
    }
}
