pub mod assoc;
mod person_tracker;
mod track;

pub use person_tracker::{PerformanceStats, PersonTracker, TrackPrediction, TrackerStats};
pub use track::{
    Observation, Track, TrackStatus, LOST_AFTER_MISSES, LOST_TIMEOUT, REMOVE_AFTER_MISSES,
};
