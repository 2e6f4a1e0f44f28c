mod depth_estimator;

pub use crate::config::DepthMethod;
pub use depth_estimator::{DepthEstimator, DepthStats, DEFAULT_DEPTH, MAX_DEPTH, MIN_DEPTH};
