//! Camera-relative depth (Z) from a single 2D person detection.
//!
//! Four interchangeable models are provided, selected by
//! `tracking.depth_estimation_method`:
//! - `simple`: pinhole model on the box height
//! - `height_based`: pinhole model scaled by a confidence-weighted
//!   height-variation factor
//! - `geometric`: ground-plane projection of the box foot point
//! - `hybrid`: confidence-weighted blend of `height_based` and `geometric`
//!
//! Every estimate is clamped to [`MIN_DEPTH`, `MAX_DEPTH`].

use crate::config::{DepthMethod, ReidConfig};
use crate::detection::{Detection, FrameShape};
use crate::error::TrackError;
use crate::position::{Position3D, TrackingSource};
use nalgebra::Vector3;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{info, warn};

pub const MIN_DEPTH: f64 = 1.0;
pub const MAX_DEPTH: f64 = 20.0;
/// Returned by the height-driven models when a box has no height.
pub const DEFAULT_DEPTH: f64 = 10.0;

const ANGLE_EPSILON: f64 = 0.001;

/// Counters for inputs the estimator had to absorb with a default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepthStats {
    pub estimates: usize,
    pub degenerate_boxes: usize,
}

#[derive(Debug)]
pub struct DepthEstimator {
    method: DepthMethod,

    camera_height: f64,
    camera_angle: f64,
    focal_length: f64,
    fov: f64,
    person_height: f64,

    jitter: Option<StdRng>,
    stats: DepthStats,
}

impl DepthEstimator {
    pub fn new(config: &ReidConfig) -> Result<Self, TrackError> {
        config.validate()?;
        let camera = &config.camera.front_camera;
        let jitter = config.tracking.depth_jitter_seed.map(StdRng::seed_from_u64);

        info!(
            method = ?config.tracking.depth_estimation_method,
            seeded_jitter = jitter.is_some(),
            "DepthEstimator initialized"
        );

        Ok(Self {
            method: config.tracking.depth_estimation_method,
            camera_height: camera.height(),
            camera_angle: camera.angle,
            focal_length: camera.focal_length,
            fov: camera.fov,
            person_height: config.tracking.assumed_person_height,
            jitter,
            stats: DepthStats::default(),
        })
    }

    /// Switch the depth model.
    pub fn with_method(self, method: DepthMethod) -> Self {
        Self { method, ..self }
    }

    pub fn method(&self) -> DepthMethod {
        self.method
    }

    pub fn camera_height(&self) -> f64 {
        self.camera_height
    }

    pub fn set_camera_height(&mut self, camera_height: f64) {
        self.camera_height = camera_height;
    }

    pub fn stats(&self) -> DepthStats {
        self.stats
    }

    /// Estimate depths for every detection, in input order.
    pub fn estimate_depths(
        &mut self,
        detections: &[Detection],
        frame_shape: FrameShape,
    ) -> Vec<f64> {
        detections
            .iter()
            .map(|detection| self.estimate_depth(detection, frame_shape))
            .collect()
    }

    pub fn estimate_depth(
        &mut self,
        detection: &Detection,
        frame_shape: FrameShape,
    ) -> f64 {
        self.stats.estimates += 1;
        if self.method != DepthMethod::Geometric
            && !(detection.get_rect().height() > 0.0)
        {
            self.stats.degenerate_boxes += 1;
            warn!(
                bbox = ?detection.get_rect().get_xyxy(),
                "bounding box has no height, using default depth"
            );
        }

        match self.method {
            DepthMethod::Simple => self.simple_depth(detection),
            DepthMethod::HeightBased => self.height_based_depth(detection),
            DepthMethod::Geometric => self.geometric_depth(detection, frame_shape),
            DepthMethod::Hybrid => self.hybrid_depth(detection, frame_shape),
        }
    }

    /// Unclamped pinhole estimate, `None` for a box with no height.
    fn pinhole_depth(&self, detection: &Detection) -> Option<f64> {
        let pixel_height = detection.get_rect().height();
        if pixel_height > 0.0 {
            Some(self.person_height * self.focal_length / pixel_height)
        } else {
            None
        }
    }

    fn simple_depth(&self, detection: &Detection) -> f64 {
        self.pinhole_depth(detection)
            .map(clamp_depth)
            .unwrap_or(DEFAULT_DEPTH)
    }

    fn height_based_depth(&mut self, detection: &Detection) -> f64 {
        let depth_avg = match self.pinhole_depth(detection) {
            Some(depth) => depth,
            None => return DEFAULT_DEPTH,
        };

        // higher confidence, smaller adjustment
        let variation_factor = 1.0 - (detection.get_prob() - 0.5) * 0.2;
        let height_variation = match self.jitter.as_mut() {
            Some(rng) => rng.gen_range(0.9..1.1),
            None => 1.0,
        };

        clamp_depth(depth_avg * height_variation * variation_factor)
    }

    fn geometric_depth(&self, detection: &Detection, frame_shape: FrameShape) -> f64 {
        let (foot_x, foot_y) = detection.get_rect().foot_point();
        let (norm_x, norm_y) = frame_shape.normalize(foot_x, foot_y);

        let half_fov = (self.fov / 2.0).to_radians();
        let mut vertical_angle = norm_y * half_fov;
        let horizontal_angle = norm_x * half_fov;

        if vertical_angle.abs() < ANGLE_EPSILON {
            vertical_angle = ANGLE_EPSILON;
        }
        let mut total_vertical_angle = self.camera_angle.to_radians() + vertical_angle;
        if total_vertical_angle.abs() < ANGLE_EPSILON {
            total_vertical_angle = ANGLE_EPSILON;
        }

        let ground_distance = self.camera_height / total_vertical_angle.abs().tan();
        clamp_depth(ground_distance / horizontal_angle.cos())
    }

    fn hybrid_depth(&mut self, detection: &Detection, frame_shape: FrameShape) -> f64 {
        let geometric = self.geometric_depth(detection, frame_shape);
        let height_based = self.height_based_depth(detection);

        // 0.3 at zero confidence, 1.0 at full confidence
        let height_weight = detection.get_prob().max(0.0).min(1.0) * 0.7 + 0.3;
        let geometric_weight = 1.0 - height_weight;

        clamp_depth(height_based * height_weight + geometric * geometric_weight)
    }

    /// Camera-relative (x, y, z) of the box center at the given depth.
    ///
    /// x grows to the right and y grows upward; z is the depth itself.
    pub fn estimate_3d_position(
        &self,
        detection: &Detection,
        depth: f64,
        frame_shape: FrameShape,
        timestamp: f64,
    ) -> Position3D {
        let (center_x, center_y) = detection.get_rect().center();
        let (norm_x, norm_y) = frame_shape.normalize(center_x, center_y);

        let half_fov = (self.fov / 2.0).to_radians();
        let width_at_depth = 2.0 * depth * half_fov.tan();
        let height_at_depth = width_at_depth
            * (f64::from(frame_shape.height) / f64::from(frame_shape.width.max(1)));

        let point = Vector3::new(
            norm_x * (width_at_depth / 2.0),
            -norm_y * (height_at_depth / 2.0),
            depth,
        );
        Position3D::new(
            point,
            detection.get_prob(),
            timestamp,
            TrackingSource::ReidCamera,
        )
    }

    /// Back-solve the camera height from detections at known depths.
    ///
    /// Each sample implies `depth * pixel_height / focal_length`; the median
    /// of those is returned. Samples with no box height are skipped, and the
    /// current height is returned when nothing usable is left.
    pub fn calibrate_camera_height(&self, known_positions: &[(Detection, f64)]) -> f64 {
        let mut estimates: Vec<f64> = known_positions
            .iter()
            .filter_map(|(detection, actual_depth)| {
                let pixel_height = detection.get_rect().height();
                if pixel_height > 0.0 {
                    Some(actual_depth * pixel_height / self.focal_length)
                } else {
                    None
                }
            })
            .filter(|estimate| estimate.is_finite())
            .collect();

        if estimates.is_empty() {
            return self.camera_height;
        }

        estimates.sort_by(|a, b| a.total_cmp(b));
        let mid = estimates.len() / 2;
        let calibrated = if estimates.len() % 2 == 0 {
            (estimates[mid - 1] + estimates[mid]) / 2.0
        } else {
            estimates[mid]
        };

        info!(
            "Camera height calibrated: {:.2}m -> {:.2}m",
            self.camera_height, calibrated
        );
        calibrated
    }

    /// Confidence in a depth estimate: mean of the detection confidence, the
    /// box aspect-ratio plausibility and the depth-range plausibility.
    pub fn get_depth_confidence(&self, detection: &Detection, estimated_depth: f64) -> f64 {
        let mut factors = vec![detection.get_prob()];

        if let Some(aspect_ratio) = detection.get_rect().aspect_ratio() {
            // people are roughly half as wide as they are tall
            let aspect_conf = (1.0 - (aspect_ratio - 0.5).abs() * 2.0).max(0.0).min(1.0);
            factors.push(aspect_conf);
        }

        let depth_conf = if (2.0..=15.0).contains(&estimated_depth) {
            1.0
        } else if (1.0..2.0).contains(&estimated_depth) {
            estimated_depth - 1.0
        } else if estimated_depth > 15.0 && estimated_depth <= 20.0 {
            (20.0 - estimated_depth) / 5.0
        } else {
            0.1
        };
        factors.push(depth_conf);

        let mean = factors.iter().sum::<f64>() / factors.len() as f64;
        mean.max(0.0).min(1.0)
    }
}

/// `max`/`min` rather than `clamp` so a NaN collapses to `MIN_DEPTH`.
fn clamp_depth(depth: f64) -> f64 {
    depth.max(MIN_DEPTH).min(MAX_DEPTH)
}
