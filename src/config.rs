//! Typed configuration for the tracking and fusion engine.
//!
//! The JSON layout is the one the stage setup tooling writes
//! (`reid_config.json`). Sections this crate does not use, such as `models`
//! or `calibration`, are ignored. Every loader validates before returning,
//! so a `ReidConfig` held by a component is always in range.

use crate::error::TrackError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReidConfig {
    #[serde(default)]
    pub performance: PerformanceConfig,
    pub tracking: TrackingConfig,
    pub data_fusion: FusionConfig,
    pub camera: CameraSection,
    pub stage_geometry: StageGeometry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceConfig {
    #[serde(default = "default_target_fps")]
    pub target_fps: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthMethod {
    Simple,
    HeightBased,
    Geometric,
    Hybrid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    pub feature_similarity_threshold: f64,
    pub max_tracking_distance: f64,
    pub track_memory_frames: usize,
    pub new_track_confidence_threshold: f64,
    pub depth_estimation_method: DepthMethod,
    /// Height in meters the pinhole depth model assumes for every person.
    #[serde(default = "default_person_height")]
    pub assumed_person_height: f64,
    /// Seed for the height-variation jitter of `height_based` depth. With no
    /// seed the jitter is replaced by its mean and estimates are deterministic.
    #[serde(default)]
    pub depth_jitter_seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    pub position_match_threshold: f64,
    pub time_sync_tolerance: f64,
    pub reid_weight: f64,
    pub ir_weight: f64,
    pub fusion_memory_time: f64,
    /// Z given to a beacon that reports none.
    #[serde(default = "default_person_height")]
    pub default_beacon_z: f64,
    #[serde(default = "default_beacon_confidence")]
    pub default_beacon_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSection {
    pub front_camera: CameraConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Mounting position in stage coordinates; `position[2]` is the height.
    pub position: [f64; 3],
    /// Downward tilt from horizontal, degrees.
    pub angle: f64,
    /// Horizontal field of view, degrees.
    pub fov: f64,
    /// Focal length in pixels.
    pub focal_length: f64,
}

impl CameraConfig {
    pub fn height(&self) -> f64 {
        self.position[2]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageGeometry {
    pub width: f64,
    pub depth: f64,
    pub height: f64,
    #[serde(default)]
    pub origin: [f64; 3],
}

fn default_target_fps() -> f64 {
    15.0
}

fn default_person_height() -> f64 {
    1.75
}

fn default_beacon_confidence() -> f64 {
    0.9
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
        }
    }
}

impl Default for ReidConfig {
    fn default() -> Self {
        Self {
            performance: PerformanceConfig::default(),
            tracking: TrackingConfig {
                feature_similarity_threshold: 0.6,
                max_tracking_distance: 2.0,
                track_memory_frames: 30,
                new_track_confidence_threshold: 0.5,
                depth_estimation_method: DepthMethod::Geometric,
                assumed_person_height: default_person_height(),
                depth_jitter_seed: None,
            },
            data_fusion: FusionConfig {
                position_match_threshold: 1.0,
                time_sync_tolerance: 0.1,
                reid_weight: 0.4,
                ir_weight: 0.6,
                fusion_memory_time: 3.0,
                default_beacon_z: default_person_height(),
                default_beacon_confidence: default_beacon_confidence(),
            },
            camera: CameraSection {
                front_camera: CameraConfig {
                    position: [0.0, 0.0, 2.5],
                    angle: 0.0,
                    fov: 60.0,
                    focal_length: 1000.0,
                },
            },
            stage_geometry: StageGeometry {
                width: 10.0,
                depth: 8.0,
                height: 3.0,
                origin: [0.0, 0.0, 0.0],
            },
        }
    }
}

impl ReidConfig {
    pub fn from_json_str(json: &str) -> Result<Self, TrackError> {
        let config: ReidConfig = serde_json::from_str(json).map_err(|e| {
            if e.is_data() {
                // missing keys and wrong types
                TrackError::Config(e.to_string())
            } else {
                TrackError::ConfigParse(e.to_string())
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, TrackError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            TrackError::ConfigIo(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Frame budget in seconds implied by `performance.target_fps`.
    pub fn frame_budget(&self) -> f64 {
        1.0 / self.performance.target_fps
    }

    pub fn validate(&self) -> Result<(), TrackError> {
        positive("performance.target_fps", self.performance.target_fps)?;

        let t = &self.tracking;
        unit_interval(
            "tracking.feature_similarity_threshold",
            t.feature_similarity_threshold,
        )?;
        positive("tracking.max_tracking_distance", t.max_tracking_distance)?;
        if t.track_memory_frames == 0 {
            return Err(TrackError::Config(
                "tracking.track_memory_frames must be at least 1".to_string(),
            ));
        }
        unit_interval(
            "tracking.new_track_confidence_threshold",
            t.new_track_confidence_threshold,
        )?;
        positive("tracking.assumed_person_height", t.assumed_person_height)?;

        let f = &self.data_fusion;
        non_negative(
            "data_fusion.position_match_threshold",
            f.position_match_threshold,
        )?;
        non_negative("data_fusion.time_sync_tolerance", f.time_sync_tolerance)?;
        non_negative("data_fusion.reid_weight", f.reid_weight)?;
        non_negative("data_fusion.ir_weight", f.ir_weight)?;
        if f.reid_weight + f.ir_weight <= 0.0 {
            return Err(TrackError::Config(
                "data_fusion.reid_weight + data_fusion.ir_weight must be positive"
                    .to_string(),
            ));
        }
        positive("data_fusion.fusion_memory_time", f.fusion_memory_time)?;
        unit_interval(
            "data_fusion.default_beacon_confidence",
            f.default_beacon_confidence,
        )?;
        finite("data_fusion.default_beacon_z", f.default_beacon_z)?;

        let c = &self.camera.front_camera;
        for (axis, value) in c.position.iter().enumerate() {
            finite(&format!("camera.front_camera.position[{}]", axis), *value)?;
        }
        positive("camera.front_camera.position[2]", c.height())?;
        finite("camera.front_camera.angle", c.angle)?;
        if !(c.fov > 0.0 && c.fov < 180.0) {
            return Err(TrackError::Config(format!(
                "camera.front_camera.fov must be in (0, 180), got {}",
                c.fov
            )));
        }
        positive("camera.front_camera.focal_length", c.focal_length)?;

        let s = &self.stage_geometry;
        positive("stage_geometry.width", s.width)?;
        positive("stage_geometry.depth", s.depth)?;
        positive("stage_geometry.height", s.height)?;
        Ok(())
    }
}

fn finite(key: &str, value: f64) -> Result<(), TrackError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(TrackError::Config(format!("{} must be finite, got {}", key, value)))
    }
}

fn positive(key: &str, value: f64) -> Result<(), TrackError> {
    finite(key, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(TrackError::Config(format!("{} must be positive, got {}", key, value)))
    }
}

fn non_negative(key: &str, value: f64) -> Result<(), TrackError> {
    finite(key, value)?;
    if value >= 0.0 {
        Ok(())
    } else {
        Err(TrackError::Config(format!(
            "{} must not be negative, got {}",
            key, value
        )))
    }
}

fn unit_interval(key: &str, value: f64) -> Result<(), TrackError> {
    finite(key, value)?;
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(TrackError::Config(format!(
            "{} must be in [0, 1], got {}",
            key, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_json() -> serde_json::Value {
        json!({
            "performance": { "target_fps": 15 },
            "tracking": {
                "feature_similarity_threshold": 0.6,
                "max_tracking_distance": 2.0,
                "track_memory_frames": 30,
                "new_track_confidence_threshold": 0.5,
                "depth_estimation_method": "height_based"
            },
            "data_fusion": {
                "position_match_threshold": 1.0,
                "time_sync_tolerance": 0.1,
                "reid_weight": 0.4,
                "ir_weight": 0.6,
                "fusion_memory_time": 3.0
            },
            "camera": {
                "front_camera": {
                    "position": [0, 0, 2.5],
                    "angle": 0,
                    "fov": 60,
                    "focal_length": 1000
                }
            },
            "stage_geometry": { "width": 10.0, "depth": 8.0, "height": 3.0 },
            "models": { "reid": { "feature_dim": 512 } }
        })
    }

    #[test]
    fn test_parse_full_config() {
        let config = ReidConfig::from_json_str(&base_json().to_string()).unwrap();
        assert_eq!(
            config.tracking.depth_estimation_method,
            DepthMethod::HeightBased
        );
        assert_eq!(config.tracking.track_memory_frames, 30);
        assert_eq!(config.stage_geometry.origin, [0.0, 0.0, 0.0]);
        assert_eq!(config.tracking.depth_jitter_seed, None);
        assert!((config.frame_budget() - 1.0 / 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_performance_section_is_optional() {
        let mut value = base_json();
        value.as_object_mut().unwrap().remove("performance");
        let config = ReidConfig::from_json_str(&value.to_string()).unwrap();
        assert_eq!(config.performance.target_fps, 15.0);
    }

    #[test]
    fn test_missing_section_is_config_error() {
        let mut value = base_json();
        value.as_object_mut().unwrap().remove("data_fusion");
        let err = ReidConfig::from_json_str(&value.to_string()).unwrap_err();
        assert!(matches!(err, TrackError::Config(_)), "got {:?}", err);
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let mut value = base_json();
        value["tracking"]
            .as_object_mut()
            .unwrap()
            .remove("max_tracking_distance");
        let err = ReidConfig::from_json_str(&value.to_string()).unwrap_err();
        assert!(matches!(err, TrackError::Config(_)), "got {:?}", err);
    }

    #[test]
    fn test_unknown_depth_method_rejected() {
        let mut value = base_json();
        value["tracking"]["depth_estimation_method"] = json!("lidar");
        assert!(ReidConfig::from_json_str(&value.to_string()).is_err());
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = ReidConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, TrackError::ConfigParse(_)), "got {:?}", err);
    }

    #[test]
    fn test_zero_weights_rejected() {
        let mut value = base_json();
        value["data_fusion"]["reid_weight"] = json!(0.0);
        value["data_fusion"]["ir_weight"] = json!(0.0);
        let err = ReidConfig::from_json_str(&value.to_string()).unwrap_err();
        assert!(matches!(err, TrackError::Config(_)));
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let cases = [
            ("tracking", "feature_similarity_threshold", json!(1.5)),
            ("tracking", "track_memory_frames", json!(0)),
            ("data_fusion", "fusion_memory_time", json!(0.0)),
            ("data_fusion", "ir_weight", json!(-0.1)),
            ("stage_geometry", "height", json!(-3.0)),
        ];
        for (section, key, value) in cases {
            let mut config = base_json();
            config[section][key] = value;
            assert!(
                ReidConfig::from_json_str(&config.to_string()).is_err(),
                "{}.{} should be rejected",
                section,
                key
            );
        }
    }

    #[test]
    fn test_fov_bounds() {
        let mut config = ReidConfig::default();
        config.camera.front_camera.fov = 180.0;
        assert!(config.validate().is_err());
        config.camera.front_camera.fov = 90.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_is_valid() {
        assert!(ReidConfig::default().validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ReidConfig::from_path("/nonexistent/reid_config.json")
            .unwrap_err();
        assert!(matches!(err, TrackError::ConfigIo(_)));
    }
}
