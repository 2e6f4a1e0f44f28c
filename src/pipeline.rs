//! One depth -> track -> fuse pass per camera frame
//!
//! `FusionPipeline` owns the three stages and feeds each one the output of
//! the previous one. It does no I/O of its own; the host hands it camera
//! frames and, when one is available, the latest beacon frame.

use crate::config::ReidConfig;
use crate::data_fusion::{DataFusion, IrBeacon, PersonPosition};
use crate::depth_estimator::DepthEstimator;
use crate::detection::{Detection, FrameShape};
use crate::error::TrackError;
use crate::person_tracker::PersonTracker;
use nalgebra::DMatrix;
use std::time::Instant;
use tracing::warn;

/// Detector and ReID output for one camera frame.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub detections: Vec<Detection>,
    /// One embedding per row, aligned with `detections`
    pub features: DMatrix<f32>,
    pub shape: FrameShape,
    pub timestamp: f64,
}

/// Beacons resolved by the IR system at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct BeaconFrame {
    pub beacons: Vec<IrBeacon>,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineStats {
    pub frames: usize,
    /// Passes that took longer than the frame budget
    pub overruns: usize,
    /// Beacon frames dropped for being too far from the camera frame in time
    pub stale_beacon_frames: usize,
    pub last_pass_ms: f64,
    pub max_pass_ms: f64,
}

#[derive(Debug)]
pub struct FusionPipeline {
    depth_estimator: DepthEstimator,
    tracker: PersonTracker,
    fusion: DataFusion,
    /// Seconds allowed per pass
    frame_budget: f64,
    stats: PipelineStats,
}

impl FusionPipeline {
    pub fn new(config: &ReidConfig) -> Result<Self, TrackError> {
        Ok(Self {
            depth_estimator: DepthEstimator::new(config)?,
            tracker: PersonTracker::new(config)?,
            fusion: DataFusion::new(config)?,
            frame_budget: config.frame_budget(),
            stats: PipelineStats::default(),
        })
    }

    /// Run one pass and return the exported person positions.
    ///
    /// A beacon frame whose timestamp is further than
    /// `time_sync_tolerance` from the camera frame is ignored for this pass.
    pub fn process(
        &mut self,
        frame: &CameraFrame,
        beacons: Option<&BeaconFrame>,
    ) -> Result<Vec<PersonPosition>, TrackError> {
        // reject before any stage mutates state
        self.tracker.check_timestamp(frame.timestamp)?;
        self.fusion.check_timestamp(frame.timestamp)?;
        let start = Instant::now();

        let depths = self
            .depth_estimator
            .estimate_depths(&frame.detections, frame.shape);
        let tracks = self.tracker.update_tracks(
            &frame.detections,
            &frame.features,
            &depths,
            frame.timestamp,
        )?;

        let tolerance = self.fusion.time_sync_tolerance();
        let ir_beacons: &[IrBeacon] = match beacons {
            Some(beacon_frame) if (beacon_frame.timestamp - frame.timestamp).abs() <= tolerance => {
                &beacon_frame.beacons
            }
            Some(beacon_frame) => {
                self.stats.stale_beacon_frames += 1;
                warn!(
                    camera_timestamp = frame.timestamp,
                    beacon_timestamp = beacon_frame.timestamp,
                    tolerance,
                    "beacon frame out of sync, skipping"
                );
                &[]
            }
            None => &[],
        };

        self.fusion
            .update_fusion(&tracks, ir_beacons, frame.timestamp)?;
        let positions = self.fusion.get_person_positions();

        let elapsed = start.elapsed().as_secs_f64();
        self.stats.frames += 1;
        self.stats.last_pass_ms = elapsed * 1000.0;
        self.stats.max_pass_ms = self.stats.max_pass_ms.max(elapsed * 1000.0);
        if elapsed > self.frame_budget {
            self.stats.overruns += 1;
            warn!(
                elapsed_ms = elapsed * 1000.0,
                budget_ms = self.frame_budget * 1000.0,
                "pipeline pass over frame budget"
            );
        }

        Ok(positions)
    }

    pub fn depth_estimator(&self) -> &DepthEstimator {
        &self.depth_estimator
    }

    pub fn depth_estimator_mut(&mut self) -> &mut DepthEstimator {
        &mut self.depth_estimator
    }

    pub fn tracker(&self) -> &PersonTracker {
        &self.tracker
    }

    pub fn fusion(&self) -> &DataFusion {
        &self.fusion
    }

    pub fn fusion_mut(&mut self) -> &mut DataFusion {
        &mut self.fusion
    }

    pub fn frame_budget(&self) -> f64 {
        self.frame_budget
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(timestamp: f64) -> CameraFrame {
        CameraFrame {
            detections: vec![Detection::from_bbox([100.0, 100.0, 300.0, 700.0], 0.9)],
            features: DMatrix::from_row_slice(1, 3, &[1.0, 0.0, 0.0]),
            shape: FrameShape::new(1080, 1920),
            timestamp,
        }
    }

    #[test]
    fn test_process_runs_all_stages() {
        let mut pipeline = FusionPipeline::new(&ReidConfig::default()).unwrap();
        pipeline.process(&frame(0.0), None).unwrap();

        assert_eq!(pipeline.depth_estimator().stats().estimates, 1);
        assert_eq!(pipeline.tracker().get_active_tracks().len(), 1);
        assert_eq!(pipeline.fusion().persons().len(), 1);
        assert_eq!(pipeline.stats().frames, 1);
    }

    #[test]
    fn test_stale_beacon_frame_dropped() {
        let mut pipeline = FusionPipeline::new(&ReidConfig::default()).unwrap();
        let beacons = BeaconFrame {
            beacons: vec![IrBeacon::new(1, 0.0, 0.0)],
            timestamp: 0.5,
        };

        pipeline.process(&frame(0.0), Some(&beacons)).unwrap();
        assert_eq!(pipeline.stats().stale_beacon_frames, 1);
        assert_eq!(pipeline.fusion().stats().ir_only_persons, 0);

        let beacons = BeaconFrame {
            beacons: vec![IrBeacon::new(1, 0.0, 0.0)],
            timestamp: 0.55,
        };
        pipeline.process(&frame(0.5), Some(&beacons)).unwrap();
        assert_eq!(pipeline.stats().stale_beacon_frames, 1);
        assert_eq!(pipeline.fusion().stats().ir_only_persons, 1);
    }

    #[test]
    fn test_frame_budget_from_target_fps() {
        let pipeline = FusionPipeline::new(&ReidConfig::default()).unwrap();
        assert!((pipeline.frame_budget() - 1.0 / 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_backwards_frame_is_error() {
        let mut pipeline = FusionPipeline::new(&ReidConfig::default()).unwrap();
        pipeline.process(&frame(1.0), None).unwrap();
        assert!(pipeline.process(&frame(0.9), None).is_err());
    }

    #[test]
    fn test_rejected_frame_leaves_depth_state_untouched() {
        let mut config = ReidConfig::default();
        config.tracking.depth_estimation_method = crate::config::DepthMethod::HeightBased;
        config.tracking.depth_jitter_seed = Some(7);

        let mut clean = FusionPipeline::new(&config).unwrap();
        clean.process(&frame(1.0), None).unwrap();
        let expected = clean.process(&frame(1.1), None).unwrap();

        let mut interrupted = FusionPipeline::new(&config).unwrap();
        interrupted.process(&frame(1.0), None).unwrap();
        assert!(interrupted.process(&frame(0.5), None).is_err());
        assert_eq!(interrupted.depth_estimator().stats().estimates, 1);
        let positions = interrupted.process(&frame(1.1), None).unwrap();

        assert_eq!(positions, expected);
        assert_eq!(interrupted.stats().frames, 2);
    }
}
