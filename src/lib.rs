pub mod assoc;
pub mod config;
pub mod data_fusion;
pub mod depth_estimator;
pub mod detection;
pub mod error;
pub mod person_tracker;
pub mod pipeline;
pub mod position;
pub mod rect;

pub use config::{DepthMethod, ReidConfig};
pub use data_fusion::{DataFusion, IrBeacon, Person, PersonPosition};
pub use depth_estimator::DepthEstimator;
pub use detection::{Detection, FrameShape};
pub use error::TrackError;
pub use person_tracker::{PersonTracker, Track, TrackStatus};
pub use pipeline::{BeaconFrame, CameraFrame, FusionPipeline};
pub use position::{Position3D, TrackingSource};
pub use rect::Rect;
