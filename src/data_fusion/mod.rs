pub mod assoc;
mod data_fusion;
mod person;
pub mod transform;

pub use data_fusion::{DataFusion, FusionStats, StageBounds, IR_ONLY_PENALTY, REID_ONLY_PENALTY};
pub use person::{IrBeacon, Person, PersonPosition};
pub use transform::{AffineTransform, CalibrationPoint, LinearScaleTransform, StageTransform};
