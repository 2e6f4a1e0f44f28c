use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingSource {
    IrBeacon,
    ReidCamera,
    Fused,
}

/// Timestamped point in stage coordinates, tagged with where it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub confidence: f64,
    pub timestamp: f64,
    pub source: TrackingSource,
}

impl Position3D {
    pub fn new(
        point: Vector3<f64>,
        confidence: f64,
        timestamp: f64,
        source: TrackingSource,
    ) -> Self {
        Self {
            x: point.x,
            y: point.y,
            z: point.z,
            confidence,
            timestamp,
            source,
        }
    }

    pub fn as_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn distance_to(&self, other: &Position3D) -> f64 {
        (self.as_vector() - other.as_vector()).norm()
    }

    /// Floor-plane distance. IR beacons carry no reliable Z, so matching
    /// across modalities only looks at X and Y.
    pub fn xy_distance_to(&self, other: &Position3D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}
