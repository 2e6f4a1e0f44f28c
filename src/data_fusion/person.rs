use crate::position::{Position3D, TrackingSource};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/*------------------------------------------------------------------------------
IrBeacon struct
------------------------------------------------------------------------------*/

/// One beacon reported by the IR system, already in stage coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrBeacon {
    /// Falls back to the beacon's index in the frame when absent.
    #[serde(default)]
    pub id: Option<usize>,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub z: Option<f64>,
}

impl IrBeacon {
    pub fn new(id: usize, x: f64, y: f64) -> Self {
        Self {
            id: Some(id),
            x,
            y,
            confidence: None,
            z: None,
        }
    }

    pub fn with_confidence(self, confidence: f64) -> Self {
        Self {
            confidence: Some(confidence),
            ..self
        }
    }

    pub fn with_z(self, z: f64) -> Self {
        Self { z: Some(z), ..self }
    }
}

/*------------------------------------------------------------------------------
Person struct
------------------------------------------------------------------------------*/

/// New state for a person from one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PersonUpdate {
    pub position: Position3D,
    pub reid_confidence: Option<f64>,
    pub ir_confidence: Option<f64>,
    pub fusion_confidence: f64,
}

/// Fused identity exposed to consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: usize,
    pub reid_track_id: Option<usize>,
    pub ir_beacon_id: Option<usize>,
    pub position: Position3D,
    pub velocity: Vector3<f64>,
    pub reid_confidence: f64,
    pub ir_confidence: f64,
    pub fusion_confidence: f64,
    pub last_updated: f64,
}

impl Person {
    pub(crate) fn new(
        id: usize,
        reid_track_id: Option<usize>,
        ir_beacon_id: Option<usize>,
        update: &PersonUpdate,
        timestamp: f64,
    ) -> Self {
        Self {
            id,
            reid_track_id,
            ir_beacon_id,
            position: update.position,
            velocity: Vector3::zeros(),
            reid_confidence: update.reid_confidence.unwrap_or(0.0),
            ir_confidence: update.ir_confidence.unwrap_or(0.0),
            fusion_confidence: update.fusion_confidence,
            last_updated: timestamp,
        }
    }

    /// Move to the new position, deriving velocity from the previous one.
    pub(crate) fn apply(&mut self, update: &PersonUpdate, timestamp: f64) {
        let dt = timestamp - self.last_updated;
        if dt > 0.0 {
            self.velocity = (update.position.as_vector() - self.position.as_vector()) / dt;
        }
        self.position = update.position;
        if let Some(confidence) = update.reid_confidence {
            self.reid_confidence = confidence;
        }
        if let Some(confidence) = update.ir_confidence {
            self.ir_confidence = confidence;
        }
        self.fusion_confidence = update.fusion_confidence;
        self.last_updated = timestamp;
    }

    pub fn source(&self) -> TrackingSource {
        self.position.source
    }

    pub fn is_fused(&self) -> bool {
        self.reid_track_id.is_some() && self.ir_beacon_id.is_some()
    }
}

/*------------------------------------------------------------------------------
PersonPosition struct
------------------------------------------------------------------------------*/

/// Exported view of a person, the record the lighting controller consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonPosition {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub confidence: f64,
    pub velocity: [f64; 3],
    pub reid_id: Option<usize>,
    pub ir_id: Option<usize>,
    pub source: TrackingSource,
    pub timestamp: f64,
}

impl From<&Person> for PersonPosition {
    fn from(person: &Person) -> Self {
        Self {
            id: person.id,
            x: person.position.x,
            y: person.position.y,
            z: person.position.z,
            confidence: person.fusion_confidence,
            velocity: [person.velocity.x, person.velocity.y, person.velocity.z],
            reid_id: person.reid_track_id,
            ir_id: person.ir_beacon_id,
            source: person.position.source,
            timestamp: person.position.timestamp,
        }
    }
}
