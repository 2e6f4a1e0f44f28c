//! Main DataFusion implementation
//!
//! Reconciles active ReID tracks with IR beacons into `Person` records,
//! one call per frame.

use super::assoc::{match_positions, xy_distance_matrix};
use super::person::{IrBeacon, Person, PersonPosition, PersonUpdate};
use super::transform::{AffineTransform, CalibrationPoint, LinearScaleTransform, StageTransform};
use crate::config::{ReidConfig, StageGeometry};
use crate::error::TrackError;
use crate::person_tracker::Track;
use crate::position::{Position3D, TrackingSource};
use nalgebra::Vector3;
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Confidence kept by a person seen only by the ReID camera.
pub const REID_ONLY_PENALTY: f64 = 0.7;
/// Confidence kept by a person seen only by the IR system.
pub const IR_ONLY_PENALTY: f64 = 0.8;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FusionStats {
    pub total_persons: usize,
    pub reid_only_persons: usize,
    pub ir_only_persons: usize,
    pub fused_persons: usize,
    /// Accepted ReID/IR pairs, cumulative
    pub position_matches: usize,
    /// Positions left unmatched while both sensors reported, cumulative
    pub position_mismatches: usize,
}

/// Axis-aligned region a person position must fall in to be exported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageBounds {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub z_min: f64,
    pub z_max: f64,
}

impl StageBounds {
    /// Width and depth centered on `origin`, height measured up from it.
    pub fn from_geometry(stage: &StageGeometry) -> Self {
        let [ox, oy, oz] = stage.origin;
        Self {
            x_min: ox - stage.width / 2.0,
            x_max: ox + stage.width / 2.0,
            y_min: oy - stage.depth / 2.0,
            y_max: oy + stage.depth / 2.0,
            z_min: oz,
            z_max: oz + stage.height,
        }
    }

    pub fn contains(&self, position: &Position3D) -> bool {
        (self.x_min..=self.x_max).contains(&position.x)
            && (self.y_min..=self.y_max).contains(&position.y)
            && (self.z_min..=self.z_max).contains(&position.z)
    }
}

#[derive(Debug)]
pub struct DataFusion {
    position_match_threshold: f64,
    time_sync_tolerance: f64,
    reid_weight: f64,
    ir_weight: f64,
    fusion_memory_time: f64,
    default_beacon_z: f64,
    default_beacon_confidence: f64,
    stage_bounds: StageBounds,
    transform: Box<dyn StageTransform>,

    persons: BTreeMap<usize, Person>,
    next_person_id: usize,
    reid_to_ir: BTreeMap<usize, usize>,
    ir_to_reid: BTreeMap<usize, usize>,
    last_timestamp: Option<f64>,
    stats: FusionStats,
}

impl DataFusion {
    pub fn new(config: &ReidConfig) -> Result<Self, TrackError> {
        config.validate()?;
        let fusion = &config.data_fusion;
        let stage = &config.stage_geometry;
        info!(
            position_match_threshold = fusion.position_match_threshold,
            reid_weight = fusion.reid_weight,
            ir_weight = fusion.ir_weight,
            "data fusion initialized"
        );
        Ok(Self {
            position_match_threshold: fusion.position_match_threshold,
            time_sync_tolerance: fusion.time_sync_tolerance,
            reid_weight: fusion.reid_weight,
            ir_weight: fusion.ir_weight,
            fusion_memory_time: fusion.fusion_memory_time,
            default_beacon_z: fusion.default_beacon_z,
            default_beacon_confidence: fusion.default_beacon_confidence,
            stage_bounds: StageBounds::from_geometry(stage),
            transform: Box::new(LinearScaleTransform::default()),
            persons: BTreeMap::new(),
            next_person_id: 1,
            reid_to_ir: BTreeMap::new(),
            ir_to_reid: BTreeMap::new(),
            last_timestamp: None,
            stats: FusionStats::default(),
        })
    }

    /// Replace the camera-to-stage transform.
    pub fn with_transform<T: StageTransform + 'static>(self, transform: T) -> Self {
        Self {
            transform: Box::new(transform),
            ..self
        }
    }

    pub fn transform(&self) -> &dyn StageTransform {
        self.transform.as_ref()
    }

    pub fn stage_bounds(&self) -> &StageBounds {
        &self.stage_bounds
    }

    pub fn time_sync_tolerance(&self) -> f64 {
        self.time_sync_tolerance
    }

    /// Fails when `timestamp` is earlier than the last update, or NaN.
    pub fn check_timestamp(&self, timestamp: f64) -> Result<(), TrackError> {
        match self.last_timestamp {
            Some(previous) if !(timestamp >= previous) => Err(TrackError::NonMonotonicTimestamp {
                component: "data_fusion",
                previous,
                current: timestamp,
            }),
            _ => Ok(()),
        }
    }

    /// Fit an affine camera-to-stage transform from measured points and
    /// use it from the next update on.
    pub fn calibrate_coordinate_systems(
        &mut self,
        calibration_points: &[CalibrationPoint],
    ) -> Result<(), TrackError> {
        let transform = AffineTransform::fit(calibration_points)?;
        info!(
            points = calibration_points.len(),
            "coordinate systems calibrated"
        );
        self.transform = Box::new(transform);
        Ok(())
    }

    /// Fuse one frame of tracks and beacons.
    ///
    /// Only active tracks with at least one observation take part. A beacon
    /// without an id is keyed by its index in `ir_beacons`.
    pub fn update_fusion(
        &mut self,
        reid_tracks: &[&Track],
        ir_beacons: &[IrBeacon],
        timestamp: f64,
    ) -> Result<&BTreeMap<usize, Person>, TrackError> {
        self.check_timestamp(timestamp)?;
        let start = Instant::now();
        self.last_timestamp = Some(timestamp);

        let reid_positions = self.extract_reid_positions(reid_tracks);
        let ir_positions = self.extract_ir_positions(ir_beacons, timestamp);

        let reid_ids: Vec<usize> = reid_positions.keys().copied().collect();
        let reid: Vec<Position3D> = reid_positions.values().copied().collect();
        let ir_ids: Vec<usize> = ir_positions.keys().copied().collect();
        let ir: Vec<Position3D> = ir_positions.values().copied().collect();

        let assignment = match_positions(
            &xy_distance_matrix(&reid, &ir),
            self.position_match_threshold,
        );
        self.stats.position_matches += assignment.matches.len();
        if !reid.is_empty() && !ir.is_empty() {
            self.stats.position_mismatches +=
                assignment.unmatched_rows.len() + assignment.unmatched_cols.len();
        }

        let mut updated = HashSet::new();
        let weight_sum = self.reid_weight + self.ir_weight;

        for &(row, col) in &assignment.matches {
            let (reid_id, ir_id) = (reid_ids[row], ir_ids[col]);
            let (reid_pos, ir_pos) = (&reid[row], &ir[col]);
            self.record_association(reid_id, ir_id);

            let fused_x = (reid_pos.x * self.reid_weight + ir_pos.x * self.ir_weight) / weight_sum;
            let fused_y = (reid_pos.y * self.reid_weight + ir_pos.y * self.ir_weight) / weight_sum;
            let fusion_confidence = (reid_pos.confidence * self.reid_weight
                + ir_pos.confidence * self.ir_weight)
                / weight_sum;
            let update = PersonUpdate {
                position: Position3D::new(
                    Vector3::new(fused_x, fused_y, reid_pos.z),
                    fusion_confidence,
                    timestamp,
                    TrackingSource::Fused,
                ),
                reid_confidence: Some(reid_pos.confidence),
                ir_confidence: Some(ir_pos.confidence),
                fusion_confidence,
            };
            self.upsert_person(Some(reid_id), Some(ir_id), &update, timestamp, &mut updated);
        }

        for &row in &assignment.unmatched_rows {
            let reid_pos = reid[row];
            let update = PersonUpdate {
                position: reid_pos,
                reid_confidence: Some(reid_pos.confidence),
                ir_confidence: None,
                fusion_confidence: reid_pos.confidence * REID_ONLY_PENALTY,
            };
            self.upsert_person(Some(reid_ids[row]), None, &update, timestamp, &mut updated);
        }

        for &col in &assignment.unmatched_cols {
            let ir_pos = ir[col];
            let update = PersonUpdate {
                position: ir_pos,
                reid_confidence: None,
                ir_confidence: Some(ir_pos.confidence),
                fusion_confidence: ir_pos.confidence * IR_ONLY_PENALTY,
            };
            self.upsert_person(None, Some(ir_ids[col]), &update, timestamp, &mut updated);
        }

        self.cleanup_old_persons(timestamp);
        self.refresh_stats();
        debug!(
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            persons = self.persons.len(),
            "fusion update"
        );

        Ok(&self.persons)
    }

    /// In-bounds persons, highest fusion confidence first. Equal confidences
    /// keep ascending person id order.
    pub fn get_person_positions(&self) -> Vec<PersonPosition> {
        let mut positions: Vec<PersonPosition> = self
            .persons
            .values()
            .filter(|p| self.stage_bounds.contains(&p.position))
            .map(PersonPosition::from)
            .collect();
        positions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        positions
    }

    pub fn persons(&self) -> &BTreeMap<usize, Person> {
        &self.persons
    }

    pub fn get_person(&self, person_id: usize) -> Option<&Person> {
        self.persons.get(&person_id)
    }

    pub fn stats(&self) -> FusionStats {
        self.stats
    }

    /// Beacon last matched to the given ReID track.
    pub fn associated_beacon(&self, track_id: usize) -> Option<usize> {
        self.reid_to_ir.get(&track_id).copied()
    }

    /// ReID track last matched to the given beacon.
    pub fn associated_track(&self, beacon_id: usize) -> Option<usize> {
        self.ir_to_reid.get(&beacon_id).copied()
    }

    fn extract_reid_positions(&self, reid_tracks: &[&Track]) -> BTreeMap<usize, Position3D> {
        reid_tracks
            .iter()
            .filter(|t| t.is_active())
            .filter_map(|track| {
                let camera = track.last_position()?;
                let stage = self.transform.to_stage(camera);
                Some((
                    track.track_id(),
                    Position3D::new(
                        stage,
                        track.confidence(),
                        track.last_update(),
                        TrackingSource::ReidCamera,
                    ),
                ))
            })
            .collect()
    }

    fn extract_ir_positions(
        &self,
        ir_beacons: &[IrBeacon],
        timestamp: f64,
    ) -> BTreeMap<usize, Position3D> {
        let mut positions = BTreeMap::new();
        for (index, beacon) in ir_beacons.iter().enumerate() {
            let beacon_id = beacon.id.unwrap_or(index);
            let position = Position3D::new(
                Vector3::new(
                    beacon.x,
                    beacon.y,
                    beacon.z.unwrap_or(self.default_beacon_z),
                ),
                beacon.confidence.unwrap_or(self.default_beacon_confidence),
                timestamp,
                TrackingSource::IrBeacon,
            );
            if positions.insert(beacon_id, position).is_some() {
                warn!(beacon_id, "duplicate beacon id in frame, keeping the last one");
            }
        }
        positions
    }

    /// Update the person holding `reid_id` or `ir_id`, or create one.
    ///
    /// Persons already updated in this frame are never picked. After the
    /// call only the returned person holds the given ids.
    fn upsert_person(
        &mut self,
        reid_id: Option<usize>,
        ir_id: Option<usize>,
        update: &PersonUpdate,
        timestamp: f64,
        updated: &mut HashSet<usize>,
    ) -> usize {
        let holds = |p: &Person| {
            (reid_id.is_some() && p.reid_track_id == reid_id)
                || (ir_id.is_some() && p.ir_beacon_id == ir_id)
        };
        let found = self
            .persons
            .values()
            .find(|p| !updated.contains(&p.id) && holds(*p))
            .map(|p| p.id);
        let person_id = match found {
            Some(id) => id,
            None => {
                let id = self.next_person_id;
                self.next_person_id += 1;
                id
            }
        };

        for person in self.persons.values_mut() {
            if person.id == person_id {
                continue;
            }
            if reid_id.is_some() && person.reid_track_id == reid_id {
                person.reid_track_id = None;
            }
            if ir_id.is_some() && person.ir_beacon_id == ir_id {
                person.ir_beacon_id = None;
            }
        }
        // a person stripped of both ids can never be updated again
        self.persons.retain(|&id, person| {
            let keep =
                id == person_id || person.reid_track_id.is_some() || person.ir_beacon_id.is_some();
            if !keep {
                debug!(person_id = id, absorbed_by = person_id, "person merged away");
            }
            keep
        });

        match self.persons.get_mut(&person_id) {
            Some(person) => {
                if reid_id.is_some() {
                    person.reid_track_id = reid_id;
                }
                if ir_id.is_some() {
                    person.ir_beacon_id = ir_id;
                }
                person.apply(update, timestamp);
            }
            None => {
                self.persons.insert(
                    person_id,
                    Person::new(person_id, reid_id, ir_id, update, timestamp),
                );
                debug!(person_id, ?reid_id, ?ir_id, "person created");
            }
        }
        updated.insert(person_id);
        person_id
    }

    fn record_association(&mut self, reid_id: usize, ir_id: usize) {
        if let Some(old_ir) = self.reid_to_ir.insert(reid_id, ir_id) {
            if old_ir != ir_id && self.ir_to_reid.get(&old_ir) == Some(&reid_id) {
                self.ir_to_reid.remove(&old_ir);
            }
        }
        if let Some(old_reid) = self.ir_to_reid.insert(ir_id, reid_id) {
            if old_reid != reid_id && self.reid_to_ir.get(&old_reid) == Some(&ir_id) {
                self.reid_to_ir.remove(&old_reid);
            }
        }
    }

    fn forget_associations(&mut self, person: &Person) {
        if let Some(reid_id) = person.reid_track_id {
            if let Some(ir_id) = self.reid_to_ir.remove(&reid_id) {
                if self.ir_to_reid.get(&ir_id) == Some(&reid_id) {
                    self.ir_to_reid.remove(&ir_id);
                }
            }
        }
        if let Some(ir_id) = person.ir_beacon_id {
            if let Some(reid_id) = self.ir_to_reid.remove(&ir_id) {
                if self.reid_to_ir.get(&reid_id) == Some(&ir_id) {
                    self.reid_to_ir.remove(&reid_id);
                }
            }
        }
    }

    fn cleanup_old_persons(&mut self, timestamp: f64) {
        let expired: Vec<usize> = self
            .persons
            .values()
            .filter(|p| timestamp - p.last_updated > self.fusion_memory_time)
            .map(|p| p.id)
            .collect();
        for person_id in expired {
            if let Some(person) = self.persons.remove(&person_id) {
                self.forget_associations(&person);
                debug!(person_id, "person removed");
            }
        }
    }

    fn refresh_stats(&mut self) {
        let mut reid_only = 0;
        let mut ir_only = 0;
        let mut fused = 0;
        for person in self.persons.values() {
            match (person.reid_track_id, person.ir_beacon_id) {
                (Some(_), Some(_)) => fused += 1,
                (Some(_), None) => reid_only += 1,
                (None, Some(_)) => ir_only += 1,
                (None, None) => {}
            }
        }
        self.stats.total_persons = self.persons.len();
        self.stats.reid_only_persons = reid_only;
        self.stats.ir_only_persons = ir_only;
        self.stats.fused_persons = fused;
    }
}
