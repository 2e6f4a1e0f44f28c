//! Camera-to-stage coordinate transforms
//!
//! Track positions come out of the tracker as (center_x_px, center_y_px,
//! depth_m). A `StageTransform` maps them into the stage frame the IR system
//! reports in.

use crate::error::TrackError;
use nalgebra::{DMatrix, Matrix3x4, Vector3, Vector4};
use std::fmt::Debug;

const MIN_CALIBRATION_POINTS: usize = 4;

pub trait StageTransform: Debug + Send + Sync {
    fn to_stage(&self, camera: &Vector3<f64>) -> Vector3<f64>;
}

/// Uncalibrated placeholder: pixels scaled to meters, Z clamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearScaleTransform {
    pub scale: f64,
    pub z_min: f64,
    pub z_max: f64,
}

impl Default for LinearScaleTransform {
    fn default() -> Self {
        Self {
            scale: 0.01,
            z_min: 0.0,
            z_max: 3.0,
        }
    }
}

impl StageTransform for LinearScaleTransform {
    fn to_stage(&self, camera: &Vector3<f64>) -> Vector3<f64> {
        Vector3::new(
            camera.x * self.scale,
            camera.y * self.scale,
            camera.z.max(self.z_min).min(self.z_max),
        )
    }
}

/// A camera point paired with where it was measured on stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationPoint {
    pub camera: Vector3<f64>,
    pub stage: Vector3<f64>,
}

impl CalibrationPoint {
    pub fn new(camera: Vector3<f64>, stage: Vector3<f64>) -> Self {
        Self { camera, stage }
    }
}

/// `stage = M * [x, y, z, 1]` for a 3x4 calibration matrix `M`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    matrix: Matrix3x4<f64>,
}

impl AffineTransform {
    pub fn new(matrix: Matrix3x4<f64>) -> Self {
        Self { matrix }
    }

    pub fn matrix(&self) -> &Matrix3x4<f64> {
        &self.matrix
    }

    /// Least-squares fit over at least four camera/stage pairs.
    ///
    /// Fails when there are too few points or the camera points are
    /// coplanar, since the system then has no unique solution.
    pub fn fit(points: &[CalibrationPoint]) -> Result<Self, TrackError> {
        if points.len() < MIN_CALIBRATION_POINTS {
            return Err(TrackError::Calibration(format!(
                "need at least {} points, got {}",
                MIN_CALIBRATION_POINTS,
                points.len()
            )));
        }

        let n = points.len();
        let a = DMatrix::from_fn(n, 4, |row, col| match col {
            3 => 1.0,
            _ => points[row].camera[col],
        });
        let b = DMatrix::from_fn(n, 3, |row, col| points[row].stage[col]);

        let svd = a.svd(true, true);
        let largest = svd.singular_values.max();
        let eps = largest.max(1.0) * 1e-9;
        if svd.rank(eps) < 4 {
            return Err(TrackError::Calibration(
                "camera points are degenerate (coplanar or repeated)".to_string(),
            ));
        }
        let solution = svd
            .solve(&b, eps)
            .map_err(|e| TrackError::Calibration(e.to_string()))?;

        // solution is 4x3, the transform is its transpose
        let matrix = Matrix3x4::from_iterator(solution.transpose().iter().cloned());
        Ok(Self { matrix })
    }
}

impl StageTransform for AffineTransform {
    fn to_stage(&self, camera: &Vector3<f64>) -> Vector3<f64> {
        self.matrix * Vector4::new(camera.x, camera.y, camera.z, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nearly_eq::assert_nearly_eq;

    fn known_matrix() -> Matrix3x4<f64> {
        Matrix3x4::new(
            0.01, 0.0, 0.0, -5.0, //
            0.0, -0.01, 0.0, 4.0, //
            0.0, 0.0, 0.5, 0.2,
        )
    }

    fn points_from(matrix: &Matrix3x4<f64>, cameras: &[[f64; 3]]) -> Vec<CalibrationPoint> {
        let transform = AffineTransform::new(*matrix);
        cameras
            .iter()
            .map(|c| {
                let camera = Vector3::new(c[0], c[1], c[2]);
                CalibrationPoint::new(camera, transform.to_stage(&camera))
            })
            .collect()
    }

    #[test]
    fn test_linear_scale() {
        let transform = LinearScaleTransform::default();
        let stage = transform.to_stage(&Vector3::new(100.0, 250.0, 7.5));

        assert_nearly_eq!(stage.x, 1.0, 1e-12);
        assert_nearly_eq!(stage.y, 2.5, 1e-12);
        assert_eq!(stage.z, 3.0);
        assert_eq!(transform.to_stage(&Vector3::new(0.0, 0.0, -1.0)).z, 0.0);
    }

    #[test]
    fn test_affine_fit_recovers_matrix() {
        let matrix = known_matrix();
        let points = points_from(
            &matrix,
            &[
                [0.0, 0.0, 2.0],
                [1920.0, 0.0, 5.0],
                [0.0, 1080.0, 8.0],
                [960.0, 540.0, 12.0],
                [1500.0, 200.0, 3.0],
            ],
        );

        let fitted = AffineTransform::fit(&points).unwrap();
        for (fitted, expected) in fitted.matrix().iter().zip(matrix.iter()) {
            assert_nearly_eq!(*fitted, *expected, 1e-6);
        }

        let stage = fitted.to_stage(&Vector3::new(500.0, 400.0, 6.0));
        assert_nearly_eq!(stage.x, 0.0, 1e-6);
        assert_nearly_eq!(stage.y, 0.0, 1e-6);
        assert_nearly_eq!(stage.z, 3.2, 1e-6);
    }

    #[test]
    fn test_affine_fit_too_few_points() {
        let points = points_from(
            &known_matrix(),
            &[[0.0, 0.0, 2.0], [1.0, 0.0, 2.0], [0.0, 1.0, 3.0]],
        );
        assert!(matches!(
            AffineTransform::fit(&points),
            Err(TrackError::Calibration(_))
        ));
    }

    #[test]
    fn test_affine_fit_coplanar_points() {
        // every camera point at the same depth
        let points = points_from(
            &known_matrix(),
            &[
                [0.0, 0.0, 5.0],
                [100.0, 0.0, 5.0],
                [0.0, 100.0, 5.0],
                [100.0, 100.0, 5.0],
                [50.0, 20.0, 5.0],
            ],
        );
        assert!(matches!(
            AffineTransform::fit(&points),
            Err(TrackError::Calibration(_))
        ));
    }
}
