use nalgebra::{Matrix3, Vector3};

use crate::geometry::{normalized, Vec2};
use crate::trace::trace_event;

const EPS: f32 = 1e-9;
const SINGULAR_EPS: f32 = 1e-8;

/// Projective 2D transformation mapping candidate coordinates into the
/// reference frame.
///
/// A (near) singular matrix is replaced by the identity at construction.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Homography {
    matrix: Matrix3<f32>,
    identity: bool,
}

impl Default for Homography {
    fn default() -> Self {
        Self::identity()
    }
}

impl Homography {
    /// The identity transformation.
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
            identity: true,
        }
    }

    /// Wraps a 3x3 matrix; singular input falls back to the identity.
    pub fn new(matrix: Matrix3<f32>) -> Self {
        let det = matrix.determinant();
        if !det.is_finite() || det.abs() <= SINGULAR_EPS {
            trace_event!("homography_singular", determinant = det);
            return Self::identity();
        }
        let identity = (matrix - Matrix3::identity())
            .iter()
            .all(|v| v.abs() <= f32::EPSILON);
        Self { matrix, identity }
    }

    /// Builds a homography from nine row-major values.
    pub fn from_row_slice(values: &[f32; 9]) -> Self {
        Self::new(Matrix3::from_row_slice(values))
    }

    /// The underlying matrix.
    pub fn matrix(&self) -> &Matrix3<f32> {
        &self.matrix
    }

    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Maps `point`; `None` if it lands on the line at infinity.
    pub fn transform(&self, point: &Vec2) -> Option<Vec2> {
        if self.identity {
            return Some(*point);
        }
        let v = self.matrix * Vector3::new(point.x, point.y, 1.0);
        let w = v.z;
        if !w.is_finite() || w.abs() <= EPS {
            return None;
        }
        let out = Vec2::new(v.x / w, v.y / w);
        if out.x.is_finite() && out.y.is_finite() {
            Some(out)
        } else {
            None
        }
    }

    /// Maps a unit direction anchored at `tail` and renormalizes it.
    pub fn transform_direction(&self, tail: &Vec2, direction: &Vec2) -> Option<Vec2> {
        if self.identity {
            return Some(*direction);
        }
        let start = self.transform(tail)?;
        let end = self.transform(&(tail + direction))?;
        normalized(&(end - start))
    }
}
