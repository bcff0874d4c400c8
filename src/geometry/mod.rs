//! 2D geometry primitives: vectors, lines, homographies, spatial grids and
//! a Bresenham stepper.

mod bresenham;
mod grid;
mod homography;
mod line;

pub use bresenham::{border_intersection, Bresenham};
pub use grid::SpatialGrid;
pub use homography::Homography;
pub use line::{FiniteLine2, Line2};

/// 2D vector/point type used throughout the crate.
pub type Vec2 = nalgebra::Vector2<f32>;

/// Returns `v` rotated by +90 degrees: `(-y, x)`.
#[inline]
pub fn perpendicular(v: &Vec2) -> Vec2 {
    Vec2::new(-v.y, v.x)
}

/// 2D cross product (z component of the 3D cross product).
#[inline]
pub fn cross(a: &Vec2, b: &Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

/// Returns the unit vector of `v`, or `None` if `v` has zero length.
#[inline]
pub fn normalized(v: &Vec2) -> Option<Vec2> {
    let norm = v.norm();
    if norm > f32::EPSILON {
        Some(v / norm)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{cross, normalized, perpendicular, Vec2};

    #[test]
    fn perpendicular_rotates_counter_clockwise() {
        let v = Vec2::new(1.0, 0.0);
        assert_eq!(perpendicular(&v), Vec2::new(0.0, 1.0));
        assert!(cross(&v, &perpendicular(&v)) > 0.0);
    }

    #[test]
    fn normalized_rejects_zero() {
        assert!(normalized(&Vec2::zeros()).is_none());
        let unit = normalized(&Vec2::new(3.0, 4.0)).unwrap();
        assert!((unit.norm() - 1.0).abs() < 1e-6);
    }
}
