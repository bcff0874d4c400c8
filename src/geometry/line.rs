use crate::geometry::{cross, normalized, perpendicular, Vec2};

/// Infinite 2D line in normal form: all points `p` with `normal . p == distance`.
///
/// The normal is a unit vector; the direction is the normal rotated by -90
/// degrees so that `perpendicular(direction) == normal`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Line2 {
    normal: Vec2,
    distance: f32,
}

impl Line2 {
    /// Creates a line through `point` along `direction`.
    ///
    /// Returns `None` if `direction` has zero length.
    pub fn new(point: Vec2, direction: Vec2) -> Option<Self> {
        let direction = normalized(&direction)?;
        let normal = perpendicular(&direction);
        Some(Self {
            normal,
            distance: normal.dot(&point),
        })
    }

    /// Creates a line from a normal angle (radians) and signed distance.
    pub fn from_angle_distance(angle: f32, distance: f32) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self {
            normal: Vec2::new(cos, sin),
            distance,
        }
    }

    /// Returns the unit normal.
    pub fn normal(&self) -> Vec2 {
        self.normal
    }

    /// Returns the signed distance of the line from the origin along the normal.
    pub fn distance(&self) -> f32 {
        self.distance
    }

    /// Returns the unit direction.
    pub fn direction(&self) -> Vec2 {
        Vec2::new(self.normal.y, -self.normal.x)
    }

    /// Returns the point of the line closest to the origin.
    pub fn point(&self) -> Vec2 {
        self.normal * self.distance
    }

    /// Returns the same line with the normal flipped so the distance is non-negative.
    pub fn with_positive_distance(&self) -> Self {
        if self.distance < 0.0 {
            Self {
                normal: -self.normal,
                distance: -self.distance,
            }
        } else {
            *self
        }
    }

    /// Signed distance between `point` and the line.
    #[inline]
    pub fn signed_distance(&self, point: &Vec2) -> f32 {
        self.normal.dot(point) - self.distance
    }

    /// Squared distance between `point` and the line.
    #[inline]
    pub fn sqr_distance(&self, point: &Vec2) -> f32 {
        let d = self.signed_distance(point);
        d * d
    }

    /// Intersection of two lines; `None` for (near) parallel lines.
    pub fn intersection(&self, other: &Line2) -> Option<Vec2> {
        let det = cross(&self.normal, &other.normal);
        if det.abs() <= 1e-6 {
            return None;
        }
        let x = (self.distance * other.normal.y - other.distance * self.normal.y) / det;
        let y = (self.normal.x * other.distance - other.normal.x * self.distance) / det;
        Some(Vec2::new(x, y))
    }

    /// Fits a line minimizing the sum of squared orthogonal distances.
    ///
    /// Needs at least two distinct points.
    pub fn fit_least_squares(points: &[Vec2]) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        let n = points.len() as f32;
        let mean = points.iter().fold(Vec2::zeros(), |acc, p| acc + p) / n;

        let mut sxx = 0.0f32;
        let mut sxy = 0.0f32;
        let mut syy = 0.0f32;
        for p in points {
            let d = p - mean;
            sxx += d.x * d.x;
            sxy += d.x * d.y;
            syy += d.y * d.y;
        }
        if sxx + syy <= f32::EPSILON {
            return None;
        }

        // principal axis of the 2x2 scatter matrix
        let angle = 0.5 * (2.0 * sxy).atan2(sxx - syy);
        let direction = Vec2::new(angle.cos(), angle.sin());
        Self::new(mean, direction)
    }

    /// Outlier-tolerant fit: every point pair proposes a line, the proposal
    /// with most points within `inlier_threshold` wins and is refined by a
    /// least-squares fit over its inliers.
    ///
    /// Returns the line and its inlier count.
    pub fn fit_robust(points: &[Vec2], inlier_threshold: f32) -> Option<(Self, usize)> {
        let threshold_sqr = inlier_threshold * inlier_threshold;
        let count_inliers = |line: &Line2| {
            points
                .iter()
                .filter(|p| line.sqr_distance(p) <= threshold_sqr)
                .count()
        };

        let mut best: Option<(Line2, usize)> = None;
        for (i, a) in points.iter().enumerate() {
            for b in &points[i + 1..] {
                let Some(candidate) = Line2::new(*a, b - a) else {
                    continue;
                };
                let inliers = count_inliers(&candidate);
                if best.map_or(true, |(_, n)| inliers > n) {
                    best = Some((candidate, inliers));
                }
            }
        }

        let (proposal, _) = best?;
        let inliers: Vec<Vec2> = points
            .iter()
            .copied()
            .filter(|p| proposal.sqr_distance(p) <= threshold_sqr)
            .collect();
        let refined = Line2::fit_least_squares(&inliers).unwrap_or(proposal);
        let refined_count = count_inliers(&refined);
        Some((refined, refined_count))
    }
}

/// Finite 2D line segment between two end points.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FiniteLine2 {
    pub p0: Vec2,
    pub p1: Vec2,
}

impl FiniteLine2 {
    /// Creates a segment from two end points.
    pub fn new(p0: Vec2, p1: Vec2) -> Self {
        Self { p0, p1 }
    }

    /// Returns end point `0` or `1`.
    #[inline]
    pub fn point(&self, index: usize) -> Vec2 {
        debug_assert!(index < 2);
        if index == 0 {
            self.p0
        } else {
            self.p1
        }
    }

    /// Unit direction from `p0` to `p1`; zero for degenerate segments.
    pub fn direction(&self) -> Vec2 {
        normalized(&(self.p1 - self.p0)).unwrap_or_else(Vec2::zeros)
    }

    /// Length of the segment.
    pub fn length(&self) -> f32 {
        (self.p1 - self.p0).norm()
    }

    /// Returns `true` if both end points coincide.
    pub fn is_degenerate(&self) -> bool {
        (self.p1 - self.p0).norm_squared() <= f32::EPSILON
    }

    /// Infinite line through the segment.
    pub fn infinite_line(&self) -> Option<Line2> {
        Line2::new(self.p0, self.p1 - self.p0)
    }

    /// Distance between `point` and the closest point of the segment.
    pub fn distance(&self, point: &Vec2) -> f32 {
        let d = self.p1 - self.p0;
        let len_sqr = d.norm_squared();
        if len_sqr <= f32::EPSILON {
            return (point - self.p0).norm();
        }
        let t = ((point - self.p0).dot(&d) / len_sqr).clamp(0.0, 1.0);
        (point - (self.p0 + d * t)).norm()
    }
}

#[cfg(test)]
mod tests {
    use super::{FiniteLine2, Line2};
    use crate::geometry::Vec2;

    #[test]
    fn line_from_point_direction_contains_point() {
        let line = Line2::new(Vec2::new(3.0, 4.0), Vec2::new(1.0, 1.0)).unwrap();
        assert!(line.signed_distance(&Vec2::new(3.0, 4.0)).abs() < 1e-5);
        assert!(line.signed_distance(&Vec2::new(5.0, 6.0)).abs() < 1e-5);
        assert!((line.direction().dot(&line.normal())).abs() < 1e-6);
    }

    #[test]
    fn intersection_of_axes() {
        let horizontal = Line2::new(Vec2::new(0.0, 2.0), Vec2::new(1.0, 0.0)).unwrap();
        let vertical = Line2::new(Vec2::new(5.0, 0.0), Vec2::new(0.0, 1.0)).unwrap();
        let p = horizontal.intersection(&vertical).unwrap();
        assert!((p - Vec2::new(5.0, 2.0)).norm() < 1e-5);
        assert!(horizontal.intersection(&horizontal).is_none());
    }

    #[test]
    fn least_squares_recovers_horizontal_line() {
        // noise is symmetric at every x, so the fitted slope is zero
        let points: Vec<Vec2> = (0..10)
            .flat_map(|i| [Vec2::new(i as f32, 7.1), Vec2::new(i as f32, 6.9)])
            .collect();
        let line = Line2::fit_least_squares(&points).unwrap();
        assert!(line.direction().x.abs() > 0.999);
        assert!(line.signed_distance(&Vec2::new(4.5, 7.0)).abs() < 1e-4);
        assert!(line.signed_distance(&Vec2::new(100.0, 7.0)).abs() < 0.01);
    }

    #[test]
    fn robust_fit_ignores_outliers() {
        let mut points: Vec<Vec2> = (0..12).map(|i| Vec2::new(i as f32 * 2.0, 10.0)).collect();
        points.push(Vec2::new(3.0, 40.0));
        points.push(Vec2::new(9.0, -25.0));
        let (line, inliers) = Line2::fit_robust(&points, 1.5).unwrap();
        assert_eq!(inliers, 12);
        assert!(line.signed_distance(&Vec2::new(50.0, 10.0)).abs() < 1e-3);
    }

    #[test]
    fn finite_distance_clamps_to_end_points() {
        let segment = FiniteLine2::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0));
        assert!((segment.distance(&Vec2::new(5.0, 3.0)) - 3.0).abs() < 1e-6);
        assert!((segment.distance(&Vec2::new(13.0, 4.0)) - 5.0).abs() < 1e-6);
        assert!((segment.length() - 10.0).abs() < 1e-6);
    }
}
