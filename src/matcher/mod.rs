//! Matching of junction shapes between two detections.
//!
//! A [`ShapeMatcher`] compares a reference shape with a candidate shape,
//! optionally mapping the candidate through a homography, and grades the
//! pair with a [`MatchType`]. The submodules build on it: aligned
//! one-to-one matching of whole shape sets, merging of duplicate shapes and
//! grouping of shapes along lines.

use crate::geometry::{Homography, Vec2};
use crate::shape::ShapeView;
use crate::util::math::cos_deg;

mod aligned;
mod lines;
pub mod merge;

pub use aligned::{
    build_reference_grid, determine_aligned_matching, AlignedMatching, AlignedMatchingParams,
};
pub use lines::{
    determine_horizontal_groups, determine_parallel_line_groups, determine_shapes_along_lines,
    ShapeLineGroup,
};
pub use merge::{
    merge_l_shapes, merge_t_and_l_shapes, merge_t_shapes, merge_x_and_t_shapes, merge_x_shapes,
};

/// Grade of a shape pair, ordered from worst to best.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchType {
    /// Not evaluated.
    Unknown,
    /// Positions are too far apart.
    WrongPosition,
    /// Positions agree but the shapes do not.
    NoMatch,
    /// The candidate may be a partial view of the reference, e.g. a T-shape
    /// seen as an L-shape.
    PartialMatch,
    /// Same type and compatible directions.
    PerfectMatch,
}

/// Compares shapes by position and direction.
///
/// Candidate positions are shifted by the candidate offset before the
/// optional homography is applied.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ShapeMatcher {
    maximal_distance: f32,
    sqr_maximal_distance: f32,
    candidate_offset: Vec2,
    parallel_cos: f32,
    diagonal_low_cos: f32,
    diagonal_high_cos: f32,
    perpendicular_cos: f32,
}

impl ShapeMatcher {
    /// Creates a matcher accepting positions within `maximal_distance` and
    /// directions within `angle_threshold_deg` (at most 45 degrees).
    pub fn new(maximal_distance: f32, angle_threshold_deg: f32) -> Self {
        debug_assert!(maximal_distance >= 0.0);
        debug_assert!((0.0..=45.0).contains(&angle_threshold_deg));
        Self {
            maximal_distance,
            sqr_maximal_distance: maximal_distance * maximal_distance,
            candidate_offset: Vec2::zeros(),
            parallel_cos: cos_deg(angle_threshold_deg),
            diagonal_low_cos: cos_deg(45.0 + angle_threshold_deg),
            diagonal_high_cos: cos_deg(45.0 - angle_threshold_deg),
            perpendicular_cos: cos_deg(90.0 - angle_threshold_deg),
        }
    }

    /// Adds `offset` to every candidate position, e.g. the origin of the
    /// sub-image the candidates were detected in.
    pub fn with_candidate_offset(mut self, offset: Vec2) -> Self {
        self.candidate_offset = offset;
        self
    }

    pub fn maximal_distance(&self) -> f32 {
        self.maximal_distance
    }

    pub fn candidate_offset(&self) -> Vec2 {
        self.candidate_offset
    }

    /// Candidate position in the reference frame; `None` if the homography
    /// maps it to infinity.
    pub fn transformed_position(
        &self,
        candidate_position: &Vec2,
        homography: Option<&Homography>,
    ) -> Option<Vec2> {
        let shifted = candidate_position + self.candidate_offset;
        match homography {
            Some(h) => h.transform(&shifted),
            None => Some(shifted),
        }
    }

    pub fn are_positions_close(
        &self,
        reference_position: &Vec2,
        candidate_position: &Vec2,
        homography: Option<&Homography>,
    ) -> bool {
        self.transformed_position(candidate_position, homography)
            .is_some_and(|p| (p - reference_position).norm_squared() <= self.sqr_maximal_distance)
    }

    /// Cosine between a reference direction and a candidate direction
    /// mapped through `homography` at the candidate position. Falls back to
    /// the untransformed direction where the mapping degenerates.
    pub fn cos_value_directions(
        &self,
        reference_direction: &Vec2,
        candidate_direction: &Vec2,
        candidate_position: &Vec2,
        homography: Option<&Homography>,
    ) -> f32 {
        let mapped = homography.and_then(|h| {
            let tail = self.candidate_offset + candidate_position;
            h.transform_direction(&tail, candidate_direction)
        });
        reference_direction.dot(&mapped.unwrap_or(*candidate_direction))
    }

    /// Grades `candidate` against `reference`; pairs further apart than the
    /// maximal distance are [`MatchType::WrongPosition`].
    pub fn match_shapes(
        &self,
        reference: ShapeView<'_>,
        candidate: ShapeView<'_>,
        homography: Option<&Homography>,
    ) -> MatchType {
        if !self.are_positions_close(&reference.position(), &candidate.position(), homography) {
            return MatchType::WrongPosition;
        }
        self.match_shapes_unchecked(reference, candidate, homography)
    }

    /// Grades a pair by type and direction only; positions are assumed to
    /// have been checked by the caller.
    pub fn match_shapes_unchecked(
        &self,
        reference: ShapeView<'_>,
        candidate: ShapeView<'_>,
        homography: Option<&Homography>,
    ) -> MatchType {
        let at = candidate.position();
        let cos = |r: &Vec2, c: &Vec2| self.cos_value_directions(r, c, &at, homography);
        let grade = |matched: bool, on_match: MatchType| {
            if matched {
                on_match
            } else {
                MatchType::NoMatch
            }
        };

        match (reference, candidate) {
            (ShapeView::L(r), ShapeView::L(c)) => grade(
                cos(&r.direction, &c.direction) >= self.parallel_cos,
                MatchType::PerfectMatch,
            ),
            (ShapeView::T(r), ShapeView::T(c)) => grade(
                cos(&r.direction, &c.direction) >= self.parallel_cos,
                MatchType::PerfectMatch,
            ),
            (ShapeView::T(r), ShapeView::L(c)) => {
                let value = cos(&r.direction, &c.direction);
                grade(self.is_diagonal(value), MatchType::PartialMatch)
            }
            (ShapeView::T(r), ShapeView::X(c)) => grade(
                cos(&r.direction, &c.direction0).abs() >= self.parallel_cos
                    || cos(&r.direction, &c.direction1).abs() >= self.parallel_cos,
                MatchType::PartialMatch,
            ),
            (ShapeView::X(r), ShapeView::T(c)) => grade(
                cos(&r.direction0, &c.direction).abs() >= self.parallel_cos
                    || cos(&r.direction1, &c.direction).abs() >= self.parallel_cos,
                MatchType::PartialMatch,
            ),
            (ShapeView::X(r), ShapeView::X(c)) => {
                let first = cos(&r.direction0, &c.direction0).abs();
                let second = cos(&r.direction1, &c.direction1).abs();
                grade(
                    self.is_parallel_or_perpendicular(first)
                        && self.is_parallel_or_perpendicular(second),
                    MatchType::PerfectMatch,
                )
            }
            (ShapeView::X(r), ShapeView::L(c)) => grade(
                self.is_diagonal(cos(&r.direction0, &c.direction).abs())
                    && self.is_diagonal(cos(&r.direction1, &c.direction).abs()),
                MatchType::PartialMatch,
            ),
            (ShapeView::L(_), ShapeView::T(_) | ShapeView::X(_)) => MatchType::NoMatch,
        }
    }

    fn is_diagonal(&self, cos: f32) -> bool {
        cos >= self.diagonal_low_cos && cos <= self.diagonal_high_cos
    }

    fn is_parallel_or_perpendicular(&self, abs_cos: f32) -> bool {
        abs_cos >= self.parallel_cos || abs_cos <= self.perpendicular_cos
    }
}

/// Checks whether `direction` points like `shape` within the angle whose
/// cosine is `min_cos`. X-shapes accept either of their directions.
pub fn are_directions_similar(direction: &Vec2, shape: ShapeView<'_>, min_cos: f32) -> bool {
    match shape {
        ShapeView::L(l) => direction.dot(&l.direction) >= min_cos,
        ShapeView::T(t) => direction.dot(&t.direction) >= min_cos,
        ShapeView::X(x) => {
            direction.dot(&x.direction0) >= min_cos || direction.dot(&x.direction1) >= min_cos
        }
    }
}

/// Like [`are_directions_similar`] but ignoring the sign of the directions.
pub fn are_directions_parallel(direction: &Vec2, shape: ShapeView<'_>, min_cos: f32) -> bool {
    match shape {
        ShapeView::L(l) => direction.dot(&l.direction).abs() >= min_cos,
        ShapeView::T(t) => direction.dot(&t.direction).abs() >= min_cos,
        ShapeView::X(x) => {
            direction.dot(&x.direction0).abs() >= min_cos
                || direction.dot(&x.direction1).abs() >= min_cos
        }
    }
}
