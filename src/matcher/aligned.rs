//! One-to-one matching of two shape sets that are already roughly aligned.

use crate::geometry::{Homography, SpatialGrid, Vec2};
use crate::matcher::{MatchType, ShapeMatcher};
use crate::shape::ShapeView;
use crate::trace::{trace_event, trace_span};

/// Parameters of [`determine_aligned_matching`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AlignedMatchingParams {
    /// Maximal distance between a reference and a transformed candidate.
    pub maximal_distance: f32,
    /// Angular tolerance of the shape comparison, in degrees.
    pub angle_threshold_deg: f32,
    /// A match is ambiguous if the second closest reference is less than
    /// `ambiguity_ratio * maximal_distance` further away than the closest.
    pub ambiguity_ratio: f32,
    /// Added to candidate positions before the homography is applied.
    pub candidate_offset: Vec2,
    /// Maps shifted candidate positions into the reference frame.
    pub homography: Option<Homography>,
}

impl Default for AlignedMatchingParams {
    fn default() -> Self {
        Self {
            maximal_distance: 5.0,
            angle_threshold_deg: 20.0,
            ambiguity_ratio: 0.40,
            candidate_offset: Vec2::zeros(),
            homography: None,
        }
    }
}

/// Result of [`determine_aligned_matching`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AlignedMatching {
    /// `(reference index, candidate index)` pairs; every reference and every
    /// candidate appears at most once.
    pub matches: Vec<(u32, u32)>,
    pub unmatched_references: Vec<u32>,
    pub unmatched_candidates: Vec<u32>,
    /// Mean squared distance of the accepted matches; `None` without
    /// matches.
    pub average_sqr_distance: Option<f32>,
}

/// Builds the lookup grid expected by [`determine_aligned_matching`]: a
/// `width` x `height` area binned so that one cell plus its neighbors covers
/// `maximal_distance`, with every cell holding its 3x3 neighborhood.
///
/// References outside the area are stored in the nearest border cell.
pub fn build_reference_grid(
    references: &[ShapeView<'_>],
    width: usize,
    height: usize,
    maximal_distance: f32,
) -> SpatialGrid {
    let (horizontal_bins, vertical_bins) =
        SpatialGrid::ideal_bins_neighborhood9(width, height, maximal_distance);
    let mut grid = SpatialGrid::new(
        0.0,
        0.0,
        width as f32,
        height as f32,
        horizontal_bins,
        vertical_bins,
    );
    for (n, shape) in references.iter().enumerate() {
        let position = shape.position();
        grid.push(
            grid.clamped_horizontal_bin(position.x),
            grid.clamped_vertical_bin(position.y),
            n as u32,
        );
    }
    grid.with_copied_neighborhood8()
}

/// Matches every candidate to the closest compatible reference.
///
/// `grid` must index `reference` with copied 8-neighborhoods (see
/// [`build_reference_grid`]). Candidates landing more than one cell outside
/// the grid stay unmatched, as do candidates whose two closest compatible
/// references are nearly equally far. References claimed by more than one
/// candidate drop all their claims.
pub fn determine_aligned_matching(
    reference: &[ShapeView<'_>],
    grid: &SpatialGrid,
    candidates: &[ShapeView<'_>],
    params: &AlignedMatchingParams,
) -> AlignedMatching {
    let _span = trace_span!(
        "aligned_matching",
        references = reference.len(),
        candidates = candidates.len()
    )
    .entered();

    let mut result = AlignedMatching::default();
    if reference.is_empty() || candidates.is_empty() {
        result.unmatched_references = (0..reference.len() as u32).collect();
        result.unmatched_candidates = (0..candidates.len() as u32).collect();
        return result;
    }

    let matcher = ShapeMatcher::new(params.maximal_distance, params.angle_threshold_deg)
        .with_candidate_offset(params.candidate_offset);
    let homography = params.homography.as_ref().filter(|h| !h.is_identity());
    let sqr_maximal_distance = params.maximal_distance * params.maximal_distance;
    let ambiguity_gap = params.maximal_distance * params.ambiguity_ratio;
    let horizontal_bins = grid.horizontal_bins() as i32;
    let vertical_bins = grid.vertical_bins() as i32;

    let mut claims = vec![0u32; reference.len()];
    let mut matches: Vec<(u32, u32, f32)> = Vec::with_capacity(candidates.len());

    for (n, candidate) in candidates.iter().enumerate() {
        let Some(position) = matcher.transformed_position(&candidate.position(), homography)
        else {
            result.unmatched_candidates.push(n as u32);
            continue;
        };

        let bx = grid.horizontal_bin(position.x);
        let by = grid.vertical_bin(position.y);
        if bx < -1 || by < -1 || bx > horizontal_bins || by > vertical_bins {
            result.unmatched_candidates.push(n as u32);
            continue;
        }
        let bx = bx.clamp(0, horizontal_bins - 1) as usize;
        let by = by.clamp(0, vertical_bins - 1) as usize;

        let mut best: Option<(u32, f32)> = None;
        let mut second_sqr_distance = f32::MAX;
        for &index in grid.cell(bx, by) {
            let shape = reference[index as usize];
            let sqr_distance = (shape.position() - position).norm_squared();
            if sqr_distance > sqr_maximal_distance {
                continue;
            }
            if matcher.match_shapes_unchecked(shape, *candidate, homography)
                < MatchType::PartialMatch
            {
                continue;
            }
            match best {
                Some((_, best_sqr)) if sqr_distance >= best_sqr => {
                    second_sqr_distance = second_sqr_distance.min(sqr_distance);
                }
                _ => {
                    if let Some((_, best_sqr)) = best {
                        second_sqr_distance = best_sqr;
                    }
                    best = Some((index, sqr_distance));
                }
            }
        }

        let accepted = best.filter(|&(_, best_sqr)| {
            second_sqr_distance == f32::MAX
                || second_sqr_distance.sqrt() - best_sqr.sqrt() >= ambiguity_gap
        });
        match accepted {
            Some((index, sqr_distance)) => {
                claims[index as usize] += 1;
                matches.push((index, n as u32, sqr_distance));
            }
            None => result.unmatched_candidates.push(n as u32),
        }
    }

    matches.retain(|&(index, candidate, _)| {
        let unique = claims[index as usize] == 1;
        if !unique {
            result.unmatched_candidates.push(candidate);
        }
        unique
    });
    result.unmatched_candidates.sort_unstable();

    result.unmatched_references = claims
        .iter()
        .enumerate()
        .filter(|(_, &count)| count != 1)
        .map(|(n, _)| n as u32)
        .collect();
    if !matches.is_empty() {
        let sum: f32 = matches.iter().map(|&(_, _, d)| d).sum();
        result.average_sqr_distance = Some(sum / matches.len() as f32);
    }
    result.matches = matches.iter().map(|&(r, c, _)| (r, c)).collect();

    trace_event!(
        "aligned_matches",
        matches = result.matches.len(),
        unmatched_candidates = result.unmatched_candidates.len()
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{TShape, XShape};

    fn t(x: f32, y: f32) -> TShape {
        TShape::new(Vec2::new(x, y), Vec2::y(), 1.0)
    }

    fn views(shapes: &[TShape]) -> Vec<ShapeView<'_>> {
        shapes.iter().map(ShapeView::from).collect()
    }

    #[test]
    fn matches_nearby_compatible_shapes() {
        let references = [t(10.0, 10.0), t(50.0, 10.0), t(90.0, 40.0)];
        let candidates = [t(11.0, 10.5), t(49.0, 11.0), t(200.0, 40.0)];
        let reference_views = views(&references);
        let candidate_views = views(&candidates);
        let grid = build_reference_grid(&reference_views, 100, 50, 5.0);

        let result = determine_aligned_matching(
            &reference_views,
            &grid,
            &candidate_views,
            &AlignedMatchingParams::default(),
        );
        assert_eq!(result.matches, vec![(0, 0), (1, 1)]);
        assert_eq!(result.unmatched_references, vec![2]);
        assert_eq!(result.unmatched_candidates, vec![2]);
        let expected = (1.25 + 2.0) / 2.0;
        assert!((result.average_sqr_distance.unwrap() - expected).abs() < 1e-4);
    }

    #[test]
    fn incompatible_types_do_not_match() {
        let references = [t(10.0, 10.0)];
        let crossing = [XShape::new(
            Vec2::new(10.0, 10.0),
            Vec2::new(1.0, 1.0).normalize(),
            Vec2::new(-1.0, 1.0).normalize(),
            1.0,
        )];
        let reference_views = views(&references);
        let candidate_views: Vec<ShapeView<'_>> = crossing.iter().map(ShapeView::from).collect();
        let grid = build_reference_grid(&reference_views, 40, 40, 5.0);
        let result = determine_aligned_matching(
            &reference_views,
            &grid,
            &candidate_views,
            &AlignedMatchingParams::default(),
        );
        assert!(result.matches.is_empty());
        assert_eq!(result.average_sqr_distance, None);
    }

    #[test]
    fn ambiguous_candidates_are_rejected() {
        let references = [t(10.0, 10.0), t(13.0, 10.0)];
        let candidates = [t(11.4, 10.0)];
        let reference_views = views(&references);
        let candidate_views = views(&candidates);
        let grid = build_reference_grid(&reference_views, 40, 40, 5.0);
        let result = determine_aligned_matching(
            &reference_views,
            &grid,
            &candidate_views,
            &AlignedMatchingParams::default(),
        );
        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_candidates, vec![0]);
        assert_eq!(result.unmatched_references, vec![0, 1]);
    }

    #[test]
    fn shared_references_lose_all_claims() {
        let references = [t(10.0, 10.0), t(30.0, 30.0)];
        let candidates = [t(9.0, 10.0), t(30.5, 30.0), t(11.0, 10.0)];
        let reference_views = views(&references);
        let candidate_views = views(&candidates);
        let grid = build_reference_grid(&reference_views, 40, 40, 5.0);
        let result = determine_aligned_matching(
            &reference_views,
            &grid,
            &candidate_views,
            &AlignedMatchingParams::default(),
        );
        assert_eq!(result.matches, vec![(1, 1)]);
        assert_eq!(result.unmatched_references, vec![0]);
        assert_eq!(result.unmatched_candidates, vec![0, 2]);
    }

    #[test]
    fn offset_and_homography_move_candidates() {
        let references = [t(20.0, 20.0)];
        let candidates = [t(5.0, 10.0)];
        let reference_views = views(&references);
        let candidate_views = views(&candidates);
        let grid = build_reference_grid(&reference_views, 40, 40, 3.0);

        let params = AlignedMatchingParams {
            maximal_distance: 3.0,
            candidate_offset: Vec2::new(5.0, 0.0),
            homography: Some(Homography::from_row_slice(&[
                1.0, 0.0, 10.0, 0.0, 1.0, 10.0, 0.0, 0.0, 1.0,
            ])),
            ..AlignedMatchingParams::default()
        };
        let result = determine_aligned_matching(&reference_views, &grid, &candidate_views, &params);
        assert_eq!(result.matches, vec![(0, 0)]);

        let without = AlignedMatchingParams {
            homography: None,
            ..params
        };
        let result =
            determine_aligned_matching(&reference_views, &grid, &candidate_views, &without);
        assert!(result.matches.is_empty());
    }
}
