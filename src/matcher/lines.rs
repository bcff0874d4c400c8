//! Grouping of shapes along (roughly horizontal) lines.

use crate::geometry::{border_intersection, Bresenham, Line2, SpatialGrid, Vec2};
use crate::image::ImageView;
use crate::matcher::are_directions_parallel;
use crate::nms::{suppress_by_radius, NonMaximumSuppression, Region, StrengthPosition};
use crate::shape::ShapeView;
use crate::trace::{trace_event, trace_span};
use crate::util::math::{cos_deg, wrap_rad_positive};
use crate::util::{JunctionError, JunctionResult};

/// Each normal votes for all rotations within this many degrees.
const ROTATION_RANGE_DEG: i32 = 15;

/// First Hough angle, in degrees; the accumulator covers 45..=135.
const ANGLE_START_DEG: i32 = 45;
const ANGLE_BINS: usize = 91;

const PEAK_RADIUS: f32 = 6.0;

/// Maximal distance between a line and a shape it claims.
const CLAIM_DISTANCE: f32 = 3.0;
const CLAIM_ANGLE_DEG: f32 = 30.0;

/// Shapes lying on one line.
#[derive(Clone, Debug, PartialEq)]
pub struct ShapeLineGroup {
    /// Indices into the input shapes.
    pub indices: Vec<u32>,
    /// Least-squares line through the shape positions, if requested.
    pub line: Option<Line2>,
}

/// Normal a shape contributes to the line vote; L-shapes do not vote.
fn voting_normal(shape: ShapeView<'_>) -> Option<Vec2> {
    match shape {
        ShapeView::T(t) => Some(t.direction),
        ShapeView::X(x) => {
            if x.direction0.y.abs() > x.direction1.y.abs() {
                Some(x.direction0)
            } else {
                Some(x.direction1)
            }
        }
        ShapeView::L(_) => None,
    }
}

/// Finds lines with normals between 45 and 135 degrees that pass through at
/// least `minimal_shapes` T- or X-shapes.
///
/// Every shape votes in a Hough accumulator (one-pixel distance bins,
/// one-degree angle bins) with its normal and all rotations of it within
/// +-15 degrees. Each peak line then claims the unclaimed shapes within
/// three pixels whose direction is parallel to the line normal within 30
/// degrees, strongest peaks first. Groups are sorted by size, largest
/// first; with `fit_lines` each group carries a refitted line.
pub fn determine_shapes_along_lines(
    width: usize,
    height: usize,
    shapes: &[ShapeView<'_>],
    minimal_shapes: usize,
    fit_lines: bool,
) -> JunctionResult<Vec<ShapeLineGroup>> {
    if width == 0 || height == 0 {
        return Err(JunctionError::InvalidDimensions { width, height });
    }
    if minimal_shapes < 2 {
        return Err(JunctionError::InvalidParameter {
            name: "minimal_shapes",
            reason: "must be at least 2",
        });
    }
    let _span = trace_span!("shapes_along_lines", shapes = shapes.len()).entered();

    let distance_bins = width.max(height);
    let mut votes = vec![0u32; distance_bins * ANGLE_BINS];
    let rotations: Vec<(f32, f32)> = (-ROTATION_RANGE_DEG..=ROTATION_RANGE_DEG)
        .map(|deg| (deg as f32).to_radians().sin_cos())
        .collect();

    for shape in shapes {
        let Some(normal) = voting_normal(*shape) else {
            continue;
        };
        let position = shape.position();
        for &(sin, cos) in &rotations {
            let rotated = Vec2::new(cos * normal.x - sin * normal.y, sin * normal.x + cos * normal.y);
            let mut angle = rotated.y.atan2(rotated.x);
            let mut distance = rotated.dot(&position);
            if distance < 0.0 {
                distance = -distance;
                angle += std::f32::consts::PI;
            }
            let angle = wrap_rad_positive(angle).to_degrees() - ANGLE_START_DEG as f32;

            let distance_bin = (distance + 0.5) as i64;
            let angle_bin = (angle + 0.5) as i64;
            if (0..distance_bins as i64).contains(&distance_bin)
                && (0..ANGLE_BINS as i64).contains(&angle_bin)
            {
                votes[angle_bin as usize * distance_bins + distance_bin as usize] += 1;
            }
        }
    }

    let accumulator = ImageView::from_slice(&votes, distance_bins, ANGLE_BINS)?;
    let full = Region::new(0, 0, distance_bins as u32, ANGLE_BINS as u32);
    let mut nms = NonMaximumSuppression::new(distance_bins as u32, ANGLE_BINS as u32, 0);
    nms.add_candidates(accumulator, full, 4u32.max(minimal_shapes as u32 / 4))?;
    let peaks = nms.suppress_non_maximum(full, false)?;
    let mut peaks = suppress_by_radius(
        distance_bins as u32,
        ANGLE_BINS as u32,
        &peaks,
        PEAK_RADIUS,
        false,
    );
    peaks.sort_by(StrengthPosition::compare_strength_desc);

    let lines = peaks.iter().map(|peak| {
        let angle = ((ANGLE_START_DEG + peak.y as i32) as f32).to_radians();
        Line2::from_angle_distance(angle, peak.x as f32)
    });

    let cell_bins = |extent: usize| (extent / PEAK_RADIUS as usize).clamp(1, 20);
    let mut grid = SpatialGrid::new(
        0.0,
        0.0,
        width as f32,
        height as f32,
        cell_bins(width),
        cell_bins(height),
    );
    for (n, shape) in shapes.iter().enumerate() {
        grid.insert(&shape.position(), n as u32);
    }

    let sqr_claim_distance = CLAIM_DISTANCE * CLAIM_DISTANCE;
    let claim_cos = cos_deg(CLAIM_ANGLE_DEG);
    let horizontal_bins = grid.horizontal_bins() as i32;
    let vertical_bins = grid.vertical_bins() as i32;
    let mut used = vec![false; shapes.len()];
    let mut groups: Vec<(Vec<u32>, Line2)> = Vec::new();

    for line in lines {
        let Some((start, end)) = border_intersection(
            &line,
            0.0,
            0.0,
            (width - 1) as f32,
            (height - 1) as f32,
        ) else {
            continue;
        };
        let first = (
            grid.clamped_horizontal_bin(start.x) as i32,
            grid.clamped_vertical_bin(start.y) as i32,
        );
        let last = (
            grid.clamped_horizontal_bin(end.x) as i32,
            grid.clamped_vertical_bin(end.y) as i32,
        );

        let mut indices = Vec::new();
        let cells = Bresenham::new(first.0, first.1, last.0, last.1).chain(std::iter::once(last));
        for (bx, by) in cells {
            for y in (by - 1).max(0)..(by + 2).min(vertical_bins) {
                for x in (bx - 1).max(0)..(bx + 2).min(horizontal_bins) {
                    for &index in grid.cell(x as usize, y as usize) {
                        let shape = shapes[index as usize];
                        if !used[index as usize]
                            && line.sqr_distance(&shape.position()) <= sqr_claim_distance
                            && are_directions_parallel(&line.normal(), shape, claim_cos)
                        {
                            used[index as usize] = true;
                            indices.push(index);
                        }
                    }
                }
            }
        }

        if indices.len() >= minimal_shapes {
            groups.push((indices, line));
        }
    }

    groups.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    trace_event!("shape_lines", lines = peaks.len(), groups = groups.len());

    Ok(groups
        .into_iter()
        .map(|(indices, hough_line)| {
            let line = fit_lines.then(|| {
                let points: Vec<Vec2> = indices
                    .iter()
                    .map(|&n| shapes[n as usize].position())
                    .collect();
                Line2::fit_least_squares(&points).unwrap_or(hough_line)
            });
            ShapeLineGroup { indices, line }
        })
        .collect())
}

/// Greedily groups lines whose normals differ by at most
/// `maximal_angle_deg`.
///
/// Lines are expected in order of importance: each unused line opens a
/// group and absorbs every later unused line parallel to it. Groups with at
/// least `minimal_lines` members are returned, largest first.
pub fn determine_parallel_line_groups(
    lines: &[Line2],
    maximal_angle_deg: f32,
    minimal_lines: usize,
) -> Vec<Vec<u32>> {
    if lines.is_empty() {
        return Vec::new();
    }
    let normals: Vec<Vec2> = lines
        .iter()
        .map(|line| line.with_positive_distance().normal())
        .collect();
    let min_cos = cos_deg(maximal_angle_deg);
    let mut used = vec![false; lines.len()];
    let mut groups = Vec::new();

    for interest in 0..lines.len() - 1 {
        if used[interest] {
            continue;
        }
        let mut group = vec![interest as u32];
        for test in interest + 1..lines.len() {
            if !used[test] && normals[interest].dot(&normals[test]) >= min_cos {
                used[test] = true;
                group.push(test as u32);
            }
        }
        if group.len() >= minimal_lines {
            groups.push(group);
        }
    }

    groups.sort_by(|a, b| b.len().cmp(&a.len()));
    groups
}

/// Groups positions into horizontal bands.
///
/// Positions are binned by `y` with a bin size of about
/// `maximal_group_radius`; every local histogram maximum collects the
/// positions of its own and both neighboring bins that lie within the radius
/// of its center. Returns the groups with at least `minimal_group_size`
/// members together with their mean `y`.
pub fn determine_horizontal_groups(
    height: u32,
    positions: &[Vec2],
    minimal_group_size: usize,
    maximal_group_radius: f32,
) -> (Vec<Vec<u32>>, Vec<f32>) {
    let mut groups = Vec::new();
    let mut means = Vec::new();
    if height == 0 || !(maximal_group_radius > 0.0) {
        return (groups, means);
    }

    let bins = ((height as f32 / maximal_group_radius + 0.5) as u32).min(height * 100) as usize;
    if bins < 3 {
        return (groups, means);
    }
    let position_to_bin = bins as f32 / height as f32;
    let bin_to_position = height as f32 / bins as f32;

    // one spare bin for positions rounding onto the upper border
    let mut histogram: Vec<Vec<u32>> = vec![Vec::new(); bins + 1];
    for (n, p) in positions.iter().enumerate() {
        if p.y >= 0.0 && p.y < height as f32 {
            let bin = ((p.y * position_to_bin) as usize).min(bins);
            histogram[bin].push(n as u32);
        }
    }

    let sqr_radius = maximal_group_radius * maximal_group_radius;
    let mut n = 1;
    while n < bins - 1 {
        let count = histogram[n].len();
        if histogram[n - 1].len() < count && count >= histogram[n + 1].len() {
            let mut group = Vec::new();
            let mut sum = 0.0f32;
            for bin in n - 1..=n + 1 {
                let center = (bin as f32 + 0.5) * bin_to_position;
                for &index in &histogram[bin] {
                    let y = positions[index as usize].y;
                    if (y - center) * (y - center) <= sqr_radius {
                        group.push(index);
                        sum += y;
                    }
                }
            }
            if group.len() >= minimal_group_size {
                means.push(sum / group.len() as f32);
                groups.push(group);
                // the next bin cannot be a local maximum
                n += 1;
            }
        }
        n += 1;
    }

    (groups, means)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{LShape, TShape, XShape};

    #[test]
    fn t_shapes_on_a_horizontal_line() {
        let mut t_shapes: Vec<TShape> = (1..=8)
            .map(|n| TShape::new(Vec2::new(n as f32 * 10.0, 50.0), Vec2::y(), 1.0))
            .collect();
        t_shapes.push(TShape::new(Vec2::new(50.0, 80.0), Vec2::y(), 1.0));
        let crossing = XShape::new(Vec2::new(90.0, 50.0), Vec2::x(), Vec2::y(), 1.0);
        let corner = LShape::new(
            Vec2::new(45.0, 50.0),
            Vec2::y(),
            Vec2::new(1.0, 1.0).normalize(),
            Vec2::new(-1.0, 1.0).normalize(),
            1.0,
        );

        let mut shapes: Vec<ShapeView<'_>> = t_shapes.iter().map(ShapeView::from).collect();
        shapes.push(ShapeView::from(&crossing));
        shapes.push(ShapeView::from(&corner));

        let groups = determine_shapes_along_lines(100, 100, &shapes, 5, true).unwrap();
        assert_eq!(groups.len(), 1);
        let mut indices = groups[0].indices.clone();
        indices.sort_unstable();
        // the corner does not vote but is claimed by the line
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5, 6, 7, 9, 10]);

        let line = groups[0].line.unwrap();
        assert!(line.sqr_distance(&Vec2::new(0.0, 50.0)) < 1e-4);
        assert!(line.normal().y.abs() > 0.999);

        let unfitted = determine_shapes_along_lines(100, 100, &shapes, 5, false).unwrap();
        assert_eq!(unfitted[0].line, None);
    }

    #[test]
    fn vertical_lines_are_not_reported() {
        let t_shapes: Vec<TShape> = (1..=8)
            .map(|n| TShape::new(Vec2::new(50.0, n as f32 * 10.0), Vec2::x(), 1.0))
            .collect();
        let shapes: Vec<ShapeView<'_>> = t_shapes.iter().map(ShapeView::from).collect();
        assert!(determine_shapes_along_lines(100, 100, &shapes, 5, false)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn too_few_minimal_shapes_is_rejected() {
        assert!(determine_shapes_along_lines(100, 100, &[], 1, false).is_err());
        assert!(determine_shapes_along_lines(0, 100, &[], 4, false).is_err());
    }

    #[test]
    fn parallel_line_groups() {
        let line = |x: f32, y: f32, dx: f32, dy: f32| {
            Line2::new(Vec2::new(x, y), Vec2::new(dx, dy)).unwrap()
        };
        let tilt = 3.0f32.to_radians();
        let lines = [
            line(0.0, 10.0, 1.0, 0.0),
            line(0.0, 20.0, -1.0, 0.0),
            line(5.0, 0.0, 0.0, 1.0),
            line(0.0, 30.0, tilt.cos(), tilt.sin()),
            line(30.0, 0.0, 0.0, -1.0),
            line(0.0, 40.0, 1.0, 1.0),
        ];
        let groups = determine_parallel_line_groups(&lines, 5.0, 2);
        assert_eq!(groups, vec![vec![0, 1, 3], vec![2, 4]]);
        assert!(determine_parallel_line_groups(&lines, 5.0, 4).is_empty());
        assert!(determine_parallel_line_groups(&[], 5.0, 2).is_empty());
    }

    #[test]
    fn horizontal_groups_with_means() {
        let mut positions = Vec::new();
        positions.extend((0..10).map(|n| Vec2::new(n as f32 * 7.0, 30.2)));
        positions.extend((0..12).map(|n| Vec2::new(n as f32 * 5.0, 70.5)));
        positions.extend((0..3).map(|n| Vec2::new(n as f32 * 9.0, 50.0)));

        let (groups, means) = determine_horizontal_groups(100, &positions, 10, 2.0);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], (0..10).collect::<Vec<u32>>());
        assert_eq!(groups[1], (10..22).collect::<Vec<u32>>());
        assert!((means[0] - 30.2).abs() < 1e-4);
        assert!((means[1] - 70.5).abs() < 1e-4);
    }
}
