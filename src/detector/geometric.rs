//! Junctions assembled from line segments.

use std::collections::HashSet;

use crate::geometry::{cross, normalized, perpendicular, FiniteLine2, SpatialGrid, Vec2};
use crate::matcher::merge::{merge_l_shapes_into_t, merge_l_shapes_into_x, merge_t_shapes_into_x};
use crate::shape::{LShape, ShapeSet, TShape, XShape};
use crate::trace::{trace_event, trace_span};
use crate::util::math::cos_deg;

/// Tolerances for classifying segment intersections in [`determine_shapes`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ShapeParams {
    /// Maximal distance of an intersection from a segment end to count as
    /// "at the end".
    pub short_distance: f32,
    /// Minimal distance of an intersection from both segment ends to count
    /// as "inside".
    pub long_distance: f32,
    /// Maximal deviation from perpendicular for any shape, in degrees.
    pub shape_angle_deg: f32,
    /// Maximal deviation from perpendicular for X-shapes, in degrees.
    pub x_angle_deg: f32,
}

impl Default for ShapeParams {
    fn default() -> Self {
        Self {
            short_distance: 2.0,
            long_distance: 5.0,
            shape_angle_deg: 20.0,
            x_angle_deg: 5.0,
        }
    }
}

fn inside_image(point: &Vec2, width: usize, height: usize) -> bool {
    point.x >= 0.0
        && point.y >= 0.0
        && point.x <= (width - 1) as f32
        && point.y <= (height - 1) as f32
}

fn clamped_bin(grid: &SpatialGrid, point: &Vec2) -> (usize, usize) {
    (
        grid.clamped_horizontal_bin(point.x),
        grid.clamped_vertical_bin(point.y),
    )
}

/// Endpoint of `line` further away from `point`.
fn far_endpoint(line: &FiniteLine2, point: &Vec2) -> Vec2 {
    if (line.p0 - point).norm_squared() >= (line.p1 - point).norm_squared() {
        line.p0
    } else {
        line.p1
    }
}

/// Finds corners formed by pairs of segments whose ends are close.
///
/// Two segments form a corner if they are perpendicular within
/// `angle_threshold_deg`, an endpoint of one lies within
/// `distance_threshold` of an endpoint of the other, and their infinite
/// lines intersect inside the image. Every unordered pair is reported at
/// most once; the score penalizes intersections beyond the segment ends.
pub fn determine_l_shapes(
    lines: &[FiniteLine2],
    width: usize,
    height: usize,
    distance_threshold: f32,
    angle_threshold_deg: f32,
) -> Vec<LShape> {
    let _span = trace_span!("determine_l_shapes", lines = lines.len()).entered();
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let (horizontal_bins, vertical_bins) =
        SpatialGrid::ideal_bins_neighborhood9(width, height, distance_threshold);
    let mut grid = SpatialGrid::new(
        0.0,
        0.0,
        width as f32,
        height as f32,
        horizontal_bins,
        vertical_bins,
    );
    for (index, line) in lines.iter().enumerate() {
        if !inside_image(&line.p0, width, height) || !inside_image(&line.p1, width, height) {
            continue;
        }
        let bin0 = clamped_bin(&grid, &line.p0);
        let bin1 = clamped_bin(&grid, &line.p1);
        grid.push(bin0.0, bin0.1, index as u32);
        if bin1 != bin0 {
            grid.push(bin1.0, bin1.1, index as u32);
        }
    }

    let max_cos = cos_deg(90.0 - angle_threshold_deg);
    let sqr_distance = distance_threshold * distance_threshold;
    let mut pairs: HashSet<(usize, usize)> = HashSet::new();
    let mut neighbors = Vec::new();
    let mut shapes = Vec::new();

    for (a, line_a) in lines.iter().enumerate() {
        let Some(infinite_a) = line_a.infinite_line() else {
            continue;
        };
        let direction_a = line_a.direction();

        for probe in [line_a.p0, line_a.p1] {
            let (bx, by) = clamped_bin(&grid, &probe);
            neighbors.clear();
            grid.indices_neighborhood9(bx, by, &mut neighbors);

            for &b in &neighbors {
                let b = b as usize;
                if b <= a || pairs.contains(&(a, b)) {
                    continue;
                }
                let line_b = &lines[b];
                let Some(infinite_b) = line_b.infinite_line() else {
                    continue;
                };
                if direction_a.dot(&line_b.direction()).abs() > max_cos {
                    continue;
                }
                if (line_b.p0 - probe).norm_squared() > sqr_distance
                    && (line_b.p1 - probe).norm_squared() > sqr_distance
                {
                    continue;
                }
                let Some(intersection) = infinite_a.intersection(&infinite_b) else {
                    continue;
                };
                if intersection.x < 0.0
                    || intersection.y < 0.0
                    || intersection.x >= width as f32
                    || intersection.y >= height as f32
                {
                    continue;
                }

                let edge_a = normalized(&(far_endpoint(line_a, &intersection) - intersection));
                let edge_b = normalized(&(far_endpoint(line_b, &intersection) - intersection));
                let (Some(edge_a), Some(edge_b)) = (edge_a, edge_b) else {
                    continue;
                };
                let Some(direction) = normalized(&(edge_a + edge_b)) else {
                    continue;
                };

                let score = (line_a.length() - line_a.distance(&intersection)).max(0.0)
                    * (line_b.length() - line_b.distance(&intersection)).max(0.0);
                let shape = if cross(&edge_a, &edge_b) >= 0.0 {
                    LShape::new(intersection, direction, edge_a, edge_b, score)
                        .with_lines(a as u32, b as u32)
                } else {
                    LShape::new(intersection, direction, edge_b, edge_a, score)
                        .with_lines(b as u32, a as u32)
                };
                shapes.push(shape);
                pairs.insert((a, b));
            }
        }
    }

    trace_event!("l_shapes", count = shapes.len());
    shapes
}

/// Where an intersection falls along a segment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Hit {
    Interior,
    Start,
    End,
    Outside,
}

fn classify(parameter: f32, length: f32, params: &ShapeParams) -> Hit {
    if parameter >= params.long_distance && parameter <= length - params.long_distance {
        Hit::Interior
    } else if parameter.abs() <= params.short_distance {
        Hit::Start
    } else if (parameter - length).abs() <= params.short_distance {
        Hit::End
    } else {
        Hit::Outside
    }
}

/// Classifies every horizontal/vertical segment pair into an X-, T- or
/// L-shape based on where their intersection falls along each segment.
///
/// Segments not longer than `long_distance` and `2 * short_distance` are
/// ignored. Line indices of the shapes refer to `horizontal` and
/// `vertical` respectively.
pub fn determine_shapes(
    horizontal: &[FiniteLine2],
    vertical: &[FiniteLine2],
    params: &ShapeParams,
) -> ShapeSet {
    let _span = trace_span!(
        "determine_shapes",
        horizontal = horizontal.len(),
        vertical = vertical.len()
    )
    .entered();

    let min_length = params.long_distance.max(2.0 * params.short_distance);
    let max_cos_shape = cos_deg(90.0 - params.shape_angle_deg);
    let max_cos_x = cos_deg(90.0 - params.x_angle_deg);
    let mut shapes = ShapeSet::new();

    for (nh, line_h) in horizontal.iter().enumerate() {
        let length_h = line_h.length();
        let Some(infinite_h) = line_h.infinite_line().filter(|_| length_h > min_length) else {
            continue;
        };
        let direction_h = line_h.direction();

        for (nv, line_v) in vertical.iter().enumerate() {
            let length_v = line_v.length();
            let Some(infinite_v) = line_v.infinite_line().filter(|_| length_v > min_length) else {
                continue;
            };
            let direction_v = line_v.direction();

            let abs_cos = direction_h.dot(&direction_v).abs();
            if abs_cos > max_cos_shape {
                continue;
            }
            let Some(intersection) = infinite_h.intersection(&infinite_v) else {
                continue;
            };

            let hit_h = classify(direction_h.dot(&(intersection - line_h.p0)), length_h, params);
            let hit_v = classify(direction_v.dot(&(intersection - line_v.p0)), length_v, params);
            let (nh, nv) = (nh as u32, nv as u32);

            match (hit_h, hit_v) {
                (Hit::Interior, Hit::Interior) => {
                    if abs_cos <= max_cos_x {
                        shapes.x_shapes.push(
                            XShape::new(intersection, direction_h, direction_v, 0.0)
                                .with_lines(nh, nv),
                        );
                    }
                }
                (Hit::Interior, Hit::Start) => shapes
                    .t_shapes
                    .push(TShape::new(intersection, direction_v, 0.0).with_lines(nh, nv)),
                (Hit::Interior, Hit::End) => shapes
                    .t_shapes
                    .push(TShape::new(intersection, -direction_v, 0.0).with_lines(nh, nv)),
                (Hit::Start, Hit::Interior) => shapes
                    .t_shapes
                    .push(TShape::new(intersection, direction_h, 0.0).with_lines(nh, nv)),
                (Hit::End, Hit::Interior) => shapes
                    .t_shapes
                    .push(TShape::new(intersection, -direction_h, 0.0).with_lines(nh, nv)),
                (Hit::Start | Hit::End, Hit::Start | Hit::End) => {
                    let far_h = if hit_h == Hit::Start { line_h.p1 } else { line_h.p0 };
                    let far_v = if hit_v == Hit::Start { line_v.p1 } else { line_v.p0 };
                    let edges = (
                        normalized(&(far_h - intersection)),
                        normalized(&(far_v - intersection)),
                    );
                    let (Some(edge_h), Some(edge_v)) = edges else {
                        continue;
                    };
                    let Some(direction) = normalized(&(edge_h + edge_v)) else {
                        continue;
                    };
                    let (left, right) = if cross(&edge_h, &edge_v) >= 0.0 {
                        (edge_h, edge_v)
                    } else {
                        (edge_v, edge_h)
                    };
                    shapes.l_shapes.push(
                        LShape::new(intersection, direction, left, right, length_h * length_v)
                            .with_lines(nh, nv),
                    );
                }
                _ => {}
            }
        }
    }

    trace_event!(
        "shapes",
        l = shapes.l_shapes.len(),
        t = shapes.t_shapes.len(),
        x = shapes.x_shapes.len()
    );
    shapes
}

/// Merges coincident shapes in place.
///
/// Two T-shapes within `similar_distance` that are parallel or
/// perpendicular within `similar_angle_deg` become an X-shape; two
/// opposite L-shapes become an X-shape; two perpendicular L-shapes become a
/// T-shape. Every shape takes part in at most one merge. Surviving shapes
/// keep their order; merged shapes are appended.
pub fn post_adjust_shapes(
    width: usize,
    height: usize,
    shapes: &mut ShapeSet,
    similar_distance: f32,
    similar_angle_deg: f32,
) {
    let t_count = shapes.t_shapes.len();
    let l_count = shapes.l_shapes.len();
    if t_count + l_count < 2 {
        return;
    }

    let mut grid = SpatialGrid::new(
        0.0,
        0.0,
        width.max(1) as f32,
        height.max(1) as f32,
        (width / 5).max(1),
        (height / 5).max(1),
    );
    for (n, t) in shapes.t_shapes.iter().enumerate() {
        let (bx, by) = clamped_bin(&grid, &t.position());
        grid.push(bx, by, n as u32);
    }
    for (n, l) in shapes.l_shapes.iter().enumerate() {
        let (bx, by) = clamped_bin(&grid, &l.position());
        grid.push(bx, by, (t_count + n) as u32);
    }

    let sqr_distance = similar_distance * similar_distance;
    let cos_parallel = cos_deg(similar_angle_deg);
    let cos_perpendicular = cos_deg(90.0 - similar_angle_deg);

    let mut removed_t = vec![false; t_count];
    let mut removed_l = vec![false; l_count];
    let mut new_x = Vec::new();
    let mut new_t = Vec::new();
    let mut neighbors = Vec::new();

    for by in 0..grid.vertical_bins() {
        for bx in 0..grid.horizontal_bins() {
            neighbors.clear();
            grid.indices_neighborhood9(bx, by, &mut neighbors);

            for &i in grid.cell(bx, by) {
                let i = i as usize;
                for &j in &neighbors {
                    let j = j as usize;
                    if j <= i {
                        continue;
                    }
                    if j < t_count {
                        let (a, b) = (&shapes.t_shapes[i], &shapes.t_shapes[j]);
                        if removed_t[i]
                            || removed_t[j]
                            || (a.position() - b.position()).norm_squared() > sqr_distance
                        {
                            continue;
                        }
                        let abs_cos = a.direction.dot(&b.direction).abs();
                        if abs_cos >= cos_parallel || abs_cos <= cos_perpendicular {
                            new_x.push(merge_t_shapes_into_x(a, b));
                            removed_t[i] = true;
                            removed_t[j] = true;
                        }
                    } else if i >= t_count {
                        let (li, lj) = (i - t_count, j - t_count);
                        let (a, b) = (&shapes.l_shapes[li], &shapes.l_shapes[lj]);
                        if removed_l[li]
                            || removed_l[lj]
                            || (a.position() - b.position()).norm_squared() > sqr_distance
                        {
                            continue;
                        }
                        let cos = a.direction.dot(&b.direction);
                        if cos <= -cos_parallel {
                            new_x.push(merge_l_shapes_into_x(a, b));
                            removed_l[li] = true;
                            removed_l[lj] = true;
                        } else if cos.abs() <= cos_perpendicular {
                            if let Some(t) = merge_l_shapes_into_t(a, b) {
                                new_t.push(t);
                                removed_l[li] = true;
                                removed_l[lj] = true;
                            }
                        }
                    }
                }
            }
        }
    }

    let mut n = 0;
    shapes.t_shapes.retain(|_| {
        n += 1;
        !removed_t[n - 1]
    });
    let mut n = 0;
    shapes.l_shapes.retain(|_| {
        n += 1;
        !removed_l[n - 1]
    });
    shapes.t_shapes.extend(new_t);
    shapes.x_shapes.extend(new_x);
}

/// Keeps every L-shape that has no better neighbor within `distance`
/// pointing in the same direction (within `angle_deg`). Ties keep the
/// lower index.
pub fn non_maximum_suppression_l_shapes(
    l_shapes: &[LShape],
    width: usize,
    height: usize,
    distance: f32,
    angle_deg: f32,
) -> Vec<LShape> {
    if l_shapes.is_empty() || width == 0 || height == 0 {
        return Vec::new();
    }
    let (horizontal_bins, vertical_bins) =
        SpatialGrid::ideal_bins_neighborhood9(width, height, distance);
    let mut grid = SpatialGrid::new(
        0.0,
        0.0,
        width as f32,
        height as f32,
        horizontal_bins,
        vertical_bins,
    );
    for (n, l) in l_shapes.iter().enumerate() {
        let (bx, by) = clamped_bin(&grid, &l.position());
        grid.push(bx, by, n as u32);
    }

    let sqr_distance = distance * distance;
    let min_cos = cos_deg(angle_deg);
    let mut neighbors = Vec::new();

    l_shapes
        .iter()
        .enumerate()
        .filter(|(i, shape)| {
            let (bx, by) = clamped_bin(&grid, &shape.position());
            neighbors.clear();
            grid.indices_neighborhood9(bx, by, &mut neighbors);
            !neighbors.iter().any(|&j| {
                let j = j as usize;
                let other = &l_shapes[j];
                j != *i
                    && (other.position() - shape.position()).norm_squared() <= sqr_distance
                    && other.direction.dot(&shape.direction) >= min_cos
                    && (other.score() > shape.score() || (other.score() == shape.score() && j < *i))
            })
        })
        .map(|(_, shape)| *shape)
        .collect()
}

/// Keeps L-shapes whose direction is within `angle_deg` of `direction`,
/// or of its perpendicular when `allow_perpendicular` is set.
pub fn filter_l_shapes_by_direction(
    l_shapes: &[LShape],
    direction: &Vec2,
    angle_deg: f32,
    allow_perpendicular: bool,
) -> Vec<LShape> {
    let min_cos = cos_deg(angle_deg);
    let perpendicular = perpendicular(direction);
    l_shapes
        .iter()
        .filter(|l| {
            l.direction.dot(direction).abs() >= min_cos
                || (allow_perpendicular && l.direction.dot(&perpendicular).abs() >= min_cos)
        })
        .copied()
        .collect()
}

/// Drops segments with an endpoint closer than `distance` to the image
/// border.
pub fn remove_lines_too_close_to_border(
    lines: &mut Vec<FiniteLine2>,
    width: usize,
    height: usize,
    distance: f32,
) {
    let max_x = width as f32 - distance;
    let max_y = height as f32 - distance;
    let inside = |p: &Vec2| p.x >= distance && p.y >= distance && p.x <= max_x && p.y <= max_y;
    lines.retain(|line| inside(&line.p0) && inside(&line.p1));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(x0: f32, y0: f32, x1: f32, y1: f32) -> FiniteLine2 {
        FiniteLine2::new(Vec2::new(x0, y0), Vec2::new(x1, y1))
    }

    fn corner(position: Vec2, direction: Vec2, score: f32) -> LShape {
        let direction = direction.normalize();
        let left = Vec2::new(direction.x + direction.y, direction.y - direction.x).normalize();
        let right = Vec2::new(direction.x - direction.y, direction.x + direction.y).normalize();
        LShape::new(position, direction, left, right, score)
    }

    #[test]
    fn corner_from_nearby_segment_ends() {
        let lines = [segment(10.0, 10.0, 40.0, 10.0), segment(10.0, 12.0, 10.0, 40.0)];
        let shapes = determine_l_shapes(&lines, 64, 64, 5.0, 20.0);
        assert_eq!(shapes.len(), 1);
        let l = &shapes[0];
        assert!((l.position() - Vec2::new(10.0, 10.0)).norm() < 1e-4);
        assert!((l.edge_left - Vec2::x()).norm() < 1e-5);
        assert!((l.edge_right - Vec2::y()).norm() < 1e-5);
        assert!((l.direction - Vec2::new(1.0, 1.0).normalize()).norm() < 1e-5);
        assert!((l.score() - 30.0 * 26.0).abs() < 1e-2);
        assert_eq!((l.base.line_a, l.base.line_b), (Some(0), Some(1)));
    }

    #[test]
    fn distant_or_parallel_segments_form_no_corner() {
        let far = [segment(10.0, 10.0, 40.0, 10.0), segment(10.0, 30.0, 10.0, 60.0)];
        assert!(determine_l_shapes(&far, 64, 64, 5.0, 20.0).is_empty());
        let parallel = [segment(10.0, 10.0, 40.0, 10.0), segment(11.0, 12.0, 40.0, 12.0)];
        assert!(determine_l_shapes(&parallel, 64, 64, 5.0, 20.0).is_empty());
    }

    #[test]
    fn intersection_classification() {
        let params = ShapeParams::default();

        let shapes = determine_shapes(
            &[segment(0.0, 20.0, 40.0, 20.0)],
            &[segment(20.0, 20.0, 20.0, 50.0)],
            &params,
        );
        assert_eq!(shapes.t_shapes.len(), 1);
        assert!((shapes.t_shapes[0].direction - Vec2::y()).norm() < 1e-5);
        assert_eq!(shapes.t_shapes[0].base.line_b, Some(0));

        let shapes = determine_shapes(
            &[segment(0.0, 20.0, 40.0, 20.0)],
            &[segment(20.0, 50.0, 20.0, 20.0)],
            &params,
        );
        assert!((shapes.t_shapes[0].direction - Vec2::y()).norm() < 1e-5);

        let shapes = determine_shapes(
            &[segment(0.0, 20.0, 40.0, 20.0)],
            &[segment(20.0, 0.0, 20.0, 40.0)],
            &params,
        );
        assert_eq!(shapes.x_shapes.len(), 1);
        assert!(shapes.t_shapes.is_empty() && shapes.l_shapes.is_empty());

        let shapes = determine_shapes(
            &[segment(10.0, 10.0, 40.0, 10.0)],
            &[segment(10.0, 10.0, 10.0, 40.0)],
            &params,
        );
        assert_eq!(shapes.l_shapes.len(), 1);
        let l = &shapes.l_shapes[0];
        assert!((l.score() - 900.0).abs() < 1e-2);
        assert!(cross(&l.edge_left, &l.edge_right) >= 0.0);
    }

    #[test]
    fn short_segments_are_ignored() {
        let shapes = determine_shapes(
            &[segment(10.0, 10.0, 14.0, 10.0)],
            &[segment(10.0, 10.0, 10.0, 40.0)],
            &ShapeParams::default(),
        );
        assert!(shapes.is_empty());
    }

    #[test]
    fn coincident_shapes_are_merged() {
        let mut shapes = ShapeSet::new();
        shapes.l_shapes.push(corner(Vec2::new(20.0, 20.0), Vec2::new(1.0, 1.0), 1.0));
        shapes.l_shapes.push(corner(Vec2::new(20.5, 20.0), Vec2::new(-1.0, -1.0), 1.0));
        shapes.l_shapes.push(corner(Vec2::new(40.0, 20.0), Vec2::new(1.0, 1.0), 1.0));
        shapes.l_shapes.push(corner(Vec2::new(40.0, 21.0), Vec2::new(-1.0, 1.0), 1.0));
        shapes.l_shapes.push(corner(Vec2::new(5.0, 5.0), Vec2::new(1.0, 1.0), 1.0));
        shapes.t_shapes.push(TShape::new(Vec2::new(30.0, 40.0), Vec2::y(), 1.0));
        shapes.t_shapes.push(TShape::new(Vec2::new(30.0, 41.0), -Vec2::y(), 1.0));

        post_adjust_shapes(64, 64, &mut shapes, 1.5, 15.0);

        assert_eq!(shapes.l_shapes.len(), 1);
        assert_eq!(shapes.l_shapes[0].position(), Vec2::new(5.0, 5.0));
        assert_eq!(shapes.t_shapes.len(), 1);
        assert!((shapes.t_shapes[0].direction - Vec2::y()).norm() < 1e-5);
        assert_eq!(shapes.x_shapes.len(), 2);
    }

    #[test]
    fn weaker_corner_is_suppressed() {
        let shapes = [
            corner(Vec2::new(20.0, 20.0), Vec2::new(1.0, 1.0), 1.0),
            corner(Vec2::new(24.0, 20.0), Vec2::new(1.0, 1.0), 3.0),
            corner(Vec2::new(22.0, 20.0), Vec2::new(-1.0, -1.0), 0.5),
        ];
        let kept = non_maximum_suppression_l_shapes(&shapes, 64, 64, 10.0, 25.0);
        let scores: Vec<f32> = kept.iter().map(|l| l.score()).collect();
        assert_eq!(scores, vec![3.0, 0.5]);
    }

    #[test]
    fn equal_corners_keep_the_first() {
        let shapes = [
            corner(Vec2::new(20.0, 20.0), Vec2::new(1.0, 1.0), 2.0),
            corner(Vec2::new(21.0, 20.0), Vec2::new(1.0, 1.0), 2.0),
        ];
        let kept = non_maximum_suppression_l_shapes(&shapes, 64, 64, 10.0, 25.0);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].position(), Vec2::new(20.0, 20.0));
    }

    #[test]
    fn direction_filter_with_perpendicular() {
        let shapes = [
            corner(Vec2::new(1.0, 1.0), Vec2::new(1.0, 1.0), 1.0),
            corner(Vec2::new(1.0, 1.0), Vec2::new(-1.0, 1.0), 1.0),
            corner(Vec2::new(1.0, 1.0), Vec2::new(1.0, 0.0), 1.0),
        ];
        let direction = Vec2::new(1.0, 1.0).normalize();
        assert_eq!(filter_l_shapes_by_direction(&shapes, &direction, 15.0, false).len(), 1);
        assert_eq!(filter_l_shapes_by_direction(&shapes, &direction, 15.0, true).len(), 2);
    }

    #[test]
    fn border_lines_are_removed() {
        let mut lines = vec![
            segment(2.0, 10.0, 30.0, 10.0),
            segment(10.0, 10.0, 30.0, 30.0),
            segment(10.0, 10.0, 30.0, 62.0),
        ];
        remove_lines_too_close_to_border(&mut lines, 64, 64, 5.0);
        assert_eq!(lines, vec![segment(10.0, 10.0, 30.0, 30.0)]);
    }
}
