//! Axis-aligned rectangles assembled from L-shaped corners.
//!
//! Corners are grouped by the quadrant they open into, chained
//! top-left -> bottom-left -> bottom-right -> top-right, filtered by size,
//! aspect ratio and orthogonality, and finally snapped to the strongest
//! intensity step along each edge.

use crate::detector::geometric::{
    determine_l_shapes, filter_l_shapes_by_direction, non_maximum_suppression_l_shapes,
    remove_lines_too_close_to_border,
};
use crate::geometry::{normalized, perpendicular, FiniteLine2, Line2, Vec2};
use crate::image::{interpolate_bilinear, ImageView};
use crate::shape::LShape;
use crate::trace::{trace_event, trace_span};
use crate::util::math::cos_deg;
use crate::util::{JunctionError, JunctionResult};

/// Corner locations in the order top-left, bottom-left, bottom-right,
/// top-right.
pub type Rectangle = [Vec2; 4];

/// L-shape indices in the order top-left, bottom-left, bottom-right,
/// top-right.
pub type IndexedRectangle = [u32; 4];

/// Minimal intensity step accepted as an edge by [`optimize_line_along_edge`].
const MINIMAL_EDGE_STEP: i32 = 10;

/// Inlier distance of the robust edge fit, in pixels.
const EDGE_FIT_THRESHOLD: f32 = 1.5;

/// Minimal height of a rectangle side, in pixels.
const MINIMAL_SIDE_HEIGHT: f32 = 5.0;

/// Checks whether `b` lies along `edge_a` seen from `a` and `a` lies along
/// `edge_b` seen from `b`, both within the angle whose cosine is
/// `cos_threshold`.
pub fn are_l_shapes_connected(
    a: &LShape,
    b: &LShape,
    edge_a: &Vec2,
    edge_b: &Vec2,
    cos_threshold: f32,
) -> bool {
    let Some(direction) = normalized(&(b.position() - a.position())) else {
        return false;
    };
    edge_a.dot(&direction) >= cos_threshold && -edge_b.dot(&direction) >= cos_threshold
}

/// Combines L-shapes into rectangles whose top-left corner opens towards
/// `top_left_direction`.
///
/// The other three corners are expected at successive -90 degree rotations
/// of that direction. Adjacent corners must be at least
/// `minimal_corner_distance` apart and connected along their edges within
/// `connected_angle_deg`.
pub fn determine_aligned_rectangles(
    l_shapes: &[LShape],
    top_left_direction: &Vec2,
    minimal_corner_distance: f32,
    corner_angle_deg: f32,
    connected_angle_deg: f32,
) -> Vec<IndexedRectangle> {
    let Some(mut direction) = normalized(top_left_direction) else {
        return Vec::new();
    };
    let corner_cos = cos_deg(corner_angle_deg);
    let connected_cos = cos_deg(connected_angle_deg);
    let sqr_minimal_distance = minimal_corner_distance * minimal_corner_distance;

    let mut corners: [Vec<u32>; 4] = Default::default();
    for group in corners.iter_mut() {
        group.extend(
            l_shapes
                .iter()
                .enumerate()
                .filter(|(_, l)| l.direction.dot(&direction) >= corner_cos)
                .map(|(n, _)| n as u32),
        );
        direction = -perpendicular(&direction);
    }
    if corners.iter().any(Vec::is_empty) {
        return Vec::new();
    }

    let linked = |a: &LShape, b: &LShape, edge_a: &Vec2, edge_b: &Vec2| {
        (b.position() - a.position()).norm_squared() >= sqr_minimal_distance
            && are_l_shapes_connected(a, b, edge_a, edge_b, connected_cos)
    };

    let [top_lefts, bottom_lefts, bottom_rights, top_rights] = &corners;
    let mut rectangles = Vec::new();
    for &tl in top_lefts {
        let top_left = &l_shapes[tl as usize];
        for &bl in bottom_lefts {
            let bottom_left = &l_shapes[bl as usize];
            if !linked(top_left, bottom_left, &top_left.edge_right, &bottom_left.edge_left) {
                continue;
            }
            for &br in bottom_rights {
                let bottom_right = &l_shapes[br as usize];
                if !linked(
                    bottom_left,
                    bottom_right,
                    &bottom_left.edge_right,
                    &bottom_right.edge_left,
                ) {
                    continue;
                }
                for &tr in top_rights {
                    let top_right = &l_shapes[tr as usize];
                    if linked(
                        bottom_right,
                        top_right,
                        &bottom_right.edge_right,
                        &top_right.edge_left,
                    ) && linked(top_right, top_left, &top_right.edge_right, &top_left.edge_left)
                    {
                        rectangles.push([tl, bl, br, tr]);
                    }
                }
            }
        }
    }
    rectangles
}

/// Keeps rectangles whose widths lie in `[minimal_width, maximal_width]`,
/// whose corners deviate at most `orthogonal_angle_deg` from a right angle and
/// whose four width/height ratios lie within
/// `aspect_ratio * (1 +- aspect_tolerance)`.
pub fn determine_shaped_rectangles(
    l_shapes: &[LShape],
    rectangles: &[IndexedRectangle],
    aspect_ratio: f32,
    minimal_width: f32,
    maximal_width: f32,
    aspect_tolerance: f32,
    orthogonal_angle_deg: f32,
) -> Vec<IndexedRectangle> {
    let minimal_ratio = aspect_ratio * (1.0 - aspect_tolerance);
    let maximal_ratio = aspect_ratio * (1.0 + aspect_tolerance);
    let orthogonal_cos = cos_deg(90.0 - orthogonal_angle_deg);
    let width_ok = |w: f32| w >= minimal_width && w <= maximal_width;
    let ratio_ok = |r: f32| r >= minimal_ratio && r <= maximal_ratio;

    rectangles
        .iter()
        .filter(|indices| {
            let [tl, bl, br, tr] = indices.map(|n| l_shapes[n as usize].position());
            let top = tr - tl;
            let bottom = br - bl;
            let left = bl - tl;
            let right = br - tr;
            let (top_width, bottom_width) = (top.norm(), bottom.norm());
            let (left_height, right_height) = (left.norm(), right.norm());

            if !width_ok(top_width)
                || !width_ok(bottom_width)
                || left_height < MINIMAL_SIDE_HEIGHT
                || right_height < MINIMAL_SIDE_HEIGHT
            {
                return false;
            }

            let top = top / top_width;
            let bottom = bottom / bottom_width;
            let left = left / left_height;
            let right = right / right_height;
            let orthogonal = [
                top.dot(&left),
                bottom.dot(&left),
                bottom.dot(&right),
                top.dot(&right),
            ]
            .iter()
            .all(|c| c.abs() <= orthogonal_cos);

            orthogonal
                && ratio_ok(top_width / left_height)
                && ratio_ok(top_width / right_height)
                && ratio_ok(bottom_width / left_height)
                && ratio_ok(bottom_width / right_height)
        })
        .copied()
        .collect()
}

/// Parameters for [`guess_shaped_rectangles_from_upper_corners`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct UpperCornerParams {
    /// Opening direction of top-left corners; top-right corners open along
    /// its perpendicular.
    pub top_left_direction: Vec2,
    /// Expected width/height ratio.
    pub aspect_ratio: f32,
    /// Height of the image; a guess needs one bottom corner above it.
    pub image_height: u32,
    /// Maximal number of guesses returned.
    pub max_candidates: usize,
    pub corner_angle_deg: f32,
    pub connected_angle_deg: f32,
    pub minimal_width: f32,
    pub maximal_width: f32,
    /// Number of side lengths tried per corner pair, each 10%/n longer than
    /// the previous one.
    pub pairs_per_edge: u32,
    /// Scale of the first side length relative to `width / aspect_ratio`.
    pub side_edge_ratio_multiplier: f32,
}

impl Default for UpperCornerParams {
    fn default() -> Self {
        Self {
            top_left_direction: Vec2::new(1.0, 1.0).normalize(),
            aspect_ratio: 1.0,
            image_height: 0,
            max_candidates: 10,
            corner_angle_deg: 15.0,
            connected_angle_deg: 5.0,
            minimal_width: 90.0,
            maximal_width: 250.0,
            pairs_per_edge: 1,
            side_edge_ratio_multiplier: 1.0,
        }
    }
}

/// Guesses complete rectangles from pairs of upper corners only.
///
/// Each connected top-left/top-right pair yields up to two guesses per side
/// length: one extruding the top edge along its perpendicular, one
/// extruding along the corners' own downward edges.
pub fn guess_shaped_rectangles_from_upper_corners(
    l_shapes: &[LShape],
    params: &UpperCornerParams,
) -> Vec<Rectangle> {
    let Some(top_left_direction) = normalized(&params.top_left_direction) else {
        return Vec::new();
    };
    if params.max_candidates == 0 || params.pairs_per_edge == 0 || params.aspect_ratio <= 0.0 {
        return Vec::new();
    }
    let top_right_direction = perpendicular(&top_left_direction);
    let corner_cos = cos_deg(params.corner_angle_deg);
    let connected_cos = cos_deg(params.connected_angle_deg);
    let sqr_minimal_width = params.minimal_width * params.minimal_width;
    let sqr_maximal_width = params.maximal_width * params.maximal_width;
    let image_height = params.image_height as f32;

    let mut top_lefts = Vec::new();
    let mut top_rights = Vec::new();
    for l in l_shapes {
        if top_left_direction.dot(&l.direction) >= corner_cos {
            top_lefts.push(l);
        } else if top_right_direction.dot(&l.direction) >= corner_cos {
            top_rights.push(l);
        }
    }
    if top_lefts.is_empty() || top_rights.is_empty() {
        return Vec::new();
    }

    let extra_length = 0.10 / params.pairs_per_edge as f32;
    let mut rectangles = Vec::new();
    for top_left in &top_lefts {
        for top_right in &top_rights {
            let top = top_right.position() - top_left.position();
            let sqr_width = top.norm_squared();
            if sqr_width < sqr_minimal_width || sqr_width > sqr_maximal_width {
                continue;
            }
            if !are_l_shapes_connected(
                top_left,
                top_right,
                &top_left.edge_left,
                &top_right.edge_right,
                connected_cos,
            ) {
                continue;
            }

            for pair in 0..params.pairs_per_edge {
                let ratio = (params.side_edge_ratio_multiplier + extra_length * pair as f32)
                    / params.aspect_ratio;

                let side = perpendicular(&top) * ratio;
                let guesses = [
                    (top_left.position() + side, top_right.position() + side),
                    (
                        top_left.position() + top_left.edge_right.normalize() * top.norm() * ratio,
                        top_right.position() + top_right.edge_left.normalize() * top.norm() * ratio,
                    ),
                ];
                for (bottom_left, bottom_right) in guesses {
                    if bottom_left.y < image_height || bottom_right.y < image_height {
                        rectangles.push([
                            top_left.position(),
                            bottom_left,
                            bottom_right,
                            top_right.position(),
                        ]);
                    }
                }

                if rectangles.len() >= params.max_candidates {
                    rectangles.truncate(params.max_candidates);
                    trace_event!("guessed_rectangles", count = rectangles.len());
                    return rectangles;
                }
            }
        }
    }
    trace_event!("guessed_rectangles", count = rectangles.len());
    rectangles
}

/// `count` fractions spread evenly over the central 90% of a segment.
pub fn uniform_sample_fractions(count: usize) -> Vec<f32> {
    match count {
        0 => Vec::new(),
        1 => vec![0.5],
        _ => (0..count)
            .map(|n| 0.05 + n as f32 * 0.9 / (count - 1) as f32)
            .collect(),
    }
}

/// Fits the line of the strongest intensity step across `line`.
///
/// At every sample fraction the image is walked along the segment normal
/// from `+perpendicular_distance` to `-perpendicular_distance`; the
/// midpoint of the largest step above 10 gray values is the edge location.
/// Samples whose center is closer than twice the walking distance to the
/// image border are skipped. The fit needs `minimal_valid` edge locations
/// and as many inliers.
pub fn optimize_line_along_edge(
    image: ImageView<'_, u8>,
    line: &FiniteLine2,
    perpendicular_distance: u32,
    sample_fractions: &[f32],
    minimal_valid: usize,
) -> Option<Line2> {
    if perpendicular_distance == 0 || sample_fractions.len() < 2 {
        return None;
    }
    let margin = perpendicular_distance as usize * 2;
    if image.width() <= margin || image.height() <= margin {
        return None;
    }
    let direction = normalized(&line.direction())?;
    let normal = perpendicular(&direction);

    let low = margin as f32;
    let right = (image.width() - margin) as f32;
    let bottom = (image.height() - margin) as f32;
    let reach = perpendicular_distance as i32;

    let mut edges = Vec::with_capacity(sample_fractions.len());
    for &fraction in sample_fractions {
        let center = line.p0 + (line.p1 - line.p0) * fraction;
        if !(center.x >= low && center.y >= low && center.x < right && center.y < bottom) {
            continue;
        }

        let mut previous: Option<i32> = None;
        let mut best_step = MINIMAL_EDGE_STEP;
        let mut best_location = None;
        for n in (-reach..=reach).rev() {
            let sample = center + normal * n as f32;
            let Some(value) = interpolate_bilinear(image, sample.x, sample.y) else {
                previous = None;
                continue;
            };
            let value = value.round() as i32;
            if let Some(previous) = previous {
                let step = (value - previous).abs();
                if step > best_step {
                    best_step = step;
                    // the previous sample sits one normal step further out
                    best_location = Some(sample + normal * 0.5);
                }
            }
            previous = Some(value);
        }
        edges.extend(best_location);
    }

    if edges.len() < minimal_valid {
        return None;
    }
    let (fitted, inliers) = Line2::fit_robust(&edges, EDGE_FIT_THRESHOLD)?;
    (inliers >= minimal_valid).then_some(fitted)
}

/// Replaces the corners of `rectangle` by the intersections of its four
/// edges refined with [`optimize_line_along_edge`].
///
/// Returns `None` if an edge cannot be refined, two refined edges do not
/// intersect, or a refined corner leaves the image.
pub fn optimize_rectangle_along_edges(
    image: ImageView<'_, u8>,
    rectangle: &Rectangle,
    perpendicular_distance: u32,
) -> Option<Rectangle> {
    let fractions = uniform_sample_fractions(30);
    let refine = |a: usize, b: usize| {
        optimize_line_along_edge(
            image,
            &FiniteLine2::new(rectangle[a], rectangle[b]),
            perpendicular_distance,
            &fractions,
            5,
        )
    };
    let left = refine(0, 1)?;
    let bottom = refine(1, 2)?;
    let right = refine(2, 3)?;
    let top = refine(3, 0)?;

    let corners = [
        left.intersection(&top)?,
        left.intersection(&bottom)?,
        bottom.intersection(&right)?,
        right.intersection(&top)?,
    ];
    let width = image.width() as f32;
    let height = image.height() as f32;
    corners
        .iter()
        .all(|c| c.x >= 0.0 && c.y >= 0.0 && c.x < width && c.y < height)
        .then_some(corners)
}

/// Area enclosed by the four corners.
pub fn rectangle_area(rectangle: &Rectangle) -> f32 {
    let twice: f32 = (0..4)
        .map(|n| {
            let a = rectangle[n];
            let b = rectangle[(n + 1) % 4];
            a.x * b.y - b.x * a.y
        })
        .sum();
    twice.abs() * 0.5
}

/// Returns `true` if `a` encloses a larger area than `b`.
pub fn has_greater_area(a: &Rectangle, b: &Rectangle) -> bool {
    rectangle_area(a) > rectangle_area(b)
}

/// Configuration of [`detect_aligned_rectangles`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RectangleParams {
    /// Expected rectangle width in pixels.
    pub rectangle_width: u32,
    /// Expected width/height ratio.
    pub aspect_ratio: f32,
    /// Relative tolerance of the aspect ratio, in `[0, 1)`.
    pub aspect_tolerance: f32,
    /// Maximal deviation of a corner from the image axes, in degrees.
    pub alignment_angle_deg: f32,
    /// Sort the result by area, largest first.
    pub sort: bool,
    /// Segments with an endpoint closer than this to the border are dropped.
    pub border_distance: f32,
    /// Walking distance across each edge during refinement.
    pub perpendicular_distance: u32,
}

impl Default for RectangleParams {
    fn default() -> Self {
        Self {
            rectangle_width: 160,
            aspect_ratio: 2.5,
            aspect_tolerance: 0.10,
            alignment_angle_deg: 35.0,
            sort: true,
            border_distance: 5.0,
            perpendicular_distance: 5,
        }
    }
}

impl RectangleParams {
    pub fn new(rectangle_width: u32, aspect_ratio: f32) -> Self {
        Self {
            rectangle_width,
            aspect_ratio,
            ..Self::default()
        }
    }

    pub fn validate(&self, width: usize, height: usize) -> JunctionResult<()> {
        if self.rectangle_width == 0 || self.rectangle_width as usize >= width {
            return Err(JunctionError::InvalidParameter {
                name: "rectangle_width",
                reason: "must be positive and smaller than the image width",
            });
        }
        if !(self.aspect_ratio >= 0.01 && self.aspect_ratio <= 100.0) {
            return Err(JunctionError::InvalidParameter {
                name: "aspect_ratio",
                reason: "must be within [0.01, 100]",
            });
        }
        let rectangle_height = self.rectangle_width as f32 / self.aspect_ratio;
        if rectangle_height < 1.0 || rectangle_height >= height as f32 {
            return Err(JunctionError::InvalidParameter {
                name: "aspect_ratio",
                reason: "implied rectangle height must fit into the image",
            });
        }
        if !(self.aspect_tolerance >= 0.0 && self.aspect_tolerance < 1.0) {
            return Err(JunctionError::InvalidParameter {
                name: "aspect_tolerance",
                reason: "must be within [0, 1)",
            });
        }
        if !(self.alignment_angle_deg >= 0.0 && self.alignment_angle_deg <= 90.0) {
            return Err(JunctionError::InvalidParameter {
                name: "alignment_angle_deg",
                reason: "must be within [0, 90]",
            });
        }
        if !(self.border_distance >= 0.0)
            || self.border_distance >= width as f32
            || self.border_distance >= height as f32
        {
            return Err(JunctionError::InvalidParameter {
                name: "border_distance",
                reason: "must be non-negative and smaller than the image",
            });
        }
        if self.perpendicular_distance == 0 {
            return Err(JunctionError::InvalidParameter {
                name: "perpendicular_distance",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

/// Detects roughly axis-aligned rectangles of a known size and aspect ratio
/// from line segments detected in `image`.
///
/// The corners of every accepted rectangle are refined against the image
/// intensities; rectangles whose refinement fails are dropped.
pub fn detect_aligned_rectangles(
    image: ImageView<'_, u8>,
    lines: &[FiniteLine2],
    params: &RectangleParams,
) -> JunctionResult<Vec<Rectangle>> {
    let width = image.width();
    let height = image.height();
    params.validate(width, height)?;
    let _span = trace_span!("detect_aligned_rectangles", lines = lines.len()).entered();

    let mut lines = lines.to_vec();
    remove_lines_too_close_to_border(&mut lines, width, height, params.border_distance);

    let corner_distance = ((params.rectangle_width + 1) / 2) as f32;
    let diagonal = Vec2::new(1.0, 1.0).normalize();
    let l_shapes = determine_l_shapes(&lines, width, height, corner_distance, 25.0);
    let l_shapes =
        filter_l_shapes_by_direction(&l_shapes, &diagonal, params.alignment_angle_deg, true);
    let l_shapes =
        non_maximum_suppression_l_shapes(&l_shapes, width, height, corner_distance * 0.5, 25.0);

    let indexed = determine_aligned_rectangles(
        &l_shapes,
        &diagonal,
        10.0,
        params.alignment_angle_deg,
        15.0,
    );
    let rectangle_width = params.rectangle_width as f32;
    let indexed = determine_shaped_rectangles(
        &l_shapes,
        &indexed,
        params.aspect_ratio,
        rectangle_width * 0.5,
        rectangle_width * 2.0,
        params.aspect_tolerance,
        5.0,
    );
    trace_event!(
        "rectangle_candidates",
        l_shapes = l_shapes.len(),
        rectangles = indexed.len()
    );

    let mut rectangles: Vec<Rectangle> = indexed
        .iter()
        .filter_map(|indices| {
            let corners = indices.map(|n| l_shapes[n as usize].position());
            optimize_rectangle_along_edges(image, &corners, params.perpendicular_distance)
        })
        .collect();
    if params.sort {
        rectangles.sort_by(|a, b| rectangle_area(b).total_cmp(&rectangle_area(a)));
    }
    Ok(rectangles)
}
