//! Combined gradient and variance T-junction detector.
//!
//! Two response maps are computed once per image: a horizontal map
//! measuring the intensity step across a one-row bar, and a vertical map
//! measuring the step across a one-column stem. Both are normalized by the
//! standard deviation of the involved boxes. A junction response is the
//! product of both magnitudes, taken from the horizontal map at the bar and
//! from the vertical map either below (top-down) or above (bottom-up).

use crate::detector::geometric::post_adjust_shapes;
use crate::detector::{
    extract_peaks, have_correct_sign, refine_peak, response_rows, JunctionDetector,
    SIMILAR_SHAPE_ANGLE_DEG, SIMILAR_SHAPE_DISTANCE,
};
use crate::geometry::Vec2;
use crate::image::integral::IntegralPair;
use crate::image::{ImageView, OwnedImage};
use crate::nms::Region;
use crate::shape::{ShapeSet, TShape};
use crate::trace::{trace_event, trace_span};
use crate::util::{JunctionError, JunctionResult};

#[cfg(feature = "simd")]
use crate::detector::simd::combine_row;
#[cfg(not(feature = "simd"))]
use self::combine_row_scalar as combine_row;

const SHAPE_WIDTH: usize = 15;
const SHAPE_HEIGHT: usize = 15;
const BAND: usize = 4;
const MIN_IMAGE_SIZE: usize = 20;

/// Horizontal map cell `(hx, hy)` belongs to frame pixel `(hx + 7, hy + 5)`.
const HORIZONTAL_OFFSET: (usize, usize) = (7, 5);
/// Vertical map column `vx` belongs to frame column `vx + 5`.
const VERTICAL_COLUMN_OFFSET: usize = 5;
/// Top-down junctions read the vertical map at row `y + 2`.
const VERTICAL_ROW_BELOW: usize = 2;
/// Bottom-up junctions read the vertical map at row `y - 13`.
const VERTICAL_ROW_ABOVE: usize = 13;

/// Minimal absolute mean step on each side of bar or stem.
const MINIMAL_STEP: f32 = 0.5;

/// Maximal ratio between horizontal and vertical response.
const BALANCE_RATIO: f32 = 4.0;

/// Configuration of the combined gradient/variance detector.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GradientVarianceConfig {
    /// `-1` dark junctions, `+1` bright junctions, `0` both.
    pub sign: i32,
    /// Minimal combined response of a peak, must be positive.
    pub threshold: f32,
    /// Return the combined top-down and bottom-up response images.
    pub keep_response_images: bool,
    /// Compute maps and peaks on the rayon pool.
    pub parallel: bool,
}

impl Default for GradientVarianceConfig {
    fn default() -> Self {
        Self {
            sign: 0,
            threshold: 6.0,
            keep_response_images: false,
            parallel: false,
        }
    }
}

impl GradientVarianceConfig {
    pub fn validate(&self) -> JunctionResult<()> {
        if !(-1..=1).contains(&self.sign) {
            return Err(JunctionError::InvalidParameter {
                name: "sign",
                reason: "must be -1, 0 or 1",
            });
        }
        if !(self.threshold > 0.0) {
            return Err(JunctionError::InvalidParameter {
                name: "threshold",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

/// Shapes found by [`GradientVarianceDetector`] and, on request, the
/// combined response images (frame-sized, zero where not evaluated).
#[derive(Clone, Debug)]
pub struct GradientVarianceDetection {
    pub shapes: ShapeSet,
    pub top_down_responses: Option<OwnedImage<f32>>,
    pub bottom_up_responses: Option<OwnedImage<f32>>,
}

/// Combined gradient/variance T-junction detector with a fixed 15x15
/// template.
#[derive(Clone, Debug)]
pub struct GradientVarianceDetector {
    config: GradientVarianceConfig,
}

impl GradientVarianceDetector {
    pub fn new(config: GradientVarianceConfig) -> JunctionResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &GradientVarianceConfig {
        &self.config
    }

    /// Detects top-down and bottom-up T-junctions; both sides of the image
    /// must be at least 20 pixels.
    pub fn detect(&self, image: ImageView<'_, u8>) -> JunctionResult<GradientVarianceDetection> {
        let width = image.width();
        let height = image.height();
        let _span =
            trace_span!("gradient_variance_detect", width = width, height = height).entered();

        if width < MIN_IMAGE_SIZE || height < MIN_IMAGE_SIZE {
            return Err(JunctionError::ImageTooSmall {
                width,
                height,
                min_width: MIN_IMAGE_SIZE,
                min_height: MIN_IMAGE_SIZE,
            });
        }

        let parallel = self.config.parallel;
        let integral = IntegralPair::new(image);
        let horizontal = horizontal_responses(&integral, parallel)?;
        let vertical = vertical_responses(&integral, parallel)?;

        let mut shapes = ShapeSet::new();
        let top_down = self.combine(&horizontal, &vertical, width, height, Orientation::TopDown)?;
        let bottom_up = self.combine(&horizontal, &vertical, width, height, Orientation::BottomUp)?;

        for orientation in [Orientation::TopDown, Orientation::BottomUp] {
            let (responses, region) = match orientation {
                Orientation::TopDown => (
                    &top_down,
                    Region::new(8, 6, (width - 16) as u32, height.saturating_sub(21) as u32),
                ),
                Orientation::BottomUp => (
                    &bottom_up,
                    Region::new(8, 14, (width - 16) as u32, height.saturating_sub(20) as u32),
                ),
            };
            let peaks = extract_peaks(responses.view(), region, self.config.threshold, parallel)?;
            for peak in &peaks {
                let offset = refine_peak(peak.x, peak.y, |x, y| {
                    let (h, v) = orientation.map_values(&horizontal, &vertical, x, y);
                    (h * v).abs() as f64
                });
                let position = Vec2::new(peak.x as f32, peak.y as f32) + offset;
                shapes
                    .t_shapes
                    .push(TShape::new(position, orientation.direction(), peak.strength));
            }
        }

        post_adjust_shapes(
            width,
            height,
            &mut shapes,
            SIMILAR_SHAPE_DISTANCE,
            SIMILAR_SHAPE_ANGLE_DEG,
        );
        trace_event!("gradient_variance_shapes", count = shapes.len());

        let keep = self.config.keep_response_images;
        Ok(GradientVarianceDetection {
            shapes,
            top_down_responses: keep.then_some(top_down),
            bottom_up_responses: keep.then_some(bottom_up),
        })
    }

    /// Frame-sized image of `|h| * |v|` for every pixel where both maps are
    /// defined, balanced and of the configured sign.
    fn combine(
        &self,
        horizontal: &OwnedImage<f32>,
        vertical: &OwnedImage<f32>,
        width: usize,
        height: usize,
        orientation: Orientation,
    ) -> JunctionResult<OwnedImage<f32>> {
        let (x0, _) = HORIZONTAL_OFFSET;
        let rows = orientation.frame_rows(height);
        let sign = self.config.sign;
        let h_view = horizontal.view();
        let v_view = vertical.view();

        response_rows(width, height, self.config.parallel, |y, out| {
            if !rows.contains(&y) {
                return;
            }
            let (hy, vy) = orientation.map_rows(y);
            let (Some(h_row), Some(v_row)) = (h_view.row(hy), v_view.row(vy)) else {
                return;
            };
            let columns = width - 2 * x0;
            let vx = x0 - VERTICAL_COLUMN_OFFSET;
            combine_row(
                &h_row[..columns],
                &v_row[vx..vx + columns],
                sign,
                &mut out[x0..x0 + columns],
            );
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Orientation {
    TopDown,
    BottomUp,
}

impl Orientation {
    fn direction(self) -> Vec2 {
        match self {
            Orientation::TopDown => Vec2::new(0.0, 1.0),
            Orientation::BottomUp => Vec2::new(0.0, -1.0),
        }
    }

    /// Frame rows for which both maps are defined.
    fn frame_rows(self, height: usize) -> std::ops::Range<usize> {
        match self {
            Orientation::TopDown => 5..height - 14,
            Orientation::BottomUp => 13..height - 5,
        }
    }

    /// Horizontal and vertical map rows of frame row `y`.
    fn map_rows(self, y: usize) -> (usize, usize) {
        let hy = y - HORIZONTAL_OFFSET.1;
        let vy = match self {
            Orientation::TopDown => y + VERTICAL_ROW_BELOW,
            Orientation::BottomUp => y - VERTICAL_ROW_ABOVE,
        };
        (hy, vy)
    }

    /// Horizontal and vertical map values of frame pixel `(x, y)`.
    fn map_values(
        self,
        horizontal: &OwnedImage<f32>,
        vertical: &OwnedImage<f32>,
        x: u32,
        y: u32,
    ) -> (f32, f32) {
        let (x, y) = (x as usize, y as usize);
        let (hy, vy) = self.map_rows(y);
        let h = horizontal.get(x - HORIZONTAL_OFFSET.0, hy).unwrap_or(0.0);
        let v = vertical.get(x - VERTICAL_COLUMN_OFFSET, vy).unwrap_or(0.0);
        (h, v)
    }
}

/// Signed step response normalized by the mean standard deviation of the
/// involved boxes; zero if either step is too small.
#[inline]
fn normalized_response(first_step: f32, second_step: f32, deviation: f32) -> f32 {
    if first_step.abs() < MINIMAL_STEP || second_step.abs() < MINIMAL_STEP {
        return 0.0;
    }
    let response = first_step - second_step;
    let magnitude = (response.abs() - deviation).max(0.0) / deviation.max(1.0);
    magnitude.copysign(response)
}

/// Map of size `(w - 14) x (h - 10)`: top band, one-row bar, bottom band.
fn horizontal_responses(integral: &IntegralPair, parallel: bool) -> JunctionResult<OwnedImage<f32>> {
    let width = integral.width() - (SHAPE_WIDTH - 1);
    let height = integral.height() - (SHAPE_HEIGHT - 5);
    let wing = (SHAPE_WIDTH - 3) / 2;
    let right = wing + 3;

    response_rows(width, height, parallel, |y, row| {
        for (x, value) in row.iter_mut().enumerate() {
            let (top, _) =
                integral.mean_variance(&[(x, y, wing, BAND), (x + right, y, wing, BAND)]);
            let (center, center_variance) = integral.mean_variance(&[(x, y + 5, SHAPE_WIDTH, 1)]);
            let (bottom, _) = integral.mean_variance(&[
                (x, y + 7, wing, BAND),
                (x + right, y + 7, wing, BAND),
            ]);
            let (_, band_variance) = integral.mean_variance(&[
                (x, y, wing, BAND),
                (x + right, y, wing, BAND),
                (x, y + 7, wing, BAND),
                (x + right, y + 7, wing, BAND),
            ]);
            let deviation = (band_variance.sqrt() + center_variance.sqrt()) * 0.5;
            *value = normalized_response(center - top, bottom - center, deviation);
        }
    })
}

/// Map of size `(w - 10) x (h - 11)`: left band, one-column stem, right band.
fn vertical_responses(integral: &IntegralPair, parallel: bool) -> JunctionResult<OwnedImage<f32>> {
    let stem = 12;
    let width = integral.width() - 10;
    let height = integral.height() - 11;

    response_rows(width, height, parallel, |y, row| {
        for (x, value) in row.iter_mut().enumerate() {
            let (left, _) = integral.mean_variance(&[(x, y, BAND, stem)]);
            let (middle, middle_variance) = integral.mean_variance(&[(x + 5, y, 1, stem)]);
            let (right, _) = integral.mean_variance(&[(x + 7, y, BAND, stem)]);
            let (_, band_variance) =
                integral.mean_variance(&[(x, y, BAND, stem), (x + 7, y, BAND, stem)]);
            let deviation = (band_variance.sqrt() + middle_variance.sqrt()) * 0.5;
            *value = normalized_response(middle - left, right - middle, deviation);
        }
    })
}

/// Writes `|h| * |v|` for balanced, correctly signed pairs and zero
/// otherwise.
pub(crate) fn combine_row_scalar(h_row: &[f32], v_row: &[f32], sign: i32, out: &mut [f32]) {
    for ((value, &h), &v) in out.iter_mut().zip(h_row).zip(v_row) {
        let (h_abs, v_abs) = (h.abs(), v.abs());
        *value = if h_abs < BALANCE_RATIO * v_abs
            && v_abs < BALANCE_RATIO * h_abs
            && have_correct_sign(sign, h, v)
        {
            h_abs * v_abs
        } else {
            0.0
        };
    }
}

impl JunctionDetector for GradientVarianceDetector {
    fn detect_shapes(&self, image: ImageView<'_, u8>) -> JunctionResult<ShapeSet> {
        self.detect(image).map(|detection| detection.shapes)
    }
}
