//! Junction detectors.
//!
//! Two families live here. The geometric path ([`geometric`],
//! [`rectangle`]) assembles L/T/X shapes from externally supplied line
//! segments. The response-field path ([`gradient`], [`variance`],
//! [`gradient_variance`]) evaluates a T-junction template at every pixel,
//! extracts peaks with the [`nms`](crate::nms) engine and emits axis-aligned
//! T-shapes in both vertical orientations.

use crate::geometry::Vec2;
use crate::image::{ImageView, OwnedImage};
use crate::nms::{
    precise_peak_location_2, suppress_by_radius, NonMaximumSuppression, Region, StrengthPosition,
};
use crate::shape::ShapeSet;
use crate::util::{JunctionError, JunctionResult};

pub mod geometric;
pub mod gradient;
pub mod gradient_variance;
pub mod rectangle;
pub mod variance;

#[cfg(feature = "simd")]
mod simd;

pub use gradient::{GradientDetector, GradientDetectorConfig};
pub use gradient_variance::{GradientVarianceConfig, GradientVarianceDetection, GradientVarianceDetector};
pub use variance::{VarianceDetector, VarianceDetectorConfig};

/// Radius of the strict suppression applied to extracted peaks.
pub(crate) const PEAK_RADIUS: f32 = 9.0;

/// Distance below which `post_adjust_shapes` merges response shapes.
pub(crate) const SIMILAR_SHAPE_DISTANCE: f32 = 1.5;

/// Angle in degrees used by `post_adjust_shapes` for response shapes.
pub(crate) const SIMILAR_SHAPE_ANGLE_DEG: f32 = 15.0;

/// Common entry point of the response-field detectors.
pub trait JunctionDetector {
    /// Detects junctions in an 8-bit grayscale image.
    fn detect_shapes(&self, image: ImageView<'_, u8>) -> JunctionResult<ShapeSet>;
}

/// Geometry of the T-junction template.
///
/// The template is `shape_width x shape_height` pixels. Its horizontal bar
/// is `step_size` rows thick and centered on the junction row; the vertical
/// stem is `step_size` columns wide and runs down from the bar. `top_band`
/// rows above the bar and `bottom_band` pixels beside the stem form the
/// background.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct JunctionTemplate {
    /// Template width in pixels (odd).
    pub shape_width: u32,
    /// Template height in pixels.
    pub shape_height: u32,
    /// Thickness of bar and stem (odd).
    pub step_size: u32,
    /// Background rows above the bar.
    pub top_band: u32,
    /// Background pixels below the bar and beside the stem.
    pub bottom_band: u32,
}

impl Default for JunctionTemplate {
    fn default() -> Self {
        Self {
            shape_width: 15,
            shape_height: 15,
            step_size: 3,
            top_band: 4,
            bottom_band: 4,
        }
    }
}

impl JunctionTemplate {
    /// Checks that all template boxes are non-empty and nest correctly.
    pub fn validate(&self) -> JunctionResult<()> {
        let invalid = |name, reason| Err(JunctionError::InvalidParameter { name, reason });
        if self.shape_width % 2 == 0 {
            return invalid("shape_width", "must be odd");
        }
        if self.step_size % 2 == 0 {
            return invalid("step_size", "must be odd");
        }
        if self.top_band == 0 || self.bottom_band == 0 {
            return invalid("bottom_band", "bands must be at least one pixel");
        }
        if self.bottom_band + self.step_size >= self.shape_width {
            return invalid("shape_width", "must exceed bottom_band + step_size");
        }
        if self.bottom_band + self.step_size >= self.shape_height {
            return invalid("shape_height", "must exceed bottom_band + step_size");
        }
        if self.step_size + 2 * self.bottom_band > self.shape_width {
            return invalid("bottom_band", "step_size + 2 * bottom_band must not exceed shape_width");
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn half_width(&self) -> usize {
        self.shape_width as usize / 2
    }

    #[inline]
    pub(crate) fn half_step(&self) -> usize {
        self.step_size as usize / 2
    }
}

/// Returns whether a horizontal and a vertical response agree in sign.
///
/// `sign < 0` accepts dark junctions (both negative), `sign > 0` bright
/// junctions (both positive), `sign == 0` either, as long as both are
/// non-zero with the same sign.
#[inline]
pub fn have_correct_sign(sign: i32, horizontal: f32, vertical: f32) -> bool {
    let negative = horizontal < 0.0 && vertical < 0.0;
    let positive = horizontal > 0.0 && vertical > 0.0;
    match sign {
        s if s < 0 => negative,
        s if s > 0 => positive,
        _ => negative || positive,
    }
}

/// Fills a `width x height` image row by row.
pub(crate) fn response_rows<T, F>(
    width: usize,
    height: usize,
    parallel: bool,
    fill: F,
) -> JunctionResult<OwnedImage<T>>
where
    T: Copy + Default + Send,
    F: Fn(usize, &mut [T]) + Sync,
{
    let mut data = vec![T::default(); width * height];

    #[cfg(feature = "rayon")]
    if parallel {
        use rayon::prelude::*;
        data.par_chunks_mut(width.max(1))
            .enumerate()
            .for_each(|(y, row)| fill(y, row));
        return OwnedImage::new(data, width, height);
    }
    #[cfg(not(feature = "rayon"))]
    let _ = parallel;

    data.chunks_mut(width.max(1))
        .enumerate()
        .for_each(|(y, row)| fill(y, row));
    OwnedImage::new(data, width, height)
}

/// Evaluates `response` at every pixel of a `width x height` frame.
pub(crate) fn response_field<T, F>(
    width: usize,
    height: usize,
    parallel: bool,
    response: F,
) -> JunctionResult<OwnedImage<T>>
where
    T: Copy + Default + Send,
    F: Fn(usize, usize) -> T + Sync,
{
    response_rows(width, height, parallel, |y, row| {
        for (x, value) in row.iter_mut().enumerate() {
            *value = response(x, y);
        }
    })
}

/// Peaks of a response field: candidates `>= threshold` inside `region`,
/// non-strict 3x3 suppression, then strict radius suppression.
pub(crate) fn extract_peaks<T>(
    responses: ImageView<'_, T>,
    region: Region,
    threshold: T,
    parallel: bool,
) -> JunctionResult<Vec<StrengthPosition<u32, T>>>
where
    T: Copy + PartialOrd + Send + Sync,
{
    let width = responses.width() as u32;
    let height = responses.height() as u32;
    let mut nms = NonMaximumSuppression::new(width, height, 0);

    #[cfg(feature = "rayon")]
    if parallel {
        nms.add_candidates_par(responses, region, threshold)?;
        let peaks = nms.suppress_non_maximum_par(region, false)?;
        return Ok(suppress_by_radius(width, height, &peaks, PEAK_RADIUS, true));
    }
    #[cfg(not(feature = "rayon"))]
    let _ = parallel;

    nms.add_candidates(responses, region, threshold)?;
    let peaks = nms.suppress_non_maximum(region, false)?;
    Ok(suppress_by_radius(width, height, &peaks, PEAK_RADIUS, true))
}

/// Sub-pixel offset of a peak at `(x, y)` from the 3x3 values around it.
///
/// Flat or out-of-range fits keep the integer position.
pub(crate) fn refine_peak(x: u32, y: u32, value: impl Fn(u32, u32) -> f64) -> Vec2 {
    debug_assert!(x >= 1 && y >= 1);
    let mut values = [[0.0f64; 3]; 3];
    for (row, line) in values.iter_mut().enumerate() {
        for (column, v) in line.iter_mut().enumerate() {
            *v = value(x + column as u32 - 1, y + row as u32 - 1);
        }
    }
    match precise_peak_location_2(values) {
        Some((dx, dy)) => Vec2::new(dx, dy),
        None => Vec2::zeros(),
    }
}

#[cfg(test)]
mod tests {
    use super::{extract_peaks, have_correct_sign, refine_peak, response_field, JunctionTemplate};
    use crate::nms::Region;
    use crate::util::JunctionError;

    #[test]
    fn sign_rules() {
        assert!(have_correct_sign(-1, -2.0, -1.0));
        assert!(!have_correct_sign(-1, 2.0, 1.0));
        assert!(have_correct_sign(1, 2.0, 1.0));
        assert!(!have_correct_sign(1, 2.0, -1.0));
        assert!(have_correct_sign(0, -2.0, -1.0));
        assert!(have_correct_sign(0, 2.0, 1.0));
        assert!(!have_correct_sign(0, 0.0, 1.0));
        assert!(!have_correct_sign(0, -2.0, 1.0));
    }

    #[test]
    fn default_template_is_valid() {
        assert!(JunctionTemplate::default().validate().is_ok());
    }

    #[test]
    fn even_width_is_rejected() {
        let template = JunctionTemplate {
            shape_width: 14,
            ..JunctionTemplate::default()
        };
        assert!(matches!(
            template.validate(),
            Err(JunctionError::InvalidParameter { name: "shape_width", .. })
        ));
    }

    #[test]
    fn wide_bands_are_rejected() {
        let template = JunctionTemplate {
            bottom_band: 7,
            ..JunctionTemplate::default()
        };
        assert!(template.validate().is_err());
    }

    #[test]
    fn peaks_are_suppressed_within_radius() {
        let field = response_field(40, 40, false, |x, y| match (x, y) {
            (10, 10) => 5.0f32,
            (14, 12) => 4.0,
            (30, 30) => 3.0,
            _ => 0.0,
        })
        .unwrap();
        let peaks = extract_peaks(field.view(), Region::new(1, 1, 38, 38), 1.0, false).unwrap();
        let positions: Vec<_> = peaks.iter().map(|p| (p.x, p.y)).collect();
        assert_eq!(positions, vec![(10, 10), (30, 30)]);
    }

    #[test]
    fn symmetric_peak_keeps_integer_position() {
        let offset = refine_peak(5, 5, |x, y| if (x, y) == (5, 5) { 4.0 } else { 1.0 });
        assert!(offset.norm() < 1e-6);
    }

    #[test]
    fn skewed_peak_moves_towards_stronger_side() {
        let offset = refine_peak(5, 5, |x, y| match (x, y) {
            (5, 5) => 4.0,
            (6, 5) => 3.0,
            _ => 1.0,
        });
        assert!(offset.x > 0.0 && offset.x < 0.5);
        assert!(offset.y.abs() < 1e-6);
    }
}
