//! Gradient-based T-junction detector.
//!
//! The response at a pixel compares the summed vertical gradient above and
//! below the horizontal bar and the summed horizontal gradient left and
//! right of the stem, penalizes gradients running along bar and stem, and
//! normalizes by the gradient energy of the surrounding background bands.

use crate::detector::{
    extract_peaks, refine_peak, response_field, JunctionDetector, JunctionTemplate,
    SIMILAR_SHAPE_ANGLE_DEG, SIMILAR_SHAPE_DISTANCE,
};
use crate::detector::geometric::post_adjust_shapes;
use crate::geometry::Vec2;
use crate::image::integral::GradientIntegrals;
use crate::image::{ImageView, OwnedImage};
use crate::nms::Region;
use crate::shape::{ShapeSet, TShape};
use crate::trace::{trace_event, trace_span};
use crate::util::{JunctionError, JunctionResult};

/// Images with a side of at most this many pixels yield no shapes.
const MIN_IMAGE_SIZE: usize = 20;

/// Configuration of the gradient-based detector.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GradientDetectorConfig {
    /// `-1` dark junctions on bright background, `+1` bright on dark, `0` both.
    pub sign: i32,
    /// Minimal response of a peak.
    pub threshold: f64,
    /// Template geometry.
    pub template: JunctionTemplate,
    /// Minimal mean intensity step per pixel along bar and stem edges.
    pub minimal_delta: u32,
    /// Evaluate the response field and the peak search on the rayon pool.
    pub parallel: bool,
}

impl Default for GradientDetectorConfig {
    fn default() -> Self {
        Self {
            sign: 0,
            threshold: 5.0,
            template: JunctionTemplate::default(),
            minimal_delta: 5,
            parallel: false,
        }
    }
}

impl GradientDetectorConfig {
    pub fn validate(&self) -> JunctionResult<()> {
        self.template.validate()?;
        if !(-1..=1).contains(&self.sign) {
            return Err(JunctionError::InvalidParameter {
                name: "sign",
                reason: "must be -1, 0 or 1",
            });
        }
        if !(self.threshold >= 0.0) {
            return Err(JunctionError::InvalidParameter {
                name: "threshold",
                reason: "must be non-negative",
            });
        }
        Ok(())
    }
}

/// Gradient-based T-junction detector.
#[derive(Clone, Debug)]
pub struct GradientDetector {
    config: GradientDetectorConfig,
}

impl GradientDetector {
    pub fn new(config: GradientDetectorConfig) -> JunctionResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &GradientDetectorConfig {
        &self.config
    }

    /// Detects top-down and bottom-up T-junctions.
    ///
    /// The bottom-up pass runs the top-down template on the image rotated
    /// by 180 degrees and maps the positions back.
    pub fn detect(&self, image: ImageView<'_, u8>) -> JunctionResult<ShapeSet> {
        let width = image.width();
        let height = image.height();
        let _span = trace_span!("gradient_detect", width = width, height = height).entered();

        let mut shapes = ShapeSet::new();
        if width <= MIN_IMAGE_SIZE || height <= MIN_IMAGE_SIZE {
            return Ok(shapes);
        }

        for (position, score) in self.detect_top_down(image)? {
            shapes
                .t_shapes
                .push(TShape::new(position, Vec2::new(0.0, 1.0), score));
        }

        let rotated = OwnedImage::from_view(image).rotated_180();
        let far_corner = Vec2::new((width - 1) as f32, (height - 1) as f32);
        for (position, score) in self.detect_top_down(rotated.view())? {
            shapes
                .t_shapes
                .push(TShape::new(far_corner - position, Vec2::new(0.0, -1.0), score));
        }

        post_adjust_shapes(
            width,
            height,
            &mut shapes,
            SIMILAR_SHAPE_DISTANCE,
            SIMILAR_SHAPE_ANGLE_DEG,
        );
        trace_event!("gradient_shapes", count = shapes.len());
        Ok(shapes)
    }

    fn detect_top_down(&self, image: ImageView<'_, u8>) -> JunctionResult<Vec<(Vec2, f32)>> {
        let width = image.width();
        let height = image.height();
        let integrals = GradientIntegrals::new(image);

        let responses = response_field(width, height, self.config.parallel, |x, y| {
            self.response(&integrals, width, height, x, y)
        })?;
        let view = responses.view();
        let region = Region::new(1, 1, width as u32 - 2, height as u32 - 2);
        let peaks = extract_peaks(view, region, self.config.threshold, self.config.parallel)?;

        Ok(peaks
            .iter()
            .map(|peak| {
                let offset = refine_peak(peak.x, peak.y, |x, y| view.at(x as usize, y as usize));
                let position = Vec2::new(peak.x as f32, peak.y as f32) + offset;
                (position, peak.strength as f32)
            })
            .collect())
    }

    /// Template response with the bar centered on row `y` and the stem on
    /// column `x`.
    fn response(
        &self,
        integrals: &GradientIntegrals,
        width: usize,
        height: usize,
        x: usize,
        y: usize,
    ) -> f64 {
        let template = &self.config.template;
        let shape_width = template.shape_width as usize;
        let shape_height = template.shape_height as usize;
        let step = template.step_size as usize;
        let top = template.top_band as usize;
        let bottom = template.bottom_band as usize;
        let w2 = template.half_width();
        let s2 = template.half_step();

        if x < w2 || y < top + s2 || x + w2 >= width || y + shape_height - s2 >= height {
            return 0.0;
        }

        let vs = |x, y, w, h| integrals.vertical_signed.sum(x, y, w, h) as i64;
        let va = |x, y, w, h| integrals.vertical_absolute.sum(x, y, w, h) as i64;
        let hs = |x, y, w, h| integrals.horizontal_signed.sum(x, y, w, h) as i64;
        let ha = |x, y, w, h| integrals.horizontal_absolute.sum(x, y, w, h) as i64;

        let delta = self.config.minimal_delta as i64;
        let sign = self.config.sign;
        let wrong_sign = |value: i64| (sign < 0 && value > 0) || (sign > 0 && value < 0);

        let wing = w2 - s2;
        let trunk = shape_height - step;
        let left = x - w2;
        let right = x + s2 + 1;

        // edges above and below the bar
        let h_positive = vs(left, y - s2 - 1, shape_width, 1);
        let h_negative = vs(left, y + s2, wing, 1) + vs(right, y + s2, wing, 1);
        if h_positive.abs() < shape_width as i64 * delta
            || h_negative.abs() < (2 * wing) as i64 * 2 * delta
        {
            return 0.0;
        }
        let horizontal = h_positive - h_negative;
        if wrong_sign(horizontal) {
            return 0.0;
        }
        let horizontal = horizontal.abs();
        if horizontal < shape_width as i64 * 2 * delta {
            return 0.0;
        }
        let horizontal_penalty = ha(left, y, shape_width - 1, 1) * step as i64;

        // edges left and right of the stem
        let v_positive = hs(x - s2 - 1, y + s2 + 1, 1, trunk);
        let v_negative = hs(x + s2, y + s2 + 1, 1, trunk);
        if v_positive.abs() < trunk as i64 * delta || v_negative.abs() < trunk as i64 * delta {
            return 0.0;
        }
        let vertical = v_positive - v_negative;
        if wrong_sign(vertical) {
            return 0.0;
        }
        let vertical = vertical.abs();
        if vertical < trunk as i64 * 2 * delta {
            return 0.0;
        }
        let vertical_penalty = va(x, y, 1, shape_height - s2 - 1) * step as i64;

        let below_bar = y + s2 + 1;
        let beside_stem = y + s2 + bottom;
        let stem_rows = trunk - bottom;
        let background = ha(left, y - s2 - top, shape_width - 1, top)
            + va(left, y - s2 - top, shape_width, top - 1)
            + ha(left, below_bar, wing - 1, bottom)
            + va(left, below_bar, wing, bottom - 1)
            + ha(right, below_bar, wing - 1, bottom)
            + va(right, below_bar, wing, bottom - 1)
            + ha(x - s2 - bottom, beside_stem + 1, bottom - 1, stem_rows)
            + va(x - s2 - bottom, beside_stem, bottom, stem_rows)
            + ha(right, beside_stem + 1, bottom - 1, stem_rows)
            + va(right, beside_stem, bottom, stem_rows);

        let horizontal = (horizontal - horizontal_penalty).max(0) as f64;
        let vertical = (vertical - vertical_penalty).max(0) as f64;
        horizontal * vertical / background.max(1) as f64
    }
}

impl JunctionDetector for GradientDetector {
    fn detect_shapes(&self, image: ImageView<'_, u8>) -> JunctionResult<ShapeSet> {
        self.detect(image)
    }
}

#[cfg(test)]
mod tests {
    use super::{GradientDetector, GradientDetectorConfig};
    use crate::image::OwnedImage;
    use crate::util::JunctionError;

    fn dark_t_junction() -> OwnedImage {
        let mut image = OwnedImage::filled(64, 64, 200u8).unwrap();
        for y in 19..=21 {
            for x in 0..64 {
                image.set(x, y, 40);
            }
        }
        for y in 22..64 {
            for x in 31..=33 {
                image.set(x, y, 40);
            }
        }
        image
    }

    #[test]
    fn finds_single_dark_t_junction() {
        let config = GradientDetectorConfig {
            sign: -1,
            ..GradientDetectorConfig::default()
        };
        let detector = GradientDetector::new(config).unwrap();
        let shapes = detector.detect(dark_t_junction().view()).unwrap();

        assert!(shapes.l_shapes.is_empty() && shapes.x_shapes.is_empty());
        assert_eq!(shapes.t_shapes.len(), 1);
        let t = &shapes.t_shapes[0];
        assert!((t.position().x - 32.0).abs() < 1e-4);
        assert!((t.position().y - 20.0).abs() < 1e-4);
        assert_eq!(t.direction.y, 1.0);
        assert!(t.score() > 0.0);
    }

    #[test]
    fn bright_sign_rejects_dark_junction() {
        let config = GradientDetectorConfig {
            sign: 1,
            ..GradientDetectorConfig::default()
        };
        let detector = GradientDetector::new(config).unwrap();
        let shapes = detector.detect(dark_t_junction().view()).unwrap();
        assert!(shapes.t_shapes.is_empty());
    }

    #[test]
    fn small_images_yield_nothing() {
        let image = OwnedImage::filled(20, 64, 0u8).unwrap();
        let detector = GradientDetector::new(GradientDetectorConfig::default()).unwrap();
        assert!(detector.detect(image.view()).unwrap().is_empty());
    }

    #[test]
    fn invalid_sign_is_rejected() {
        let config = GradientDetectorConfig {
            sign: 2,
            ..GradientDetectorConfig::default()
        };
        assert!(matches!(
            GradientDetector::new(config),
            Err(JunctionError::InvalidParameter { name: "sign", .. })
        ));
    }
}
