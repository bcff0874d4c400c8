//! Variance-based T-junction detector.
//!
//! The roof response sums the absolute mean differences of consecutive rows
//! across the horizontal bar, the trunk response does the same for the
//! columns across the stem. Both are squared and normalized by the variance
//! inside the rows/columns and of the adjacent background bands.

use crate::detector::geometric::post_adjust_shapes;
use crate::detector::{
    extract_peaks, refine_peak, response_field, JunctionDetector, JunctionTemplate,
    SIMILAR_SHAPE_ANGLE_DEG, SIMILAR_SHAPE_DISTANCE,
};
use crate::geometry::Vec2;
use crate::image::integral::{BoxRegion, IntegralPair};
use crate::image::{ImageView, OwnedImage};
use crate::nms::Region;
use crate::shape::{ShapeSet, TShape};
use crate::trace::{trace_event, trace_span};
use crate::util::{JunctionError, JunctionResult};

/// Summed mean differences below this are treated as noise.
const MINIMAL_GRADIENT: f32 = 2.0;

/// Squared maximal ratio between roof and trunk response.
const SQR_BALANCE_RATIO: f32 = 2.5 * 2.5;

/// Configuration of the variance-based detector.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VarianceDetectorConfig {
    /// Minimal response of a peak.
    pub threshold: f32,
    /// Template geometry.
    pub template: JunctionTemplate,
    /// Evaluate the response field and the peak search on the rayon pool.
    pub parallel: bool,
}

impl Default for VarianceDetectorConfig {
    fn default() -> Self {
        Self {
            threshold: 5.421,
            template: JunctionTemplate::default(),
            parallel: false,
        }
    }
}

impl VarianceDetectorConfig {
    pub fn validate(&self) -> JunctionResult<()> {
        self.template.validate()?;
        if !(self.threshold >= 0.0) {
            return Err(JunctionError::InvalidParameter {
                name: "threshold",
                reason: "must be non-negative",
            });
        }
        Ok(())
    }
}

/// Variance-based T-junction detector.
#[derive(Clone, Debug)]
pub struct VarianceDetector {
    config: VarianceDetectorConfig,
}

impl VarianceDetector {
    pub fn new(config: VarianceDetectorConfig) -> JunctionResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &VarianceDetectorConfig {
        &self.config
    }

    /// Detects top-down and bottom-up T-junctions.
    pub fn detect(&self, image: ImageView<'_, u8>) -> JunctionResult<ShapeSet> {
        let width = image.width();
        let height = image.height();
        let _span = trace_span!("variance_detect", width = width, height = height).entered();

        let template = &self.config.template;
        let mut shapes = ShapeSet::new();
        if (template.shape_width as usize) > width
            || (template.shape_height + template.top_band) as usize > height
            || width < 3
            || height < 3
        {
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
        trace_event!("variance_shapes", count = shapes.len());
        Ok(shapes)
    }

    fn detect_top_down(&self, image: ImageView<'_, u8>) -> JunctionResult<Vec<(Vec2, f32)>> {
        let width = image.width();
        let height = image.height();
        let integral = IntegralPair::new(image);

        let responses = response_field(width, height, self.config.parallel, |x, y| {
            self.response(&integral, x, y)
        })?;
        let view = responses.view();
        let region = Region::new(1, 1, width as u32 - 2, height as u32 - 2);
        let peaks = extract_peaks(view, region, self.config.threshold, self.config.parallel)?;

        Ok(peaks
            .iter()
            .map(|peak| {
                let offset = refine_peak(peak.x, peak.y, |x, y| {
                    view.at(x as usize, y as usize) as f64
                });
                (Vec2::new(peak.x as f32, peak.y as f32) + offset, peak.strength)
            })
            .collect())
    }

    fn response(&self, integral: &IntegralPair, x: usize, y: usize) -> f32 {
        let template = &self.config.template;
        let shape_width = template.shape_width as usize;
        let shape_height = template.shape_height as usize;
        let step = template.step_size as usize;
        let top = template.top_band as usize;
        let bottom = template.bottom_band as usize;
        let w2 = template.half_width();
        let s2 = template.half_step();
        let width = integral.width();
        let height = integral.height();

        if x < w2 || y < top + s2 || x + w2 >= width || y + shape_height >= height + s2 {
            return 0.0;
        }

        let wing = w2 - s2;
        let trunk = shape_height - step;
        let left = x - w2;
        let right = x + s2 + 1;

        // roof: rows across the bar, the last one interrupted by the stem
        let (_, roof_band_variance) = integral.mean_variance(&[
            (left, y - s2 - top, shape_width, top),
            (left, y + s2 + 1, wing, bottom),
            (right, y + s2 + 1, wing, bottom),
        ]);
        let rows = (y - s2 - 1..=y + s2 + 1).map(|r| -> Vec<BoxRegion> {
            if r <= y + s2 {
                vec![(left, r, shape_width, 1)]
            } else {
                vec![(left, r, wing, 1), (right, r, wing, 1)]
            }
        });
        let (roof, roof_variance) = accumulate_steps(integral, rows);
        let horizontal = normalized_step(roof, roof_variance + roof_band_variance);

        // trunk: columns across the stem, the central ones reaching into the bar
        let (_, trunk_band_variance) = integral.mean_variance(&[
            (x - s2 - bottom, y + s2 + 1, bottom, trunk),
            (right, y + s2 + 1, bottom, trunk),
        ]);
        let columns = (x - s2 - 1..=x + s2 + 1).map(|c| -> Vec<BoxRegion> {
            if c + s2 >= x && c <= x + s2 {
                vec![(c, y, 1, shape_height - s2)]
            } else {
                vec![(c, y + s2 + 1, 1, trunk)]
            }
        });
        let (stem, stem_variance) = accumulate_steps(integral, columns);
        let vertical = normalized_step(stem, stem_variance + trunk_band_variance);

        if horizontal > SQR_BALANCE_RATIO * vertical || vertical > SQR_BALANCE_RATIO * horizontal {
            return 0.0;
        }
        horizontal * vertical
    }
}

/// Sum of absolute mean differences between consecutive box groups and sum
/// of their variances.
fn accumulate_steps(
    integral: &IntegralPair,
    groups: impl Iterator<Item = Vec<BoxRegion>>,
) -> (f32, f32) {
    let mut steps = 0.0f32;
    let mut variance_sum = 0.0f32;
    let mut last_mean: Option<f32> = None;
    for boxes in groups {
        let (mean, variance) = integral.mean_variance(&boxes);
        variance_sum += variance;
        if let Some(last) = last_mean {
            steps += (mean - last).abs();
        }
        last_mean = Some(mean);
    }
    (steps, variance_sum)
}

fn normalized_step(step: f32, variance: f32) -> f32 {
    let step = if step < MINIMAL_GRADIENT { 0.0 } else { step };
    step * step / variance.max(1.0)
}

impl JunctionDetector for VarianceDetector {
    fn detect_shapes(&self, image: ImageView<'_, u8>) -> JunctionResult<ShapeSet> {
        self.detect(image)
    }
}
