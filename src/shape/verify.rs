use crate::image::{interpolate_bilinear, ImageView};
use crate::shape::XShape;

impl XShape {
    /// Photometric check that the crossing separates consistent regions.
    ///
    /// Samples `samples` points along each of the four arms (`±direction0`,
    /// `±direction1`) starting `sample_offset` pixels from the center. Any
    /// sample outside the image rejects the shape; a value range below
    /// `minimal_value_range` accepts it. Otherwise the samples (inverted for
    /// dark shapes) are thresholded at the one of rank `ceil(samples / 2)`
    /// and at least two arms must contain a sample at or below it.
    pub fn verify_shape(
        &self,
        image: ImageView<'_, u8>,
        dark_shape: bool,
        minimal_value_range: u8,
        sample_offset: u32,
        samples: u32,
    ) -> bool {
        debug_assert!(samples >= 3);
        let width = image.width() as f32;
        let height = image.height() as f32;
        let arms = [
            self.direction0,
            -self.direction0,
            self.direction1,
            -self.direction1,
        ];

        let samples = samples as usize;
        let mut values = Vec::with_capacity(samples * arms.len());
        let mut min_value = u8::MAX;
        let mut max_value = u8::MIN;

        for arm in &arms {
            for n in 0..samples {
                let location = self.base.position + arm * (sample_offset as usize + n) as f32;
                if location.x < 0.0 || location.y < 0.0 || location.x >= width || location.y >= height {
                    return false;
                }
                let x = location.x.min(width - 1.0);
                let y = location.y.min(height - 1.0);
                let Some(sample) = interpolate_bilinear(image, x, y) else {
                    return false;
                };
                let value = sample.round().clamp(0.0, 255.0) as u8;
                min_value = min_value.min(value);
                max_value = max_value.max(value);
                values.push(if dark_shape { u8::MAX - value } else { value });
            }
        }

        if max_value - min_value < minimal_value_range {
            return true;
        }

        let mut sorted = values.clone();
        let median_index = samples.div_ceil(2);
        let (_, threshold, _) = sorted.select_nth_unstable(median_index);
        let threshold = *threshold;

        let arms_below = values
            .chunks(samples)
            .filter(|arm| arm.iter().any(|&v| v <= threshold))
            .count();
        arms_below >= 2
    }
}
