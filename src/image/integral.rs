//! Lined integral images.
//!
//! A lined integral image of a `width x height` source stores
//! `(width + 1) x (height + 1)` running sums with a leading zero row and
//! column, so any box sum is four lookups. Sums use wrapping arithmetic; the
//! box difference is exact as long as the true box sum fits the element type.

use crate::image::ImageView;

/// Element types that can be accumulated in a lined integral image.
pub trait IntegralElement: Copy + Default + Send + Sync {
    fn wrapping_add(self, other: Self) -> Self;
    fn wrapping_sub(self, other: Self) -> Self;
    fn to_f64(self) -> f64;
}

macro_rules! impl_integral_element {
    ($($ty:ty),*) => {
        $(
            impl IntegralElement for $ty {
                #[inline]
                fn wrapping_add(self, other: Self) -> Self {
                    <$ty>::wrapping_add(self, other)
                }

                #[inline]
                fn wrapping_sub(self, other: Self) -> Self {
                    <$ty>::wrapping_sub(self, other)
                }

                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_integral_element!(u32, u64, i32, i64);

/// Lined integral image over a source of `width x height` elements.
#[derive(Clone, Debug)]
pub struct LinedIntegral<T> {
    data: Vec<T>,
    width: usize,
    height: usize,
}

impl<T: IntegralElement> LinedIntegral<T> {
    /// Builds the integral of `value(x, y)` for a `width x height` source.
    pub fn from_fn(width: usize, height: usize, mut value: impl FnMut(usize, usize) -> T) -> Self {
        let stride = width + 1;
        let mut data = vec![T::default(); stride * (height + 1)];
        for y in 0..height {
            let mut row_sum = T::default();
            for x in 0..width {
                row_sum = row_sum.wrapping_add(value(x, y));
                let above = data[y * stride + x + 1];
                data[(y + 1) * stride + x + 1] = above.wrapping_add(row_sum);
            }
        }
        Self {
            data,
            width,
            height,
        }
    }

    /// Width of the source the integral was built from.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height of the source the integral was built from.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Sum over the box with top-left `(x, y)` and size `w x h` in source
    /// coordinates.
    #[inline]
    pub fn sum(&self, x: usize, y: usize, w: usize, h: usize) -> T {
        debug_assert!(x + w <= self.width && y + h <= self.height);
        let stride = self.width + 1;
        let top = y * stride;
        let bottom = (y + h) * stride;
        self.data[bottom + x + w]
            .wrapping_sub(self.data[top + x + w])
            .wrapping_sub(self.data[bottom + x])
            .wrapping_add(self.data[top + x])
    }
}

/// Box in source coordinates: `(x, y, width, height)`.
pub type BoxRegion = (usize, usize, usize, usize);

/// Integral image of the intensities together with the integral of the
/// squared intensities, for O(1) mean and variance queries.
#[derive(Clone, Debug)]
pub struct IntegralPair {
    sum: LinedIntegral<u32>,
    squared: LinedIntegral<u64>,
}

impl IntegralPair {
    /// Builds both integrals from an 8-bit image.
    pub fn new(image: ImageView<'_, u8>) -> Self {
        let sum = LinedIntegral::from_fn(image.width(), image.height(), |x, y| {
            image.at(x, y) as u32
        });
        let squared = LinedIntegral::from_fn(image.width(), image.height(), |x, y| {
            let v = image.at(x, y) as u64;
            v * v
        });
        Self { sum, squared }
    }

    /// Width of the source image.
    pub fn width(&self) -> usize {
        self.sum.width()
    }

    /// Height of the source image.
    pub fn height(&self) -> usize {
        self.sum.height()
    }

    /// Sum of intensities inside one box.
    #[inline]
    pub fn box_sum(&self, x: usize, y: usize, w: usize, h: usize) -> u32 {
        self.sum.sum(x, y, w, h)
    }

    /// Sum of squared intensities inside one box.
    #[inline]
    pub fn box_sqr_sum(&self, x: usize, y: usize, w: usize, h: usize) -> u64 {
        self.squared.sum(x, y, w, h)
    }

    /// Mean and variance of the union of (disjoint) boxes.
    ///
    /// Empty input yields `(0, 0)`.
    pub fn mean_variance(&self, boxes: &[BoxRegion]) -> (f32, f32) {
        let mut count = 0usize;
        let mut sum = 0.0f64;
        let mut sqr_sum = 0.0f64;
        for &(x, y, w, h) in boxes {
            count += w * h;
            sum += self.box_sum(x, y, w, h) as f64;
            sqr_sum += self.box_sqr_sum(x, y, w, h) as f64;
        }
        if count == 0 {
            return (0.0, 0.0);
        }
        let n = count as f64;
        let mean = sum / n;
        let variance = (sqr_sum / n - mean * mean).max(0.0);
        (mean as f32, variance as f32)
    }
}

/// Lined integrals of the 1x2 horizontal and 2x1 vertical intensity
/// differences, signed and absolute.
///
/// The horizontal gradient `I(x + 1, y) - I(x, y)` has `width - 1` columns,
/// the vertical gradient `I(x, y + 1) - I(x, y)` has `height - 1` rows.
#[derive(Clone, Debug)]
pub struct GradientIntegrals {
    pub horizontal_signed: LinedIntegral<i32>,
    pub horizontal_absolute: LinedIntegral<u32>,
    pub vertical_signed: LinedIntegral<i32>,
    pub vertical_absolute: LinedIntegral<u32>,
}

impl GradientIntegrals {
    /// Builds all four gradient integrals. The image needs at least 2x2 pixels.
    pub fn new(image: ImageView<'_, u8>) -> Self {
        let width = image.width();
        let height = image.height();
        debug_assert!(width >= 2 && height >= 2);

        let horizontal = |x: usize, y: usize| image.at(x + 1, y) as i32 - image.at(x, y) as i32;
        let vertical = |x: usize, y: usize| image.at(x, y + 1) as i32 - image.at(x, y) as i32;

        Self {
            horizontal_signed: LinedIntegral::from_fn(width - 1, height, horizontal),
            horizontal_absolute: LinedIntegral::from_fn(width - 1, height, |x, y| {
                horizontal(x, y).unsigned_abs()
            }),
            vertical_signed: LinedIntegral::from_fn(width, height - 1, vertical),
            vertical_absolute: LinedIntegral::from_fn(width, height - 1, |x, y| {
                vertical(x, y).unsigned_abs()
            }),
        }
    }
}
