//! Image views, owned buffers and integral images.
//!
//! `ImageView` is a borrowed 2D view into a 1D buffer with an explicit stride.
//! The stride counts elements between the starts of consecutive rows, so a
//! stride larger than the width represents padded rows. This is the
//! interchange format for grayscale frames, response maps and candidate
//! score fields. ROI slices are zero-copy views into the same backing slice
//! and retain the original stride.

use crate::util::{JunctionError, JunctionResult};

pub mod integral;
#[cfg(feature = "image-io")]
pub mod io;
mod sample;

pub use sample::interpolate_bilinear;

/// Borrowed 2D image view with an explicit stride.
#[derive(Copy, Clone, Debug)]
pub struct ImageView<'a, T> {
    data: &'a [T],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a, T> ImageView<'a, T> {
    /// Creates a contiguous view with `stride == width`.
    pub fn from_slice(data: &'a [T], width: usize, height: usize) -> JunctionResult<Self> {
        Self::new(data, width, height, width)
    }

    /// Creates a view with an explicit stride.
    pub fn new(data: &'a [T], width: usize, height: usize, stride: usize) -> JunctionResult<Self> {
        let needed = required_len(width, height, stride)?;
        if data.len() < needed {
            return Err(JunctionError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the stride in elements between row starts.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the number of padding elements at the end of each row.
    pub fn padding(&self) -> usize {
        self.stride - self.width
    }

    /// Returns the backing slice including any row padding.
    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }

    /// Returns the element at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<&'a T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y.checked_mul(self.stride)?.checked_add(x)?;
        self.data.get(idx)
    }

    /// Returns a contiguous slice for row `y` with length `width`.
    pub fn row(&self, y: usize) -> Option<&'a [T]> {
        if y >= self.height {
            return None;
        }
        let start = y.checked_mul(self.stride)?;
        let end = start.checked_add(self.width)?;
        self.data.get(start..end)
    }

    /// Returns a zero-copy ROI view into the same backing buffer.
    pub fn roi(
        &self,
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    ) -> JunctionResult<ImageView<'a, T>> {
        if width == 0 || height == 0 {
            return Err(JunctionError::InvalidDimensions { width, height });
        }

        let out_of_bounds = JunctionError::RegionOutOfBounds {
            x,
            y,
            width,
            height,
            domain_width: self.width,
            domain_height: self.height,
        };
        let end_x = x.checked_add(width).ok_or(out_of_bounds.clone())?;
        let end_y = y.checked_add(height).ok_or(out_of_bounds.clone())?;
        if end_x > self.width || end_y > self.height {
            return Err(out_of_bounds);
        }

        let start = y * self.stride + x;
        let data = self
            .data
            .get(start..)
            .ok_or(JunctionError::BufferTooSmall {
                needed: start.saturating_add(1),
                got: self.data.len(),
            })?;

        ImageView::new(data, width, height, self.stride)
    }
}

impl<T: Copy> ImageView<'_, T> {
    /// Returns the element at `(x, y)` without the `Option` wrapper.
    ///
    /// Callers must guarantee `x < width` and `y < height`.
    #[inline]
    pub(crate) fn at(&self, x: usize, y: usize) -> T {
        debug_assert!(x < self.width && y < self.height);
        self.data[y * self.stride + x]
    }
}

/// Owned contiguous image buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct OwnedImage<T = u8> {
    data: Vec<T>,
    width: usize,
    height: usize,
}

impl<T: Copy> OwnedImage<T> {
    /// Wraps a contiguous buffer with exactly `width * height` elements.
    pub fn new(data: Vec<T>, width: usize, height: usize) -> JunctionResult<Self> {
        let needed = required_len(width, height, width)?;
        if data.len() < needed {
            return Err(JunctionError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        if data.len() > needed {
            return Err(JunctionError::InvalidDimensions { width, height });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Creates an image with every element set to `value`.
    pub fn filled(width: usize, height: usize, value: T) -> JunctionResult<Self> {
        let needed = required_len(width, height, width)?;
        Ok(Self {
            data: vec![value; needed],
            width,
            height,
        })
    }

    /// Copies a (possibly padded) view into a contiguous buffer.
    pub fn from_view(view: ImageView<'_, T>) -> Self {
        let mut data = Vec::with_capacity(view.width() * view.height());
        for y in 0..view.height() {
            data.extend_from_slice(&view.as_slice()[y * view.stride()..y * view.stride() + view.width()]);
        }
        Self {
            data,
            width: view.width(),
            height: view.height(),
        }
    }

    /// Returns a copy rotated by 180 degrees (flipped and mirrored).
    pub fn rotated_180(&self) -> Self {
        let mut data = self.data.clone();
        data.reverse();
        Self {
            data,
            width: self.width,
            height: self.height,
        }
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the pixel data in row-major order.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Returns the element at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(y * self.width + x).copied()
    }

    /// Overwrites the element at `(x, y)`; out-of-range writes are ignored.
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        if x < self.width && y < self.height {
            self.data[y * self.width + x] = value;
        }
    }

    /// Returns a borrowed view of the image.
    pub fn view(&self) -> ImageView<'_, T> {
        ImageView {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride: self.width,
        }
    }
}

fn required_len(width: usize, height: usize, stride: usize) -> JunctionResult<usize> {
    if width == 0 || height == 0 {
        return Err(JunctionError::InvalidDimensions { width, height });
    }
    if stride < width {
        return Err(JunctionError::InvalidStride { width, stride });
    }
    let needed = (height - 1)
        .checked_mul(stride)
        .and_then(|v| v.checked_add(width))
        .ok_or(JunctionError::InvalidDimensions { width, height })?;
    Ok(needed)
}

#[cfg(test)]
mod tests {
    use super::{ImageView, OwnedImage};

    #[test]
    fn rotated_180_maps_corners() {
        let image = OwnedImage::new((0u8..6).collect(), 3, 2).unwrap();
        let rotated = image.rotated_180();
        assert_eq!(rotated.get(0, 0), Some(5));
        assert_eq!(rotated.get(2, 1), Some(0));
        assert_eq!(rotated.get(1, 0), image.get(1, 1));
    }

    #[test]
    fn from_view_drops_padding() {
        let data = [1u8, 2, 99, 3, 4, 99];
        let view = ImageView::new(&data, 2, 2, 3).unwrap();
        assert_eq!(view.padding(), 1);
        let owned = OwnedImage::from_view(view);
        assert_eq!(owned.data(), &[1, 2, 3, 4]);
    }
}
