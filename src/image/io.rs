//! Grayscale frame loading through the `image` crate.
//!
//! Available with the `image-io` feature. Color inputs are converted to
//! 8-bit luma before they enter the detectors.

use crate::image::{ImageView, OwnedImage};
use crate::util::{JunctionError, JunctionResult};
use std::path::Path;

/// Borrows the pixels of a decoded grayscale frame.
pub fn view_from_gray_image(frame: &image::GrayImage) -> JunctionResult<ImageView<'_, u8>> {
    ImageView::from_slice(frame.as_raw(), frame.width() as usize, frame.height() as usize)
}

/// Copies a decoded frame of any pixel format into an 8-bit luma image.
pub fn owned_from_dynamic_image(frame: &image::DynamicImage) -> JunctionResult<OwnedImage> {
    let gray = frame.to_luma8();
    let (width, height) = (gray.width() as usize, gray.height() as usize);
    OwnedImage::new(gray.into_raw(), width, height)
}

/// Decodes a PNG or JPEG file into an 8-bit luma image.
pub fn load_gray_image<P: AsRef<Path>>(path: P) -> JunctionResult<OwnedImage> {
    let path = path.as_ref();
    let frame = image::open(path).map_err(|err| JunctionError::ImageIo {
        reason: format!("{}: {err}", path.display()),
    })?;
    owned_from_dynamic_image(&frame)
}
