use crate::image::ImageView;

/// Samples `image` at a sub-pixel location with bilinear interpolation.
///
/// Pixel centers sit at integer coordinates. Returns `None` when the
/// location lies outside `[0, width - 1] x [0, height - 1]`.
pub fn interpolate_bilinear(image: ImageView<'_, u8>, x: f32, y: f32) -> Option<f32> {
    let max_x = (image.width() - 1) as f32;
    let max_y = (image.height() - 1) as f32;
    if !(x >= 0.0 && y >= 0.0 && x <= max_x && y <= max_y) {
        return None;
    }

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(image.width() - 1);
    let y1 = (y0 + 1).min(image.height() - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let top = image.at(x0, y0) as f32 * (1.0 - fx) + image.at(x1, y0) as f32 * fx;
    let bottom = image.at(x0, y1) as f32 * (1.0 - fx) + image.at(x1, y1) as f32 * fx;
    Some(top * (1.0 - fy) + bottom * fy)
}

#[cfg(test)]
mod tests {
    use super::interpolate_bilinear;
    use crate::image::ImageView;

    #[test]
    fn bilinear_interpolates_between_pixels() {
        let data = [0u8, 100, 50, 150];
        let view = ImageView::from_slice(&data, 2, 2).unwrap();
        assert_eq!(interpolate_bilinear(view, 0.0, 0.0), Some(0.0));
        let center = interpolate_bilinear(view, 0.5, 0.5).unwrap();
        assert!((center - 75.0).abs() < 1e-4);
        assert_eq!(interpolate_bilinear(view, 1.0, 1.0), Some(150.0));
        assert_eq!(interpolate_bilinear(view, 1.01, 0.0), None);
        assert_eq!(interpolate_bilinear(view, -0.01, 0.0), None);
    }
}
