//! Sub-pixel peak refinement from discrete neighborhoods.
//!
//! Both functions take one Newton step on the quadratic Taylor expansion
//! around the center sample (first derivative `[-1 0 1] / 2`, second
//! derivative `[1 -2 1]`).

const EPS: f64 = 1e-6;

/// Peak offset in `[-1, 1]` for three consecutive samples centered at 0.
///
/// The range is closed: an offset of exactly `±1` (the peak sits on a
/// neighboring sample) is returned, anything beyond yields `None`. Flat
/// curvature yields `Some(0.0)`.
pub fn precise_peak_location_1<T: Copy + Into<f64>>(left: T, middle: T, right: T) -> Option<f32> {
    let (left, middle, right) = (left.into(), middle.into(), right.into());
    let df = (right - left) * 0.5;
    let dff = left + right - 2.0 * middle;

    if dff.abs() <= EPS {
        return Some(0.0);
    }

    let x = -df / dff;
    if !(-1.0..=1.0).contains(&x) {
        return None;
    }
    Some(x as f32)
}

/// Peak offset `(dx, dy)` for a 3x3 neighborhood `values[row][column]`
/// centered at `values[1][1]`.
///
/// A singular Hessian yields `Some((0, 0))`. Each axis accepts the closed
/// range `[-1, 1]`, so offsets of exactly `±1` are kept; anything beyond in
/// either axis yields `None`.
pub fn precise_peak_location_2<T: Copy + Into<f64>>(values: [[T; 3]; 3]) -> Option<(f32, f32)> {
    let v = values.map(|row| row.map(Into::<f64>::into));

    let dx = (v[1][2] - v[1][0]) * 0.5;
    let dy = (v[2][1] - v[0][1]) * 0.5;
    let dxx = v[1][2] + v[1][0] - 2.0 * v[1][1];
    let dyy = v[2][1] + v[0][1] - 2.0 * v[1][1];
    let dxy = (v[2][2] + v[0][0] - v[2][0] - v[0][2]) * 0.25;

    let det = dxx * dyy - dxy * dxy;
    if det.abs() <= EPS {
        return Some((0.0, 0.0));
    }

    let offset_x = -(dyy * dx - dxy * dy) / det;
    let offset_y = -(dxx * dy - dxy * dx) / det;
    if !(-1.0..=1.0).contains(&offset_x) || !(-1.0..=1.0).contains(&offset_y) {
        return None;
    }
    Some((offset_x as f32, offset_y as f32))
}
