//! Scalar and angle helpers shared by the detectors and the matcher.

/// Returns the cosine of an angle given in degrees.
pub(crate) fn cos_deg(angle_deg: f32) -> f32 {
    angle_deg.to_radians().cos()
}

/// Wraps an angle in radians to the range [0, 2*pi).
pub(crate) fn wrap_rad_positive(angle: f32) -> f32 {
    let tau = std::f32::consts::TAU;
    let wrapped = angle % tau;
    if wrapped < 0.0 {
        wrapped + tau
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::{cos_deg, wrap_rad_positive};
    use std::f32::consts::PI;

    #[test]
    fn wrap_rad_positive_maps_to_expected_range() {
        assert!((wrap_rad_positive(-0.5 * PI) - 1.5 * PI).abs() < 1e-5);
        assert!((wrap_rad_positive(2.5 * PI) - 0.5 * PI).abs() < 1e-5);
        assert!(wrap_rad_positive(0.0).abs() < 1e-6);
    }

    #[test]
    fn cos_deg_matches_known_values() {
        assert!((cos_deg(60.0) - 0.5).abs() < 1e-6);
        assert!(cos_deg(90.0).abs() < 1e-6);
        assert!(cos_deg(270.0).abs() < 1e-6);
    }
}
