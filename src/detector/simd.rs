//! SIMD combination of horizontal and vertical junction responses using the
//! `wide` crate.
//!
//! Eight response pairs are combined per iteration with `f32x8`; the
//! remainder of a row falls back to the scalar loop.

use wide::{f32x8, CmpGt, CmpLt};

use crate::detector::gradient_variance::combine_row_scalar;

const LANES: usize = 8;

/// Load 8 f32 values into f32x8.
#[inline]
fn load_f32x8(slice: &[f32]) -> f32x8 {
    f32x8::from([
        slice[0], slice[1], slice[2], slice[3], slice[4], slice[5], slice[6], slice[7],
    ])
}

/// SIMD variant of [`combine_row_scalar`].
pub(crate) fn combine_row(h_row: &[f32], v_row: &[f32], sign: i32, out: &mut [f32]) {
    let len = out.len().min(h_row.len()).min(v_row.len());
    let simd_end = len / LANES * LANES;

    let zero = f32x8::ZERO;
    let ratio = f32x8::splat(4.0);

    for i in (0..simd_end).step_by(LANES) {
        let h = load_f32x8(&h_row[i..i + LANES]);
        let v = load_f32x8(&v_row[i..i + LANES]);
        let h_abs = h.abs();
        let v_abs = v.abs();

        let balanced = h_abs.cmp_lt(v_abs * ratio) & v_abs.cmp_lt(h_abs * ratio);
        let negative = h.cmp_lt(zero) & v.cmp_lt(zero);
        let positive = h.cmp_gt(zero) & v.cmp_gt(zero);
        let signed = match sign {
            s if s < 0 => negative,
            s if s > 0 => positive,
            _ => negative | positive,
        };

        let combined = (balanced & signed).blend(h_abs * v_abs, zero);
        out[i..i + LANES].copy_from_slice(&combined.to_array());
    }

    combine_row_scalar(
        &h_row[simd_end..len],
        &v_row[simd_end..len],
        sign,
        &mut out[simd_end..len],
    );
}

#[cfg(test)]
mod tests {
    use super::combine_row;
    use crate::detector::gradient_variance::combine_row_scalar;
    use rand::{Rng, SeedableRng};

    #[test]
    fn matches_scalar_combination() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let len = 37;
        let h: Vec<f32> = (0..len).map(|_| rng.random_range(-20.0..20.0)).collect();
        let v: Vec<f32> = (0..len).map(|_| rng.random_range(-20.0..20.0)).collect();

        for sign in -1..=1 {
            let mut expected = vec![0.0f32; len];
            let mut actual = vec![0.0f32; len];
            combine_row_scalar(&h, &v, sign, &mut expected);
            combine_row(&h, &v, sign, &mut actual);
            assert_eq!(expected, actual);
        }
    }
}
