//! Radius-based suppression of extracted peaks.

use crate::nms::StrengthPosition;
use crate::trace::{trace_event, trace_span};

/// Removes every position that has a stronger position within `radius`.
///
/// Positions must lie inside `[0, width) x [0, height)`. Equal strengths
/// within the radius remove both positions when `strict`; otherwise the one
/// further bottom-right (larger `y`, then larger `x`) survives.
pub fn suppress_by_radius<C, S>(
    width: u32,
    height: u32,
    positions: &[StrengthPosition<C, S>],
    radius: f32,
    strict: bool,
) -> Vec<StrengthPosition<C, S>>
where
    C: Copy + PartialOrd + Into<f64>,
    S: Copy + PartialOrd,
{
    suppress_by_radius_indices(width, height, positions, radius, strict)
        .into_iter()
        .map(|i| positions[i])
        .collect()
}

/// Same as [`suppress_by_radius`], returning the indices of the surviving
/// positions in input order.
pub fn suppress_by_radius_indices<C, S>(
    width: u32,
    height: u32,
    positions: &[StrengthPosition<C, S>],
    radius: f32,
    strict: bool,
) -> Vec<usize>
where
    C: Copy + PartialOrd + Into<f64>,
    S: Copy + PartialOrd,
{
    let _span = trace_span!("suppress_by_radius", count = positions.len()).entered();
    debug_assert!(width >= 1 && height >= 1);

    let bin_size = 10u32.max(radius.max(0.0).ceil() as u32);
    let horizontal_bins = width.div_ceil(bin_size).max(1) as usize;
    let vertical_bins = height.div_ceil(bin_size).max(1) as usize;

    let bin = |p: &StrengthPosition<C, S>| -> (usize, usize) {
        let x: f64 = p.x.into();
        let y: f64 = p.y.into();
        debug_assert!(x >= 0.0 && y >= 0.0 && x < width as f64 && y < height as f64);
        let bx = ((x.max(0.0) as u32) / bin_size) as usize;
        let by = ((y.max(0.0) as u32) / bin_size) as usize;
        (bx.min(horizontal_bins - 1), by.min(vertical_bins - 1))
    };

    let mut cells: Vec<Vec<usize>> = vec![Vec::new(); horizontal_bins * vertical_bins];
    for (i, p) in positions.iter().enumerate() {
        let (bx, by) = bin(p);
        cells[by * horizontal_bins + bx].push(i);
    }

    let sqr_radius = (radius as f64) * (radius as f64);
    let sqr_distance = |a: &StrengthPosition<C, S>, b: &StrengthPosition<C, S>| {
        let (ax, ay): (f64, f64) = (a.x.into(), a.y.into());
        let (bx, by): (f64, f64) = (b.x.into(), b.y.into());
        (ax - bx) * (ax - bx) + (ay - by) * (ay - by)
    };

    let mut valid = vec![true; positions.len()];

    for (candidate_index, candidate) in positions.iter().enumerate() {
        if !valid[candidate_index] {
            continue;
        }
        let (bx, by) = bin(candidate);

        'cells: for y in by.saturating_sub(1)..(by + 2).min(vertical_bins) {
            for x in bx.saturating_sub(1)..(bx + 2).min(horizontal_bins) {
                for &test_index in &cells[y * horizontal_bins + x] {
                    if test_index == candidate_index {
                        continue;
                    }
                    // suppressed neighbors still count, they may suppress the candidate
                    let test = &positions[test_index];
                    if sqr_distance(candidate, test) > sqr_radius {
                        continue;
                    }

                    if candidate.strength > test.strength {
                        valid[test_index] = false;
                    } else if candidate.strength < test.strength {
                        valid[candidate_index] = false;
                        break 'cells;
                    } else if strict {
                        valid[candidate_index] = false;
                        valid[test_index] = false;
                        break 'cells;
                    } else if candidate.y < test.y || (candidate.y == test.y && candidate.x < test.x) {
                        valid[candidate_index] = false;
                        break 'cells;
                    } else {
                        valid[test_index] = false;
                    }
                }
            }
        }
    }

    let survivors: Vec<usize> = (0..positions.len()).filter(|&i| valid[i]).collect();
    trace_event!("radius_survivors", count = survivors.len());
    survivors
}

#[cfg(test)]
mod tests {
    use super::{suppress_by_radius, suppress_by_radius_indices};
    use crate::nms::StrengthPosition;

    #[test]
    fn weaker_neighbor_is_removed() {
        let positions = vec![
            StrengthPosition::new(10.0f32, 10.0, 5.0f32),
            StrengthPosition::new(13.0, 10.0, 9.0),
            StrengthPosition::new(40.0, 40.0, 1.0),
        ];
        let kept = suppress_by_radius_indices(64, 64, &positions, 5.0, true);
        assert_eq!(kept, vec![1, 2]);
    }

    #[test]
    fn equal_strength_tie_breaks() {
        let positions = vec![
            StrengthPosition::new(10u32, 10, 3i32),
            StrengthPosition::new(12, 10, 3),
        ];
        assert!(suppress_by_radius(32, 32, &positions, 4.0, true).is_empty());
        let kept = suppress_by_radius(32, 32, &positions, 4.0, false);
        assert_eq!(kept, vec![StrengthPosition::new(12, 10, 3)]);
    }

    #[test]
    fn neighbors_across_bins_are_compared() {
        // bin size is 10: the two points sit in adjacent cells
        let positions = vec![
            StrengthPosition::new(9.5f32, 5.0, 1.0f32),
            StrengthPosition::new(10.5, 5.0, 2.0),
        ];
        assert_eq!(suppress_by_radius_indices(30, 30, &positions, 2.0, true), vec![1]);
    }
}
