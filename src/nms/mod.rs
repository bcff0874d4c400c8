//! Sparse 3x3 non-maximum suppression over row-bucketed candidates.
//!
//! Candidates are stored per row as `(column, strength)` pairs in ascending
//! column order. A frame of `height` rows starting at `y_offset` is
//! pre-allocated; suppression walks three row cursors (`y - 1`, `y`,
//! `y + 1`) in lockstep so each candidate compares against at most eight
//! neighbors without touching a dense buffer.
//!
//! The engine also provides radius-based suppression of already extracted
//! peaks and quadratic sub-pixel refinement.

use std::cmp::Ordering;
use std::ops::Range;

use crate::image::ImageView;
use crate::trace::{trace_event, trace_span};
use crate::util::{JunctionError, JunctionResult};

#[cfg(feature = "rayon")]
mod parallel;
mod peak;
mod radius;

pub use peak::{precise_peak_location_1, precise_peak_location_2};
pub use radius::{suppress_by_radius, suppress_by_radius_indices};

/// Column and strength of a single candidate within its row.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Candidate<T> {
    pub x: u32,
    pub strength: T,
}

/// A located maximum with its strength.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StrengthPosition<C, S> {
    pub x: C,
    pub y: C,
    pub strength: S,
}

impl<C, S> StrengthPosition<C, S> {
    pub fn new(x: C, y: C, strength: S) -> Self {
        Self { x, y, strength }
    }
}

impl<C: PartialOrd, S: PartialOrd> StrengthPosition<C, S> {
    /// Sort comparator: strength descending, then `y`, then `x` ascending.
    pub fn compare_strength_desc(a: &Self, b: &Self) -> Ordering {
        b.strength
            .partial_cmp(&a.strength)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.y.partial_cmp(&b.y).unwrap_or(Ordering::Equal))
            .then_with(|| a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal))
    }
}

/// Axis-aligned sub-area of the candidate frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn columns(&self) -> Range<u32> {
        self.x..self.x + self.width
    }

    fn rows(&self) -> Range<u32> {
        self.y..self.y + self.height
    }
}

/// Candidate store and 3x3 maximum search for a `width x height` frame whose
/// first row is `y_offset`.
#[derive(Clone, Debug)]
pub struct NonMaximumSuppression<T> {
    width: u32,
    y_offset: u32,
    rows: Vec<Vec<Candidate<T>>>,
}

impl<T: Copy + PartialOrd> NonMaximumSuppression<T> {
    pub fn new(width: u32, height: u32, y_offset: u32) -> Self {
        Self {
            width,
            y_offset,
            rows: vec![Vec::new(); height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.rows.len() as u32
    }

    pub fn y_offset(&self) -> u32 {
        self.y_offset
    }

    /// Total number of stored candidates.
    pub fn candidate_count(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    /// Candidates of row `y` (absolute), in ascending column order.
    pub fn row(&self, y: u32) -> &[Candidate<T>] {
        &self.rows[self.row_index(y)]
    }

    #[inline]
    fn row_index(&self, y: u32) -> usize {
        debug_assert!(y >= self.y_offset && y < self.y_offset + self.height());
        (y - self.y_offset) as usize
    }

    /// Appends a candidate to row `y`.
    ///
    /// Columns of one row must arrive in non-decreasing order.
    #[inline]
    pub fn add_candidate(&mut self, x: u32, y: u32, strength: T) {
        debug_assert!(x < self.width);
        let index = self.row_index(y);
        let row = &mut self.rows[index];
        debug_assert!(row.last().map_or(true, |c| c.x <= x));
        row.push(Candidate { x, strength });
    }

    /// Adds every value `>= threshold` inside `region` of a dense buffer.
    ///
    /// `values` is addressed with absolute frame rows and must be exactly
    /// `width` wide; its stride may include padding.
    pub fn add_candidates(
        &mut self,
        values: ImageView<'_, T>,
        region: Region,
        threshold: T,
    ) -> JunctionResult<()> {
        self.validate_values(&values, region)?;
        for y in region.rows() {
            let Some(source) = values.row(y as usize) else {
                continue;
            };
            let index = self.row_index(y);
            push_row_candidates(&mut self.rows[index], source, region.columns(), threshold);
        }
        Ok(())
    }

    /// Pops candidates from the end of row `y` while their column is `>= x`.
    pub fn remove_candidates_right_from(&mut self, x: u32, y: u32) {
        let index = self.row_index(y);
        let row = &mut self.rows[index];
        while row.last().is_some_and(|c| c.x >= x) {
            row.pop();
        }
    }

    /// Clears all rows while keeping their allocations.
    pub fn reset(&mut self) {
        for row in &mut self.rows {
            row.clear();
        }
    }

    /// Returns all 3x3 maxima inside `region` at their integer positions.
    ///
    /// With `strict == false`, equal strength is tolerated in the west and
    /// north neighbors and in the south-west neighbor, so a plateau yields
    /// exactly one maximum (its bottom-right-most element).
    pub fn suppress_non_maximum(
        &self,
        region: Region,
        strict: bool,
    ) -> JunctionResult<Vec<StrengthPosition<u32, T>>> {
        self.suppress_non_maximum_with(region, strict, |x, y, strength| {
            Some(StrengthPosition::new(x, y, strength))
        })
    }

    /// Like [`suppress_non_maximum`](Self::suppress_non_maximum), but every
    /// maximum passes through `refine`, which may reposition or drop it.
    pub fn suppress_non_maximum_with<C, S, F>(
        &self,
        region: Region,
        strict: bool,
        refine: F,
    ) -> JunctionResult<Vec<StrengthPosition<C, S>>>
    where
        F: Fn(u32, u32, T) -> Option<StrengthPosition<C, S>>,
    {
        let _span = trace_span!("suppress_non_maximum", strict = strict).entered();
        let Some((columns, rows)) = self.center_area(region)? else {
            return Ok(Vec::new());
        };

        let mut maxima = Vec::with_capacity(100);
        for y in rows {
            self.suppress_row(y, columns.clone(), strict, &refine, &mut maxima);
        }
        trace_event!("nms_maxima", count = maxima.len());
        Ok(maxima)
    }

    fn validate_region(&self, region: Region) -> JunctionResult<()> {
        let within_columns = region.x.checked_add(region.width).is_some_and(|end| end <= self.width);
        let within_rows = region.y >= self.y_offset
            && region
                .y
                .checked_add(region.height)
                .is_some_and(|end| end <= self.y_offset + self.height());
        if within_columns && within_rows {
            Ok(())
        } else {
            Err(JunctionError::RegionOutOfBounds {
                x: region.x as usize,
                y: region.y as usize,
                width: region.width as usize,
                height: region.height as usize,
                domain_width: self.width as usize,
                domain_height: (self.y_offset + self.height()) as usize,
            })
        }
    }

    fn validate_values(&self, values: &ImageView<'_, T>, region: Region) -> JunctionResult<()> {
        self.validate_region(region)?;
        if values.width() != self.width as usize {
            return Err(JunctionError::InvalidParameter {
                name: "values",
                reason: "buffer width must equal the suppression frame width",
            });
        }
        if values.height() < (region.y + region.height) as usize {
            return Err(JunctionError::RegionOutOfBounds {
                x: region.x as usize,
                y: region.y as usize,
                width: region.width as usize,
                height: region.height as usize,
                domain_width: values.width(),
                domain_height: values.height(),
            });
        }
        Ok(())
    }

    /// Columns and rows whose candidates have a complete 3x3 neighborhood
    /// inside the frame; `None` if the region is thinner than 3 in either
    /// direction.
    fn center_area(&self, region: Region) -> JunctionResult<Option<(Range<u32>, Range<u32>)>> {
        self.validate_region(region)?;
        if region.width < 3 || region.height < 3 || self.width < 2 || self.height() < 2 {
            return Ok(None);
        }
        let columns = region.x.max(1)..(region.x + region.width).min(self.width - 1);
        let rows = region.y.max(self.y_offset + 1)
            ..(region.y + region.height).min(self.y_offset + self.height() - 1);
        Ok(Some((columns, rows)))
    }

    /// 3x3 maximum test for every candidate of row `y` within `columns`.
    fn suppress_row<C, S, F>(
        &self,
        y: u32,
        columns: Range<u32>,
        strict: bool,
        refine: &F,
        out: &mut Vec<StrengthPosition<C, S>>,
    ) where
        F: Fn(u32, u32, T) -> Option<StrengthPosition<C, S>>,
    {
        let north = self.row(y - 1);
        let center = self.row(y);
        let south = self.row(y + 1);

        // a neighbor defeats the center if it is larger, or equal when strict
        let defeats = |neighbor: T, value: T, strict: bool| {
            if strict {
                neighbor >= value
            } else {
                neighbor > value
            }
        };

        let mut i_north = 0usize;
        let mut i_south = 0usize;

        for (i, candidate) in center.iter().enumerate() {
            let x = candidate.x;
            let value = candidate.strength;
            if !columns.contains(&x) {
                continue;
            }

            if i > 0 {
                let west = center[i - 1];
                if west.x + 1 == x && defeats(west.strength, value, strict) {
                    continue;
                }
            }
            if let Some(east) = center.get(i + 1) {
                if east.x == x + 1 && defeats(east.strength, value, true) {
                    continue;
                }
            }

            while i_north < north.len() && north[i_north].x + 1 < x {
                i_north += 1;
            }
            let north_defeats = north[i_north..]
                .iter()
                .take_while(|n| n.x <= x + 1)
                .any(|n| defeats(n.strength, value, strict));
            if north_defeats {
                continue;
            }

            while i_south < south.len() && south[i_south].x + 1 < x {
                i_south += 1;
            }
            let south_defeats = south[i_south..]
                .iter()
                .take_while(|s| s.x <= x + 1)
                .any(|s| defeats(s.strength, value, strict || s.x != x - 1));
            if south_defeats {
                continue;
            }

            if let Some(position) = refine(x, y, value) {
                out.push(position);
            }
        }
    }
}

fn push_row_candidates<T: Copy + PartialOrd>(
    row: &mut Vec<Candidate<T>>,
    source: &[T],
    columns: Range<u32>,
    threshold: T,
) {
    for x in columns {
        let value = source[x as usize];
        if value >= threshold {
            row.push(Candidate { x, strength: value });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{NonMaximumSuppression, Region, StrengthPosition};
    use crate::image::ImageView;

    fn full<T: Copy + PartialOrd>(nms: &NonMaximumSuppression<T>) -> Region {
        Region::new(0, nms.y_offset(), nms.width(), nms.height())
    }

    #[test]
    fn single_peak_is_found() {
        let mut values = vec![0u32; 25];
        values[2 * 5 + 2] = 9;
        values[2 * 5 + 1] = 4;
        let view = ImageView::from_slice(&values, 5, 5).unwrap();

        let mut nms = NonMaximumSuppression::new(5, 5, 0);
        nms.add_candidates(view, Region::new(0, 0, 5, 5), 1).unwrap();
        assert_eq!(nms.candidate_count(), 2);

        let maxima = nms.suppress_non_maximum(full(&nms), true).unwrap();
        assert_eq!(maxima, vec![StrengthPosition::new(2, 2, 9)]);
    }

    #[test]
    fn plateau_strict_and_non_strict() {
        let mut nms = NonMaximumSuppression::new(6, 5, 0);
        nms.add_candidate(2, 2, 7u32);
        nms.add_candidate(3, 2, 7u32);

        assert!(nms.suppress_non_maximum(full(&nms), true).unwrap().is_empty());
        let maxima = nms.suppress_non_maximum(full(&nms), false).unwrap();
        assert_eq!(maxima, vec![StrengthPosition::new(3, 2, 7)]);
    }

    #[test]
    fn vertical_plateau_keeps_lower_element() {
        let mut nms = NonMaximumSuppression::new(5, 6, 0);
        nms.add_candidate(2, 2, 3u32);
        nms.add_candidate(2, 3, 3u32);
        let maxima = nms.suppress_non_maximum(full(&nms), false).unwrap();
        assert_eq!(maxima, vec![StrengthPosition::new(2, 3, 3)]);
    }

    #[test]
    fn border_candidates_are_never_maxima() {
        let mut nms = NonMaximumSuppression::new(4, 4, 0);
        nms.add_candidate(0, 1, 10u32);
        nms.add_candidate(3, 2, 10u32);
        nms.add_candidate(1, 0, 10u32);
        assert!(nms.suppress_non_maximum(full(&nms), true).unwrap().is_empty());
    }

    #[test]
    fn thin_region_yields_nothing() {
        let mut nms = NonMaximumSuppression::new(10, 10, 0);
        nms.add_candidate(5, 5, 1u32);
        let maxima = nms.suppress_non_maximum(Region::new(4, 4, 2, 5), true).unwrap();
        assert!(maxima.is_empty());
    }

    #[test]
    fn region_outside_frame_is_rejected() {
        let nms = NonMaximumSuppression::<u32>::new(10, 10, 5);
        assert!(nms.suppress_non_maximum(Region::new(0, 0, 10, 10), true).is_err());
        assert!(nms.suppress_non_maximum(Region::new(0, 5, 11, 10), true).is_err());
    }

    #[test]
    fn y_offset_addresses_absolute_rows() {
        let mut nms = NonMaximumSuppression::new(5, 3, 10);
        nms.add_candidate(2, 11, 5i32);
        let maxima = nms.suppress_non_maximum(full(&nms), true).unwrap();
        assert_eq!(maxima, vec![StrengthPosition::new(2, 11, 5)]);
    }

    #[test]
    fn remove_right_from_and_reset() {
        let mut nms = NonMaximumSuppression::new(10, 2, 0);
        for x in [1, 4, 6, 8] {
            nms.add_candidate(x, 1, 1.0f32);
        }
        nms.remove_candidates_right_from(5, 1);
        assert_eq!(nms.row(1).len(), 2);
        nms.reset();
        assert_eq!(nms.candidate_count(), 0);
    }

    #[test]
    fn callback_can_drop_and_refine() {
        let mut nms = NonMaximumSuppression::new(7, 7, 0);
        nms.add_candidate(2, 2, 4u32);
        nms.add_candidate(4, 4, 8u32);
        let refined = nms
            .suppress_non_maximum_with(full(&nms), true, |x, y, s| {
                (s > 5).then(|| StrengthPosition::new(x as f32 + 0.5, y as f32, s as f32 * 2.0))
            })
            .unwrap();
        assert_eq!(refined, vec![StrengthPosition::new(4.5, 4.0, 16.0)]);
    }

    #[test]
    fn compare_strength_orders_descending() {
        let mut positions = vec![
            StrengthPosition::new(1.0f32, 1.0, 2.0f32),
            StrengthPosition::new(0.0, 0.0, 5.0),
            StrengthPosition::new(3.0, 0.0, 2.0),
        ];
        positions.sort_by(StrengthPosition::compare_strength_desc);
        assert_eq!(positions[0].strength, 5.0);
        assert_eq!(positions[1], StrengthPosition::new(3.0, 0.0, 2.0));
    }
}
