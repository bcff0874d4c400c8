//! Row-parallel candidate insertion and 3x3 suppression (feature `rayon`).
//!
//! Every task owns a disjoint set of rows, so insertion needs no locking and
//! suppression collects per-row vectors that are concatenated in row order.
//! Results are identical to the sequential variants.

use rayon::prelude::*;

use crate::image::ImageView;
use crate::nms::{push_row_candidates, NonMaximumSuppression, Region, StrengthPosition};
use crate::trace::{trace_event, trace_span};
use crate::util::JunctionResult;

const MIN_ROWS_ADD: usize = 5;
const MIN_ROWS_SUPPRESS: usize = 6;

impl<T: Copy + PartialOrd + Send + Sync> NonMaximumSuppression<T> {
    /// Parallel variant of [`add_candidates`](Self::add_candidates).
    pub fn add_candidates_par(
        &mut self,
        values: ImageView<'_, T>,
        region: Region,
        threshold: T,
    ) -> JunctionResult<()> {
        self.validate_values(&values, region)?;
        let first = self.row_index(region.y);
        let columns = region.columns();
        let first_row = region.y as usize;

        self.rows[first..first + region.height as usize]
            .par_iter_mut()
            .with_min_len(MIN_ROWS_ADD)
            .enumerate()
            .for_each(|(i, row)| {
                if let Some(source) = values.row(first_row + i) {
                    push_row_candidates(row, source, columns.clone(), threshold);
                }
            });
        Ok(())
    }

    /// Parallel variant of [`suppress_non_maximum`](Self::suppress_non_maximum).
    pub fn suppress_non_maximum_par(
        &self,
        region: Region,
        strict: bool,
    ) -> JunctionResult<Vec<StrengthPosition<u32, T>>> {
        self.suppress_non_maximum_with_par(region, strict, |x, y, strength| {
            Some(StrengthPosition::new(x, y, strength))
        })
    }

    /// Parallel variant of
    /// [`suppress_non_maximum_with`](Self::suppress_non_maximum_with).
    pub fn suppress_non_maximum_with_par<C, S, F>(
        &self,
        region: Region,
        strict: bool,
        refine: F,
    ) -> JunctionResult<Vec<StrengthPosition<C, S>>>
    where
        C: Send,
        S: Send,
        F: Fn(u32, u32, T) -> Option<StrengthPosition<C, S>> + Sync,
    {
        let _span = trace_span!("suppress_non_maximum_par", strict = strict).entered();
        let Some((columns, rows)) = self.center_area(region)? else {
            return Ok(Vec::new());
        };

        let per_row: Vec<Vec<StrengthPosition<C, S>>> = rows
            .into_par_iter()
            .with_min_len(MIN_ROWS_SUPPRESS)
            .map(|y| {
                let mut local = Vec::new();
                self.suppress_row(y, columns.clone(), strict, &refine, &mut local);
                local
            })
            .collect();

        let maxima: Vec<_> = per_row.into_iter().flatten().collect();
        trace_event!("nms_maxima", count = maxima.len());
        Ok(maxima)
    }
}
