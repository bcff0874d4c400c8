//! Uniform bin grid over a rectangular area storing element indices per cell.

use crate::geometry::Vec2;

/// Uniform grid of index buckets over `[left, left + width) x [top, top + height)`.
#[derive(Clone, Debug)]
pub struct SpatialGrid {
    left: f32,
    top: f32,
    width: f32,
    height: f32,
    horizontal_bins: usize,
    vertical_bins: usize,
    x_to_bin: f32,
    y_to_bin: f32,
    cells: Vec<Vec<u32>>,
}

impl SpatialGrid {
    /// Creates an empty grid; bin counts are raised to at least one.
    pub fn new(
        left: f32,
        top: f32,
        width: f32,
        height: f32,
        horizontal_bins: usize,
        vertical_bins: usize,
    ) -> Self {
        let horizontal_bins = horizontal_bins.max(1);
        let vertical_bins = vertical_bins.max(1);
        let width = width.max(f32::EPSILON);
        let height = height.max(f32::EPSILON);
        Self {
            left,
            top,
            width,
            height,
            horizontal_bins,
            vertical_bins,
            x_to_bin: horizontal_bins as f32 / width,
            y_to_bin: vertical_bins as f32 / height,
            cells: vec![Vec::new(); horizontal_bins * vertical_bins],
        }
    }

    /// Bin counts such that a 3x3 neighborhood covers at least `distance` in
    /// every direction.
    pub fn ideal_bins_neighborhood9(width: usize, height: usize, distance: f32) -> (usize, usize) {
        let ideal = |extent: usize| -> usize {
            if distance <= 0.0 {
                return extent.max(1);
            }
            let bins = (extent as f32 / distance).round() as usize;
            bins.clamp(1, extent.max(1))
        };
        (ideal(width), ideal(height))
    }

    pub fn horizontal_bins(&self) -> usize {
        self.horizontal_bins
    }

    pub fn vertical_bins(&self) -> usize {
        self.vertical_bins
    }

    pub fn left(&self) -> f32 {
        self.left
    }

    pub fn top(&self) -> f32 {
        self.top
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    /// Horizontal bin of `x`; may be negative or `>= horizontal_bins`.
    #[inline]
    pub fn horizontal_bin(&self, x: f32) -> i32 {
        ((x - self.left) * self.x_to_bin).floor() as i32
    }

    /// Vertical bin of `y`; may be negative or `>= vertical_bins`.
    #[inline]
    pub fn vertical_bin(&self, y: f32) -> i32 {
        ((y - self.top) * self.y_to_bin).floor() as i32
    }

    #[inline]
    pub fn clamped_horizontal_bin(&self, x: f32) -> usize {
        self.horizontal_bin(x).clamp(0, self.horizontal_bins as i32 - 1) as usize
    }

    #[inline]
    pub fn clamped_vertical_bin(&self, y: f32) -> usize {
        self.vertical_bin(y).clamp(0, self.vertical_bins as i32 - 1) as usize
    }

    /// Returns the bin of `point` if it lies inside the grid area.
    pub fn bin_of(&self, point: &Vec2) -> Option<(usize, usize)> {
        let bx = self.horizontal_bin(point.x);
        let by = self.vertical_bin(point.y);
        if bx < 0 || by < 0 || bx >= self.horizontal_bins as i32 || by >= self.vertical_bins as i32 {
            return None;
        }
        Some((bx as usize, by as usize))
    }

    /// Indices stored in cell `(bx, by)`.
    #[inline]
    pub fn cell(&self, bx: usize, by: usize) -> &[u32] {
        &self.cells[by * self.horizontal_bins + bx]
    }

    /// Appends `index` to cell `(bx, by)`.
    #[inline]
    pub fn push(&mut self, bx: usize, by: usize, index: u32) {
        let hb = self.horizontal_bins;
        self.cells[by * hb + bx].push(index);
    }

    /// Inserts `index` into the cell containing `point`; points outside the
    /// grid area are ignored. Returns `true` if inserted.
    pub fn insert(&mut self, point: &Vec2, index: u32) -> bool {
        match self.bin_of(point) {
            Some((bx, by)) => {
                self.push(bx, by, index);
                true
            }
            None => false,
        }
    }

    /// Appends all indices of the 3x3 cells centered at `(bx, by)` to `out`.
    pub fn indices_neighborhood9(&self, bx: usize, by: usize, out: &mut Vec<u32>) {
        let x0 = bx.saturating_sub(1);
        let y0 = by.saturating_sub(1);
        let x1 = (bx + 1).min(self.horizontal_bins - 1);
        let y1 = (by + 1).min(self.vertical_bins - 1);
        for y in y0..=y1 {
            for x in x0..=x1 {
                out.extend_from_slice(self.cell(x, y));
            }
        }
    }

    /// Returns a grid in which every cell also holds the indices of its eight
    /// neighbors, so one cell lookup yields the full 3x3 neighborhood.
    pub fn with_copied_neighborhood8(&self) -> Self {
        let mut cells = Vec::with_capacity(self.cells.len());
        let mut scratch = Vec::new();
        for by in 0..self.vertical_bins {
            for bx in 0..self.horizontal_bins {
                scratch.clear();
                self.indices_neighborhood9(bx, by, &mut scratch);
                cells.push(scratch.clone());
            }
        }
        Self {
            cells,
            ..self.clone_layout()
        }
    }

    fn clone_layout(&self) -> Self {
        Self {
            left: self.left,
            top: self.top,
            width: self.width,
            height: self.height,
            horizontal_bins: self.horizontal_bins,
            vertical_bins: self.vertical_bins,
            x_to_bin: self.x_to_bin,
            y_to_bin: self.y_to_bin,
            cells: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SpatialGrid;
    use crate::geometry::Vec2;

    #[test]
    fn bins_floor_and_clamp() {
        let grid = SpatialGrid::new(0.0, 0.0, 100.0, 50.0, 10, 5);
        assert_eq!(grid.horizontal_bin(-0.5), -1);
        assert_eq!(grid.horizontal_bin(99.9), 9);
        assert_eq!(grid.horizontal_bin(100.0), 10);
        assert_eq!(grid.clamped_horizontal_bin(250.0), 9);
        assert_eq!(grid.clamped_vertical_bin(-3.0), 0);
    }

    #[test]
    fn ideal_bins_cover_distance() {
        assert_eq!(SpatialGrid::ideal_bins_neighborhood9(640, 480, 10.0), (64, 48));
        assert_eq!(SpatialGrid::ideal_bins_neighborhood9(5, 5, 100.0), (1, 1));
        assert_eq!(SpatialGrid::ideal_bins_neighborhood9(4, 3, 0.1), (4, 3));
    }

    #[test]
    fn copied_neighborhood_contains_adjacent_cells() {
        let mut grid = SpatialGrid::new(0.0, 0.0, 30.0, 30.0, 3, 3);
        assert!(grid.insert(&Vec2::new(5.0, 5.0), 0));
        assert!(grid.insert(&Vec2::new(25.0, 25.0), 1));
        assert!(!grid.insert(&Vec2::new(31.0, 5.0), 2));

        let copied = grid.with_copied_neighborhood8();
        let center = copied.cell(1, 1);
        assert!(center.contains(&0) && center.contains(&1));
        assert_eq!(copied.cell(0, 0), &[0]);
        assert!(copied.cell(2, 0).is_empty());
    }
}
