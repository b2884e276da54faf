//! Curve-fit adaptive regions.
//!
//! Instead of a single trailing square, the boundary between significant and
//! insignificant coefficients is approximated by a piecewise-linear curve through
//! three points on a coarse grid: `(0, Ay)`, `(B, B)` and `(Cx, 0)`. Every cell
//! below the curve is writable. Coordinates are stored in grid units so they pack
//! into a byte for any grid size above one.

use crate::error::QtarError;
use crate::grid::{Grid, Rect, RegionSet};
use crate::quantization::QuantizationTables;

/// Three-point boundary of a curve-fit region, in units of the grid size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Curve {
    /// Height of the boundary at the first column.
    pub ay: u16,
    /// Position on the main diagonal the boundary passes through.
    pub b: u16,
    /// Column at which the boundary reaches the top edge.
    pub cx: u16,
}

impl Curve {
    pub fn new(ay: u16, b: u16, cx: u16) -> Self {
        Curve { ay, b, cx }
    }

    /// Height of the boundary at column `x`, in cells, never negative.
    pub fn offset_at(&self, grid_size: usize, x: usize) -> f64 {
        let g = grid_size as f64;
        let ay = self.ay as f64 * g;
        let b = self.b as f64 * g;
        let cx = self.cx as f64 * g;
        let x = x as f64;

        let y = if x < b {
            (x / b) * (b - ay) + ay
        } else if cx == b {
            0.0
        } else {
            ((b - x) / (cx - b) + 1.0) * b
        };
        y.max(0.0)
    }

    /// First writable row of column `x` for a block of the given height.
    pub fn column_start(&self, grid_size: usize, x: usize, height: usize) -> usize {
        (self.offset_at(grid_size, x).ceil() as usize).min(height)
    }
}

/// Fit a curve to a significance mask of an `n x n` block.
pub fn fit_curve(significant: &[bool], n: usize, grid_size: usize) -> Curve {
    let mut max_y = None;
    let mut max_x = None;
    let mut max_diagonal = None;
    let mut max_inner = 0;
    for (i, _) in significant.iter().enumerate().filter(|(_, s)| **s) {
        let (x, y) = (i % n, i / n);
        max_y = max_y.max(Some(y));
        max_x = max_x.max(Some(x));
        max_inner = max_inner.max(x.min(y));
        if x == y {
            max_diagonal = max_diagonal.max(Some(x));
        }
    }

    let to_grid = |index: usize| ((index + 1).div_ceil(grid_size)) as u16;
    match (max_y, max_x) {
        (Some(max_y), Some(max_x)) => {
            let ay = to_grid(max_y);
            let cx = to_grid(max_x);
            // Without a diagonal anchor, pass through the corner of the rectangular region.
            let b = to_grid(max_diagonal.unwrap_or(max_inner));
            Curve::new(ay, b, cx)
        }
        // Nothing significant, the whole block is writable.
        _ => Curve::default(),
    }
}

/// Fit curves to every block of the coefficient grid.
pub fn fit_regions(
    coefficients: &Grid<f32>,
    rects: &[Rect],
    quant_power: f32,
    grid_size: usize,
    tables: &mut QuantizationTables,
) -> Result<(RegionSet, Vec<Curve>), QtarError> {
    let mut curves = Vec::with_capacity(rects.len());
    for (index, rect) in rects.iter().enumerate() {
        if !rect.is_square() {
            return Err(QtarError::RegionShape {
                index,
                width: rect.width(),
                height: rect.height(),
            });
        }
        let n = rect.width();
        let significant = tables.significance(&coefficients.region(rect), n, quant_power);
        curves.push(fit_curve(&significant, n, grid_size));
    }
    Ok((regions_from_curves(rects, &curves, grid_size), curves))
}

/// Rebuild the curve-fit regions from stored curves.
pub fn regions_from_curves(rects: &[Rect], curves: &[Curve], grid_size: usize) -> RegionSet {
    RegionSet::curve_fit(rects.to_vec(), curves.to_vec(), grid_size)
}
