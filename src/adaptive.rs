//! Rectangular adaptive regions.
//!
//! Each DCT block is quantized with the perceptual matrix; the writable area is the
//! largest trailing sub-square whose coefficients all quantize to zero. It is stored
//! as the offset `k` of that square from the block's top left corner, `k == n` means
//! the block has no capacity.

use crate::error::QtarError;
use crate::grid::{Grid, Rect, RegionSet};
use crate::quantization::QuantizationTables;

/// Smallest `k` such that the trailing `k..n x k..n` square holds no significant entry.
///
/// Any square inside an all-zero trailing square is itself all-zero, so the first hit of
/// the upward scan is the minimum.
pub fn trailing_offset(significant: &[bool], n: usize) -> usize {
    if n == 0 || significant[n * n - 1] {
        return n;
    }
    (0..n)
        .find(|&k| {
            (k..n).all(|y| significant[y * n + k..(y + 1) * n].iter().all(|s| !*s))
        })
        .unwrap_or(n)
}

/// Find the adaptive offset of every block.
pub fn find_offsets(
    coefficients: &Grid<f32>,
    rects: &[Rect],
    quant_power: f32,
    tables: &mut QuantizationTables,
) -> Result<Vec<usize>, QtarError> {
    let mut offsets = Vec::with_capacity(rects.len());
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
        offsets.push(trailing_offset(&significant, n));
    }
    Ok(offsets)
}

/// Writable regions described by stored offsets, no coefficient is inspected.
pub fn regions_from_offsets(rects: &[Rect], offsets: &[usize]) -> RegionSet {
    RegionSet::rectangular(
        rects
            .iter()
            .zip(offsets.iter())
            .map(|(rect, k)| rect.trailing(*k))
            .collect(),
    )
}
