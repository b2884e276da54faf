//! Perceptual quantization and flattening matrices, resized to arbitrary block sizes.

use std::collections::HashMap;

/// JPEG luminance quantization table, the perceptual weight of each 8x8 frequency.
#[rustfmt::skip]
pub const BASE_MATRIX: [[f32; 8]; 8] = [
    [16.0, 11.0, 10.0, 16.0,  24.0,  40.0,  51.0,  61.0],
    [12.0, 12.0, 14.0, 19.0,  26.0,  58.0,  60.0,  55.0],
    [14.0, 13.0, 16.0, 24.0,  40.0,  57.0,  69.0,  56.0],
    [14.0, 17.0, 22.0, 29.0,  51.0,  87.0,  80.0,  62.0],
    [18.0, 22.0, 37.0, 56.0,  68.0, 109.0, 103.0,  77.0],
    [24.0, 35.0, 55.0, 64.0,  81.0, 104.0, 113.0,  92.0],
    [49.0, 64.0, 78.0, 87.0, 103.0, 121.0, 120.0, 101.0],
    [72.0, 92.0, 95.0, 98.0, 112.0, 100.0, 103.0,  99.0],
];

/// Divisor applied to secret image coefficients in payload-DCT mode, damps the DC and the
/// first AC terms so the linearized payload has a flatter magnitude profile.
#[rustfmt::skip]
pub const FLAT_MATRIX: [[f32; 8]; 8] = [
    [20.0, 5.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
    [ 5.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
    [ 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
    [ 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
    [ 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
    [ 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
    [ 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
    [ 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
];

/// Resize an 8x8 table to `n x n` with bilinear interpolation, corners map onto corners.
pub fn resize_bilinear(base: &[[f32; 8]; 8], n: usize) -> Vec<f32> {
    let coordinate = |o: usize| -> f32 {
        if n <= 1 {
            0.0
        } else {
            o as f32 * 7.0 / (n - 1) as f32
        }
    };
    let mut out = Vec::with_capacity(n * n);
    for y in 0..n {
        let cy = coordinate(y);
        let y0 = cy.floor() as usize;
        let y1 = (y0 + 1).min(7);
        let ty = cy - y0 as f32;
        for x in 0..n {
            let cx = coordinate(x);
            let x0 = cx.floor() as usize;
            let x1 = (x0 + 1).min(7);
            let tx = cx - x0 as f32;
            let top = base[y0][x0] * (1.0 - tx) + base[y0][x1] * tx;
            let bottom = base[y1][x0] * (1.0 - tx) + base[y1][x1] * tx;
            out.push(top * (1.0 - ty) + bottom * ty);
        }
    }
    out
}

/// Cache of resized tables keyed by block size.
#[derive(Debug, Default)]
pub struct QuantizationTables {
    perceptual: HashMap<usize, Vec<f32>>,
    flat: HashMap<usize, Vec<f32>>,
}

impl QuantizationTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Perceptual quantization matrix for an `n x n` block, row-major.
    pub fn perceptual(&mut self, n: usize) -> &[f32] {
        self.perceptual
            .entry(n)
            .or_insert_with(|| resize_bilinear(&BASE_MATRIX, n))
    }

    /// Flattening matrix for an `n x n` secret image block, row-major.
    pub fn flat(&mut self, n: usize) -> &[f32] {
        self.flat
            .entry(n)
            .or_insert_with(|| resize_bilinear(&FLAT_MATRIX, n))
    }

    /// Quantize a square coefficient block, returns the significance mask.
    ///
    /// A coefficient is significant when its quotient by the scaled quantization step
    /// truncates to a non-zero integer, so raising `quant_power` can only clear entries.
    pub fn significance(&mut self, block: &[f32], n: usize, quant_power: f32) -> Vec<bool> {
        let matrix = self.perceptual(n);
        block
            .iter()
            .zip(matrix.iter())
            .map(|(coefficient, step)| (coefficient / (step * quant_power)).trunc() as i32 != 0)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_identity() {
        let m = resize_bilinear(&BASE_MATRIX, 8);
        for y in 0..8 {
            for x in 0..8 {
                assert_eq!(m[y * 8 + x], BASE_MATRIX[y][x]);
            }
        }
    }

    #[test]
    fn test_resize_corners() {
        let m = resize_bilinear(&BASE_MATRIX, 2);
        assert_eq!(m, vec![16.0, 61.0, 72.0, 99.0]);
        let m = resize_bilinear(&BASE_MATRIX, 1);
        assert_eq!(m, vec![16.0]);
        let m = resize_bilinear(&BASE_MATRIX, 32);
        assert_eq!(m[0], 16.0);
        assert_eq!(m[31], 61.0);
        assert!((m[32 * 32 - 1] - 99.0).abs() < 1e-4);
    }

    #[test]
    fn test_significance() {
        let mut tables = QuantizationTables::new();
        let block = [32.0f32, -11.0, 13.9, -98.9];
        // Steps for n = 2 are [16, 61, 72, 99].
        assert_eq!(
            tables.significance(&block, 2, 1.0),
            vec![true, false, false, false]
        );
        assert_eq!(
            tables.significance(&block, 2, 0.1),
            vec![true, true, true, true]
        );
        assert_eq!(
            tables.significance(&block, 2, 4.0),
            vec![false, false, false, false]
        );
    }
}
