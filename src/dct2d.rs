use rustdct::DctNum;
use rustdct::DctPlanner;

use crate::grid::{Grid, Rect};

/*
Both directions are orthonormal, matching:

dct = lambda x: scipy.fftpack.dct(x, norm='ortho')
block_dct = dct(dct(block).T).T

idct = lambda x: scipy.fftpack.idct(x, norm='ortho')
block = idct(idct(block_dct.T).T)

rustdct computes the unnormalized DCT-II, y_k = sum x_n cos(pi k (2n + 1) / 2N), and a DCT-III
that halves the first term. The normalization is applied per row / column below.
*/

/// Direction of the transform.
#[derive(PartialEq, Debug, Copy, Clone)]
pub enum Type {
    /// Forward transform, pixels to coefficients.
    DCT2,
    /// Inverse transform, coefficients to pixels.
    DCT3,
}

#[derive(PartialEq, Debug, Copy, Clone)]
enum Direction {
    Row,
    Column,
}

/// Perform an orthonormal 2-D discrete cosine transform of the given type.
/// Data is assumed to be ordered row first and will be overwritten with the result.
pub fn dct2_2d<T: DctNum + std::ops::Mul>(
    planner: &mut rustdct::DctPlanner<T>,
    transform: Type,
    width: usize,
    height: usize,
    data: &mut [T],
) {
    assert_eq!(data.len(), (width * height));
    // The order of rows / columns and then columns / rows does not matter.
    // We can do the largest dimension first, to allow reuse of the scratch buffer.
    let first = if width >= height {
        Direction::Row
    } else {
        Direction::Column
    };
    let second = if first == Direction::Row {
        Direction::Column
    } else {
        Direction::Row
    };

    // Allocate the vector we'll use for the intermediate row / column storage.
    let mut tmp: Vec<T> = Vec::<T>::new();

    // Allocate the scratch buffer.
    let mut scratch: Vec<T> = Vec::<T>::new();

    for current in [first, second] {
        let iter_max;
        let step;
        let take;
        let skip_mult;
        match current {
            Direction::Row => {
                iter_max = height;
                step = 1;
                skip_mult = width;
                take = width;
            }

            Direction::Column => {
                iter_max = width;
                step = width;
                skip_mult = 1;
                take = height;
            }
        }
        let length = take;

        let dct = planner.plan_dct2(length);
        tmp.resize(length, T::zero());
        scratch.resize(dct.get_scratch_len(), T::zero());

        let n = length as f64;
        let dc_scale = T::from_f64((1.0 / n).sqrt()).expect("scale fits the sample type");
        let ac_scale = T::from_f64((2.0 / n).sqrt()).expect("scale fits the sample type");

        // Generalised iteration.
        for i in 0..iter_max {
            // Copy the row into tmp.
            let row_iter = data.iter().skip(i * skip_mult).step_by(step).take(take);
            for (orig, out) in row_iter.zip(tmp.iter_mut()) {
                *out = *orig;
            }

            match transform {
                Type::DCT2 => {
                    dct.process_dct2_with_scratch(&mut tmp, &mut scratch);
                    tmp[0] = tmp[0] * dc_scale;
                    for v in tmp.iter_mut().skip(1) {
                        *v = *v * ac_scale;
                    }
                }
                Type::DCT3 => {
                    // The DCT-III halves the first term, so it gets twice the scale.
                    tmp[0] = tmp[0] * dc_scale * T::two();
                    for v in tmp.iter_mut().skip(1) {
                        *v = *v * ac_scale;
                    }
                    dct.process_dct3_with_scratch(&mut tmp, &mut scratch);
                }
            }

            // Copy tmp back into the data, overwriting the original input.
            let row_iter_mut = data.iter_mut().skip(i * skip_mult).step_by(step).take(take);
            for (data_dct, result) in row_iter_mut.zip(tmp.iter()) {
                *data_dct = *result;
            }
        }
    }
}

/// Applies the block transform to every rectangle of a grid.
pub struct BlockTransform {
    planner: DctPlanner<f32>,
}

impl Default for BlockTransform {
    fn default() -> Self {
        BlockTransform::new()
    }
}

impl BlockTransform {
    pub fn new() -> Self {
        BlockTransform {
            planner: DctPlanner::<f32>::new(),
        }
    }

    /// Transform a single row-major block in place.
    pub fn block(&mut self, transform: Type, width: usize, height: usize, data: &mut [f32]) {
        dct2_2d(&mut self.planner, transform, width, height, data);
    }

    /// Transform each rectangle independently, rectangles must not overlap.
    pub fn regions(&mut self, transform: Type, grid: &Grid<f32>, rects: &[Rect]) -> Grid<f32> {
        let mut out = grid.clone();
        for rect in rects.iter() {
            let mut block = grid.region(rect);
            self.block(transform, rect.width(), rect.height(), &mut block);
            out.set_region(rect, &block);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_equal(a: &[f32], b: &[f32], max_error: f32) {
        assert_eq!(a.len(), b.len(), "a and b are not equal length");
        for delta in a.iter().zip(b.iter()).map(|(av, bv)| (*av - *bv).abs()) {
            if delta > max_error {
                panic!("a: {a:?}, b: {b:?}, delta was {delta}, this exceeded allowed {max_error}.");
            }
        }
    }

    #[test]
    fn test_simple_dct_against_scipy() {
        /*
            scipy.fftpack.dct(np.array([1, 0, 0]), norm='ortho')
        */
        let input = [1.0f32, 0.0, 0.0];
        let expected = [0.57735027f32, 0.70710678, 0.40824829];
        let mut v = input;
        let mut planner = DctPlanner::new();
        dct2_2d(&mut planner, Type::DCT2, 3, 1, &mut v);
        approx_equal(&expected, &v, 0.0001);

        dct2_2d(&mut planner, Type::DCT3, 3, 1, &mut v);
        approx_equal(&input, &v, 0.0001);
    }

    #[test]
    fn test_2d_dct_against_scipy() {
        #[rustfmt::skip]
        let z = [1.0f32, 0.0, 0.0,
                 1.0f32, 0.0, 0.0,
                 0.0f32, 0.0, 1.0];
        let mut input = z;
        let mut planner = DctPlanner::new();
        dct2_2d(&mut planner, Type::DCT2, 3, 3, &mut input);

        #[rustfmt::skip]
        let res = [1.0f32, 0.40824829, 0.70710678,
                   0.0, 1.0, 0.0,
                   0.0, -0.57735027, 0.0];
        approx_equal(&input, &res, 0.0001);

        dct2_2d(&mut planner, Type::DCT3, 3, 3, &mut input);
        approx_equal(&input, &z, 0.0001);
    }

    #[test]
    fn test_regions_are_independent() {
        let side = 8;
        let data = (0..side * side).map(|v| (v % 13) as f32).collect::<Vec<_>>();
        let grid = Grid::from_vec(side, side, data).unwrap();
        let rects = Rect::square(side).quadrants();
        let mut transform = BlockTransform::new();

        let coefficients = transform.regions(Type::DCT2, &grid, &rects);
        // DC of an orthonormal 4x4 block is the sum divided by 4.
        let sum: f32 = grid.region(&rects[1]).iter().sum();
        assert!((coefficients.get(4, 0) - sum / 4.0).abs() < 1e-3);

        let back = transform.regions(Type::DCT3, &coefficients, &rects);
        approx_equal(back.as_slice(), grid.as_slice(), 1e-3);
    }
}
