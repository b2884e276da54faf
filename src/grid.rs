//! Sample grids and indexed region views over them.
//!
//! A [`Grid`] is a row-major 2-D buffer. A [`RegionSet`] is a list of
//! non-overlapping regions over such a grid; each region linearizes to a
//! fixed sequence of cells which can be read or written as a flat slice.

use crate::curve::Curve;

/// Half-open axis-aligned rectangle `[x0, x1) x [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl Rect {
    pub fn new(x0: usize, y0: usize, x1: usize, y1: usize) -> Self {
        Rect { x0, y0, x1, y1 }
    }

    /// Square rectangle anchored at the origin.
    pub fn square(side: usize) -> Self {
        Rect::new(0, 0, side, side)
    }

    pub fn width(&self) -> usize {
        self.x1 - self.x0
    }

    pub fn height(&self) -> usize {
        self.y1 - self.y0
    }

    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    pub fn is_square(&self) -> bool {
        self.width() == self.height()
    }

    /// Split into four equal quadrants in canonical order: TL, TR, BL, BR.
    pub fn quadrants(&self) -> [Rect; 4] {
        let h = self.width() / 2;
        let (x0, y0, x1, y1) = (self.x0, self.y0, self.x1, self.y1);
        [
            Rect::new(x0, y0, x0 + h, y0 + h),
            Rect::new(x0 + h, y0, x1, y0 + h),
            Rect::new(x0, y0 + h, x0 + h, y1),
            Rect::new(x0 + h, y0 + h, x1, y1),
        ]
    }

    /// Trailing sub-square starting `offset` cells in from the top left corner.
    pub fn trailing(&self, offset: usize) -> Rect {
        let offset = offset.min(self.width()).min(self.height());
        Rect::new(self.x0 + offset, self.y0 + offset, self.x1, self.y1)
    }

    /// Iterate over the (x, y) cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> {
        let (x0, x1) = (self.x0, self.x1);
        (self.y0..self.y1).flat_map(move |y| (x0..x1).map(move |x| (x, y)))
    }
}

/// Row-major 2-D grid of samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: Copy> Grid<T> {
    /// Create a grid filled with `value`.
    pub fn new(width: usize, height: usize, value: T) -> Self {
        Grid {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Wrap an existing row-major buffer, returns `None` if the length doesn't match.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Option<Self> {
        if data.len() != width * height {
            return None;
        }
        Some(Grid {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Rectangle covering the whole grid.
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Flat index of cell (x, y).
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[self.index(x, y)]
    }

    pub fn set(&mut self, x: usize, y: usize, value: T) {
        let i = self.index(x, y);
        self.data[i] = value;
    }

    /// Copy the samples inside `rect` out in row-major order.
    pub fn region(&self, rect: &Rect) -> Vec<T> {
        let mut out = Vec::with_capacity(rect.area());
        for y in rect.y0..rect.y1 {
            let start = self.index(rect.x0, y);
            out.extend_from_slice(&self.data[start..start + rect.width()]);
        }
        out
    }

    /// Overwrite the samples inside `rect` from a row-major slice.
    pub fn set_region(&mut self, rect: &Rect, values: &[T]) {
        assert_eq!(values.len(), rect.area());
        for (row, y) in (rect.y0..rect.y1).enumerate() {
            let start = self.index(rect.x0, y);
            let w = rect.width();
            self.data[start..start + w].copy_from_slice(&values[row * w..(row + 1) * w]);
        }
    }

    pub fn map<U: Copy, F: Fn(T) -> U>(&self, f: F) -> Grid<U> {
        Grid {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|v| f(*v)).collect(),
        }
    }

    /// Cyclically shift the grid so the sample at (x, y) ends up at (x + dx, y + dy).
    pub fn rolled(&self, dx: i64, dy: i64) -> Grid<T> {
        if self.data.is_empty() {
            return self.clone();
        }
        let w = self.width as i64;
        let h = self.height as i64;
        let mut out = self.data.clone();
        for y in 0..self.height {
            let ny = (y as i64 + dy).rem_euclid(h) as usize;
            for x in 0..self.width {
                let nx = (x as i64 + dx).rem_euclid(w) as usize;
                out[ny * self.width + nx] = self.data[y * self.width + x];
            }
        }
        Grid {
            width: self.width,
            height: self.height,
            data: out,
        }
    }
}

impl From<&image::GrayImage> for Grid<u8> {
    fn from(img: &image::GrayImage) -> Self {
        Grid {
            width: img.width() as usize,
            height: img.height() as usize,
            data: img.as_raw().clone(),
        }
    }
}

impl From<Grid<u8>> for image::GrayImage {
    fn from(grid: Grid<u8>) -> Self {
        image::GrayImage::from_raw(grid.width as u32, grid.height as u32, grid.data)
            .expect("grid length always matches its dimensions")
    }
}

/// Round and clamp a sample into the 8 bit range.
pub fn quantize_sample(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Indexed regions over a shared grid.
///
/// Rectangular regions are addressed row-major. Curve-fit regions are addressed
/// column by column, each column starting at the curve's offset for that column.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionSet {
    Rectangular {
        rects: Vec<Rect>,
    },
    CurveFit {
        rects: Vec<Rect>,
        curves: Vec<Curve>,
        grid_size: usize,
    },
}

impl RegionSet {
    pub fn rectangular(rects: Vec<Rect>) -> Self {
        RegionSet::Rectangular { rects }
    }

    pub fn curve_fit(rects: Vec<Rect>, curves: Vec<Curve>, grid_size: usize) -> Self {
        assert_eq!(rects.len(), curves.len());
        RegionSet::CurveFit {
            rects,
            curves,
            grid_size,
        }
    }

    /// Bounding rectangles of the regions.
    pub fn rects(&self) -> &[Rect] {
        match self {
            RegionSet::Rectangular { rects } => rects,
            RegionSet::CurveFit { rects, .. } => rects,
        }
    }

    pub fn len(&self) -> usize {
        self.rects().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects().is_empty()
    }

    /// Number of cells in region `i`.
    pub fn region_size(&self, i: usize) -> usize {
        match self {
            RegionSet::Rectangular { rects } => rects[i].area(),
            RegionSet::CurveFit {
                rects,
                curves,
                grid_size,
            } => {
                let rect = &rects[i];
                (0..rect.width())
                    .map(|x| rect.height() - curves[i].column_start(*grid_size, x, rect.height()))
                    .sum()
            }
        }
    }

    /// Number of cells over all regions.
    pub fn total_size(&self) -> usize {
        (0..self.len()).map(|i| self.region_size(i)).sum()
    }

    /// Absolute (x, y) cells of region `i` in its native addressing order.
    pub fn cells(&self, i: usize) -> Vec<(usize, usize)> {
        match self {
            RegionSet::Rectangular { rects } => rects[i].cells().collect(),
            RegionSet::CurveFit {
                rects,
                curves,
                grid_size,
            } => {
                let rect = &rects[i];
                let mut out = Vec::with_capacity(self.region_size(i));
                for x in 0..rect.width() {
                    let start = curves[i].column_start(*grid_size, x, rect.height());
                    for y in start..rect.height() {
                        out.push((rect.x0 + x, rect.y0 + y));
                    }
                }
                out
            }
        }
    }

    /// Read region `i` as a flat sequence.
    pub fn get<T: Copy>(&self, grid: &Grid<T>, i: usize) -> Vec<T> {
        self.cells(i).into_iter().map(|(x, y)| grid.get(x, y)).collect()
    }

    /// Write a flat sequence into region `i`, the length must equal the region size.
    pub fn set<T: Copy>(&self, grid: &mut Grid<T>, i: usize, values: &[T]) {
        let cells = self.cells(i);
        assert_eq!(cells.len(), values.len());
        for ((x, y), v) in cells.into_iter().zip(values.iter()) {
            grid.set(x, y, *v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arange(side: usize) -> Grid<usize> {
        Grid::from_vec(side, side, (0..side * side).collect()).unwrap()
    }

    #[test]
    fn test_quadrants_order() {
        let q = Rect::square(4).quadrants();
        assert_eq!(
            q,
            [
                Rect::new(0, 0, 2, 2),
                Rect::new(2, 0, 4, 2),
                Rect::new(0, 2, 2, 4),
                Rect::new(2, 2, 4, 4)
            ]
        );
    }

    #[test]
    fn test_region_get_set() {
        let mut grid = arange(4);
        let rect = Rect::new(1, 1, 3, 3);
        assert_eq!(grid.region(&rect), vec![5, 6, 9, 10]);
        grid.set_region(&rect, &[0, 0, 0, 0]);
        assert_eq!(grid.get(2, 2), 0);
        assert_eq!(grid.get(3, 3), 15);
    }

    #[test]
    fn test_rolled_round_trip() {
        let grid = arange(4);
        let rolled = grid.rolled(1, -2);
        assert_eq!(rolled.get(1, 2), grid.get(0, 0));
        assert_eq!(rolled.rolled(-1, 2), grid);
    }

    #[test]
    fn test_rectangular_regions() {
        let grid = arange(4);
        let regions = RegionSet::rectangular(vec![Rect::new(0, 0, 2, 2), Rect::new(3, 3, 4, 4)]);
        assert_eq!(regions.total_size(), 5);
        assert_eq!(regions.get(&grid, 0), vec![0, 1, 4, 5]);
        assert_eq!(regions.get(&grid, 1), vec![15]);
    }

    #[test]
    fn test_curve_regions_column_major() {
        let mut grid = arange(4);
        // Curve that leaves the first two rows of column 0 and 1 untouched.
        let regions = RegionSet::curve_fit(vec![Rect::square(4)], vec![Curve::new(2, 2, 2)], 1);
        let cells = regions.cells(0);
        assert_eq!(cells[0], (0, 2));
        assert_eq!(cells[1], (0, 3));
        assert_eq!(regions.region_size(0), cells.len());

        let values = vec![99; cells.len()];
        regions.set(&mut grid, 0, &values);
        assert_eq!(grid.get(0, 0), 0);
        assert_eq!(grid.get(0, 2), 99);
        assert_eq!(regions.get(&grid, 0), values);
    }
}
