//! Intensity-banded permutation of a channel and its diff-fix correction.
//!
//! Before a node splits, its cells are relabelled so that each quadrant receives one
//! quartile of the node's samples by intensity. The resulting permutation grid is a
//! bijection over flat sample indices: cell `i` holds the index of the sample that
//! occupies it. Once the stego image has been rounded to 8 bits the intensity ranks can
//! shift, so the permutation rebuilt on extraction may drift; [`DiffFix`] records the
//! per-leaf entries needed to restore the original exactly.

use std::collections::HashSet;

use crate::error::QtarError;
use crate::grid::{Grid, Rect};
use crate::quadtree::{self, BlockLimits, Homogeneity, Quadtree, QuadtreeKey};

/// Permutation grid of a square channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation {
    cells: Grid<usize>,
}

impl Permutation {
    pub fn identity(side: usize) -> Self {
        let mut cells = Grid::new(side, side, 0usize);
        for (i, c) in cells.as_mut_slice().iter_mut().enumerate() {
            *c = i;
        }
        Permutation { cells }
    }

    /// Build the quadtree over the permuted channel, aligning every node that splits.
    pub fn build(
        channel: &Grid<u8>,
        limits: BlockLimits,
        policy: &Homogeneity,
    ) -> Result<(Quadtree, Permutation), QtarError> {
        quadtree::check_dimensions(0, channel.width(), channel.height())?;
        let mut permutation = Permutation::identity(channel.width());
        let tree = quadtree::walk(channel.width(), |node| {
            let split = quadtree::split_decision(node, limits, policy, || {
                permutation.samples(channel, &node.rect)
            });
            if split {
                permutation.align(channel, &node.rect);
            }
            Ok(split)
        })?;
        Ok((tree, permutation))
    }

    /// Re-derive the permutation of a channel from a stored quadtree key.
    pub fn rebuild(channel: &Grid<u8>, key: &QuadtreeKey) -> Result<Permutation, QtarError> {
        quadtree::check_dimensions(0, channel.width(), channel.height())?;
        let mut permutation = Permutation::identity(channel.width());
        quadtree::replay(channel.width(), key, |node| {
            permutation.align(channel, &node.rect)
        })?;
        Ok(permutation)
    }

    pub fn side(&self) -> usize {
        self.cells.width()
    }

    pub fn as_grid(&self) -> &Grid<usize> {
        &self.cells
    }

    /// Entries of the cells inside `rect`, row-major.
    pub fn entries(&self, rect: &Rect) -> Vec<usize> {
        self.cells.region(rect)
    }

    /// Channel samples that occupy the cells of `rect`.
    fn samples(&self, channel: &Grid<u8>, rect: &Rect) -> Vec<u8> {
        let data = channel.as_slice();
        self.entries(rect).into_iter().map(|e| data[e]).collect()
    }

    /// Distribute the entries of `rect` over its quadrants by sample intensity.
    ///
    /// Entries are ordered by intensity with ties kept in their current row-major order,
    /// each quarter is then sorted by index and written row-major into TL, TR, BL, BR.
    pub fn align(&mut self, channel: &Grid<u8>, rect: &Rect) {
        let data = channel.as_slice();
        let mut entries = self.entries(rect);
        entries.sort_by_key(|e| data[*e]);
        let quarter = entries.len() / 4;
        for (chunk, quadrant) in entries.chunks(quarter.max(1)).zip(rect.quadrants().iter()) {
            let mut chunk = chunk.to_vec();
            chunk.sort_unstable();
            self.cells.set_region(quadrant, &chunk);
        }
    }

    /// Gather: cell `i` of the output holds `grid[P[i]]`.
    pub fn apply<T: Copy>(&self, grid: &Grid<T>) -> Grid<T> {
        let data = grid.as_slice();
        let mut out = grid.clone();
        for (o, p) in out.as_mut_slice().iter_mut().zip(self.cells.as_slice()) {
            *o = data[*p];
        }
        out
    }

    /// Scatter, the inverse of [`Permutation::apply`].
    pub fn reverse<T: Copy>(&self, grid: &Grid<T>) -> Grid<T> {
        let mut out = grid.clone();
        let data = out.as_mut_slice();
        for (v, p) in grid.as_slice().iter().zip(self.cells.as_slice()) {
            data[*p] = *v;
        }
        out
    }

    /// True if every index occurs exactly once.
    pub fn is_bijection(&self) -> bool {
        let mut seen = vec![false; self.cells.len()];
        for p in self.cells.as_slice() {
            match seen.get_mut(*p) {
                Some(s) if !*s => *s = true,
                _ => return false,
            }
        }
        true
    }
}

/// Per-leaf permutation entries lost when the permutation is rebuilt from the stego image.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiffFix {
    leaves: Vec<Vec<u32>>,
}

impl DiffFix {
    pub fn from_leaves(leaves: Vec<Vec<u32>>) -> Self {
        DiffFix { leaves }
    }

    /// Entries of each leaf present in `original` but missing from `lossy`, sorted.
    pub fn compute(original: &Permutation, lossy: &Permutation, rects: &[Rect]) -> DiffFix {
        let leaves = rects
            .iter()
            .map(|rect| {
                let present = lossy.entries(rect).into_iter().collect::<HashSet<_>>();
                let mut missing = original
                    .entries(rect)
                    .into_iter()
                    .filter(|e| !present.contains(e))
                    .map(|e| e as u32)
                    .collect::<Vec<_>>();
                missing.sort_unstable();
                missing
            })
            .collect();
        DiffFix { leaves }
    }

    pub fn leaves(&self) -> &[Vec<u32>] {
        &self.leaves
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Total number of corrected entries.
    pub fn entry_count(&self) -> usize {
        self.leaves.iter().map(|l| l.len()).sum()
    }

    /// Restore the original permutation from one rebuilt off the stego image.
    ///
    /// An entry of a lossy leaf is wrong exactly when it is a correction of some leaf;
    /// those are replaced by this leaf's corrections and the leaf is re-sorted.
    pub fn fix(&self, lossy: &Permutation, rects: &[Rect]) -> Result<Permutation, QtarError> {
        if self.leaves.len() != rects.len() {
            return Err(QtarError::DiffFixMismatch {
                leaf: rects.len().min(self.leaves.len()),
                expected: self.leaves.len(),
                found: rects.len(),
            });
        }
        let corrections = self
            .leaves
            .iter()
            .flatten()
            .map(|e| *e as usize)
            .collect::<HashSet<_>>();

        let mut fixed = lossy.clone();
        for (leaf, (rect, correction)) in rects.iter().zip(self.leaves.iter()).enumerate() {
            let entries = lossy.entries(rect);
            let mut kept = entries
                .iter()
                .copied()
                .filter(|e| !corrections.contains(e))
                .collect::<Vec<_>>();
            let wrong = entries.len() - kept.len();
            if wrong != correction.len() {
                return Err(QtarError::DiffFixMismatch {
                    leaf,
                    expected: correction.len(),
                    found: wrong,
                });
            }
            if wrong == 0 {
                continue;
            }
            kept.extend(correction.iter().map(|e| *e as usize));
            kept.sort_unstable();
            fixed.cells.set_region(rect, &kept);
        }
        Ok(fixed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Grid<u8> {
        #[rustfmt::skip]
        let data = vec![
            0, 1, 2, 3,
            4, 255, 6, 7,
            0, 9, 127, 0,
            128, 13, 14, 128,
        ];
        Grid::from_vec(4, 4, data).unwrap()
    }

    fn limits() -> BlockLimits {
        BlockLimits {
            min_size: 1,
            max_size: 4,
        }
    }

    fn permutation(side: usize, data: Vec<usize>) -> Permutation {
        Permutation {
            cells: Grid::from_vec(side, side, data).unwrap(),
        }
    }

    #[test]
    fn test_build_fixture() {
        let (tree, p) = Permutation::build(&fixture(), limits(), &Homogeneity::Uniform(0.5)).unwrap();
        #[rustfmt::skip]
        let expected = vec![
            0, 1, 2, 3,
            8, 11, 4, 6,
            7, 9, 10, 12,
            13, 14, 15, 5,
        ];
        assert_eq!(p.as_grid().as_slice(), &expected[..]);
        assert_eq!(
            tree.leaves(),
            &[
                Rect::new(0, 0, 2, 2),
                Rect::new(2, 0, 4, 2),
                Rect::new(0, 2, 2, 4),
                Rect::new(2, 2, 3, 3),
                Rect::new(3, 2, 4, 3),
                Rect::new(2, 3, 3, 4),
                Rect::new(3, 3, 4, 4),
            ]
        );
        assert_eq!(
            tree.key().bits(),
            &[true, false, false, false, true, false, false, false, false]
        );
        assert_eq!(tree.max_depth(), 2);

        // Leaves of the permuted channel.
        let permuted = p.apply(&fixture());
        assert_eq!(permuted.region(&tree.leaves()[0]), vec![0, 1, 0, 0]);
        assert_eq!(permuted.region(&tree.leaves()[2]), vec![7, 9, 13, 14]);
        assert_eq!(permuted.region(&tree.leaves()[6]), vec![255]);
    }

    #[test]
    fn test_rebuild_matches_build() {
        let channel = fixture();
        let (tree, p) = Permutation::build(&channel, limits(), &Homogeneity::Uniform(0.5)).unwrap();
        let rebuilt = Permutation::rebuild(&channel, tree.key()).unwrap();
        assert_eq!(rebuilt, p);
        assert!(p.is_bijection());
    }

    #[test]
    fn test_apply_reverse() {
        let channel = fixture();
        let (_, p) = Permutation::build(&channel, limits(), &Homogeneity::Uniform(0.5)).unwrap();
        let permuted = p.apply(&channel);
        assert_ne!(permuted, channel);
        assert_eq!(p.reverse(&permuted), channel);
    }

    #[test]
    fn test_is_bijection() {
        assert!(Permutation::identity(4).is_bijection());
        assert!(!permutation(2, vec![0, 1, 1, 3]).is_bijection());
        assert!(!permutation(2, vec![0, 1, 2, 4]).is_bijection());
    }

    fn swapped() -> (Permutation, Permutation, Vec<Rect>) {
        let base = Permutation::identity(4);
        let mut lossy = (0..16).collect::<Vec<_>>();
        lossy.swap(5, 6);
        lossy.swap(13, 14);
        (base, permutation(4, lossy), Rect::square(4).quadrants().to_vec())
    }

    #[test]
    fn test_diff_fix() {
        let (base, lossy, rects) = swapped();
        let fix = DiffFix::compute(&base, &lossy, &rects);
        assert_eq!(fix.leaves(), &[vec![5], vec![6], vec![13], vec![14]]);
        assert_eq!(fix.entry_count(), 4);
        assert_eq!(fix.fix(&lossy, &rects).unwrap(), base);
    }

    #[test]
    fn test_diff_fix_without_drift() {
        let (base, _, rects) = swapped();
        let fix = DiffFix::compute(&base, &base, &rects);
        assert_eq!(fix.entry_count(), 0);
        assert_eq!(fix.fix(&base, &rects).unwrap(), base);
    }

    #[test]
    fn test_diff_fix_mismatch() {
        let (base, lossy, rects) = swapped();
        let fix = DiffFix::from_leaves(vec![vec![5, 7], vec![6], vec![13], vec![14]]);
        let r = fix.fix(&lossy, &rects);
        assert!(matches!(
            r,
            Err(QtarError::DiffFixMismatch {
                leaf: 0,
                expected: 2,
                found: 1
            })
        ));

        let fix = DiffFix::compute(&base, &lossy, &rects[..3]);
        assert!(matches!(
            fix.fix(&lossy, &rects),
            Err(QtarError::DiffFixMismatch { .. })
        ));
    }
}
