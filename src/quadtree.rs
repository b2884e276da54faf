//! Quadtree partitioning of a channel into homogeneous square blocks.
//!
//! The tree is described by its key, a preorder sequence with one boolean per visited
//! node: `true` when the node splits into its four quadrants (TL, TR, BL, BR), `false`
//! when it is a leaf. Replaying the key against a square of the same size reproduces
//! the leaves exactly, without reading a single sample.

use serde::{Deserialize, Serialize};

use crate::error::{KeyError, QtarError};
use crate::grid::{Grid, Rect};

/// Homogeneity test deciding whether a block may stay a leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Homogeneity {
    /// One threshold for every block, the allowed span is `threshold * 256`.
    Uniform(f32),
    /// One threshold per brightness band, chosen by the mean sample of the block.
    Banded(Vec<f32>),
}

impl Default for Homogeneity {
    fn default() -> Self {
        Homogeneity::Uniform(0.4)
    }
}

impl Homogeneity {
    /// Threshold applicable to a block with the given mean sample value.
    pub fn threshold_for(&self, mean: f32) -> f32 {
        match self {
            Homogeneity::Uniform(t) => *t,
            Homogeneity::Banded(bands) => {
                let count = bands.len();
                for (i, t) in bands.iter().enumerate().take(count.saturating_sub(1)) {
                    let band_max = (255.0 / count as f32 * (i + 1) as f32) as i32;
                    if mean <= band_max as f32 {
                        return *t;
                    }
                }
                bands.last().copied().unwrap_or(0.0)
            }
        }
    }

    /// True if the span of the samples is below the applicable threshold.
    pub fn is_homogeneous(&self, samples: &[u8]) -> bool {
        let (Some(min), Some(max)) = (samples.iter().min(), samples.iter().max()) else {
            return true;
        };
        let span = (*max - *min) as f32;
        let mean = match self {
            Homogeneity::Uniform(_) => 0.0,
            Homogeneity::Banded(_) => {
                samples.iter().map(|v| *v as f32).sum::<f32>() / samples.len() as f32
            }
        };
        span < self.threshold_for(mean) * 256.0
    }
}

/// Block size bounds of the partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLimits {
    /// Blocks of this size or smaller are always leaves.
    pub min_size: usize,
    /// Blocks above this size always split.
    pub max_size: usize,
}

/// A node being visited during descent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    pub rect: Rect,
    pub depth: usize,
}

impl Node {
    pub fn size(&self) -> usize {
        self.rect.width()
    }

    fn children(&self) -> [Node; 4] {
        self.rect.quadrants().map(|rect| Node {
            rect,
            depth: self.depth + 1,
        })
    }
}

/// Preorder split sequence of a quadtree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QuadtreeKey {
    bits: Vec<bool>,
}

impl QuadtreeKey {
    pub fn from_bits(bits: Vec<bool>) -> Self {
        QuadtreeKey { bits }
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Parse one complete tree from the front of `bits`, no deeper than `max_depth`.
    ///
    /// Returns the number of bits consumed and the number of leaves encountered.
    pub fn parse(bits: &[bool], max_depth: usize) -> Result<(usize, usize), KeyError> {
        let mut position = 0;
        let mut leaves = 0;
        parse_subtree(bits, &mut position, 0, max_depth, &mut leaves)?;
        Ok((position, leaves))
    }

    /// Number of leaves, failing unless the key is exactly one complete tree.
    pub fn leaf_count(&self, max_depth: usize) -> Result<usize, KeyError> {
        let (consumed, leaves) = QuadtreeKey::parse(&self.bits, max_depth)?;
        if consumed != self.bits.len() {
            return Err(KeyError::MalformedQuadtree {
                reason: "bits left after the last leaf",
            });
        }
        Ok(leaves)
    }
}

fn parse_subtree(
    bits: &[bool],
    position: &mut usize,
    depth: usize,
    max_depth: usize,
    leaves: &mut usize,
) -> Result<(), KeyError> {
    let Some(split) = bits.get(*position) else {
        return Err(KeyError::MalformedQuadtree {
            reason: "sequence ends inside the tree",
        });
    };
    *position += 1;
    if *split {
        if depth >= max_depth {
            return Err(KeyError::TooDeep { max_depth });
        }
        for _ in 0..4 {
            parse_subtree(bits, position, depth + 1, max_depth, leaves)?;
        }
    } else {
        *leaves += 1;
    }
    Ok(())
}

/// Leaves and key of a partitioned square channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quadtree {
    side: usize,
    leaves: Vec<Rect>,
    key: QuadtreeKey,
    max_depth: usize,
}

impl Quadtree {
    /// Partition the channel, splitting every block that is too large or not homogeneous.
    pub fn build(
        channel: &Grid<u8>,
        limits: BlockLimits,
        policy: &Homogeneity,
    ) -> Result<Quadtree, QtarError> {
        check_dimensions(0, channel.width(), channel.height())?;
        walk(channel.width(), |node| {
            Ok(split_decision(node, limits, policy, || channel.region(&node.rect)))
        })
    }

    /// Replay a key against a square of the given side.
    pub fn rebuild(side: usize, key: &QuadtreeKey) -> Result<Quadtree, QtarError> {
        replay(side, key, |_node| {})
    }

    pub fn side(&self) -> usize {
        self.side
    }

    /// Leaf rectangles in preorder.
    pub fn leaves(&self) -> &[Rect] {
        &self.leaves
    }

    pub fn key(&self) -> &QuadtreeKey {
        &self.key
    }

    /// Depth of the deepest leaf, the root is at depth zero.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

/// Check a channel can be partitioned, it must be square with a power of two side.
pub fn check_dimensions(channel: usize, width: usize, height: usize) -> Result<(), QtarError> {
    if width != height || !width.is_power_of_two() {
        return Err(QtarError::Dimension {
            channel,
            width,
            height,
        });
    }
    Ok(())
}

/// Deepest level a key may reach for a square of the given side.
pub fn depth_limit(side: usize) -> usize {
    side.max(1).trailing_zeros() as usize
}

/// Decide whether a node splits, `samples` is only evaluated when homogeneity matters.
pub(crate) fn split_decision<F: FnOnce() -> Vec<u8>>(
    node: &Node,
    limits: BlockLimits,
    policy: &Homogeneity,
    samples: F,
) -> bool {
    let size = node.size();
    if size <= limits.min_size || size <= 1 {
        return false;
    }
    if size > limits.max_size {
        return true;
    }
    !policy.is_homogeneous(&samples())
}

/// Walk the tree in preorder, `decide` is called once per node before its children.
pub(crate) fn walk<F>(side: usize, mut decide: F) -> Result<Quadtree, QtarError>
where
    F: FnMut(&Node) -> Result<bool, QtarError>,
{
    let mut tree = Quadtree {
        side,
        leaves: vec![],
        key: QuadtreeKey::default(),
        max_depth: 0,
    };
    let root = Node {
        rect: Rect::square(side),
        depth: 0,
    };
    descend(root, &mut decide, &mut tree)?;
    Ok(tree)
}

/// Walk the tree described by `key`, `on_split` sees every splitting node before its children.
pub(crate) fn replay<F>(side: usize, key: &QuadtreeKey, mut on_split: F) -> Result<Quadtree, QtarError>
where
    F: FnMut(&Node),
{
    let mut bits = key.bits().iter();
    let tree = walk(side, |node| {
        let split = bits.next().copied().ok_or(KeyError::MalformedQuadtree {
            reason: "sequence ends inside the tree",
        })?;
        if split && node.size() >= 2 {
            on_split(node);
        }
        Ok(split)
    })?;
    if bits.next().is_some() {
        return Err(KeyError::MalformedQuadtree {
            reason: "bits left after the last leaf",
        }
        .into());
    }
    Ok(tree)
}

fn descend<F>(node: Node, decide: &mut F, tree: &mut Quadtree) -> Result<(), QtarError>
where
    F: FnMut(&Node) -> Result<bool, QtarError>,
{
    let split = decide(&node)?;
    tree.key.bits.push(split);
    if split {
        if node.size() < 2 {
            return Err(KeyError::MalformedQuadtree {
                reason: "split of a single sample",
            }
            .into());
        }
        for child in node.children() {
            descend(child, decide, tree)?;
        }
    } else {
        tree.max_depth = tree.max_depth.max(node.depth);
        tree.leaves.push(node.rect);
    }
    Ok(())
}
