//! Linearization of payload samples into adaptive-region slots.
//!
//! Every region yields an ordered list of coefficient slots. Payload samples are dealt
//! out one at a time, round-robin across the regions in leaf order, so the distortion is
//! spread over the whole channel instead of filling the first blocks. Reading walks the
//! exact same slot sequence.

use std::collections::{HashMap, HashSet};

use crate::dct2d::{BlockTransform, Type};
use crate::error::QtarError;
use crate::grid::{quantize_sample, Grid, Rect, RegionSet};
use crate::quantization::QuantizationTables;

/// Order in which the slots of one region are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOrder {
    /// The region's native addressing order.
    Raw,
    /// Descending zigzag rank, highest spatial frequency first.
    Zigzag,
}

/// How the secret channel is turned into slot values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PayloadMode {
    /// Samples scaled from `[0, 255]` into `[0, channel_scale]`.
    Plain { channel_scale: f32 },
    /// The secret is transformed in `block_size` tiles, flattened and scaled.
    Dct { block_size: usize, scale: f32 },
}

impl PayloadMode {
    pub fn slot_order(&self) -> SlotOrder {
        match self {
            PayloadMode::Plain { .. } => SlotOrder::Raw,
            PayloadMode::Dct { .. } => SlotOrder::Zigzag,
        }
    }
}

/// Positions `(x, y)` of a `width x height` block in ascending zigzag rank.
///
/// Diagonals are visited from the DC outwards; even diagonals run from bottom left to
/// top right, odd ones the other way around, as in JPEG.
pub fn zigzag_positions(width: usize, height: usize) -> Vec<(usize, usize)> {
    let mut out = Vec::with_capacity(width * height);
    if width == 0 || height == 0 {
        return out;
    }
    for s in 0..(width + height - 1) {
        let x_min = s.saturating_sub(height - 1);
        let x_max = s.min(width - 1);
        if s % 2 == 0 {
            out.extend((x_min..=x_max).map(|x| (x, s - x)));
        } else {
            out.extend((x_min..=x_max).rev().map(|x| (x, s - x)));
        }
    }
    out
}

/// Zigzag rank of every cell, row-major.
pub fn zigzag_ranks(width: usize, height: usize) -> Grid<usize> {
    let mut ranks = Grid::new(width, height, 0);
    for (rank, (x, y)) in zigzag_positions(width, height).into_iter().enumerate() {
        ranks.set(x, y, rank);
    }
    ranks
}

/// Merge lists by taking one element of each in turn, skipping exhausted lists.
pub fn interleave<T: Copy>(lists: &[Vec<T>]) -> Vec<T> {
    let longest = lists.iter().map(Vec::len).max().unwrap_or(0);
    let mut out = Vec::with_capacity(lists.iter().map(Vec::len).sum());
    for round in 0..longest {
        out.extend(lists.iter().filter_map(|list| list.get(round).copied()));
    }
    out
}

/// Writes and reads payload samples, caching zigzag orders and transform plans.
#[derive(Default)]
pub struct PayloadCodec {
    zigzag: HashMap<(usize, usize), Vec<(usize, usize)>>,
    transform: BlockTransform,
    tables: QuantizationTables,
}

impl PayloadCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn zigzag(&mut self, width: usize, height: usize) -> &[(usize, usize)] {
        self.zigzag
            .entry((width, height))
            .or_insert_with(|| zigzag_positions(width, height))
    }

    /// Slots of every region, each list in the requested order.
    pub fn slots(&mut self, regions: &RegionSet, order: SlotOrder) -> Vec<Vec<(usize, usize)>> {
        (0..regions.len())
            .map(|i| match order {
                SlotOrder::Raw => regions.cells(i),
                SlotOrder::Zigzag => self.zigzag_slots(regions, i),
            })
            .collect()
    }

    fn zigzag_slots(&mut self, regions: &RegionSet, i: usize) -> Vec<(usize, usize)> {
        let rect = regions.rects()[i];
        let absolute = |(x, y): &(usize, usize)| (rect.x0 + x, rect.y0 + y);
        match regions {
            RegionSet::Rectangular { .. } => self
                .zigzag(rect.width(), rect.height())
                .iter()
                .rev()
                .map(absolute)
                .collect(),
            // The order follows the full block, restricted to the cells under the curve.
            RegionSet::CurveFit { .. } => {
                let inside = regions.cells(i).into_iter().collect::<HashSet<_>>();
                self.zigzag(rect.width(), rect.height())
                    .iter()
                    .rev()
                    .map(absolute)
                    .filter(|cell| inside.contains(cell))
                    .collect()
            }
        }
    }

    /// Write values into the interleaved slots, returns how many were written.
    ///
    /// Slots past the end of the payload keep their value.
    pub fn write(
        &mut self,
        grid: &mut Grid<f32>,
        regions: &RegionSet,
        order: SlotOrder,
        values: &[f32],
    ) -> usize {
        let slots = interleave(&self.slots(regions, order));
        let written = values.len().min(slots.len());
        for ((x, y), v) in slots.into_iter().zip(values.iter()) {
            grid.set(x, y, *v);
        }
        written
    }

    /// Read `len` values from the interleaved slots, zero-padded past the capacity.
    pub fn read(
        &mut self,
        grid: &Grid<f32>,
        regions: &RegionSet,
        order: SlotOrder,
        len: usize,
    ) -> Vec<f32> {
        let slots = interleave(&self.slots(regions, order));
        let mut values = slots
            .into_iter()
            .take(len)
            .map(|(x, y)| grid.get(x, y))
            .collect::<Vec<_>>();
        values.resize(len, 0.0);
        values
    }

    /// Turn a secret channel into the value stream to embed.
    pub fn encode_secret(
        &mut self,
        secret: &Grid<u8>,
        mode: PayloadMode,
    ) -> Result<Vec<f32>, QtarError> {
        check_secret(secret.width(), secret.height(), mode)?;
        match mode {
            PayloadMode::Plain { channel_scale } => Ok(secret
                .as_slice()
                .iter()
                .map(|s| *s as f32 / 255.0 * channel_scale)
                .collect()),
            PayloadMode::Dct { block_size, scale } => {
                let b = block_size;
                let flat = self.tables.flat(b).to_vec();
                let positions = self.zigzag(b, b).to_vec();
                let mut per_block = vec![];
                for rect in tiles(secret.width(), secret.height(), b) {
                    let mut block = secret
                        .region(&rect)
                        .into_iter()
                        .map(f32::from)
                        .collect::<Vec<_>>();
                    self.transform.block(Type::DCT2, b, b, &mut block);
                    per_block.push(
                        positions
                            .iter()
                            .map(|(x, y)| {
                                let i = y * b + x;
                                block[i] * scale / flat[i]
                            })
                            .collect::<Vec<_>>(),
                    );
                }
                Ok(interleave(&per_block))
            }
        }
    }

    /// Reassemble a secret channel of the given shape from extracted values.
    pub fn decode_secret(
        &mut self,
        values: &[f32],
        width: usize,
        height: usize,
        mode: PayloadMode,
    ) -> Result<Grid<u8>, QtarError> {
        check_secret(width, height, mode)?;
        let value = |i: usize| values.get(i).copied().unwrap_or(0.0);
        match mode {
            PayloadMode::Plain { channel_scale } => {
                let mut secret = Grid::new(width, height, 0u8);
                for (i, s) in secret.as_mut_slice().iter_mut().enumerate() {
                    *s = quantize_sample(value(i) * 255.0 / channel_scale);
                }
                Ok(secret)
            }
            PayloadMode::Dct { block_size, scale } => {
                let b = block_size;
                let flat = self.tables.flat(b).to_vec();
                let positions = self.zigzag(b, b).to_vec();
                let rects = tiles(width, height, b);

                let placement = rects
                    .iter()
                    .enumerate()
                    .map(|(k, _)| positions.iter().map(|p| (k, *p)).collect())
                    .collect::<Vec<Vec<_>>>();
                let mut blocks = vec![vec![0.0f32; b * b]; rects.len()];
                for (j, (k, (x, y))) in interleave(&placement).into_iter().enumerate() {
                    let i = y * b + x;
                    blocks[k][i] = value(j) * flat[i] / scale;
                }

                let mut secret = Grid::new(width, height, 0u8);
                for (rect, mut block) in rects.iter().zip(blocks.into_iter()) {
                    self.transform.block(Type::DCT3, b, b, &mut block);
                    let samples = block.into_iter().map(quantize_sample).collect::<Vec<_>>();
                    secret.set_region(rect, &samples);
                }
                Ok(secret)
            }
        }
    }
}

fn check_secret(width: usize, height: usize, mode: PayloadMode) -> Result<(), QtarError> {
    if width == 0 || height == 0 {
        return Err(QtarError::SecretShape {
            reason: format!("{width}x{height} holds no samples"),
        });
    }
    if let PayloadMode::Dct { block_size, .. } = mode {
        if block_size == 0 || width % block_size != 0 || height % block_size != 0 {
            return Err(QtarError::SecretShape {
                reason: format!("{width}x{height} is not tiled by {block_size}x{block_size} blocks"),
            });
        }
    }
    Ok(())
}

/// Row-major tiling of a `width x height` area into `b x b` blocks.
fn tiles(width: usize, height: usize, b: usize) -> Vec<Rect> {
    (0..height / b)
        .flat_map(|by| (0..width / b).map(move |bx| Rect::new(bx * b, by * b, (bx + 1) * b, (by + 1) * b)))
        .collect()
}
