//! Binary key format.
//!
//! All integers are big-endian. The header is a fixed record:
//!
//! | field | type |
//! |---|---|
//! | mode flags: bit 0 permutation, bit 1 curve fit, bit 2 payload DCT | `u8` |
//! | scale, the channel scale or the payload DCT scale | `f32` |
//! | curve fit grid size, 0 for rectangular regions | `u16` |
//! | offset x, y | `i32`, `i32` |
//! | secret width, height | `u32`, `u32` |
//! | payload DCT block size, 0 when disabled | `u16` |
//! | container width, height | `u32`, `u32` |
//! | channel count | `u8` |
//!
//! Each channel then stores its quadtree key as a `u32` bit count followed by the bits
//! packed MSB first. The number of leaves is not stored, it follows from parsing those
//! bits, and determines how many region entries come next: one `u16` offset per leaf for
//! rectangular regions, or three curve components per leaf (`u16` each for a grid size of
//! one, `u8` otherwise). With the permutation enabled a `u32` list length follows, then
//! per leaf a `u32` length and that many `u32` diff-fix entries.

use bitvec::prelude::*;

use crate::curve::Curve;
use crate::error::KeyError;
use crate::payload::PayloadMode;
use crate::permutation::DiffFix;
use crate::quadtree::{depth_limit, QuadtreeKey};

const FLAG_PERMUTATION: u8 = 0x01;
const FLAG_CURVE_FIT: u8 = 0x02;
const FLAG_PAYLOAD_DCT: u8 = 0x04;

/// Secret samples a key may describe per container pixel, larger secrets are refused.
pub const MAX_SECRET_RATIO: u64 = 16;

/// Size of the fixed header in bytes.
pub const HEADER_LEN: usize = 1 + 4 + 2 + 4 + 4 + 4 + 4 + 2 + 4 + 4 + 1;

/// Optional stages enabled for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modes {
    pub permutation: bool,
    pub curve_fit: bool,
    pub payload_dct: bool,
}

impl Modes {
    fn to_flags(self) -> u8 {
        let mut flags = 0;
        if self.permutation {
            flags |= FLAG_PERMUTATION;
        }
        if self.curve_fit {
            flags |= FLAG_CURVE_FIT;
        }
        if self.payload_dct {
            flags |= FLAG_PAYLOAD_DCT;
        }
        flags
    }

    fn from_flags(flags: u8) -> Result<Modes, KeyError> {
        if flags & !(FLAG_PERMUTATION | FLAG_CURVE_FIT | FLAG_PAYLOAD_DCT) != 0 {
            return Err(KeyError::ValueOutOfRange {
                field: "mode flags",
                value: flags as u64,
            });
        }
        Ok(Modes {
            permutation: flags & FLAG_PERMUTATION != 0,
            curve_fit: flags & FLAG_CURVE_FIT != 0,
            payload_dct: flags & FLAG_PAYLOAD_DCT != 0,
        })
    }
}

/// Stored description of the adaptive regions of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionKey {
    /// Trailing square offset per leaf.
    Offsets(Vec<u16>),
    /// Boundary curve per leaf.
    Curves(Vec<Curve>),
}

impl RegionKey {
    pub fn len(&self) -> usize {
        match self {
            RegionKey::Offsets(o) => o.len(),
            RegionKey::Curves(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything needed to find the payload in one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelKey {
    pub quadtree: QuadtreeKey,
    pub regions: RegionKey,
    /// Present exactly when the permutation is enabled.
    pub diff_fix: Option<DiffFix>,
}

/// Byte counts of the sections of a serialized key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeySizeInfo {
    pub total: usize,
    pub header: usize,
    pub quadtree: usize,
    pub regions: usize,
    pub diff_fix: usize,
}

/// Parameters and per-channel keys of an embedding run.
#[derive(Debug, Clone, PartialEq)]
pub struct Key {
    pub modes: Modes,
    /// Channel scale, or the payload DCT scale when that mode is on.
    pub scale: f32,
    pub curve_fit_grid: u16,
    pub offset: (i32, i32),
    pub secret_shape: (u32, u32),
    pub payload_block_size: u16,
    pub container_shape: (u32, u32),
    pub channels: Vec<ChannelKey>,
}

impl Key {
    /// How the secret was encoded into slot values.
    pub fn payload_mode(&self) -> PayloadMode {
        if self.modes.payload_dct {
            PayloadMode::Dct {
                block_size: self.payload_block_size as usize,
                scale: self.scale,
            }
        } else {
            PayloadMode::Plain {
                channel_scale: self.scale,
            }
        }
    }

    fn region_entry_len(&self) -> usize {
        match (self.modes.curve_fit, self.curve_fit_grid) {
            (true, 1) => 3 * 2,
            (true, _) => 3,
            (false, _) => 2,
        }
    }

    /// Samples per secret channel, refusing shapes no container of this size could carry.
    pub fn secret_samples(&self) -> Result<usize, KeyError> {
        let (width, height) = self.secret_shape;
        let (container_width, container_height) = self.container_shape;
        let samples = width as u64 * height as u64;
        let limit = (container_width as u64 * container_height as u64).saturating_mul(MAX_SECRET_RATIO);
        if samples > limit {
            return Err(KeyError::SecretTooLarge {
                width,
                height,
                container_width,
                container_height,
            });
        }
        usize::try_from(samples).map_err(|_| KeyError::ValueOutOfRange {
            field: "secret shape",
            value: samples,
        })
    }

    /// Serialize the key.
    pub fn to_bytes(&self) -> Result<Vec<u8>, KeyError> {
        let mut out = Vec::with_capacity(self.size_info().total);
        out.push(self.modes.to_flags());
        out.extend_from_slice(&self.scale.to_be_bytes());
        out.extend_from_slice(&self.curve_fit_grid.to_be_bytes());
        out.extend_from_slice(&self.offset.0.to_be_bytes());
        out.extend_from_slice(&self.offset.1.to_be_bytes());
        out.extend_from_slice(&self.secret_shape.0.to_be_bytes());
        out.extend_from_slice(&self.secret_shape.1.to_be_bytes());
        out.extend_from_slice(&self.payload_block_size.to_be_bytes());
        out.extend_from_slice(&self.container_shape.0.to_be_bytes());
        out.extend_from_slice(&self.container_shape.1.to_be_bytes());
        out.push(narrow::<u8>("channel count", self.channels.len())?);

        let max_depth = depth_limit(self.container_shape.0 as usize);
        for (index, channel) in self.channels.iter().enumerate() {
            let bits = channel.quadtree.bits();
            let leaves = channel.quadtree.leaf_count(max_depth)?;
            out.extend_from_slice(&narrow::<u32>("quadtree bit count", bits.len())?.to_be_bytes());
            out.extend(bits.iter().copied().collect::<BitVec<u8, Msb0>>().into_vec());

            if channel.regions.len() != leaves {
                return Err(KeyError::ValueOutOfRange {
                    field: "region entry count",
                    value: channel.regions.len() as u64,
                });
            }
            match (&channel.regions, self.modes.curve_fit) {
                (RegionKey::Offsets(offsets), false) => {
                    for k in offsets {
                        out.extend_from_slice(&k.to_be_bytes());
                    }
                }
                (RegionKey::Curves(curves), true) => {
                    for curve in curves {
                        for c in [curve.ay, curve.b, curve.cx] {
                            if self.curve_fit_grid == 1 {
                                out.extend_from_slice(&c.to_be_bytes());
                            } else {
                                out.push(narrow::<u8>("curve component", c as usize)?);
                            }
                        }
                    }
                }
                _ => {
                    return Err(KeyError::ValueOutOfRange {
                        field: "region mode",
                        value: self.modes.curve_fit as u64,
                    })
                }
            }

            match (&channel.diff_fix, self.modes.permutation) {
                (Some(fix), true) => {
                    out.extend_from_slice(&narrow::<u32>("diff-fix leaf count", fix.len())?.to_be_bytes());
                    for leaf in fix.leaves() {
                        out.extend_from_slice(&narrow::<u32>("diff-fix length", leaf.len())?.to_be_bytes());
                        for e in leaf {
                            out.extend_from_slice(&e.to_be_bytes());
                        }
                    }
                }
                (None, false) => {}
                _ => {
                    return Err(KeyError::DiffFixPresence {
                        channel: index,
                        permutation: self.modes.permutation,
                    })
                }
            }
        }
        Ok(out)
    }

    /// Parse a serialized key, the whole slice must be consumed.
    pub fn from_bytes(data: &[u8]) -> Result<Key, KeyError> {
        let mut r = Reader::new(data);
        let modes = Modes::from_flags(r.u8("mode flags")?)?;
        let scale = r.f32("scale")?;
        let curve_fit_grid = r.u16("curve fit grid")?;
        let offset = (r.i32("offset x")?, r.i32("offset y")?);
        let secret_shape = (r.u32("secret width")?, r.u32("secret height")?);
        let payload_block_size = r.u16("payload block size")?;
        let container_shape = (r.u32("container width")?, r.u32("container height")?);
        let channel_count = r.u8("channel count")? as usize;

        if modes.curve_fit && curve_fit_grid == 0 {
            return Err(KeyError::ValueOutOfRange {
                field: "curve fit grid",
                value: 0,
            });
        }

        let max_depth = depth_limit(container_shape.0 as usize);
        let mut channels = Vec::with_capacity(channel_count);
        for _ in 0..channel_count {
            let bit_count = r.u32("quadtree bit count")? as usize;
            let packed = r.take(bit_count.div_ceil(8), "quadtree bits")?;
            let bits = packed.view_bits::<Msb0>()[..bit_count]
                .iter()
                .by_vals()
                .collect::<Vec<bool>>();
            let quadtree = QuadtreeKey::from_bits(bits);
            let leaves = quadtree.leaf_count(max_depth)?;

            let regions = if modes.curve_fit {
                let mut curves = Vec::with_capacity(leaves.min(r.remaining()));
                for _ in 0..leaves {
                    let mut component = || -> Result<u16, KeyError> {
                        if curve_fit_grid == 1 {
                            r.u16("curve component")
                        } else {
                            r.u8("curve component").map(u16::from)
                        }
                    };
                    let (ay, b, cx) = (component()?, component()?, component()?);
                    curves.push(Curve::new(ay, b, cx));
                }
                RegionKey::Curves(curves)
            } else {
                let mut offsets = Vec::with_capacity(leaves.min(r.remaining()));
                for _ in 0..leaves {
                    offsets.push(r.u16("region offset")?);
                }
                RegionKey::Offsets(offsets)
            };

            let diff_fix = if modes.permutation {
                let count = r.u32("diff-fix leaf count")? as usize;
                let mut fix = Vec::with_capacity(count.min(r.remaining()));
                for _ in 0..count {
                    let len = r.u32("diff-fix length")? as usize;
                    let mut entries = Vec::with_capacity(len.min(r.remaining() / 4));
                    for _ in 0..len {
                        entries.push(r.u32("diff-fix entry")?);
                    }
                    fix.push(entries);
                }
                Some(DiffFix::from_leaves(fix))
            } else {
                None
            };

            channels.push(ChannelKey {
                quadtree,
                regions,
                diff_fix,
            });
        }

        if r.remaining() != 0 {
            return Err(KeyError::TrailingBytes {
                count: r.remaining(),
            });
        }

        Ok(Key {
            modes,
            scale,
            curve_fit_grid,
            offset,
            secret_shape,
            payload_block_size,
            container_shape,
            channels,
        })
    }

    /// Size of each section of the serialized key.
    pub fn size_info(&self) -> KeySizeInfo {
        let mut info = KeySizeInfo {
            header: HEADER_LEN,
            ..Default::default()
        };
        for channel in self.channels.iter() {
            info.quadtree += 4 + channel.quadtree.len().div_ceil(8);
            info.regions += channel.regions.len() * self.region_entry_len();
            if let Some(fix) = &channel.diff_fix {
                info.diff_fix += 4 + fix.leaves().iter().map(|l| 4 + 4 * l.len()).sum::<usize>();
            }
        }
        info.total = info.header + info.quadtree + info.regions + info.diff_fix;
        info
    }
}

fn narrow<T: TryFrom<usize>>(field: &'static str, value: usize) -> Result<T, KeyError> {
    T::try_from(value).map_err(|_| KeyError::ValueOutOfRange {
        field,
        value: value as u64,
    })
}

/// Cursor over the serialized key.
struct Reader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, position: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], KeyError> {
        if len > self.remaining() {
            return Err(KeyError::UnexpectedEnd { field });
        }
        let out = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(out)
    }

    fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], KeyError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, KeyError> {
        Ok(self.array::<1>(field)?[0])
    }

    fn u16(&mut self, field: &'static str) -> Result<u16, KeyError> {
        Ok(u16::from_be_bytes(self.array(field)?))
    }

    fn u32(&mut self, field: &'static str) -> Result<u32, KeyError> {
        Ok(u32::from_be_bytes(self.array(field)?))
    }

    fn i32(&mut self, field: &'static str) -> Result<i32, KeyError> {
        Ok(i32::from_be_bytes(self.array(field)?))
    }

    fn f32(&mut self, field: &'static str) -> Result<f32, KeyError> {
        Ok(f32::from_be_bytes(self.array(field)?))
    }
}
