//! Contains the actual logic that ties everything together.
//!
//! The main steps per channel are:
//! - Roll the channel by the configured offset.
//! - Partition it into a quadtree of homogeneous blocks, optionally over a permuted
//!   version of the channel.
//! - Compute the orthonormal DCT of every leaf.
//! - Find the adaptive region of each leaf, the coefficients a payload can replace.
//! - Write the payload round-robin into those regions.
//! - Perform the inverse DCT per leaf, undo the permutation and the roll.
//!
//! Extraction repeats the analysis from the key alone: the quadtree and the regions are
//! replayed instead of being derived from the modified pixels.

use image::GrayImage;
use tracing::{debug, info, warn};

use crate::adaptive::{find_offsets, regions_from_offsets};
use crate::config::EmbedConfig;
use crate::curve::{fit_regions, regions_from_curves};
use crate::dct2d::{BlockTransform, Type};
use crate::error::{KeyError, QtarError};
use crate::grid::{quantize_sample, Grid, RegionSet};
use crate::key::{ChannelKey, Key, RegionKey, MAX_SECRET_RATIO};
use crate::payload::{PayloadCodec, PayloadMode};
use crate::permutation::{DiffFix, Permutation};
use crate::quadtree::{check_dimensions, Quadtree};
use crate::quantization::QuantizationTables;

/// Payload that did not fit into a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityWarning {
    pub channel: usize,
    /// Number of samples the secret channel holds.
    pub required: usize,
    /// Number of samples that were embedded.
    pub available: usize,
}

impl std::fmt::Display for CapacityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "channel {} holds {} of {} secret samples, the rest is lost",
            self.channel, self.available, self.required
        )
    }
}

/// Outcome of an embedding run.
#[derive(Debug, Clone)]
pub struct EmbedResult {
    pub stego: Vec<GrayImage>,
    pub key: Key,
    /// Embedded bits per container pixel.
    pub bpp: f32,
    pub warnings: Vec<CapacityWarning>,
}

/// Analysis of one container channel.
#[derive(Debug, Clone)]
pub struct ChannelAnalysis {
    tree: Quadtree,
    permutation: Option<Permutation>,
    coefficients: Grid<f32>,
    regions: RegionSet,
    region_key: RegionKey,
}

impl ChannelAnalysis {
    pub fn tree(&self) -> &Quadtree {
        &self.tree
    }

    pub fn permutation(&self) -> Option<&Permutation> {
        self.permutation.as_ref()
    }

    /// Per-leaf DCT coefficients of the rolled, possibly permuted, channel.
    pub fn coefficients(&self) -> &Grid<f32> {
        &self.coefficients
    }

    pub fn regions(&self) -> &RegionSet {
        &self.regions
    }

    pub fn capacity(&self) -> usize {
        self.regions.total_size()
    }
}

/// Embeds secret images according to a validated configuration.
#[derive(Debug, Clone)]
pub struct Embedder {
    config: EmbedConfig,
}

impl Embedder {
    pub fn new(config: EmbedConfig) -> Result<Self, QtarError> {
        config.validate()?;
        Ok(Embedder { config })
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    /// Analyse the container channels, this determines the capacity.
    pub fn prepare(&self, container: &[GrayImage]) -> Result<Container, QtarError> {
        let Some(first) = container.first() else {
            return Err(QtarError::Dimension {
                channel: 0,
                width: 0,
                height: 0,
            });
        };
        let side = first.width() as usize;
        let mut transform = BlockTransform::new();
        let mut tables = QuantizationTables::new();
        let mut channels = Vec::with_capacity(container.len());

        for (index, image) in container.iter().enumerate() {
            let (width, height) = (image.width() as usize, image.height() as usize);
            check_dimensions(index, width, height)?;
            if width != side {
                return Err(QtarError::Dimension {
                    channel: index,
                    width,
                    height,
                });
            }
            let analysis = self.analyse(index, image, &mut transform, &mut tables)?;
            channels.push(analysis);
        }

        Ok(Container {
            config: self.config.clone(),
            side,
            channels,
        })
    }

    fn analyse(
        &self,
        index: usize,
        image: &GrayImage,
        transform: &mut BlockTransform,
        tables: &mut QuantizationTables,
    ) -> Result<ChannelAnalysis, QtarError> {
        let config = &self.config;
        let (dx, dy) = config.offset;
        let rolled = Grid::from(image).rolled(dx as i64, dy as i64);

        let (tree, permutation) = if config.permutation {
            let (tree, permutation) =
                Permutation::build(&rolled, config.limits(), &config.homogeneity)?;
            (tree, Some(permutation))
        } else {
            (
                Quadtree::build(&rolled, config.limits(), &config.homogeneity)?,
                None,
            )
        };
        let analysed = match &permutation {
            Some(p) => p.apply(&rolled),
            None => rolled,
        };

        let coefficients = transform.regions(Type::DCT2, &analysed.map(f32::from), tree.leaves());

        let (regions, region_key) = if config.curve_fit_grid > 0 {
            let (regions, curves) = fit_regions(
                &coefficients,
                tree.leaves(),
                config.quant_power,
                config.curve_fit_grid,
                tables,
            )?;
            (regions, RegionKey::Curves(curves))
        } else {
            let offsets = find_offsets(&coefficients, tree.leaves(), config.quant_power, tables)?;
            let stored = offsets
                .iter()
                .map(|k| {
                    u16::try_from(*k).map_err(|_| KeyError::ValueOutOfRange {
                        field: "region offset",
                        value: *k as u64,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            (
                regions_from_offsets(tree.leaves(), &offsets),
                RegionKey::Offsets(stored),
            )
        };

        debug!(
            channel = index,
            leaves = tree.leaves().len(),
            depth = tree.max_depth(),
            capacity = regions.total_size(),
            "analysed container channel"
        );

        Ok(ChannelAnalysis {
            tree,
            permutation,
            coefficients,
            regions,
            region_key,
        })
    }

    /// Prepare the container and embed the secret in one go.
    pub fn embed(
        &self,
        container: &[GrayImage],
        secret: &[GrayImage],
    ) -> Result<EmbedResult, QtarError> {
        self.prepare(container)?.embed(secret)
    }
}

/// Container channels analysed and ready to receive a secret image.
#[derive(Debug, Clone)]
pub struct Container {
    config: EmbedConfig,
    side: usize,
    channels: Vec<ChannelAnalysis>,
}

impl Container {
    /// Number of samples every channel can carry, the minimum over the channels.
    pub fn capacity(&self) -> usize {
        self.channels
            .iter()
            .map(ChannelAnalysis::capacity)
            .min()
            .unwrap_or(0)
    }

    pub fn side(&self) -> usize {
        self.side
    }

    pub fn channels(&self) -> &[ChannelAnalysis] {
        &self.channels
    }

    /// Embed one secret channel per container channel.
    pub fn embed(self, secret: &[GrayImage]) -> Result<EmbedResult, QtarError> {
        if secret.len() != self.channels.len() {
            return Err(QtarError::SecretShape {
                reason: format!(
                    "{} channels for a container with {}",
                    secret.len(),
                    self.channels.len()
                ),
            });
        }
        let (width, height) = match secret.first() {
            Some(s) => (s.width(), s.height()),
            None => (0, 0),
        };
        if secret.iter().any(|s| s.dimensions() != (width, height)) {
            return Err(QtarError::SecretShape {
                reason: "channels differ in size".to_owned(),
            });
        }
        let area = (self.side * self.side) as u64;
        if width as u64 * height as u64 > area.saturating_mul(MAX_SECRET_RATIO) {
            return Err(QtarError::SecretShape {
                reason: format!(
                    "{width}x{height} is more than {MAX_SECRET_RATIO} times the container area"
                ),
            });
        }
        if let Some(channel) = self.channels.iter().position(|c| c.capacity() == 0) {
            return Err(QtarError::NoSpace { channel });
        }

        let mode = self.config.payload_mode();
        let order = mode.slot_order();
        let mut codec = PayloadCodec::new();
        let payloads = secret
            .iter()
            .map(|s| codec.encode_secret(&Grid::from(s), mode))
            .collect::<Result<Vec<_>, _>>()?;

        let (dx, dy) = self.config.offset;
        let mut transform = BlockTransform::new();
        let mut stego = Vec::with_capacity(self.channels.len());
        let mut channel_keys = Vec::with_capacity(self.channels.len());
        let mut warnings = vec![];
        let mut embedded = 0usize;

        for (index, (analysis, values)) in self.channels.into_iter().zip(payloads).enumerate() {
            let mut coefficients = analysis.coefficients;
            let written = codec.write(&mut coefficients, &analysis.regions, order, &values);
            embedded += written;
            if written < values.len() {
                let warning = CapacityWarning {
                    channel: index,
                    required: values.len(),
                    available: written,
                };
                warn!("{warning}");
                warnings.push(warning);
            }

            let mut samples = transform.regions(Type::DCT3, &coefficients, analysis.tree.leaves());
            if let Some(p) = &analysis.permutation {
                samples = p.reverse(&samples);
            }
            let rolled = samples.map(quantize_sample);

            let diff_fix = match &analysis.permutation {
                Some(original) => {
                    let lossy = Permutation::rebuild(&rolled, analysis.tree.key())?;
                    let fix = DiffFix::compute(original, &lossy, analysis.tree.leaves());
                    debug!(
                        channel = index,
                        entries = fix.entry_count(),
                        "permutation drift after rounding"
                    );
                    Some(fix)
                }
                None => None,
            };

            stego.push(GrayImage::from(rolled.rolled(-(dx as i64), -(dy as i64))));
            channel_keys.push(ChannelKey {
                quadtree: analysis.tree.key().clone(),
                regions: analysis.region_key,
                diff_fix,
            });
        }

        let key = Key {
            modes: self.config.modes(),
            scale: match mode {
                PayloadMode::Plain { channel_scale } => channel_scale,
                PayloadMode::Dct { scale, .. } => scale,
            },
            curve_fit_grid: self.config.curve_fit_grid as u16,
            offset: self.config.offset,
            secret_shape: (width, height),
            payload_block_size: self.config.payload_dct_block_size as u16,
            container_shape: (self.side as u32, self.side as u32),
            channels: channel_keys,
        };
        let bpp = 8.0 * embedded as f32 / (self.side * self.side) as f32;
        info!(
            channels = stego.len(),
            bpp,
            key_bytes = key.size_info().total,
            "embedded secret image"
        );

        Ok(EmbedResult {
            stego,
            key,
            bpp,
            warnings,
        })
    }
}

/// Recover the secret image from stego channels and the key of the run.
pub fn extract(stego: &[GrayImage], key: &Key) -> Result<Vec<GrayImage>, QtarError> {
    if stego.len() != key.channels.len() {
        return Err(KeyError::ChannelCount {
            expected: key.channels.len(),
            found: stego.len(),
        }
        .into());
    }
    let (side_x, side_y) = key.container_shape;
    for (index, image) in stego.iter().enumerate() {
        if image.dimensions() != (side_x, side_y) {
            return Err(QtarError::Dimension {
                channel: index,
                width: image.width() as usize,
                height: image.height() as usize,
            });
        }
        check_dimensions(index, side_x as usize, side_y as usize)?;
    }
    let samples = key.secret_samples()?;
    let (width, height) = (key.secret_shape.0 as usize, key.secret_shape.1 as usize);
    let (dx, dy) = key.offset;
    let mode = key.payload_mode();
    let order = mode.slot_order();
    let mut transform = BlockTransform::new();
    let mut codec = PayloadCodec::new();
    let mut secret = Vec::with_capacity(stego.len());

    for (index, (image, channel)) in stego.iter().zip(key.channels.iter()).enumerate() {
        let side = side_x as usize;
        let rolled = Grid::from(image).rolled(dx as i64, dy as i64);
        let tree = Quadtree::rebuild(side, &channel.quadtree)?;

        let analysed = if key.modes.permutation {
            let fix = channel.diff_fix.as_ref().ok_or(KeyError::DiffFixPresence {
                channel: index,
                permutation: true,
            })?;
            let lossy = Permutation::rebuild(&rolled, &channel.quadtree)?;
            fix.fix(&lossy, tree.leaves())?.apply(&rolled)
        } else {
            rolled
        };

        let coefficients = transform.regions(Type::DCT2, &analysed.map(f32::from), tree.leaves());

        if channel.regions.len() != tree.leaves().len() {
            return Err(KeyError::ValueOutOfRange {
                field: "region entry count",
                value: channel.regions.len() as u64,
            }
            .into());
        }
        let regions = match &channel.regions {
            RegionKey::Offsets(offsets) => {
                let offsets = offsets.iter().map(|k| *k as usize).collect::<Vec<_>>();
                regions_from_offsets(tree.leaves(), &offsets)
            }
            RegionKey::Curves(curves) => {
                regions_from_curves(tree.leaves(), curves, key.curve_fit_grid as usize)
            }
        };

        let values = codec.read(&coefficients, &regions, order, samples);
        let channel_secret = codec.decode_secret(&values, width, height, mode)?;
        debug!(
            channel = index,
            leaves = tree.leaves().len(),
            capacity = regions.total_size(),
            "extracted secret channel"
        );
        secret.push(GrayImage::from(channel_secret));
    }

    info!(channels = secret.len(), width, height, "extracted secret image");
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::fitting_secret_side;

    fn smooth(side: u32, phase: u32) -> GrayImage {
        GrayImage::from_fn(side, side, |x, y| {
            image::Luma([(60 + (x * 3 + y * 2 + phase) % 120) as u8])
        })
    }

    /// Gentle ramp with a small repeating texture, far from both clipping ends.
    fn ramp(side: u32) -> GrayImage {
        GrayImage::from_fn(side, side, |x, y| {
            image::Luma([(100 + x + y / 2 + (x * 7 + y * 13) % 5) as u8])
        })
    }

    fn flat_secret(side: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(side, side, image::Luma([value]))
    }

    #[test]
    fn test_channel_count_mismatch() {
        let embedder = Embedder::new(EmbedConfig::default()).unwrap();
        let container = embedder.prepare(&[smooth(32, 0)]).unwrap();
        let r = container.embed(&[flat_secret(4, 10), flat_secret(4, 10)]);
        assert!(matches!(r, Err(QtarError::SecretShape { .. })));
    }

    #[test]
    fn test_rejects_bad_container() {
        let embedder = Embedder::new(EmbedConfig::default()).unwrap();
        let r = embedder.prepare(&[GrayImage::new(24, 24)]);
        assert!(matches!(r, Err(QtarError::Dimension { channel: 0, .. })));
        let r = embedder.prepare(&[GrayImage::new(32, 32), GrayImage::new(16, 16)]);
        assert!(matches!(r, Err(QtarError::Dimension { channel: 1, .. })));
    }

    #[test]
    fn test_invalid_config() {
        let config = EmbedConfig {
            quant_power: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            Embedder::new(config),
            Err(QtarError::InvalidConfig { field: "quant_power", .. })
        ));
    }

    #[test]
    fn test_round_trip_at_capacity() {
        // Every leaf is 4x4, so each written slot moves pixels by whole units.
        let config = EmbedConfig {
            min_block_size: 4,
            max_block_size: 4,
            quant_power: 2.0,
            channel_scale: 16.0,
            ..Default::default()
        };
        let embedder = Embedder::new(config).unwrap();
        let container = embedder.prepare(&[ramp(32)]).unwrap();
        assert_eq!(container.channels()[0].tree().leaves().len(), 64);
        let side = fitting_secret_side(container.capacity(), 0);
        assert!(side >= 8, "capacity {}", container.capacity());

        let secret = GrayImage::from_fn(side, side, |x, y| {
            image::Luma([(120 + (x * 37 + y * 11) % 100) as u8])
        });
        let result = container.embed(&[secret.clone()]).unwrap();
        assert!(result.warnings.is_empty());
        let expected_bpp = 8.0 * (side * side) as f32 / 1024.0;
        assert!((result.bpp - expected_bpp).abs() < 1e-5);

        let recovered = extract(&result.stego, &result.key).unwrap();
        assert_eq!(recovered[0].dimensions(), (side, side));
        let error = recovered[0]
            .pixels()
            .zip(secret.pixels())
            .map(|(a, b)| (a.0[0] as f32 - b.0[0] as f32).abs())
            .sum::<f32>()
            / (side * side) as f32;
        assert!(error < 15.0, "mean error {error}");
    }

    #[test]
    fn test_extract_checks_channel_count() {
        let embedder = Embedder::new(EmbedConfig::default()).unwrap();
        let result = embedder
            .embed(&[smooth(32, 0)], &[flat_secret(2, 100)])
            .unwrap();
        let r = extract(&[result.stego[0].clone(), result.stego[0].clone()], &result.key);
        assert!(matches!(
            r,
            Err(QtarError::Key(KeyError::ChannelCount {
                expected: 1,
                found: 2
            }))
        ));
    }

    #[test]
    fn test_extract_refuses_oversized_secret_shape() {
        let embedder = Embedder::new(EmbedConfig::default()).unwrap();
        let mut result = embedder
            .embed(&[smooth(32, 0)], &[flat_secret(2, 100)])
            .unwrap();
        result.key.secret_shape = (u32::MAX, u32::MAX);
        let key = Key::from_bytes(&result.key.to_bytes().unwrap()).unwrap();
        assert!(matches!(
            extract(&result.stego, &key),
            Err(QtarError::Key(KeyError::SecretTooLarge { .. }))
        ));
    }

    #[test]
    fn test_extract_requires_diff_fix_in_permutation_mode() {
        let config = EmbedConfig {
            permutation: true,
            ..Default::default()
        };
        let mut result = Embedder::new(config)
            .unwrap()
            .embed(&[smooth(32, 0)], &[flat_secret(2, 100)])
            .unwrap();
        result.key.channels[0].diff_fix = None;
        assert!(matches!(
            extract(&result.stego, &result.key),
            Err(QtarError::Key(KeyError::DiffFixPresence {
                channel: 0,
                permutation: true
            }))
        ));
    }

    #[test]
    fn test_embed_refuses_oversized_secret() {
        let embedder = Embedder::new(EmbedConfig::default()).unwrap();
        let container = embedder.prepare(&[smooth(32, 0)]).unwrap();
        let r = container.embed(&[flat_secret(129, 100)]);
        assert!(matches!(r, Err(QtarError::SecretShape { .. })));
    }
}
