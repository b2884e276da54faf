//! Parameters of an embedding run.

use serde::{Deserialize, Serialize};

use crate::error::QtarError;
use crate::key::Modes;
use crate::payload::PayloadMode;
use crate::quadtree::{BlockLimits, Homogeneity};

/// Configuration to embed a secret image with.
///
/// Deserializes from JSON with every field optional, missing fields take their default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    /// Homogeneity threshold, a single value or one per brightness band.
    pub homogeneity: Homogeneity,
    pub min_block_size: usize,
    pub max_block_size: usize,
    /// Multiplier of the perceptual quantization matrix, higher values free more coefficients.
    pub quant_power: f32,
    /// Upper bound of the embedded sample values in plain mode.
    pub channel_scale: f32,
    /// Cyclic shift applied to the container before analysis.
    pub offset: (i32, i32),
    /// Grid of the curve-fit regions, 0 selects rectangular regions.
    pub curve_fit_grid: usize,
    pub permutation: bool,
    /// Tile size of the payload DCT, 0 disables it.
    pub payload_dct_block_size: usize,
    pub payload_dct_scale: f32,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        EmbedConfig {
            homogeneity: Homogeneity::default(),
            min_block_size: 8,
            max_block_size: 512,
            quant_power: 1.0,
            channel_scale: 4.37,
            offset: (0, 0),
            curve_fit_grid: 0,
            permutation: false,
            payload_dct_block_size: 0,
            payload_dct_scale: 0.0,
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> QtarError {
    QtarError::InvalidConfig {
        field,
        reason: reason.into(),
    }
}

fn positive(field: &'static str, value: f32) -> Result<(), QtarError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(field, format!("{value} is not a positive number")));
    }
    Ok(())
}

impl EmbedConfig {
    /// Check every field is within its legal range.
    pub fn validate(&self) -> Result<(), QtarError> {
        for (field, size) in [
            ("min_block_size", self.min_block_size),
            ("max_block_size", self.max_block_size),
        ] {
            if !size.is_power_of_two() {
                return Err(invalid(field, format!("{size} is not a power of two")));
            }
        }
        if self.min_block_size > self.max_block_size {
            return Err(invalid(
                "min_block_size",
                format!("exceeds max_block_size {}", self.max_block_size),
            ));
        }
        // Offsets and wide curve components are stored as u16.
        if self.max_block_size > 1 << 15 {
            return Err(invalid("max_block_size", "must not exceed 32768"));
        }

        let thresholds = match &self.homogeneity {
            Homogeneity::Uniform(t) => std::slice::from_ref(t),
            Homogeneity::Banded(bands) => &bands[..],
        };
        if thresholds.is_empty() {
            return Err(invalid("homogeneity", "needs at least one band"));
        }
        if let Some(t) = thresholds
            .iter()
            .find(|t| !t.is_finite() || !(0.0..=1.0).contains(*t))
        {
            return Err(invalid("homogeneity", format!("threshold {t} is outside [0, 1]")));
        }

        positive("quant_power", self.quant_power)?;
        positive("channel_scale", self.channel_scale)?;

        let grid = self.curve_fit_grid;
        if grid > 0 {
            if !grid.is_power_of_two() || grid > self.min_block_size {
                return Err(invalid(
                    "curve_fit_grid",
                    format!("{grid} must be a power of two not above min_block_size"),
                ));
            }
            if grid > 1 && self.max_block_size / grid > u8::MAX as usize {
                return Err(invalid(
                    "curve_fit_grid",
                    format!("{grid} is too fine for blocks of {}", self.max_block_size),
                ));
            }
        }

        if self.payload_dct_block_size > 0 {
            if self.payload_dct_block_size > u16::MAX as usize {
                return Err(invalid("payload_dct_block_size", "must fit 16 bits"));
            }
            positive("payload_dct_scale", self.payload_dct_scale)?;
        }
        Ok(())
    }

    pub fn limits(&self) -> BlockLimits {
        BlockLimits {
            min_size: self.min_block_size,
            max_size: self.max_block_size,
        }
    }

    pub fn modes(&self) -> Modes {
        Modes {
            permutation: self.permutation,
            curve_fit: self.curve_fit_grid > 0,
            payload_dct: self.payload_dct_block_size > 0,
        }
    }

    pub fn payload_mode(&self) -> PayloadMode {
        if self.payload_dct_block_size > 0 {
            PayloadMode::Dct {
                block_size: self.payload_dct_block_size,
                scale: self.payload_dct_scale,
            }
        } else {
            PayloadMode::Plain {
                channel_scale: self.channel_scale,
            }
        }
    }
}
