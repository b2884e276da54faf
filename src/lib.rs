#![allow(clippy::excessive_precision)]
//! Adaptive quadtree steganography: hides a secret image in the perceptually insignificant
//! DCT coefficients of homogeneous blocks of a container image.

pub mod adaptive;
pub mod algorithm;
pub mod config;
pub mod curve;
pub mod dct2d;
pub mod error;
pub mod grid;
pub mod key;
pub mod payload;
pub mod permutation;
pub mod quadtree;
pub mod quantization;
pub mod raster;
pub mod util;

// expose the commonly used types in the prelude.
pub mod prelude {
    pub use crate::algorithm::{extract, Container, EmbedResult, Embedder};
    pub use crate::config::EmbedConfig;
    pub use crate::error::{KeyError, QtarError};
    pub use crate::key::Key;
}
// Export the public components from the algorithm here.
pub use algorithm::{extract, CapacityWarning, ChannelAnalysis, Container, EmbedResult, Embedder};
pub use config::EmbedConfig;
pub use error::{KeyError, QtarError};
pub use key::{Key, KeySizeInfo};
pub use quadtree::Homogeneity;
