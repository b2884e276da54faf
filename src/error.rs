//! Error types shared by the embedding and extraction pipeline.
//!
//! [`QtarError`] covers every fatal condition; all of them are detected before
//! any output buffer is written. Key parsing failures live in [`KeyError`].
use thiserror::Error;

/// Errors that can be emitted while embedding or extracting.
#[derive(Debug, Error)]
pub enum QtarError {
    /// No adaptive region in the container has room for a single sample.
    #[error("container has no capacity for embedding (channel {channel} offers 0 slots)")]
    NoSpace {
        channel: usize,
    },

    /// A detector was handed a region that is not square.
    #[error("region {index} is {width}x{height}, adaptive regions need square blocks")]
    RegionShape {
        index: usize,
        width: usize,
        height: usize,
    },

    /// Channel dimensions cannot be split into a quadtree.
    #[error("channel {channel} is {width}x{height}, expected a square with a power of two side")]
    Dimension {
        channel: usize,
        width: usize,
        height: usize,
    },

    /// A configuration value is outside of its legal range.
    #[error("invalid configuration for `{field}`: {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: String,
    },

    /// The secret image does not fit the shape constraints of the run.
    #[error("secret image is unusable: {reason}")]
    SecretShape {
        reason: String,
    },

    /// The permutation correction does not line up with the re-derived permutation.
    #[error(
        "diff-fix correction for leaf {leaf} holds {expected} entries, \
         but {found} entries need replacing"
    )]
    DiffFixMismatch {
        leaf: usize,
        expected: usize,
        found: usize,
    },

    /// The key is malformed or inconsistent with the stego image.
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Errors that can be emitted while decoding a key blob.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// The blob ended before the expected field.
    #[error("key ended while reading {field}")]
    UnexpectedEnd {
        field: &'static str,
    },

    /// Bytes are left after the last channel section.
    #[error("key has {count} trailing bytes")]
    TrailingBytes {
        count: usize,
    },

    /// The quadtree bit sequence does not describe a complete tree.
    #[error("quadtree key is malformed: {reason}")]
    MalformedQuadtree {
        reason: &'static str,
    },

    /// The quadtree key descends deeper than the container allows.
    #[error("quadtree key exceeds maximum depth {max_depth}")]
    TooDeep {
        max_depth: usize,
    },

    /// Channel count in the key does not match the image.
    #[error("key describes {expected} channels, image has {found}")]
    ChannelCount {
        expected: usize,
        found: usize,
    },

    /// A value does not fit the field it must be stored in.
    #[error("value {value} does not fit the key field {field}")]
    ValueOutOfRange {
        field: &'static str,
        value: u64,
    },

    /// The permutation flag and the presence of a diff-fix section disagree.
    #[error("channel {channel} diff-fix section does not match the permutation flag ({permutation})")]
    DiffFixPresence {
        channel: usize,
        permutation: bool,
    },

    /// The secret shape is larger than any container of this size could carry.
    #[error("secret of {width}x{height} is implausible for a {container_width}x{container_height} container")]
    SecretTooLarge {
        width: u32,
        height: u32,
        container_width: u32,
        container_height: u32,
    },
}
