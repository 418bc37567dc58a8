//! Error types for cmb2sphere.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for cmb2sphere operations.
#[derive(Error, Debug)]
pub enum Cmb2SphereError {
    /// The source field file does not exist.
    #[error("required data file not found: {}", path.display())]
    MissingInput {
        /// Path that was requested.
        path: PathBuf,
    },

    /// The resolution parameter is not supported by the pixelization scheme.
    #[error("invalid resolution nside={nside}: {reason}")]
    InvalidResolution {
        /// Rejected resolution value.
        nside: u32,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The spherical-harmonic transform rejected its input.
    #[error("spectral transform failed: {0}")]
    TransformFailure(String),

    /// A field's length disagrees with the pixel count of its resolution.
    #[error("resolution mismatch: expected {expected} pixels, got {actual}")]
    ResolutionMismatch { expected: usize, actual: usize },

    /// The triangulation produced an unusable triangle or skipped a vertex.
    #[error("degenerate topology: {0}")]
    DegenerateTopology(String),

    /// A triangle references a vertex that does not exist.
    #[error("triangle index {index} out of range for {len} vertices")]
    IndexOutOfRange { index: usize, len: usize },

    /// A cache entry could not be decoded or belongs to a different key.
    #[error("cache entry '{key}' is corrupt: {reason}")]
    CacheCorrupt { key: String, reason: String },

    /// A cache key already holds a different value.
    #[error("cache entry '{key}' already holds a different value")]
    CacheConflict { key: String },

    /// The input file is not a readable HEALPix FITS map.
    #[error("invalid FITS file: {0}")]
    InvalidFits(String),

    /// A mesh file could not be written or read back.
    #[error("invalid mesh file: {0}")]
    InvalidMesh(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl Cmb2SphereError {
    /// Creates a `CacheCorrupt` error for the given key.
    #[must_use]
    pub fn cache_corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CacheCorrupt {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidFits` error with the given message.
    #[must_use]
    pub fn invalid_fits(message: impl Into<String>) -> Self {
        Self::InvalidFits(message.into())
    }
}

/// A specialized Result type for cmb2sphere operations.
pub type Result<T> = std::result::Result<T, Cmb2SphereError>;
