//! Error types shared by the quantizer, the entropy coder, and the tile
//! layer.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The quantizer could not resolve a usable scale/zero pair for a tile.
    #[error("quantization failed: {0}")]
    Quantization(String),

    /// Corrupt or truncated bit stream encountered while decoding.
    #[error("corrupt stream at byte {offset}: {reason}")]
    Codec { offset: usize, reason: String },

    /// The stream opens with a tag for a different storage format.
    #[error("unexpected format tag {found:#04x}, expected {expected}")]
    Format { found: u8, expected: &'static str },

    /// Rejected option value, or an option/data mismatch.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// I/O failure in the stream framing layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn codec(offset: usize, reason: impl Into<String>) -> Self {
        Error::Codec {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Error::Configuration(reason.into())
    }

    pub(crate) fn quantization(reason: impl Into<String>) -> Self {
        Error::Quantization(reason.into())
    }
}
