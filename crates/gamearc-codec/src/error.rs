//! Error types for the codec crate.

use thiserror::Error;

/// Errors that can occur while decoding or extracting entries.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Byte source error.
    #[error("{0}")]
    Source(#[from] gamearc_common::Error),

    /// No implementation for the entry's decoder.
    #[error("unsupported decoder: {0}")]
    UnsupportedDecoder(String),

    /// Decompression error.
    #[error("decompression error in {name}: {message}")]
    Decompression { name: String, message: String },

    /// Decoded output does not have the recorded length.
    #[error("{name}: expected {expected} bytes after decoding, got {actual}")]
    SizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, Error>;
