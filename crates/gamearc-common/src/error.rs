//! Error types for gamearc-common.

use thiserror::Error;

/// Errors raised by [`ByteSource`](crate::ByteSource) reads.
#[derive(Debug, Error)]
pub enum Error {
    /// A read or seek would cross the end of the source.
    #[error("out of bounds at {position:#x}: needed {needed} bytes but only {available} available")]
    OutOfBounds {
        position: u64,
        needed: u64,
        available: u64,
    },

    /// A string read found no terminator within the allowed window.
    #[error("invalid encoding at {position:#x}: {reason}")]
    InvalidEncoding { position: u64, reason: &'static str },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
