//! Error types for the gamearc engine.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::descriptor::Slot;

/// A field failed a sanity check.
///
/// During sniffing these only lower the score; during decoding they abort
/// the attempt as a [`DecodeError`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("offset {value:#x} outside archive of {archive_size} bytes")]
    OffsetOutOfRange { value: u64, archive_size: u64 },

    #[error("length {value} exceeds limit of {limit} bytes")]
    LengthOutOfRange { value: u64, limit: u64 },

    #[error("file count {value} exceeds maximum of {max}")]
    CountOutOfRange { value: u64, max: u64 },

    #[error("invalid filename {name:?}: {reason}")]
    InvalidFilename { name: String, reason: &'static str },

    #[error("unexpected value {value:#x}")]
    UnexpectedValue { value: u64 },
}

/// The decode step that was running when a [`DecodeError`] was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStep {
    Descriptor,
    Header,
    Directory,
    Record(usize),
    Names(usize),
    Resolve(usize),
}

impl fmt::Display for DecodeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeStep::Descriptor => f.write_str("descriptor check"),
            DecodeStep::Header => f.write_str("header"),
            DecodeStep::Directory => f.write_str("directory"),
            DecodeStep::Record(i) => write!(f, "record {i}"),
            DecodeStep::Names(i) => write!(f, "name of record {i}"),
            DecodeStep::Resolve(i) => write!(f, "resolving entry {i}"),
        }
    }
}

/// What went wrong inside a decode step.
#[derive(Debug, Error)]
pub enum DecodeErrorKind {
    #[error(transparent)]
    Source(#[from] gamearc_common::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("bad magic: expected {expected:02x?}, got {actual:02x?}")]
    BadMagic { expected: Vec<u8>, actual: Vec<u8> },

    #[error("header value {0:?} was never read")]
    MissingHeaderValue(Slot),

    #[error("directory record did not advance the cursor")]
    Stalled,

    #[error("entry has a decoder but no decompressed length")]
    MissingDecompressedLength,

    #[error("entry length was never resolved")]
    UnresolvedLength,

    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(&'static str),
}

/// A failed decode attempt, with the byte position and step it failed at.
#[derive(Debug, Error)]
#[error("{step} at {position:#x}: {kind}")]
pub struct DecodeError {
    pub step: DecodeStep,
    pub position: u64,
    #[source]
    pub kind: DecodeErrorKind,
}

impl DecodeError {
    pub fn new(step: DecodeStep, position: u64, kind: impl Into<DecodeErrorKind>) -> Self {
        Self {
            step,
            position,
            kind: kind.into(),
        }
    }

    /// The validation failure underneath, if this was one.
    pub fn validation(&self) -> Option<&ValidationError> {
        match &self.kind {
            DecodeErrorKind::Validation(v) => Some(v),
            _ => None,
        }
    }
}

/// The best-scoring descriptor of a failed identification.
#[derive(Debug)]
pub struct ClosestMatch {
    pub format: &'static str,
    pub score: u32,
    pub failure: Box<Error>,
}

/// Errors raised by the engine's top-level operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Byte source error outside a decode step.
    #[error("{0}")]
    Source(#[from] gamearc_common::Error),

    /// A descriptor's decode attempt failed.
    #[error("{format}: {source}")]
    Decode {
        format: &'static str,
        #[source]
        source: DecodeError,
    },

    /// Every candidate descriptor failed or none scored.
    #[error("no supported format recognized for {}{}", .path.display(), describe_closest(.closest))]
    NoFormatRecognized {
        path: PathBuf,
        closest: Option<ClosestMatch>,
    },

    /// No descriptor registered under that name.
    #[error("unknown format: {0}")]
    UnknownFormat(String),

    /// A descriptor was rejected at registration.
    #[error("descriptor {name} rejected: {reason}")]
    InvalidDescriptor {
        name: &'static str,
        reason: &'static str,
    },

    /// A split archive's companion file could not be located.
    #[error("companion file not found: {}", .0.display())]
    MissingCompanion(PathBuf),
}

fn describe_closest(closest: &Option<ClosestMatch>) -> String {
    match closest {
        Some(c) => format!(
            " (closest: {} scoring {}, failed with: {})",
            c.format, c.score, c.failure
        ),
        None => String::new(),
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::new(
            DecodeStep::Record(2),
            0x40,
            ValidationError::OffsetOutOfRange {
                value: 0x1000,
                archive_size: 16,
            },
        );
        assert_eq!(
            err.to_string(),
            "record 2 at 0x40: offset 0x1000 outside archive of 16 bytes"
        );
        assert!(err.validation().is_some());
    }

    #[test]
    fn test_no_format_display_names_closest() {
        let err = Error::NoFormatRecognized {
            path: PathBuf::from("game.dat"),
            closest: Some(ClosestMatch {
                format: "quake-pak",
                score: 75,
                failure: Box::new(Error::Decode {
                    format: "quake-pak",
                    source: DecodeError::new(
                        DecodeStep::Directory,
                        12,
                        ValidationError::CountOutOfRange {
                            value: 9_999_999,
                            max: 1_000_000,
                        },
                    ),
                }),
            }),
        };
        let text = err.to_string();
        assert!(text.starts_with("no supported format recognized for game.dat"));
        assert!(text.contains("quake-pak scoring 75"));
        assert!(text.contains("file count 9999999"));
    }
}
