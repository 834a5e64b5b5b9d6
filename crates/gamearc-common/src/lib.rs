//! Common utilities for gamearc.
//!
//! This crate provides the foundational reading layer used by every gamearc crate:
//!
//! - [`ByteSource`] - Bounded, seekable cursor over a file or in-memory buffer
//! - [`Endian`] - Explicit byte order for every multi-byte read
//! - [`ByteTransform`] - Per-byte de-obfuscation layered over a source

mod endian;
mod error;
mod source;
mod transform;

pub use endian::Endian;
pub use error::{Error, Result};
pub use source::ByteSource;
pub use transform::ByteTransform;

/// Re-export zerocopy traits for convenience
pub use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};
