//! gamearc - descriptor-driven game archive reader.
//!
//! This crate provides a unified interface to the gamearc crates.
//!
//! # Crates
//!
//! - [`gamearc_common`] - Byte sources, byte order, byte transforms
//! - [`gamearc_core`] - Descriptors, sniffing, directory decoding, resolution
//! - [`gamearc_codec`] - Entry decoders and extraction
//! - [`gamearc_formats`] - Built-in format descriptors
//!
//! # Example
//!
//! ```no_run
//! use gamearc::prelude::*;
//!
//! let listing = gamearc::formats::builtin().open("PAK0.PAK")?;
//! println!("{} ({} entries)", listing.format, listing.entries.len());
//!
//! let extractor = Extractor::open(&listing.path, &listing.entries)?;
//! if let Some(entry) = listing.find("progs.dat") {
//!     let data = extractor.read(entry)?;
//!     println!("progs.dat: {} bytes", data.len());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export all sub-crates
pub use gamearc_codec as codec;
pub use gamearc_common as common;
pub use gamearc_core as core;
pub use gamearc_formats as formats;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use gamearc_codec::{decoder_for, extract, Extractor};
    pub use gamearc_common::{ByteSource, ByteTransform, Endian};
    pub use gamearc_core::descriptor::*;
    pub use gamearc_core::{
        Decoder, DecoderRef, Entry, FieldValidator, FormatDescriptor, Limits, Listing, Registry,
        SourceFile,
    };
}

pub use gamearc_core::{Entry, Error, Listing, Registry, Result};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
