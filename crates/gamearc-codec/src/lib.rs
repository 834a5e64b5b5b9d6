//! Entry decoders and extraction.
//!
//! Directory decoding never touches entry data. This crate turns an entry's
//! [`DecoderRef`](gamearc_core::DecoderRef) into a lazy
//! [`Decoder`](gamearc_core::Decoder) and reads the bytes:
//!
//! - XOR with a constant or a repeating key
//! - DEFLATE and zlib via `flate2`
//! - Zstandard via `zstd`
//!
//! # Example
//!
//! ```no_run
//! use gamearc_codec::Extractor;
//! use gamearc_core::Registry;
//!
//! # fn demo(registry: &Registry) -> Result<(), Box<dyn std::error::Error>> {
//! let listing = registry.open("PAK0.PAK")?;
//! let extractor = Extractor::open(&listing.path, &listing.entries)?;
//! for entry in &listing.entries {
//!     let data = extractor.read(entry)?;
//!     println!("{}: {} bytes", entry.name, data.len());
//! }
//! # Ok(())
//! # }
//! ```

mod decompress;
mod error;
mod extract;

pub use decompress::{decode_all, decoder_for, DeflateStream, XorDecoder, ZlibStream, ZstdStream};
pub use error::{Error, Result};
pub use extract::{extract, Extractor};
