//! Decoder capability.
//!
//! The engine never decompresses anything. Entries carry a [`DecoderRef`]
//! naming the transform their bytes need; an extraction layer turns it into
//! a [`Decoder`] and runs it lazily.

use std::io::Read;
use std::sync::Arc;

/// Reference to a byte transform needed at extraction time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DecoderRef {
    /// XOR with a constant.
    Xor(u8),
    /// XOR with a repeating key starting at the first byte of the entry.
    XorKey(Arc<[u8]>),
    /// Raw DEFLATE stream.
    Deflate,
    /// zlib-wrapped DEFLATE stream.
    Zlib,
    /// Zstandard frame.
    Zstd,
    /// A codec supplied outside this workspace, identified by name.
    External(&'static str),
}

impl DecoderRef {
    /// True if output is always exactly as long as input.
    pub fn preserves_size(&self) -> bool {
        matches!(self, DecoderRef::Xor(_) | DecoderRef::XorKey(_))
    }
}

/// A lazy byte transform applied to an entry's raw bytes.
pub trait Decoder: Send + Sync {
    /// Wrap `input` so that reading yields decoded bytes.
    fn transform<'a>(&self, input: Box<dyn Read + 'a>) -> Box<dyn Read + 'a>;

    /// Length of the decoded output, when known up front.
    fn expected_output_length(&self) -> Option<u64>;
}
