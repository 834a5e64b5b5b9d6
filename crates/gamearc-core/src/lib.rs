//! Descriptor-driven archive directory engine.
//!
//! Every supported archive family is a [`FormatDescriptor`]: plain data
//! interpreted by one engine. The pipeline is
//!
//! - [`FormatSniffer`] - scores how well a descriptor matches a stream
//! - [`DirectoryDecoder`] - runs the header program and walks the directory
//! - [`EntryResolver`] - fills in implicit lengths and re-validates entries
//! - [`Registry`] - ranks descriptors and tries them best first
//!
//! All field checks go through [`FieldValidator`], which is soft while
//! sniffing and fatal while decoding.

pub mod codec;
pub mod decode;
pub mod descriptor;
pub mod entry;
pub mod error;
pub mod registry;
pub mod resolve;
pub mod sniff;
pub mod validate;

#[cfg(test)]
mod testutil;

pub use codec::{Decoder, DecoderRef};
pub use decode::{DecodeTarget, DirectoryDecoder};
pub use descriptor::FormatDescriptor;
pub use entry::{Entry, PropertyValue, SourceFile};
pub use error::{
    ClosestMatch, DecodeError, DecodeErrorKind, DecodeStep, Error, Result, ValidationError,
};
pub use registry::{Candidate, Listing, Registry};
pub use resolve::EntryResolver;
pub use sniff::FormatSniffer;
pub use validate::{FieldValidator, Limits};

pub use gamearc_common::{ByteSource, ByteTransform, Endian};
