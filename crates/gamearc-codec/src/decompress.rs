//! Decoder implementations for the built-in [`DecoderRef`] kinds.

use std::io::{self, Read};

use flate2::read::{DeflateDecoder, ZlibDecoder};
use gamearc_common::ByteTransform;
use gamearc_core::{Decoder, DecoderRef, Entry};

use crate::{Error, Result};

/// Upper bound on the output buffer reserved from a recorded length.
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

/// XOR stream decoder. Output is as long as input.
#[derive(Debug, Clone)]
pub struct XorDecoder {
    transform: ByteTransform,
    output_length: Option<u64>,
}

impl XorDecoder {
    pub fn new(transform: ByteTransform, output_length: Option<u64>) -> Self {
        Self {
            transform,
            output_length,
        }
    }
}

struct XorReader<'a> {
    inner: Box<dyn Read + 'a>,
    transform: ByteTransform,
    index: u64,
}

impl Read for XorReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.transform.apply_in_place(&mut buf[..n], self.index);
        self.index += n as u64;
        Ok(n)
    }
}

impl Decoder for XorDecoder {
    fn transform<'a>(&self, input: Box<dyn Read + 'a>) -> Box<dyn Read + 'a> {
        Box::new(XorReader {
            inner: input,
            transform: self.transform.clone(),
            index: 0,
        })
    }

    fn expected_output_length(&self) -> Option<u64> {
        self.output_length
    }
}

/// Raw DEFLATE stream.
#[derive(Debug, Clone, Copy)]
pub struct DeflateStream {
    pub output_length: Option<u64>,
}

impl Decoder for DeflateStream {
    fn transform<'a>(&self, input: Box<dyn Read + 'a>) -> Box<dyn Read + 'a> {
        Box::new(DeflateDecoder::new(input))
    }

    fn expected_output_length(&self) -> Option<u64> {
        self.output_length
    }
}

/// zlib-wrapped DEFLATE stream.
#[derive(Debug, Clone, Copy)]
pub struct ZlibStream {
    pub output_length: Option<u64>,
}

impl Decoder for ZlibStream {
    fn transform<'a>(&self, input: Box<dyn Read + 'a>) -> Box<dyn Read + 'a> {
        Box::new(ZlibDecoder::new(input))
    }

    fn expected_output_length(&self) -> Option<u64> {
        self.output_length
    }
}

/// Zstandard frame.
#[derive(Debug, Clone, Copy)]
pub struct ZstdStream {
    pub output_length: Option<u64>,
}

/// Reader that reports a deferred construction error on first read.
struct FailedRead(Option<io::Error>);

impl Read for FailedRead {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        match self.0.take() {
            Some(err) => Err(err),
            None => Ok(0),
        }
    }
}

impl Decoder for ZstdStream {
    fn transform<'a>(&self, input: Box<dyn Read + 'a>) -> Box<dyn Read + 'a> {
        match zstd::Decoder::new(input) {
            Ok(decoder) => Box::new(decoder),
            Err(err) => Box::new(FailedRead(Some(err))),
        }
    }

    fn expected_output_length(&self) -> Option<u64> {
        self.output_length
    }
}

/// Build the decoder an entry needs, or `None` for raw passthrough.
pub fn decoder_for(entry: &Entry) -> Result<Option<Box<dyn Decoder>>> {
    let Some(kind) = &entry.decoder else {
        return Ok(None);
    };
    let output_length = entry.decompressed_length;
    let decoder: Box<dyn Decoder> = match kind {
        DecoderRef::Xor(key) => Box::new(XorDecoder::new(ByteTransform::xor(*key), output_length)),
        DecoderRef::XorKey(key) => {
            Box::new(XorDecoder::new(ByteTransform::xor_key(key), output_length))
        }
        DecoderRef::Deflate => Box::new(DeflateStream { output_length }),
        DecoderRef::Zlib => Box::new(ZlibStream { output_length }),
        DecoderRef::Zstd => Box::new(ZstdStream { output_length }),
        DecoderRef::External(name) => return Err(Error::UnsupportedDecoder(name.to_string())),
    };
    Ok(Some(decoder))
}

/// Run `decoder` over `data` and check the output length when it is known.
pub fn decode_all(name: &str, decoder: &dyn Decoder, data: &[u8]) -> Result<Vec<u8>> {
    let expected = decoder.expected_output_length();
    let reserve = expected.unwrap_or(data.len() as u64).min(MAX_PREALLOC);
    let mut output = Vec::with_capacity(reserve as usize);

    decoder
        .transform(Box::new(data))
        .read_to_end(&mut output)
        .map_err(|e| Error::Decompression {
            name: name.to_string(),
            message: e.to_string(),
        })?;

    if let Some(expected) = expected {
        if output.len() as u64 != expected {
            return Err(Error::SizeMismatch {
                name: name.to_string(),
                expected,
                actual: output.len() as u64,
            });
        }
    }
    Ok(output)
}
