//! Helpers for building synthetic archives in tests.

use gamearc_common::{ByteSource, Endian};

/// Little byte writer for fixtures.
#[derive(Debug, Default, Clone)]
pub(crate) struct Writer {
    pub bytes: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.bytes.extend_from_slice(data);
        self
    }

    pub fn uint(mut self, value: u64, width: usize, endian: Endian) -> Self {
        let mut buf = [0u8; 8];
        endian.write_uint(&mut buf[..width], value);
        self.bytes.extend_from_slice(&buf[..width]);
        self
    }

    pub fn u8(self, value: u8) -> Self {
        self.bytes(&[value])
    }

    pub fn u16le(self, value: u16) -> Self {
        self.uint(value as u64, 2, Endian::Little)
    }

    pub fn u32le(self, value: u32) -> Self {
        self.uint(value as u64, 4, Endian::Little)
    }

    pub fn u32be(self, value: u32) -> Self {
        self.uint(value as u64, 4, Endian::Big)
    }

    pub fn u64le(self, value: u64) -> Self {
        self.uint(value, 8, Endian::Little)
    }

    /// NUL-padded fixed-width string.
    pub fn fixed(mut self, s: &str, width: usize) -> Self {
        let mut buf = vec![0u8; width];
        buf[..s.len()].copy_from_slice(s.as_bytes());
        self.bytes.extend_from_slice(&buf);
        self
    }

    pub fn cstr(self, s: &str) -> Self {
        self.bytes(s.as_bytes()).u8(0)
    }

    /// Zero-fill up to an absolute length.
    pub fn pad_to(mut self, len: usize) -> Self {
        self.bytes.resize(len, 0);
        self
    }

    pub fn source(self) -> ByteSource {
        ByteSource::from_vec(self.bytes)
    }
}
