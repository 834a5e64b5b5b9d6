//! Byte helpers for synthetic archives.

pub(crate) fn put(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(bytes);
}

pub(crate) fn put_u16le(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u32le(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u32be(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn put_u64le(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// NUL-padded fixed-width field.
pub(crate) fn put_fixed(buf: &mut Vec<u8>, s: &str, width: usize) {
    let start = buf.len();
    buf.extend_from_slice(s.as_bytes());
    buf.resize(start + width, 0);
}
