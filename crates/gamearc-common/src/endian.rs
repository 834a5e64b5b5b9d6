//! Byte order selection.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Byte order of a multi-byte field.
///
/// There is deliberately no `Default`: every field names its order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    /// Decode an unsigned integer of `bytes.len()` bytes (1..=8).
    #[inline]
    pub fn read_uint(self, bytes: &[u8]) -> u64 {
        match self {
            Endian::Little => LittleEndian::read_uint(bytes, bytes.len()),
            Endian::Big => BigEndian::read_uint(bytes, bytes.len()),
        }
    }

    /// Encode `value` into `out`, using `out.len()` bytes (1..=8).
    #[inline]
    pub fn write_uint(self, out: &mut [u8], value: u64) {
        let n = out.len();
        match self {
            Endian::Little => LittleEndian::write_uint(out, value, n),
            Endian::Big => BigEndian::write_uint(out, value, n),
        }
    }
}
