//! Reversible per-byte transforms.
//!
//! Many game archives obfuscate their header, their directory or the whole
//! file with a cheap byte-wise cipher. A [`ByteTransform`] describes such a
//! cipher so that [`ByteSource::with_transform`](crate::ByteSource::with_transform)
//! can undo it transparently while reading.

use std::fmt;
use std::sync::Arc;

/// Signature of a custom transform: `(byte, index) -> byte`.
///
/// `index` counts bytes from the position where the transform was attached.
pub type TransformFn = dyn Fn(u8, u64) -> u8 + Send + Sync;

/// A per-byte transform applied while reading.
#[derive(Clone)]
pub enum ByteTransform {
    /// XOR every byte with one constant.
    Xor(u8),
    /// XOR with a repeating key, phase anchored where the transform was attached.
    XorKey(Arc<[u8]>),
    /// Arbitrary function of the byte and its index.
    Custom(Arc<TransformFn>),
}

impl ByteTransform {
    /// XOR with a single constant.
    pub const fn xor(key: u8) -> Self {
        Self::Xor(key)
    }

    /// XOR with a repeating multi-byte key.
    ///
    /// An empty key behaves like the identity.
    pub fn xor_key(key: &[u8]) -> Self {
        Self::XorKey(Arc::from(key))
    }

    /// Wrap a custom byte function.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(u8, u64) -> u8 + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Apply the transform to one byte at `index`.
    #[inline]
    pub fn apply(&self, byte: u8, index: u64) -> u8 {
        match self {
            ByteTransform::Xor(k) => byte ^ k,
            ByteTransform::XorKey(key) => {
                if key.is_empty() {
                    byte
                } else {
                    byte ^ key[(index % key.len() as u64) as usize]
                }
            }
            ByteTransform::Custom(f) => f(byte, index),
        }
    }

    /// Apply the transform to a buffer whose first byte sits at `start_index`.
    pub fn apply_in_place(&self, buf: &mut [u8], start_index: u64) {
        match self {
            ByteTransform::Xor(k) => buf.iter_mut().for_each(|b| *b ^= k),
            _ => {
                for (i, b) in buf.iter_mut().enumerate() {
                    *b = self.apply(*b, start_index + i as u64);
                }
            }
        }
    }
}

impl fmt::Debug for ByteTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteTransform::Xor(k) => write!(f, "Xor({k:#04x})"),
            ByteTransform::XorKey(key) => write!(f, "XorKey({key:02x?})"),
            ByteTransform::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
