//! Seekable, bounded byte source.
//!
//! This module provides [`ByteSource`], a cursor over a memory-mapped file or
//! an owned buffer. Sources are cheap to clone: clones and sub-views share the
//! same backing storage but each carries its own cursor.

use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;
use zerocopy::FromBytes;

use crate::{ByteTransform, Endian, Error, Result};

/// Chunk size used when scanning for string terminators.
const SCAN_CHUNK: usize = 256;

enum Backing {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl Backing {
    #[inline]
    fn bytes(&self) -> &[u8] {
        match self {
            Backing::Owned(v) => v,
            Backing::Mapped(m) => m,
        }
    }
}

/// A transform plus the absolute backing offset its index counts from.
#[derive(Clone, Debug)]
struct Layer {
    transform: ByteTransform,
    origin: usize,
}

/// A bounded, seekable reader over shared binary storage.
///
/// All reads advance the cursor. Multi-byte integer reads always take an
/// explicit [`Endian`].
///
/// # Example
///
/// ```
/// use gamearc_common::{ByteSource, Endian};
///
/// let mut source = ByteSource::from_vec(vec![0x01, 0x02, 0x03, 0x04, 0x00, 0x10]);
///
/// assert_eq!(source.read_u32(Endian::Little).unwrap(), 0x04030201);
/// assert_eq!(source.read_u16(Endian::Big).unwrap(), 0x0010);
/// assert_eq!(source.remaining(), 0);
/// ```
#[derive(Clone)]
pub struct ByteSource {
    backing: Arc<Backing>,
    /// Start of this view within the backing storage.
    base: usize,
    /// Length of this view.
    len: usize,
    /// Cursor, relative to `base`.
    position: usize,
    layers: Vec<Layer>,
}

impl ByteSource {
    /// Create a source that owns `data`.
    pub fn from_vec(data: Vec<u8>) -> Self {
        let len = data.len();
        Self {
            backing: Arc::new(Backing::Owned(data)),
            base: 0,
            len,
            position: 0,
            layers: Vec::new(),
        }
    }

    /// Create a source from a copy of `data`.
    pub fn from_slice(data: &[u8]) -> Self {
        Self::from_vec(data.to_vec())
    }

    /// Memory-map a file.
    ///
    /// The mapping is released when the last clone or view is dropped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        if file.metadata()?.len() == 0 {
            return Ok(Self::from_vec(Vec::new()));
        }
        let mmap = unsafe { Mmap::map(&file)? };
        let len = mmap.len();

        Ok(Self {
            backing: Arc::new(Backing::Mapped(mmap)),
            base: 0,
            len,
            position: 0,
            layers: Vec::new(),
        })
    }

    /// Total size of this view in bytes.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len as u64
    }

    /// True if the view holds no bytes at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current cursor position, relative to the start of the view.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position as u64
    }

    /// Alias of [`position`](Self::position).
    #[inline]
    pub fn tell(&self) -> u64 {
        self.position()
    }

    /// Bytes left between the cursor and the end of the view.
    #[inline]
    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.position) as u64
    }

    /// Seek to an absolute position. Seeking exactly to the end is allowed.
    pub fn seek(&mut self, position: u64) -> Result<()> {
        if position > self.len as u64 {
            return Err(Error::OutOfBounds {
                position,
                needed: 0,
                available: 0,
            });
        }
        self.position = position as usize;
        Ok(())
    }

    /// Move the cursor by `delta` bytes in either direction.
    pub fn seek_relative(&mut self, delta: i64) -> Result<()> {
        let target = (self.position as i64).checked_add(delta).filter(|t| *t >= 0);
        match target {
            Some(t) => self.seek(t as u64),
            None => Err(Error::OutOfBounds {
                position: self.position(),
                needed: delta.unsigned_abs(),
                available: self.position(),
            }),
        }
    }

    /// Advance the cursor by `count` bytes.
    #[inline]
    pub fn skip(&mut self, count: u64) -> Result<()> {
        self.ensure(count)?;
        self.position += count as usize;
        Ok(())
    }

    /// A read-only sub-view of `len` bytes starting at `offset`.
    ///
    /// The view shares backing storage and transforms, and starts with its
    /// cursor at zero.
    pub fn slice(&self, offset: u64, len: u64) -> Result<ByteSource> {
        let end = offset.checked_add(len);
        if end.map_or(true, |end| end > self.len as u64) {
            return Err(Error::OutOfBounds {
                position: offset,
                needed: len,
                available: self.len().saturating_sub(offset),
            });
        }
        Ok(Self {
            backing: Arc::clone(&self.backing),
            base: self.base + offset as usize,
            len: len as usize,
            position: 0,
            layers: self.layers.clone(),
        })
    }

    /// Wrap all further reads through `transform`.
    ///
    /// The transform's index counts from the current cursor, so a key applied
    /// to a header region lines up with the first header byte. Existing
    /// transforms stay in place and run first.
    pub fn with_transform(&self, transform: ByteTransform) -> ByteSource {
        let mut layers = self.layers.clone();
        layers.push(Layer {
            transform,
            origin: self.base + self.position,
        });
        Self {
            backing: Arc::clone(&self.backing),
            base: self.base,
            len: self.len,
            position: self.position,
            layers,
        }
    }

    /// Fill `buf` from the cursor and advance.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        self.peek_into(buf)?;
        self.position += buf.len();
        Ok(())
    }

    /// Fill `buf` from the cursor without advancing.
    pub fn peek_into(&self, buf: &mut [u8]) -> Result<()> {
        self.ensure(buf.len() as u64)?;
        let start = self.base + self.position;
        buf.copy_from_slice(&self.backing.bytes()[start..start + buf.len()]);
        for layer in &self.layers {
            // Bytes before the layer origin are not affected by it.
            if start >= layer.origin {
                layer
                    .transform
                    .apply_in_place(buf, (start - layer.origin) as u64);
            } else {
                let skip = (layer.origin - start).min(buf.len());
                layer.transform.apply_in_place(&mut buf[skip..], 0);
            }
        }
        Ok(())
    }

    /// Read `count` bytes and advance.
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; count];
        self.read_into(&mut buf)?;
        Ok(buf)
    }

    /// Read `count` bytes without advancing.
    pub fn peek_bytes(&self, count: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; count];
        self.peek_into(&mut buf)?;
        Ok(buf)
    }

    /// Read a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_into(&mut b)?;
        Ok(b[0])
    }

    /// Read a u16 in the given byte order.
    #[inline]
    pub fn read_u16(&mut self, endian: Endian) -> Result<u16> {
        self.read_uint(2, endian).map(|v| v as u16)
    }

    /// Read a u32 in the given byte order.
    #[inline]
    pub fn read_u32(&mut self, endian: Endian) -> Result<u32> {
        self.read_uint(4, endian).map(|v| v as u32)
    }

    /// Read a u64 in the given byte order.
    #[inline]
    pub fn read_u64(&mut self, endian: Endian) -> Result<u64> {
        self.read_uint(8, endian)
    }

    /// Read an i32 in the given byte order.
    #[inline]
    pub fn read_i32(&mut self, endian: Endian) -> Result<i32> {
        self.read_u32(endian).map(|v| v as i32)
    }

    /// Read an unsigned integer `width` bytes wide (1..=8).
    pub fn read_uint(&mut self, width: usize, endian: Endian) -> Result<u64> {
        debug_assert!((1..=8).contains(&width));
        let mut buf = [0u8; 8];
        self.read_into(&mut buf[..width])?;
        Ok(endian.read_uint(&buf[..width]))
    }

    /// Read a NUL-terminated string.
    ///
    /// At most `max_len` bytes are accepted before the terminator; with `None`
    /// the search runs to the end of the view. The cursor is left just past
    /// the terminator, or untouched on failure.
    pub fn read_cstring(&mut self, max_len: Option<usize>) -> Result<String> {
        let window = match max_len {
            Some(max) => (max as u64 + 1).min(self.remaining()),
            None => self.remaining(),
        } as usize;

        let mut probe = self.clone();
        let mut collected = Vec::new();
        let mut chunk = [0u8; SCAN_CHUNK];

        while collected.len() < window {
            let n = SCAN_CHUNK.min(window - collected.len());
            probe.read_into(&mut chunk[..n])?;
            if let Some(nul) = memchr::memchr(0, &chunk[..n]) {
                collected.extend_from_slice(&chunk[..nul]);
                self.position += collected.len() + 1;
                return Ok(String::from_utf8_lossy(&collected).into_owned());
            }
            collected.extend_from_slice(&chunk[..n]);
        }

        Err(Error::InvalidEncoding {
            position: self.position(),
            reason: "no string terminator within the allowed window",
        })
    }

    /// Read a fixed-size string field, stopping at the first NUL.
    pub fn read_fixed_string(&mut self, size: usize) -> Result<String> {
        let bytes = self.read_bytes(size)?;
        let end = memchr::memchr(0, &bytes).unwrap_or(size);
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Read a string preceded by a `width`-byte length.
    ///
    /// Trailing NULs inside the counted region are dropped.
    pub fn read_prefixed_string(&mut self, width: usize, endian: Endian) -> Result<String> {
        let start = self.position;
        let len = self.read_uint(width, endian)?;
        if len > self.remaining() {
            let available = self.remaining();
            self.position = start;
            return Err(Error::OutOfBounds {
                position: start as u64 + width as u64,
                needed: len,
                available,
            });
        }
        let bytes = self.read_bytes(len as usize)?;
        let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Read a struct using zerocopy.
    ///
    /// The struct must implement `FromBytes`; fields keep their in-memory
    /// (native) layout, so prefer zerocopy's byteorder types for portable
    /// multi-byte fields.
    pub fn read_struct<T: FromBytes>(&mut self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let bytes = self.read_bytes(size)?;
        T::read_from_bytes(&bytes).map_err(|_| Error::OutOfBounds {
            position: (self.position - size) as u64,
            needed: size as u64,
            available: bytes.len() as u64,
        })
    }

    /// Read `magic.len()` bytes and compare them with `magic`.
    pub fn matches_magic(&mut self, magic: &[u8]) -> Result<bool> {
        let actual = self.read_bytes(magic.len())?;
        Ok(actual == magic)
    }

    #[inline]
    fn ensure(&self, needed: u64) -> Result<()> {
        let available = self.remaining();
        if needed > available {
            return Err(Error::OutOfBounds {
                position: self.position(),
                needed,
                available,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteSource")
            .field("base", &self.base)
            .field("len", &self.len)
            .field("position", &self.position)
            .field("layers", &self.layers.len())
            .finish()
    }
}
