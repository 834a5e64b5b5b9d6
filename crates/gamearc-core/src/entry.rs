//! Archive entry.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::codec::DecoderRef;

/// Which file holds an entry's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SourceFile {
    /// The file that was opened.
    Primary,
    /// A companion file of a split archive.
    Companion(PathBuf),
}

impl SourceFile {
    /// Resolve against the path of the opened archive.
    pub fn resolve<'a>(&'a self, archive: &'a Path) -> &'a Path {
        match self {
            SourceFile::Primary => archive,
            SourceFile::Companion(path) => path,
        }
    }
}

/// Format-specific side metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(untagged))]
pub enum PropertyValue {
    Int(u64),
    Text(String),
}

/// One logical file inside an archive.
///
/// This is metadata only; the bytes stay in [`source`](Self::source) until an
/// extraction layer reads them.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Entry {
    /// File name/path within the archive. Synthesized when not stored.
    pub name: String,
    /// Absolute position of the first data byte in `source`.
    pub offset: u64,
    /// Stored (possibly compressed) length. Zero until resolved.
    pub length: u64,
    /// Length after decoding, when known.
    pub decompressed_length: Option<u64>,
    /// Transform to run at extraction time. `None` means raw passthrough.
    pub decoder: Option<DecoderRef>,
    pub source: SourceFile,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Entry {
    /// Create an entry stored raw in the primary file.
    pub fn new(name: impl Into<String>, offset: u64, length: u64) -> Self {
        Self {
            name: name.into(),
            offset,
            length,
            decompressed_length: None,
            decoder: None,
            source: SourceFile::Primary,
            properties: BTreeMap::new(),
        }
    }

    /// One past the last data byte.
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }

    /// Check if a decoder must run before the bytes are usable.
    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.decoder.is_some()
    }

    /// Size of the usable output.
    #[inline]
    pub fn output_length(&self) -> u64 {
        self.decompressed_length.unwrap_or(self.length)
    }

    /// Get the relative output path for extraction.
    ///
    /// Converts Windows path separators and drops leading separators and
    /// parent components so the result stays inside the output directory.
    pub fn output_path(&self) -> PathBuf {
        self.name
            .replace('\\', "/")
            .split('/')
            .filter(|part| !part.is_empty() && *part != "." && *part != "..")
            .collect()
    }

    /// Get the file extension, if any.
    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_normalization() {
        let entry = Entry::new(r"maps\e1m1.bsp", 0, 1);
        assert_eq!(entry.output_path(), PathBuf::from("maps/e1m1.bsp"));

        let entry = Entry::new("/../../etc/passwd", 0, 1);
        assert_eq!(entry.output_path(), PathBuf::from("etc/passwd"));
    }

    #[test]
    fn test_extension() {
        let entry = Entry::new("sound/hit.wav", 0, 1);
        assert_eq!(entry.extension(), Some("wav"));
        assert_eq!(Entry::new("README", 0, 1).extension(), None);
    }

    #[test]
    fn test_sizes() {
        let mut entry = Entry::new("a", 100, 20);
        assert_eq!(entry.end(), 120);
        assert_eq!(entry.output_length(), 20);
        assert!(!entry.is_compressed());

        entry.decoder = Some(DecoderRef::Zlib);
        entry.decompressed_length = Some(64);
        assert!(entry.is_compressed());
        assert_eq!(entry.output_length(), 64);
    }

    #[test]
    fn test_source_resolve() {
        let archive = Path::new("/games/data.idx");
        assert_eq!(SourceFile::Primary.resolve(archive), archive);
        let companion = SourceFile::Companion(PathBuf::from("/games/data.bin"));
        assert_eq!(companion.resolve(archive), Path::new("/games/data.bin"));
    }
}
