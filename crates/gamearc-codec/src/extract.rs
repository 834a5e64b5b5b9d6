//! Reading entry bytes out of archives.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use gamearc_common::ByteSource;
use gamearc_core::{Entry, SourceFile};
use tracing::debug;

use crate::decompress::{decode_all, decoder_for};
use crate::{Error, Result};

/// Read and decode one entry from the source that holds its bytes.
pub fn extract(source: &ByteSource, entry: &Entry) -> Result<Vec<u8>> {
    let mut view = source.slice(entry.offset, entry.length)?;
    let raw = view.read_bytes(entry.length as usize)?;
    match decoder_for(entry)? {
        None => Ok(raw),
        Some(decoder) => decode_all(&entry.name, decoder.as_ref(), &raw),
    }
}

/// Holds every file a listing's entries point into.
///
/// Sources are opened once up front, so reads take `&self` and can run in
/// parallel.
#[derive(Debug)]
pub struct Extractor {
    archive: PathBuf,
    primary: ByteSource,
    companions: HashMap<PathBuf, ByteSource>,
}

impl Extractor {
    /// Open `archive` and the companion files referenced by `entries`.
    pub fn open<P: AsRef<Path>>(archive: P, entries: &[Entry]) -> Result<Self> {
        let archive = archive.as_ref().to_path_buf();
        let primary = ByteSource::open(&archive)?;

        let mut companions = HashMap::new();
        for entry in entries {
            if let SourceFile::Companion(path) = &entry.source {
                if !companions.contains_key(path) {
                    companions.insert(path.clone(), ByteSource::open(path)?);
                }
            }
        }

        Ok(Self {
            archive,
            primary,
            companions,
        })
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }

    fn source_for(&self, entry: &Entry) -> Result<&ByteSource> {
        match &entry.source {
            SourceFile::Primary => Ok(&self.primary),
            SourceFile::Companion(path) => self.companions.get(path).ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("companion file not opened: {}", path.display()),
                ))
            }),
        }
    }

    /// Read entry contents, decoded.
    pub fn read(&self, entry: &Entry) -> Result<Vec<u8>> {
        extract(self.source_for(entry)?, entry)
    }

    /// Write an entry below `output_dir`, returning the written path.
    pub fn extract_to(&self, entry: &Entry, output_dir: &Path) -> Result<PathBuf> {
        let data = self.read(entry)?;
        let path = output_dir.join(entry.output_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &data)?;
        debug!(entry = %entry.name, bytes = data.len(), path = %path.display(), "extracted");
        Ok(path)
    }
}
