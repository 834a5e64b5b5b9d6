//! Descriptor registry and the format-selection loop.
//!
//! A [`Registry`] is built once, then only read. Opening an archive ranks
//! every descriptor by sniffing score and tries them best first; a failed
//! decode means "not this format after all" and the next candidate runs.

use std::path::{Path, PathBuf};

use gamearc_common::ByteSource;
use tracing::{debug, trace};

use crate::decode::{DecodeTarget, DirectoryDecoder};
use crate::descriptor::{FormatDescriptor, SplitLayout};
use crate::entry::{Entry, SourceFile};
use crate::error::{ClosestMatch, Error, Result};
use crate::resolve::EntryResolver;
use crate::sniff::FormatSniffer;
use crate::validate::{FieldValidator, Limits};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// A descriptor that scored above zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Candidate {
    /// Registration index.
    pub index: usize,
    pub name: &'static str,
    pub score: u32,
}

/// The decoded directory of one archive.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Listing {
    pub path: PathBuf,
    pub format: &'static str,
    pub score: u32,
    pub entries: Vec<Entry>,
}

impl Listing {
    /// Sum of stored lengths.
    pub fn total_length(&self) -> u64 {
        self.entries.iter().map(|e| e.length).sum()
    }

    /// Find an entry by exact name.
    pub fn find(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

/// Ordered, read-only table of format descriptors.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    descriptors: Vec<FormatDescriptor>,
    limits: Limits,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Add a descriptor. Registration order breaks score ties.
    pub fn register(&mut self, descriptor: FormatDescriptor) -> Result<()> {
        let name = descriptor.name;
        descriptor
            .check()
            .map_err(|reason| Error::InvalidDescriptor { name, reason })?;
        if self.get(name).is_some() {
            return Err(Error::InvalidDescriptor {
                name,
                reason: "a descriptor with this name is already registered",
            });
        }
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// Look up a descriptor by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&FormatDescriptor> {
        self.descriptors
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }

    pub fn descriptors(&self) -> &[FormatDescriptor] {
        &self.descriptors
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    fn validator(&self) -> FieldValidator {
        FieldValidator::new(self.limits)
    }

    /// Score every descriptor against `source`, best first.
    ///
    /// Zero scores are dropped. Equal scores keep registration order.
    pub fn rank(&self, source: &ByteSource, path: Option<&Path>) -> Vec<Candidate> {
        let sniffer = FormatSniffer::new(self.validator());
        self.rank_by(|d| sniffer.score_path(source, d, path))
    }

    fn rank_by<F>(&self, score: F) -> Vec<Candidate>
    where
        F: Fn(&FormatDescriptor) -> u32 + Send + Sync,
    {
        #[cfg(feature = "parallel")]
        let scores: Vec<u32> = self.descriptors.par_iter().map(&score).collect();
        #[cfg(not(feature = "parallel"))]
        let scores: Vec<u32> = self.descriptors.iter().map(&score).collect();

        let mut candidates: Vec<Candidate> = scores
            .into_iter()
            .enumerate()
            .filter(|&(_, score)| score > 0)
            .map(|(index, score)| Candidate {
                index,
                name: self.descriptors[index].name,
                score,
            })
            .collect();
        candidates.sort_by(|a, b| b.score.cmp(&a.score));
        candidates
    }

    /// The highest-ranked candidate, if any descriptor scored.
    pub fn best(&self, source: &ByteSource, path: Option<&Path>) -> Option<Candidate> {
        self.rank(source, path).into_iter().next()
    }

    /// Decode and resolve with one specific descriptor.
    pub fn decode_with(
        &self,
        source: &ByteSource,
        descriptor: &FormatDescriptor,
        target: &DecodeTarget,
    ) -> Result<Vec<Entry>> {
        let validator = self.validator();
        let wrap = |source| Error::Decode {
            format: descriptor.name,
            source,
        };
        let entries = DirectoryDecoder::new(validator)
            .decode_into(source, descriptor, target)
            .map_err(wrap)?;
        EntryResolver::new(validator)
            .resolve(entries, &descriptor.resolution, target.data_size)
            .map_err(wrap)
    }

    /// Identify and decode a self-contained archive held in `source`.
    ///
    /// Split descriptors need companion files and are skipped; use
    /// [`open`](Self::open) for those.
    pub fn decode(&self, source: &ByteSource, path: Option<&Path>) -> Result<Listing> {
        let candidates = self.rank(source, path);
        let display = path.map(Path::to_path_buf).unwrap_or_default();
        let target = DecodeTarget::primary(source.len());
        self.attempt(&display, &candidates, |descriptor| {
            if descriptor.split.is_some() {
                return Err(Error::MissingCompanion(display.clone()));
            }
            self.decode_with(source, descriptor, &target)
        })
    }

    /// Identify and decode the archive at `path`.
    ///
    /// The file is mapped for the duration of the call and released on every
    /// exit path.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<Listing> {
        let path = path.as_ref();
        let source = ByteSource::open(path)?;
        let sniffer = FormatSniffer::new(self.validator());

        let candidates = self.rank_by(|d| match d.split {
            // The opened file only holds data; sniff the directory beside it.
            Some(SplitLayout::DirectoryIn { extension }) => find_companion(path, extension)
                .and_then(|p| ByteSource::open(p).ok())
                .map_or(0, |dir| sniffer.score_path(&dir, d, Some(path))),
            _ => sniffer.score_path(&source, d, Some(path)),
        });

        self.attempt(path, &candidates, |descriptor| {
            self.decode_file(path, &source, descriptor)
        })
    }

    /// Decode the archive at `path` with a named descriptor, skipping sniffing.
    pub fn open_as(&self, path: impl AsRef<Path>, format: &str) -> Result<Listing> {
        let path = path.as_ref();
        let descriptor = self
            .get(format)
            .ok_or_else(|| Error::UnknownFormat(format.to_string()))?;
        let source = ByteSource::open(path)?;
        let entries = self.decode_file(path, &source, descriptor)?;
        Ok(Listing {
            path: path.to_path_buf(),
            format: descriptor.name,
            score: 0,
            entries,
        })
    }

    fn decode_file(
        &self,
        path: &Path,
        source: &ByteSource,
        descriptor: &FormatDescriptor,
    ) -> Result<Vec<Entry>> {
        match descriptor.split {
            None => self.decode_with(source, descriptor, &DecodeTarget::primary(source.len())),
            Some(SplitLayout::DataIn { extension }) => {
                let companion = find_companion(path, extension)
                    .ok_or_else(|| Error::MissingCompanion(path.with_extension(extension)))?;
                let target = DecodeTarget {
                    data_size: std::fs::metadata(&companion)?.len(),
                    data_file: SourceFile::Companion(companion),
                };
                self.decode_with(source, descriptor, &target)
            }
            Some(SplitLayout::DirectoryIn { extension }) => {
                let companion = find_companion(path, extension)
                    .ok_or_else(|| Error::MissingCompanion(path.with_extension(extension)))?;
                let directory = ByteSource::open(&companion)?;
                self.decode_with(&directory, descriptor, &DecodeTarget::primary(source.len()))
            }
        }
    }

    /// Try candidates best first until one decodes.
    fn attempt<F>(&self, path: &Path, candidates: &[Candidate], mut decode: F) -> Result<Listing>
    where
        F: FnMut(&FormatDescriptor) -> Result<Vec<Entry>>,
    {
        let mut closest: Option<ClosestMatch> = None;

        for candidate in candidates {
            let descriptor = &self.descriptors[candidate.index];
            trace!(format = candidate.name, score = candidate.score, "trying descriptor");
            match decode(descriptor) {
                Ok(entries) => {
                    debug!(
                        path = %path.display(),
                        format = candidate.name,
                        score = candidate.score,
                        entries = entries.len(),
                        "archive recognized"
                    );
                    return Ok(Listing {
                        path: path.to_path_buf(),
                        format: candidate.name,
                        score: candidate.score,
                        entries,
                    });
                }
                Err(error) => {
                    debug!(
                        path = %path.display(),
                        format = candidate.name,
                        score = candidate.score,
                        %error,
                        "decode attempt failed"
                    );
                    if closest.is_none() {
                        closest = Some(ClosestMatch {
                            format: candidate.name,
                            score: candidate.score,
                            failure: Box::new(error),
                        });
                    }
                }
            }
        }

        Err(Error::NoFormatRecognized {
            path: path.to_path_buf(),
            closest,
        })
    }
}

/// Locate a sibling file with `extension`, trying the given case and upper case.
fn find_companion(path: &Path, extension: &str) -> Option<PathBuf> {
    [extension.to_string(), extension.to_ascii_uppercase()]
        .into_iter()
        .map(|ext| path.with_extension(ext))
        .find(|p| p.is_file())
}
