//! Entry boundary resolution.
//!
//! Fills in lengths the directory does not store, applies per-format quirks,
//! and re-validates every entry against the data size. Entries keep the order
//! the decoder produced; sorting only ever happens on an index.

use crate::descriptor::{Resolution, ResolutionPolicy};
use crate::entry::Entry;
use crate::error::{DecodeError, DecodeErrorKind, DecodeStep, ValidationError};
use crate::validate::FieldValidator;

#[derive(Debug, Clone, Copy, Default)]
pub struct EntryResolver {
    validator: FieldValidator,
}

impl EntryResolver {
    pub const fn new(validator: FieldValidator) -> Self {
        Self { validator }
    }

    /// Resolve `entries` in place order against a data file of `archive_size` bytes.
    pub fn resolve(
        &self,
        mut entries: Vec<Entry>,
        resolution: &Resolution,
        archive_size: u64,
    ) -> Result<Vec<Entry>, DecodeError> {
        match resolution.policy {
            ResolutionPolicy::Explicit => {}
            ResolutionPolicy::SortDiff { header_overhead } => {
                fill_from_neighbours(&mut entries, archive_size, |offset, next| {
                    let gap = next.map_or(archive_size, |n| n) - offset;
                    let length = match next {
                        Some(_) => gap.checked_sub(header_overhead),
                        None => Some(gap),
                    };
                    length.map(|len| (offset, len)).ok_or(ValidationError::LengthOutOfRange {
                        value: header_overhead,
                        limit: gap,
                    })
                })?;
            }
            ResolutionPolicy::PaddingAware {
                header_overhead,
                alignment,
            } => {
                fill_from_neighbours(&mut entries, archive_size, |offset, next| {
                    let end = next.unwrap_or(archive_size);
                    let start = offset
                        .checked_add(header_overhead)
                        .and_then(|v| v.checked_next_multiple_of(alignment));
                    match start {
                        Some(start) if start <= end => Ok((start, end - start)),
                        _ => Err(ValidationError::LengthOutOfRange {
                            value: start.unwrap_or(u64::MAX) - offset,
                            limit: end - offset,
                        }),
                    }
                })?;
            }
            ResolutionPolicy::EndOfArchive => {
                // Entries at the highest offset alias each other.
                if let Some((index, highest)) = entries
                    .iter()
                    .enumerate()
                    .max_by_key(|&(i, e)| (e.offset, std::cmp::Reverse(i)))
                    .map(|(i, e)| (i, e.offset))
                {
                    let length = archive_size.checked_sub(highest).ok_or_else(|| {
                        DecodeError::new(
                            DecodeStep::Resolve(index),
                            highest,
                            ValidationError::OffsetOutOfRange {
                                value: highest,
                                archive_size,
                            },
                        )
                    })?;
                    for entry in entries.iter_mut().filter(|e| e.offset == highest) {
                        entry.length = length;
                    }
                }
            }
        }

        for (index, entry) in entries.iter_mut().enumerate() {
            if resolution.swap_if_inverted {
                if let Some(decompressed) = entry.decompressed_length {
                    if decompressed < entry.length {
                        entry.decompressed_length = Some(entry.length);
                        entry.length = decompressed;
                    }
                }
            }

            if let Some(decoder) = &entry.decoder {
                if entry.decompressed_length.is_none() {
                    if !decoder.preserves_size() {
                        return Err(DecodeError::new(
                            DecodeStep::Resolve(index),
                            entry.offset,
                            DecodeErrorKind::MissingDecompressedLength,
                        ));
                    }
                    entry.decompressed_length = Some(entry.length);
                }
            }

            self.validate(index, entry, resolution, archive_size)?;
        }

        Ok(entries)
    }

    fn validate(
        &self,
        index: usize,
        entry: &Entry,
        resolution: &Resolution,
        archive_size: u64,
    ) -> Result<(), DecodeError> {
        let fail = |kind: DecodeErrorKind| DecodeError::new(DecodeStep::Resolve(index), entry.offset, kind);

        self.validator
            .check_offset(entry.offset, archive_size)
            .map_err(|e| fail(e.into()))?;
        self.validator
            .check_length(entry.length, archive_size - entry.offset)
            .map_err(|e| fail(e.into()))?;
        if entry.length == 0 && !resolution.allow_empty {
            return Err(fail(DecodeErrorKind::UnresolvedLength));
        }
        Ok(())
    }
}

/// Walk entries in offset order and let `span` compute each entry's data start
/// and length from its offset and the next strictly greater offset (`None` for
/// the highest group). Results are written back by index.
fn fill_from_neighbours(
    entries: &mut [Entry],
    archive_size: u64,
    span: impl Fn(u64, Option<u64>) -> Result<(u64, u64), ValidationError>,
) -> Result<(), DecodeError> {
    let mut order: Vec<usize> = (0..entries.len()).collect();
    order.sort_by_key(|&i| entries[i].offset);

    let mut next = None;
    let mut end = order.len();
    while end > 0 {
        let offset = entries[order[end - 1]].offset;
        let start = order[..end]
            .iter()
            .rposition(|&i| entries[i].offset != offset)
            .map_or(0, |p| p + 1);

        for &index in &order[start..end] {
            let fail = |e: ValidationError| {
                DecodeError::new(DecodeStep::Resolve(index), offset, e)
            };
            if offset > archive_size {
                return Err(fail(ValidationError::OffsetOutOfRange {
                    value: offset,
                    archive_size,
                }));
            }
            let (data_start, length) = span(offset, next).map_err(fail)?;
            entries[index].offset = data_start;
            entries[index].length = length;
        }

        next = Some(offset);
        end = start;
    }
    Ok(())
}
