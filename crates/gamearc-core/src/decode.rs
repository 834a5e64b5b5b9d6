//! Directory decoding.
//!
//! [`DirectoryDecoder`] executes a descriptor against a stream:
//!
//! 1. the header program fills [`Slot`]s,
//! 2. records are read from the directory (fixed count or until a terminator),
//! 3. name references are resolved against the name table in a second pass,
//! 4. every offset, length and name goes through the [`FieldValidator`].
//!
//! Lengths that are not stored stay zero; [`EntryResolver`](crate::EntryResolver)
//! fills them in afterwards.

use gamearc_common::{ByteSource, ByteTransform};
use tracing::debug;

use crate::descriptor::{
    Anchor, Count, DecoderRule, DirectoryShape, FormatDescriptor, HeaderOp, NameEncoding,
    OffsetBase, OffsetRule, RecordLayout, RecordOp, Scope, Slot, Terminator, TransformSpec,
};
use crate::entry::{Entry, PropertyValue, SourceFile};
use crate::error::{DecodeError, DecodeErrorKind, DecodeStep, ValidationError};
use crate::validate::FieldValidator;

/// Where the entries' bytes live and how large that file is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeTarget {
    pub data_size: u64,
    pub data_file: SourceFile,
}

impl DecodeTarget {
    /// Data lives in the decoded stream itself.
    pub fn primary(data_size: u64) -> Self {
        Self {
            data_size,
            data_file: SourceFile::Primary,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct HeaderValues([Option<u64>; Slot::COUNT]);

impl HeaderValues {
    #[inline]
    fn get(&self, slot: Slot) -> Option<u64> {
        self.0[slot.index()]
    }

    #[inline]
    fn set(&mut self, slot: Slot, value: u64) {
        self.0[slot.index()] = Some(value);
    }

    #[inline]
    fn require(&self, slot: Slot) -> Result<u64, DecodeErrorKind> {
        self.get(slot).ok_or(DecodeErrorKind::MissingHeaderValue(slot))
    }
}

#[derive(Debug)]
enum RawName {
    None,
    Inline(String),
    Ref(u64),
}

/// A record as stored, before bases, units and validation are applied.
#[derive(Debug)]
struct RawRecord {
    position: u64,
    offset: Option<u64>,
    length: Option<u64>,
    end: Option<u64>,
    decompressed: Option<u64>,
    name: RawName,
    flag: u64,
    properties: Vec<(&'static str, u64)>,
}

impl RawRecord {
    fn new(position: u64) -> Self {
        Self {
            position,
            offset: None,
            length: None,
            end: None,
            decompressed: None,
            name: RawName::None,
            flag: 0,
            properties: Vec::new(),
        }
    }
}

/// Turns a descriptor plus a stream into an ordered entry list.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryDecoder {
    validator: FieldValidator,
}

impl DirectoryDecoder {
    pub const fn new(validator: FieldValidator) -> Self {
        Self { validator }
    }

    /// Decode a self-contained archive.
    pub fn decode(
        &self,
        source: &ByteSource,
        descriptor: &FormatDescriptor,
    ) -> Result<Vec<Entry>, DecodeError> {
        self.decode_into(source, descriptor, &DecodeTarget::primary(source.len()))
    }

    /// Decode a directory whose entries point into `target`.
    ///
    /// The source is not modified; decoding runs on private cursors.
    pub fn decode_into(
        &self,
        source: &ByteSource,
        descriptor: &FormatDescriptor,
        target: &DecodeTarget,
    ) -> Result<Vec<Entry>, DecodeError> {
        descriptor.check().map_err(|reason| {
            DecodeError::new(
                DecodeStep::Descriptor,
                0,
                DecodeErrorKind::InvalidDescriptor(reason),
            )
        })?;

        let mut stream = source.clone();
        stream
            .seek(0)
            .map_err(|e| DecodeError::new(DecodeStep::Header, 0, e))?;
        if let Some(spec) = descriptor.obfuscation_for(Scope::Whole) {
            stream = stream.with_transform(build_transform(spec, &HeaderValues::default(), DecodeStep::Header, 0)?);
        }

        let (values, header_end) = self.run_header(&stream, descriptor)?;

        let dir = &descriptor.directory;
        let dir_start = self
            .anchor(dir.at, &values, header_end, stream.len())
            .map_err(|kind| DecodeError::new(DecodeStep::Directory, header_end, kind))?;

        let mut cursor = stream.clone();
        cursor
            .seek(dir_start)
            .map_err(|e| DecodeError::new(DecodeStep::Directory, dir_start, e))?;
        if let Some(spec) = descriptor.obfuscation_for(Scope::Directory) {
            cursor = cursor.with_transform(build_transform(spec, &values, DecodeStep::Directory, dir_start)?);
        }

        if let Some(size) = values.get(Slot::DirectorySize) {
            self.validator
                .check_length(size, stream.len() - dir_start)
                .map_err(|e| DecodeError::new(DecodeStep::Directory, dir_start, e))?;
        }

        let inline_names = match (descriptor.obfuscation_for(Scope::Names), &dir.names) {
            (Some(spec), None) => Some(build_transform(spec, &values, DecodeStep::Directory, dir_start)?),
            _ => None,
        };

        let mut records = self.read_records(&mut cursor, descriptor, &values, dir_start, inline_names.as_ref())?;
        let directory_end = cursor.position();

        let discard = descriptor.resolution.discard_trailing.min(records.len());
        records.truncate(records.len() - discard);

        self.resolve_names(&stream, descriptor, &values, directory_end, &mut records)?;

        let entries = self.build_entries(descriptor, &values, directory_end, records, target)?;
        debug!(
            format = descriptor.name,
            entries = entries.len(),
            directory_start = dir_start,
            directory_end,
            "decoded directory"
        );
        Ok(entries)
    }

    fn run_header(
        &self,
        stream: &ByteSource,
        descriptor: &FormatDescriptor,
    ) -> Result<(HeaderValues, u64), DecodeError> {
        let mut values = HeaderValues::default();
        let mut src = match descriptor.obfuscation_for(Scope::Header) {
            Some(spec) => stream.with_transform(build_transform(spec, &values, DecodeStep::Header, 0)?),
            None => stream.clone(),
        };
        let size = src.len();

        for op in &descriptor.header {
            let at = src.position();
            let fail = |kind: DecodeErrorKind| DecodeError::new(DecodeStep::Header, at, kind);
            match op {
                HeaderOp::Expect(magic) => {
                    let actual = src.read_bytes(magic.len()).map_err(|e| fail(e.into()))?;
                    if actual != *magic {
                        return Err(fail(DecodeErrorKind::BadMagic {
                            expected: magic.clone(),
                            actual,
                        }));
                    }
                }
                HeaderOp::Skip(n) => src.skip(*n).map_err(|e| fail(e.into()))?,
                HeaderOp::Seek(anchor) => {
                    let pos = self.anchor(*anchor, &values, at, size).map_err(fail)?;
                    src.seek(pos).map_err(|e| fail(e.into()))?;
                }
                HeaderOp::Read { field, into, check } => {
                    let value = field.read(&mut src).map_err(|e| fail(e.into()))?;
                    self.validator
                        .check(check, value, size)
                        .map_err(|e| fail(e.into()))?;
                    values.set(*into, value);
                }
            }
        }

        Ok((values, src.position()))
    }

    fn read_records(
        &self,
        cursor: &mut ByteSource,
        descriptor: &FormatDescriptor,
        values: &HeaderValues,
        dir_start: u64,
        inline_names: Option<&ByteTransform>,
    ) -> Result<Vec<RawRecord>, DecodeError> {
        let dir = &descriptor.directory;
        let record = &dir.record;
        let fail = |kind: DecodeErrorKind| DecodeError::new(DecodeStep::Directory, dir_start, kind);

        match dir.shape {
            DirectoryShape::FixedCount { count } => {
                let count = match count {
                    Count::Fixed(n) => n,
                    Count::Slot(slot) => values.require(slot).map_err(fail)?,
                    Count::SlotDiv { slot, record_size } => {
                        values.require(slot).map_err(fail)? / record_size
                    }
                    Count::Field(field) => field.read(cursor).map_err(|e| fail(e.into()))?,
                };
                self.validator
                    .check_num_files(count)
                    .map_err(|e| fail(e.into()))?;

                // The declared table must physically fit before anything is allocated.
                let needed = count.checked_mul(record.min_size()).unwrap_or(u64::MAX);
                self.validator
                    .check_length(needed, cursor.remaining())
                    .map_err(|e| fail(e.into()))?;

                let mut records = Vec::with_capacity(count as usize);
                for index in 0..count as usize {
                    records.push(self.read_record(cursor, record, index, inline_names)?);
                }
                Ok(records)
            }
            DirectoryShape::Streaming { terminator } => {
                let boundary = match terminator {
                    Terminator::Boundary(anchor) => Some(
                        self.anchor(anchor, values, dir_start, cursor.len())
                            .map_err(fail)?,
                    ),
                    _ => None,
                };
                let max = self.validator.limits().max_files;
                let mut records = Vec::new();

                loop {
                    let index = records.len();
                    let start = cursor.position();
                    match terminator {
                        Terminator::Boundary(_) if boundary.is_some_and(|b| start >= b) => break,
                        Terminator::EndOfSource if cursor.remaining() == 0 => break,
                        Terminator::Marker { field, value } => {
                            let mut peek = cursor.clone();
                            let found = field.read(&mut peek).map_err(|e| {
                                DecodeError::new(DecodeStep::Record(index), start, e)
                            })?;
                            if found == value {
                                *cursor = peek;
                                break;
                            }
                        }
                        _ => {}
                    }

                    if index as u64 >= max {
                        return Err(DecodeError::new(
                            DecodeStep::Record(index),
                            start,
                            ValidationError::CountOutOfRange {
                                value: index as u64 + 1,
                                max,
                            },
                        ));
                    }

                    let raw = match self.read_record(cursor, record, index, inline_names) {
                        Ok(raw) => raw,
                        Err(e)
                            if terminator == Terminator::EndOfSource
                                && self.ran_off_end(&e, cursor.len()) =>
                        {
                            cursor
                                .seek(start)
                                .map_err(|e| DecodeError::new(DecodeStep::Record(index), start, e))?;
                            break;
                        }
                        Err(e) => return Err(e),
                    };

                    if terminator == Terminator::ZeroOffset && raw.offset == Some(0) {
                        break;
                    }
                    if cursor.position() <= start {
                        return Err(DecodeError::new(
                            DecodeStep::Record(index),
                            start,
                            DecodeErrorKind::Stalled,
                        ));
                    }
                    records.push(raw);
                }
                Ok(records)
            }
        }
    }

    fn read_record(
        &self,
        cursor: &mut ByteSource,
        layout: &RecordLayout,
        index: usize,
        inline_names: Option<&ByteTransform>,
    ) -> Result<RawRecord, DecodeError> {
        let mut raw = RawRecord::new(cursor.position());

        for op in &layout.ops {
            let at = cursor.position();
            let fail = |kind: DecodeErrorKind| DecodeError::new(DecodeStep::Record(index), at, kind);
            let source_err = |e: gamearc_common::Error| fail(e.into());
            match op {
                RecordOp::Offset(f) => raw.offset = Some(f.read(cursor).map_err(source_err)?),
                RecordOp::Length(f) => raw.length = Some(f.read(cursor).map_err(source_err)?),
                RecordOp::EndOffset(f) => raw.end = Some(f.read(cursor).map_err(source_err)?),
                RecordOp::DecompressedLength(f) => {
                    raw.decompressed = Some(f.read(cursor).map_err(source_err)?)
                }
                RecordOp::Flag(f) => raw.flag = f.read(cursor).map_err(source_err)?,
                RecordOp::Property(name, f) => {
                    let value = f.read(cursor).map_err(source_err)?;
                    raw.properties.push((*name, value));
                }
                RecordOp::Name(encoding) => {
                    raw.name = self
                        .read_inline_name(cursor, *encoding, inline_names)
                        .map_err(fail)?
                }
                RecordOp::Skip(n) => cursor.skip(*n).map_err(source_err)?,
                RecordOp::Align(n) => {
                    let aligned = at.checked_next_multiple_of(*n).unwrap_or(u64::MAX);
                    cursor.seek(aligned.min(cursor.len())).map_err(source_err)?;
                }
            }
        }

        Ok(raw)
    }

    fn read_inline_name(
        &self,
        cursor: &mut ByteSource,
        encoding: NameEncoding,
        transform: Option<&ByteTransform>,
    ) -> Result<RawName, DecodeErrorKind> {
        if let NameEncoding::Ref(field) = encoding {
            return Ok(RawName::Ref(field.read(cursor)?));
        }

        let prefixed_len = match encoding {
            NameEncoding::Prefixed(field) => {
                let len = field.read(cursor)?;
                self.validator.check_filename_length(len)?;
                Some(len as usize)
            }
            _ => None,
        };

        // Each name is keyed from its own first byte.
        let mut src = match transform {
            Some(t) => cursor.with_transform(t.clone()),
            None => cursor.clone(),
        };
        let max = self.validator.limits().max_filename_length;
        let name = match (encoding, prefixed_len) {
            (_, Some(len)) => src.read_fixed_string(len)?,
            (NameEncoding::Fixed(n), _) => src.read_fixed_string(n)?,
            _ => src.read_cstring(Some(max))?,
        };
        cursor.seek(src.position())?;
        Ok(RawName::Inline(name))
    }

    /// Second pass: read names the records point to.
    ///
    /// Uses its own handle on the stream so the record cursor is never moved.
    fn resolve_names(
        &self,
        stream: &ByteSource,
        descriptor: &FormatDescriptor,
        values: &HeaderValues,
        directory_end: u64,
        records: &mut [RawRecord],
    ) -> Result<(), DecodeError> {
        let Some(table) = descriptor.directory.names else {
            return Ok(());
        };

        let size = stream.len();
        let fail = |kind: DecodeErrorKind| DecodeError::new(DecodeStep::Names(0), directory_end, kind);
        let base = self
            .anchor(table.at, values, directory_end, size)
            .map_err(fail)?;
        let table_len = match values.get(Slot::NamesSize) {
            Some(len) => {
                self.validator
                    .check_length(len, size - base)
                    .map_err(|e| fail(e.into()))?;
                len
            }
            None => size - base,
        };
        let mut names = stream.slice(base, table_len).map_err(|e| fail(e.into()))?;
        if let Some(spec) = descriptor.obfuscation_for(Scope::Names) {
            names = names.with_transform(build_transform(spec, values, DecodeStep::Names(0), base)?);
        }

        let max = self.validator.limits().max_filename_length;
        for (index, raw) in records.iter_mut().enumerate() {
            let RawName::Ref(offset) = raw.name else {
                continue;
            };
            let fail = |kind: DecodeErrorKind| {
                DecodeError::new(DecodeStep::Names(index), base.saturating_add(offset), kind)
            };
            self.validator
                .check_offset(offset, table_len)
                .map_err(|e| fail(e.into()))?;
            names.seek(offset).map_err(|e| fail(e.into()))?;
            let name = names.read_cstring(Some(max)).map_err(|e| fail(e.into()))?;
            raw.name = RawName::Inline(name);
        }
        Ok(())
    }

    fn build_entries(
        &self,
        descriptor: &FormatDescriptor,
        values: &HeaderValues,
        directory_end: u64,
        records: Vec<RawRecord>,
        target: &DecodeTarget,
    ) -> Result<Vec<Entry>, DecodeError> {
        let dir = &descriptor.directory;
        let size = target.data_size;
        let overflow = ValidationError::OffsetOutOfRange {
            value: u64::MAX,
            archive_size: size,
        };

        let base_of = |base: OffsetBase| -> Result<u64, DecodeErrorKind> {
            Ok(match base {
                OffsetBase::Absolute => 0,
                OffsetBase::Slot(slot) => values.require(slot)?,
                OffsetBase::DirectoryEnd => directory_end,
                OffsetBase::DirectoryEndPlus(slot) => directory_end
                    .checked_add(values.require(slot)?)
                    .ok_or_else(|| overflow.clone())?,
            })
        };

        let mut next_sequential = match dir.offsets {
            OffsetRule::Sequential { base, .. } => base_of(base)
                .map_err(|kind| DecodeError::new(DecodeStep::Directory, directory_end, kind))?,
            OffsetRule::Stored { .. } => 0,
        };

        let mut entries = Vec::with_capacity(records.len());
        for (index, raw) in records.into_iter().enumerate() {
            let fail = |kind: DecodeErrorKind| DecodeError::new(DecodeStep::Record(index), raw.position, kind);

            let stored_length = raw
                .length
                .map(|len| {
                    len.checked_mul(dir.length_unit)
                        .ok_or(ValidationError::LengthOutOfRange {
                            value: u64::MAX,
                            limit: size,
                        })
                })
                .transpose()
                .map_err(|e| fail(e.into()))?;

            let (offset, end) = match dir.offsets {
                OffsetRule::Stored { base, unit } => {
                    let base = base_of(base).map_err(fail)?;
                    let scale = |v: u64| {
                        v.checked_mul(unit)
                            .and_then(|v| v.checked_add(base))
                            .ok_or_else(|| overflow.clone())
                    };
                    let offset = scale(raw.offset.unwrap_or(0)).map_err(|e| fail(e.into()))?;
                    let end = raw.end.map(scale).transpose().map_err(|e| fail(e.into()))?;
                    (offset, end)
                }
                OffsetRule::Sequential { align, .. } => {
                    let start = next_sequential
                        .checked_next_multiple_of(align)
                        .ok_or_else(|| fail(overflow.clone().into()))?;
                    next_sequential = start
                        .checked_add(stored_length.unwrap_or(0))
                        .ok_or_else(|| fail(overflow.clone().into()))?;
                    (start, None)
                }
            };
            self.validator
                .check_offset(offset, size)
                .map_err(|e| fail(e.into()))?;

            let length = match (stored_length, end) {
                (Some(len), _) => len,
                (None, Some(end)) => end.checked_sub(offset).ok_or_else(|| {
                    fail(ValidationError::LengthOutOfRange { value: end, limit: offset }.into())
                })?,
                (None, None) => 0,
            };
            // Inverted pairs are swapped during resolution; bound the smaller size.
            let stored = match raw.decompressed {
                Some(dl) if descriptor.resolution.swap_if_inverted => length.min(dl),
                _ => length,
            };
            self.validator
                .check_length(stored, size - offset)
                .map_err(|e| fail(e.into()))?;

            if let Some(decompressed) = raw.decompressed {
                self.validator
                    .check_length_sane(decompressed)
                    .map_err(|e| fail(e.into()))?;
            }

            let name = match raw.name {
                RawName::Inline(name) => {
                    self.validator
                        .check_filename(&name)
                        .map_err(|e| fail(e.into()))?;
                    name
                }
                RawName::None | RawName::Ref(_) => match descriptor.default_extension {
                    Some(ext) => format!("entry_{index}.{ext}"),
                    None => format!("entry_{index}"),
                },
            };

            let decoder = match &descriptor.decoder {
                DecoderRule::None => None,
                DecoderRule::Always(d) => Some(d.clone()),
                DecoderRule::WhenFlagSet(d) => (raw.flag != 0).then(|| d.clone()),
                DecoderRule::WhenSizesDiffer(d) => raw
                    .decompressed
                    .is_some_and(|dl| dl != length)
                    .then(|| d.clone()),
            };

            entries.push(Entry {
                name,
                offset,
                length,
                decompressed_length: raw.decompressed,
                decoder,
                source: target.data_file.clone(),
                properties: raw
                    .properties
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), PropertyValue::Int(v)))
                    .collect(),
            });
        }
        Ok(entries)
    }

    /// True if a record failed only because the stream ended inside it.
    fn ran_off_end(&self, error: &DecodeError, len: u64) -> bool {
        match error.kind {
            DecodeErrorKind::Source(gamearc_common::Error::OutOfBounds { .. }) => true,
            // A name scan cut short by the end of the stream, not by the length cap.
            DecodeErrorKind::Source(gamearc_common::Error::InvalidEncoding { .. }) => {
                len.saturating_sub(error.position)
                    <= self.validator.limits().max_filename_length as u64
            }
            _ => false,
        }
    }

    /// Resolve an anchor to an absolute, in-bounds position.
    fn anchor(
        &self,
        anchor: Anchor,
        values: &HeaderValues,
        cursor: u64,
        size: u64,
    ) -> Result<u64, DecodeErrorKind> {
        let position = match anchor {
            Anchor::Start(pos) => pos,
            Anchor::End(back) => size.checked_sub(back).ok_or(ValidationError::OffsetOutOfRange {
                value: back,
                archive_size: size,
            })?,
            Anchor::Slot(slot) => values.require(slot)?,
            Anchor::SlotPlus(slot, delta) => values
                .require(slot)?
                .checked_add(delta)
                .ok_or(ValidationError::OffsetOutOfRange {
                    value: u64::MAX,
                    archive_size: size,
                })?,
            Anchor::Cursor => cursor,
        };
        self.validator.check_offset(position, size)?;
        Ok(position)
    }
}

fn build_transform(
    spec: &TransformSpec,
    values: &HeaderValues,
    step: DecodeStep,
    position: u64,
) -> Result<ByteTransform, DecodeError> {
    spec.build(|slot| values.get(slot)).ok_or_else(|| {
        let slot = match spec {
            TransformSpec::XorFromSlot(slot) => *slot,
            _ => Slot::Key,
        };
        DecodeError::new(step, position, DecodeErrorKind::MissingHeaderValue(slot))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DecoderRef;
    use crate::descriptor::*;
    use crate::testutil::Writer;

    fn decoder() -> DirectoryDecoder {
        DirectoryDecoder::default()
    }

    /// "TBL1", count u32 at 4, then 16-byte records
    /// `{offset:u32, length:u32, nameOffset:u32, pad:u32}`.
    fn fixed_table() -> FormatDescriptor {
        FormatDescriptor::builder("fixed-table")
            .probe(Probe::magic(b"TBL1", 50))
            .header(HeaderOp::expect(b"TBL1"))
            .header(HeaderOp::read(Field::U32_LE, Slot::Count, Check::Count))
            .directory(Directory::new(
                Anchor::Cursor,
                DirectoryShape::FixedCount {
                    count: Count::Slot(Slot::Count),
                },
                RecordLayout::new()
                    .offset(Field::U32_LE)
                    .length(Field::U32_LE)
                    .property("name_offset", Field::U32_LE)
                    .skip(4),
            ))
            .default_extension("bin")
            .build()
    }

    fn fixed_table_bytes() -> Writer {
        Writer::new()
            .bytes(b"TBL1")
            .u32le(3)
            .u32le(56).u32le(10).u32le(0).u32le(0)
            .u32le(66).u32le(20).u32le(5).u32le(0)
            .u32le(86).u32le(14).u32le(9).u32le(0)
            .pad_to(100)
    }

    #[test]
    fn test_fixed_count_table() {
        let entries = decoder()
            .decode(&fixed_table_bytes().source(), &fixed_table())
            .unwrap();

        assert_eq!(entries.len(), 3);
        let fields: Vec<_> = entries.iter().map(|e| (e.offset, e.length)).collect();
        assert_eq!(fields, vec![(56, 10), (66, 20), (86, 14)]);
        assert_eq!(entries[1].name, "entry_1.bin");
        assert_eq!(
            entries[2].properties.get("name_offset"),
            Some(&PropertyValue::Int(9))
        );
        assert!(entries.iter().all(|e| e.source == SourceFile::Primary));
    }

    #[test]
    fn test_decode_is_idempotent() {
        let source = fixed_table_bytes().source();
        let d = fixed_table();
        let first = decoder().decode(&source, &d).unwrap();
        let second = decoder().decode(&source, &d).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_zero_entries() {
        let source = Writer::new().bytes(b"TBL1").u32le(0).source();
        let entries = decoder().decode(&source, &fixed_table()).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_declared_directory_larger_than_file() {
        let source = Writer::new()
            .bytes(b"TBL1")
            .u32le(1000)
            .u32le(0)
            .pad_to(64)
            .source();
        let err = decoder().decode(&source, &fixed_table()).unwrap_err();
        assert_eq!(err.step, DecodeStep::Directory);
        assert!(matches!(
            err.validation(),
            Some(ValidationError::LengthOutOfRange { value: 16000, .. })
        ));
    }

    #[test]
    fn test_count_ceiling() {
        let source = Writer::new().bytes(b"TBL1").u32le(u32::MAX).source();
        let err = decoder().decode(&source, &fixed_table()).unwrap_err();
        assert_eq!(err.step, DecodeStep::Header);
        assert!(matches!(
            err.validation(),
            Some(ValidationError::CountOutOfRange { .. })
        ));
    }

    #[test]
    fn test_bad_magic() {
        let source = Writer::new().bytes(b"NOPE").u32le(0).source();
        let err = decoder().decode(&source, &fixed_table()).unwrap_err();
        assert!(matches!(err.kind, DecodeErrorKind::BadMagic { .. }));
    }

    #[test]
    fn test_offset_past_end_is_fatal() {
        let source = Writer::new()
            .bytes(b"TBL1")
            .u32le(1)
            .u32le(5000).u32le(1).u32le(0).u32le(0)
            .source();
        let err = decoder().decode(&source, &fixed_table()).unwrap_err();
        assert_eq!(err.step, DecodeStep::Record(0));
        assert_eq!(err.position, 8);
        assert!(matches!(
            err.validation(),
            Some(ValidationError::OffsetOutOfRange { value: 5000, .. })
        ));
    }

    fn streaming(terminator: Terminator) -> FormatDescriptor {
        FormatDescriptor::builder("streaming")
            .directory(Directory::new(
                Anchor::Start(0),
                DirectoryShape::Streaming { terminator },
                RecordLayout::new()
                    .offset(Field::U32_LE)
                    .length(Field::U32_LE)
                    .name(NameEncoding::CString),
            ))
            .build()
    }

    #[test]
    fn test_streaming_zero_offset_terminator() {
        // Three real records, then a record whose offset is 0.
        let source = Writer::new()
            .u32le(100).u32le(4).cstr("a.txt")
            .u32le(104).u32le(4).cstr("b.txt")
            .u32le(108).u32le(4).cstr("c.txt")
            .u32le(0).u32le(0).cstr("end")
            .pad_to(112)
            .source();
        let entries = decoder()
            .decode(&source, &streaming(Terminator::ZeroOffset))
            .unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
    }

    #[test]
    fn test_streaming_marker_terminator() {
        let d = FormatDescriptor::builder("marker")
            .directory(Directory::new(
                Anchor::Start(0),
                DirectoryShape::Streaming {
                    terminator: Terminator::Marker {
                        field: Field::U8,
                        value: 0xFF,
                    },
                },
                RecordLayout::new()
                    .name(NameEncoding::Prefixed(Field::U8))
                    .offset(Field::U32_BE)
                    .length(Field::U32_BE),
            ))
            .build();
        let source = Writer::new()
            .u8(3).bytes(b"one").u32be(40).u32be(2)
            .u8(3).bytes(b"two").u32be(42).u32be(2)
            .u8(0xFF)
            .pad_to(44)
            .source();
        let entries = decoder().decode(&source, &d).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].name, "two");
        assert_eq!(entries[1].offset, 42);
    }

    #[test]
    fn test_streaming_end_of_source_drops_partial_record() {
        let d = FormatDescriptor::builder("eos")
            .directory(Directory::new(
                Anchor::Start(0),
                DirectoryShape::Streaming {
                    terminator: Terminator::EndOfSource,
                },
                RecordLayout::new().offset(Field::U32_LE).length(Field::U32_LE),
            ))
            .build();
        let source = Writer::new()
            .u32le(0).u32le(4)
            .u32le(4).u32le(4)
            .bytes(&[1, 2, 3])
            .source();
        let entries = decoder().decode(&source, &d).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_streaming_end_of_source_drops_unterminated_name() {
        let source = Writer::new()
            .u32le(0).u32le(4).cstr("a.txt")
            .u32le(4).u32le(4).bytes(b"b.t")
            .source();
        let entries = decoder()
            .decode(&source, &streaming(Terminator::EndOfSource))
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "a.txt");
    }

    #[test]
    fn test_overlong_name_is_still_fatal() {
        let limits = crate::Limits::default().with_max_filename_length(4);
        let strict = DirectoryDecoder::new(FieldValidator::new(limits));
        let source = Writer::new()
            .u32le(0).u32le(4).bytes(b"far-too-long")
            .pad_to(40)
            .source();
        let err = strict
            .decode(&source, &streaming(Terminator::EndOfSource))
            .unwrap_err();
        assert!(matches!(
            err.kind,
            DecodeErrorKind::Source(gamearc_common::Error::InvalidEncoding { .. })
        ));
    }

    #[test]
    fn test_header_obfuscation() {
        let d = FormatDescriptor::builder("hidden-header")
            .header(HeaderOp::expect(b"HDR1"))
            .header(HeaderOp::read(Field::U32_LE, Slot::Count, Check::Equals(1)))
            .directory(Directory::new(
                Anchor::Cursor,
                DirectoryShape::FixedCount {
                    count: Count::Slot(Slot::Count),
                },
                RecordLayout::new().offset(Field::U32_LE).length(Field::U32_LE),
            ))
            .obfuscate(Scope::Header, TransformSpec::Xor(0x69))
            .build();
        let header = Writer::new().bytes(b"HDR1").u32le(1);
        let source = Writer::new()
            .bytes(&xor_bytes(&header.bytes, 0x69))
            .u32le(16)
            .u32le(4)
            .pad_to(20)
            .source();
        let entries = decoder().decode(&source, &d).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!((entries[0].offset, entries[0].length), (16, 4));
    }

    #[test]
    fn test_entry_running_past_end_is_fatal() {
        let d = FormatDescriptor::builder("overrun")
            .directory(Directory::new(
                Anchor::Start(0),
                DirectoryShape::FixedCount { count: Count::Fixed(1) },
                RecordLayout::new().offset(Field::U32_LE).length(Field::U32_LE),
            ))
            .build();
        let source = Writer::new().u32le(90).u32le(20).pad_to(100).source();
        let err = decoder().decode(&source, &d).unwrap_err();
        assert_eq!(err.step, DecodeStep::Record(0));
        assert!(matches!(
            err.validation(),
            Some(ValidationError::LengthOutOfRange { value: 20, limit: 10 })
        ));
    }

    #[test]
    fn test_boundary_check_allows_inverted_pairs() {
        let d = FormatDescriptor::builder("inverted")
            .directory(Directory::new(
                Anchor::Start(0),
                DirectoryShape::FixedCount { count: Count::Fixed(1) },
                RecordLayout::new()
                    .offset(Field::U32_LE)
                    .length(Field::U32_LE)
                    .decompressed_length(Field::U32_LE),
            ))
            .resolution(Resolution::default().swap_if_inverted())
            .build();
        // Stored length and decompressed length are swapped on disk.
        let source = Writer::new().u32le(12).u32le(500).u32le(8).pad_to(20).source();
        let entries = decoder().decode(&source, &d).unwrap();
        assert_eq!(entries[0].length, 500);
        assert_eq!(entries[0].decompressed_length, Some(8));
    }

    #[test]
    fn test_streaming_boundary_terminator() {
        let d = FormatDescriptor::builder("bounded")
            .header(HeaderOp::read(Field::U32_LE, Slot::DirectorySize, Check::Length))
            .directory(Directory::new(
                Anchor::Cursor,
                DirectoryShape::Streaming {
                    terminator: Terminator::Boundary(Anchor::SlotPlus(Slot::DirectorySize, 4)),
                },
                RecordLayout::new().offset(Field::U32_LE).length(Field::U32_LE),
            ))
            .build();
        // Directory of 16 bytes (two records), followed by data that would
        // parse as more records if the boundary were ignored.
        let source = Writer::new()
            .u32le(16)
            .u32le(20).u32le(2)
            .u32le(22).u32le(2)
            .u32le(1).u32le(1)
            .source();
        let entries = decoder().decode(&source, &d).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_streaming_respects_file_ceiling() {
        let d = streaming(Terminator::EndOfSource);
        let mut w = Writer::new();
        for i in 0..10u32 {
            w = w.u32le(i).u32le(0).cstr("x");
        }
        let source = w.source();
        let strict = DirectoryDecoder::new(FieldValidator::new(
            crate::Limits::default().with_max_files(5),
        ));
        let err = strict.decode(&source, &d).unwrap_err();
        assert!(matches!(
            err.validation(),
            Some(ValidationError::CountOutOfRange { value: 6, max: 5 })
        ));
    }

    /// PFS0-like: records carry a name-table offset; data follows the table.
    fn two_pass() -> FormatDescriptor {
        FormatDescriptor::builder("two-pass")
            .header(HeaderOp::expect(b"PFS0"))
            .header(HeaderOp::read(Field::U32_LE, Slot::Count, Check::Count))
            .header(HeaderOp::read(Field::U32_LE, Slot::NamesSize, Check::Length))
            .header(HeaderOp::Skip(4))
            .directory(
                Directory::new(
                    Anchor::Cursor,
                    DirectoryShape::FixedCount {
                        count: Count::Slot(Slot::Count),
                    },
                    RecordLayout::new()
                        .offset(Field::U64_LE)
                        .length(Field::U64_LE)
                        .name(NameEncoding::Ref(Field::U32_LE))
                        .skip(4),
                )
                .names(Anchor::Cursor)
                .offsets(OffsetRule::Stored {
                    base: OffsetBase::DirectoryEndPlus(Slot::NamesSize),
                    unit: 1,
                }),
            )
            .build()
    }

    #[test]
    fn test_two_pass_name_table() {
        let names = b"main\0main.npdm\0\0";
        let source = Writer::new()
            .bytes(b"PFS0")
            .u32le(2)
            .u32le(names.len() as u32)
            .u32le(0)
            .u64le(0).u64le(3).u32le(5).u32le(0)
            .u64le(3).u64le(2).u32le(0).u32le(0)
            .bytes(names)
            .bytes(&[1, 2, 3, 4, 5])
            .source();
        let entries = decoder().decode(&source, &two_pass()).unwrap();

        let data_base = 0x10 + 2 * 0x18 + names.len() as u64;
        assert_eq!(entries[0].name, "main.npdm");
        assert_eq!(entries[0].offset, data_base);
        assert_eq!(entries[1].name, "main");
        assert_eq!(entries[1].offset, data_base + 3);
        assert_eq!(entries[1].length, 2);
    }

    #[test]
    fn test_two_pass_bad_name_offset() {
        let source = Writer::new()
            .bytes(b"PFS0")
            .u32le(1)
            .u32le(4)
            .u32le(0)
            .u64le(0).u64le(0).u32le(99).u32le(0)
            .bytes(b"abc\0")
            .source();
        let err = decoder().decode(&source, &two_pass()).unwrap_err();
        assert_eq!(err.step, DecodeStep::Names(0));
    }

    fn xor_bytes(data: &[u8], key: u8) -> Vec<u8> {
        data.iter().map(|b| b ^ key).collect()
    }

    #[test]
    fn test_obfuscated_directory_matches_plain() {
        let plain = fixed_table_bytes();
        let mut obfuscated = plain.bytes.clone();
        // Records start at 8 and span 48 bytes.
        let scrambled = xor_bytes(&obfuscated[8..56], 0x69);
        obfuscated[8..56].copy_from_slice(&scrambled);

        let mut d = fixed_table();
        let expected = decoder().decode(&plain.source(), &d).unwrap();

        d.obfuscation.push(Obfuscation {
            scope: Scope::Directory,
            transform: TransformSpec::Xor(0x69),
        });
        let actual = decoder()
            .decode(&ByteSource::from_vec(obfuscated), &d)
            .unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_whole_stream_obfuscation() {
        let plain = fixed_table_bytes();
        let d = fixed_table();
        let expected = decoder().decode(&plain.clone().source(), &d).unwrap();

        let whole = FormatDescriptor {
            obfuscation: vec![Obfuscation {
                scope: Scope::Whole,
                transform: TransformSpec::Xor(0x69),
            }],
            ..d
        };
        let source = ByteSource::from_vec(xor_bytes(&plain.bytes, 0x69));
        assert_eq!(decoder().decode(&source, &whole).unwrap(), expected);
    }

    #[test]
    fn test_header_keyed_name_obfuscation() {
        let d = FormatDescriptor::builder("keyed")
            .header(HeaderOp::read(Field::U8, Slot::Key, Check::Any))
            .header(HeaderOp::read(Field::U8, Slot::Count, Check::Count))
            .directory(Directory::new(
                Anchor::Cursor,
                DirectoryShape::FixedCount {
                    count: Count::Slot(Slot::Count),
                },
                RecordLayout::new()
                    .name(NameEncoding::Fixed(8))
                    .offset(Field::U16_LE)
                    .length(Field::U16_LE),
            ))
            .obfuscate(Scope::Names, TransformSpec::XorFromSlot(Slot::Key))
            .build();
        let mut name = [0u8; 8];
        name[..5].copy_from_slice(b"a.wav");
        let source = Writer::new()
            .u8(0x5A)
            .u8(1)
            .bytes(&xor_bytes(&name, 0x5A))
            .u16le(14)
            .u16le(2)
            .pad_to(16)
            .source();
        let entries = decoder().decode(&source, &d).unwrap();
        assert_eq!(entries[0].name, "a.wav");
        assert_eq!(entries[0].offset, 14);
    }

    #[test]
    fn test_sector_units_and_data_base() {
        let d = FormatDescriptor::builder("sectors")
            .header(HeaderOp::read(Field::U32_LE, Slot::Count, Check::Count))
            .directory(
                Directory::new(
                    Anchor::Cursor,
                    DirectoryShape::FixedCount {
                        count: Count::Slot(Slot::Count),
                    },
                    RecordLayout::new().offset(Field::U16_LE).length(Field::U16_LE),
                )
                .offsets(OffsetRule::Stored {
                    base: OffsetBase::Absolute,
                    unit: 2048,
                })
                .length_unit(2048),
            )
            .build();
        let source = Writer::new()
            .u32le(2)
            .u16le(1).u16le(1)
            .u16le(2).u16le(2)
            .pad_to(4 * 2048)
            .source();
        let entries = decoder().decode(&source, &d).unwrap();
        assert_eq!((entries[0].offset, entries[0].length), (2048, 2048));
        assert_eq!((entries[1].offset, entries[1].length), (4096, 4096));
    }

    #[test]
    fn test_sequential_offsets() {
        // Build GRP: magic, count, {name[12], size}, then packed data.
        let d = FormatDescriptor::builder("grp")
            .header(HeaderOp::expect(b"KenSilverman"))
            .header(HeaderOp::read(Field::U32_LE, Slot::Count, Check::Count))
            .directory(
                Directory::new(
                    Anchor::Cursor,
                    DirectoryShape::FixedCount {
                        count: Count::Slot(Slot::Count),
                    },
                    RecordLayout::new()
                        .name(NameEncoding::Fixed(12))
                        .length(Field::U32_LE),
                )
                .offsets(OffsetRule::Sequential {
                    base: OffsetBase::DirectoryEnd,
                    align: 1,
                }),
            )
            .resolution(Resolution::default().allow_empty())
            .build();
        let source = Writer::new()
            .bytes(b"KenSilverman")
            .u32le(3)
            .fixed("GAME.CON", 12).u32le(5)
            .fixed("EMPTY.TXT", 12).u32le(0)
            .fixed("TILES000.ART", 12).u32le(7)
            .pad_to(16 + 48 + 12)
            .source();
        let entries = decoder().decode(&source, &d).unwrap();
        let spans: Vec<_> = entries.iter().map(|e| (e.offset, e.length)).collect();
        assert_eq!(spans, vec![(64, 5), (69, 0), (69, 7)]);
        assert_eq!(entries[2].name, "TILES000.ART");
    }

    #[test]
    fn test_end_offset_field() {
        let d = FormatDescriptor::builder("ends")
            .directory(Directory::new(
                Anchor::Start(0),
                DirectoryShape::FixedCount { count: Count::Fixed(2) },
                RecordLayout::new().offset(Field::U32_LE).end_offset(Field::U32_LE),
            ))
            .build();
        let source = Writer::new()
            .u32le(16).u32le(20)
            .u32le(20).u32le(18)
            .pad_to(24)
            .source();
        let err = decoder().decode(&source, &d).unwrap_err();
        assert_eq!(err.step, DecodeStep::Record(1));

        let source = Writer::new()
            .u32le(16).u32le(20)
            .u32le(20).u32le(24)
            .pad_to(24)
            .source();
        let entries = decoder().decode(&source, &d).unwrap();
        assert_eq!(entries[1].length, 4);
    }

    #[test]
    fn test_decoder_rules() {
        let layout = RecordLayout::new()
            .offset(Field::U32_LE)
            .length(Field::U32_LE)
            .decompressed_length(Field::U32_LE)
            .flag(Field::U8);
        let base = FormatDescriptor::builder("codec").directory(Directory::new(
            Anchor::Start(0),
            DirectoryShape::FixedCount { count: Count::Fixed(2) },
            layout,
        ));
        let source = Writer::new()
            .u32le(26).u32le(3).u32le(3).u8(0)
            .u32le(29).u32le(3).u32le(9).u8(1)
            .pad_to(32)
            .source();

        let by_flag = base
            .clone()
            .decoder(DecoderRule::WhenFlagSet(DecoderRef::Zlib))
            .build();
        let entries = decoder().decode(&source, &by_flag).unwrap();
        assert_eq!(entries[0].decoder, None);
        assert_eq!(entries[1].decoder, Some(DecoderRef::Zlib));
        assert_eq!(entries[1].decompressed_length, Some(9));

        let by_size = base
            .decoder(DecoderRule::WhenSizesDiffer(DecoderRef::Deflate))
            .build();
        let entries = decoder().decode(&source, &by_size).unwrap();
        assert_eq!(entries[0].decoder, None);
        assert_eq!(entries[1].decoder, Some(DecoderRef::Deflate));
    }

    #[test]
    fn test_discard_trailing_garbage() {
        let mut d = fixed_table();
        d.resolution = Resolution::default().discard_trailing(1);
        let source = Writer::new()
            .bytes(b"TBL1")
            .u32le(2)
            .u32le(40).u32le(4).u32le(0).u32le(0)
            .u32le(0xFFFF_FFFF).u32le(0xFFFF_FFFF).u32le(0).u32le(0)
            .pad_to(44)
            .source();
        let entries = decoder().decode(&source, &d).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_split_target_bounds() {
        let source = fixed_table_bytes().source();
        let target = DecodeTarget {
            data_size: 1 << 20,
            data_file: SourceFile::Companion("data.bin".into()),
        };
        let entries = decoder()
            .decode_into(&source, &fixed_table(), &target)
            .unwrap();
        assert!(entries
            .iter()
            .all(|e| e.source == SourceFile::Companion("data.bin".into())));

        let tiny = DecodeTarget {
            data_size: 60,
            data_file: SourceFile::Primary,
        };
        assert!(decoder()
            .decode_into(&source, &fixed_table(), &tiny)
            .is_err());
    }

    #[test]
    fn test_invalid_descriptor_rejected() {
        let d = FormatDescriptor::builder("no-length")
            .directory(Directory::new(
                Anchor::Start(0),
                DirectoryShape::FixedCount { count: Count::Fixed(1) },
                RecordLayout::new().offset(Field::U32_LE),
            ))
            .build();
        let err = decoder()
            .decode(&ByteSource::from_vec(vec![0; 8]), &d)
            .unwrap_err();
        assert_eq!(err.step, DecodeStep::Descriptor);
    }
}
