//! Declarative archive format descriptors.
//!
//! A [`FormatDescriptor`] is plain data: probe steps for sniffing, a header
//! program that fills [`Slot`]s, a [`Directory`] describing where records live
//! and how they are laid out, and a [`Resolution`] for lengths that are not
//! stored. The engine interprets it; there is no per-format code.
//!
//! # Example
//!
//! ```
//! use gamearc_core::descriptor::*;
//!
//! // Quake PAK: "PACK", directory offset, directory size, 64-byte records.
//! let pak = FormatDescriptor::builder("quake-pak")
//!     .extensions(&["pak"], 10)
//!     .probe(Probe::magic(b"PACK", 50))
//!     .header(HeaderOp::expect(b"PACK"))
//!     .header(HeaderOp::read(Field::U32_LE, Slot::DirectoryOffset, Check::Offset))
//!     .header(HeaderOp::read(Field::U32_LE, Slot::DirectorySize, Check::Length))
//!     .directory(Directory::new(
//!         Anchor::Slot(Slot::DirectoryOffset),
//!         DirectoryShape::FixedCount {
//!             count: Count::SlotDiv { slot: Slot::DirectorySize, record_size: 64 },
//!         },
//!         RecordLayout::new()
//!             .name(NameEncoding::Fixed(56))
//!             .offset(Field::U32_LE)
//!             .length(Field::U32_LE),
//!     ))
//!     .build();
//!
//! assert!(pak.check().is_ok());
//! ```

use gamearc_common::{ByteSource, ByteTransform, Endian};

use crate::codec::DecoderRef;

/// Width of an integer field in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    U8 = 1,
    U16 = 2,
    U24 = 3,
    U32 = 4,
    U64 = 8,
}

impl Width {
    #[inline]
    pub const fn bytes(self) -> usize {
        self as usize
    }
}

/// An integer field: width plus explicit byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub width: Width,
    pub endian: Endian,
}

impl Field {
    pub const U8: Field = Field::new(Width::U8, Endian::Little);
    pub const U16_LE: Field = Field::new(Width::U16, Endian::Little);
    pub const U16_BE: Field = Field::new(Width::U16, Endian::Big);
    pub const U24_LE: Field = Field::new(Width::U24, Endian::Little);
    pub const U24_BE: Field = Field::new(Width::U24, Endian::Big);
    pub const U32_LE: Field = Field::new(Width::U32, Endian::Little);
    pub const U32_BE: Field = Field::new(Width::U32, Endian::Big);
    pub const U64_LE: Field = Field::new(Width::U64, Endian::Little);
    pub const U64_BE: Field = Field::new(Width::U64, Endian::Big);

    pub const fn new(width: Width, endian: Endian) -> Self {
        Self { width, endian }
    }

    /// Size of the field in bytes.
    #[inline]
    pub const fn size(&self) -> u64 {
        self.width.bytes() as u64
    }

    /// Read the field at the source's cursor.
    #[inline]
    pub fn read(&self, source: &mut ByteSource) -> gamearc_common::Result<u64> {
        source.read_uint(self.width.bytes(), self.endian)
    }
}

/// Named header values that later steps can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Count,
    DirectoryOffset,
    DirectorySize,
    NamesOffset,
    NamesSize,
    DataBase,
    Key,
    Aux,
}

impl Slot {
    pub(crate) const COUNT: usize = 8;

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

/// A position in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Absolute offset from the start.
    Start(u64),
    /// Bytes back from the end.
    End(u64),
    /// The value of a header slot.
    Slot(Slot),
    /// A header slot plus a constant.
    SlotPlus(Slot, u64),
    /// Wherever the previous phase left the cursor.
    Cursor,
}

/// A predicate on a numeric field.
///
/// Probes use it softly (a failed check scores nothing); header reads use it
/// as a hard gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    Any,
    Equals(u64),
    OneOf(Vec<u64>),
    Range { min: u64, max: u64 },
    NonZero,
    /// Must be a valid offset within the stream.
    Offset,
    /// Must be a valid length within the stream.
    Length,
    /// Must be a sane file count.
    Count,
}

/// How a filename is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameEncoding {
    /// Fixed-size, NUL-padded field.
    Fixed(usize),
    /// NUL-terminated, variable length.
    CString,
    /// Length prefix followed by that many bytes.
    Prefixed(Field),
    /// Offset into the directory's [`NameTable`], resolved in a second pass.
    Ref(Field),
}

/// One sniffing step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStep {
    Magic(Vec<u8>),
    Field { field: Field, check: Check },
    Skip(u64),
    Seek(Anchor),
    Filename(NameEncoding),
}

/// A sniffing step and the points it is worth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub step: ProbeStep,
    pub points: u32,
}

impl Probe {
    pub fn magic(magic: &[u8], points: u32) -> Self {
        Self {
            step: ProbeStep::Magic(magic.to_vec()),
            points,
        }
    }

    pub fn field(field: Field, check: Check, points: u32) -> Self {
        Self {
            step: ProbeStep::Field { field, check },
            points,
        }
    }

    pub fn skip(count: u64) -> Self {
        Self {
            step: ProbeStep::Skip(count),
            points: 0,
        }
    }

    pub fn seek(anchor: Anchor) -> Self {
        Self {
            step: ProbeStep::Seek(anchor),
            points: 0,
        }
    }

    pub fn filename(encoding: NameEncoding, points: u32) -> Self {
        Self {
            step: ProbeStep::Filename(encoding),
            points,
        }
    }
}

/// One step of the header program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderOp {
    /// Magic bytes that must match exactly.
    Expect(Vec<u8>),
    Skip(u64),
    Seek(Anchor),
    Read { field: Field, into: Slot, check: Check },
}

impl HeaderOp {
    pub fn expect(magic: &[u8]) -> Self {
        Self::Expect(magic.to_vec())
    }

    pub fn read(field: Field, into: Slot, check: Check) -> Self {
        Self::Read { field, into, check }
    }
}

/// One field of a directory record, in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOp {
    Offset(Field),
    Length(Field),
    /// End offset; the length is `end - offset`.
    EndOffset(Field),
    DecompressedLength(Field),
    Name(NameEncoding),
    /// Flag consulted by [`DecoderRule::WhenFlagSet`].
    Flag(Field),
    Property(&'static str, Field),
    Skip(u64),
    /// Advance the cursor to the next multiple of `n`.
    Align(u64),
}

/// The ordered fields of one directory record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordLayout {
    pub ops: Vec<RecordOp>,
}

impl RecordLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn op(mut self, op: RecordOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn offset(self, field: Field) -> Self {
        self.op(RecordOp::Offset(field))
    }

    pub fn length(self, field: Field) -> Self {
        self.op(RecordOp::Length(field))
    }

    pub fn end_offset(self, field: Field) -> Self {
        self.op(RecordOp::EndOffset(field))
    }

    pub fn decompressed_length(self, field: Field) -> Self {
        self.op(RecordOp::DecompressedLength(field))
    }

    pub fn name(self, encoding: NameEncoding) -> Self {
        self.op(RecordOp::Name(encoding))
    }

    pub fn flag(self, field: Field) -> Self {
        self.op(RecordOp::Flag(field))
    }

    pub fn property(self, name: &'static str, field: Field) -> Self {
        self.op(RecordOp::Property(name, field))
    }

    pub fn skip(self, count: u64) -> Self {
        self.op(RecordOp::Skip(count))
    }

    pub fn align(self, to: u64) -> Self {
        self.op(RecordOp::Align(to))
    }

    /// Record size when every op has a fixed width.
    pub fn fixed_size(&self) -> Option<u64> {
        self.ops.iter().try_fold(0u64, |acc, op| {
            let size = match op {
                RecordOp::Offset(f)
                | RecordOp::Length(f)
                | RecordOp::EndOffset(f)
                | RecordOp::DecompressedLength(f)
                | RecordOp::Flag(f)
                | RecordOp::Property(_, f)
                | RecordOp::Name(NameEncoding::Ref(f)) => f.size(),
                RecordOp::Name(NameEncoding::Fixed(n)) => *n as u64,
                RecordOp::Skip(n) => *n,
                RecordOp::Name(_) | RecordOp::Align(_) => return None,
            };
            Some(acc + size)
        })
    }

    /// Smallest number of bytes one record can occupy.
    pub fn min_size(&self) -> u64 {
        self.ops
            .iter()
            .map(|op| match op {
                RecordOp::Offset(f)
                | RecordOp::Length(f)
                | RecordOp::EndOffset(f)
                | RecordOp::DecompressedLength(f)
                | RecordOp::Flag(f)
                | RecordOp::Property(_, f)
                | RecordOp::Name(NameEncoding::Ref(f))
                | RecordOp::Name(NameEncoding::Prefixed(f)) => f.size(),
                RecordOp::Name(NameEncoding::Fixed(n)) => *n as u64,
                RecordOp::Name(NameEncoding::CString) => 1,
                RecordOp::Skip(n) => *n,
                RecordOp::Align(_) => 0,
            })
            .sum()
    }

    pub(crate) fn has(&self, pred: impl Fn(&RecordOp) -> bool) -> bool {
        self.ops.iter().any(pred)
    }

    pub fn stores_offset(&self) -> bool {
        self.has(|op| matches!(op, RecordOp::Offset(_)))
    }

    pub fn stores_length(&self) -> bool {
        self.has(|op| matches!(op, RecordOp::Length(_) | RecordOp::EndOffset(_)))
    }

    pub fn stores_decompressed_length(&self) -> bool {
        self.has(|op| matches!(op, RecordOp::DecompressedLength(_)))
    }

    pub fn uses_name_table(&self) -> bool {
        self.has(|op| matches!(op, RecordOp::Name(NameEncoding::Ref(_))))
    }
}

/// Where the number of records comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Count {
    Fixed(u64),
    Slot(Slot),
    /// A byte size divided by the record size.
    SlotDiv { slot: Slot, record_size: u64 },
    /// A field read at the start of the directory.
    Field(Field),
}

/// How a streaming directory signals its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// A record whose stored offset is zero ends the directory and is dropped.
    ZeroOffset,
    /// A field equal to `value` in front of the next record ends the directory.
    Marker { field: Field, value: u64 },
    /// The cursor reaching this position ends the directory.
    Boundary(Anchor),
    /// Running out of bytes ends the directory; a truncated last record is dropped.
    EndOfSource,
}

/// How records are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryShape {
    FixedCount { count: Count },
    Streaming { terminator: Terminator },
}

/// A name blob that records point into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameTable {
    /// Start of the blob. `Cursor` means directly after the records.
    pub at: Anchor,
}

/// The base stored offsets are relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetBase {
    Absolute,
    Slot(Slot),
    /// First byte after the directory records.
    DirectoryEnd,
    /// First byte after the directory records plus a header slot.
    DirectoryEndPlus(Slot),
}

/// How entry offsets are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetRule {
    /// `base + stored * unit`.
    Stored { base: OffsetBase, unit: u64 },
    /// Entries are packed back to back from `base`, each start aligned to `align`.
    Sequential { base: OffsetBase, align: u64 },
}

impl Default for OffsetRule {
    fn default() -> Self {
        Self::Stored {
            base: OffsetBase::Absolute,
            unit: 1,
        }
    }
}

/// Location and layout of the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    pub at: Anchor,
    pub shape: DirectoryShape,
    pub record: RecordLayout,
    pub names: Option<NameTable>,
    pub offsets: OffsetRule,
    /// Multiplier applied to stored lengths (e.g. 2048 for sector counts).
    pub length_unit: u64,
}

impl Directory {
    pub fn new(at: Anchor, shape: DirectoryShape, record: RecordLayout) -> Self {
        Self {
            at,
            shape,
            record,
            names: None,
            offsets: OffsetRule::default(),
            length_unit: 1,
        }
    }

    pub fn names(mut self, at: Anchor) -> Self {
        self.names = Some(NameTable { at });
        self
    }

    pub fn offsets(mut self, rule: OffsetRule) -> Self {
        self.offsets = rule;
        self
    }

    pub fn length_unit(mut self, unit: u64) -> Self {
        self.length_unit = unit;
        self
    }
}

/// Which region an obfuscation covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The entire directory stream, header included. Applies to sniffing too.
    Whole,
    /// Header program reads only.
    Header,
    /// Directory records, keyed from the directory start.
    Directory,
    /// Filenames, keyed from the start of each name (or of the name table).
    Names,
}

/// A reversible transform whose key may come from the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformSpec {
    Xor(u8),
    XorKey(Vec<u8>),
    /// XOR with the low byte of a header slot.
    XorFromSlot(Slot),
}

impl TransformSpec {
    /// Build the transform, given a lookup for slot values.
    pub(crate) fn build(&self, slot: impl Fn(Slot) -> Option<u64>) -> Option<ByteTransform> {
        match self {
            TransformSpec::Xor(k) => Some(ByteTransform::xor(*k)),
            TransformSpec::XorKey(key) => Some(ByteTransform::xor_key(key)),
            TransformSpec::XorFromSlot(s) => slot(*s).map(|v| ByteTransform::xor(v as u8)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obfuscation {
    pub scope: Scope,
    pub transform: TransformSpec,
}

/// When entries get a decoder attached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DecoderRule {
    #[default]
    None,
    Always(DecoderRef),
    /// When the record's [`RecordOp::Flag`] is non-zero.
    WhenFlagSet(DecoderRef),
    /// When the stored decompressed length differs from the stored length.
    WhenSizesDiffer(DecoderRef),
}

/// How missing lengths are computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResolutionPolicy {
    /// Lengths are stored.
    #[default]
    Explicit,
    /// Distance to the next higher offset, minus a fixed overhead; the
    /// highest entry runs to the end of the archive.
    SortDiff { header_overhead: u64 },
    /// The entry at the highest offset runs to the end of the archive.
    EndOfArchive,
    /// Offsets point at a per-entry header of `header_overhead` bytes; data
    /// starts at the next `alignment` boundary after it and runs to the next
    /// entry.
    PaddingAware { header_overhead: u64, alignment: u64 },
}

/// Resolution policy plus per-format quirks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Resolution {
    pub policy: ResolutionPolicy,
    /// Swap length and decompressed length when the latter is smaller.
    pub swap_if_inverted: bool,
    /// Zero-length entries are legitimate empty files.
    pub allow_empty: bool,
    /// Number of garbage records at the end of the directory to drop.
    pub discard_trailing: usize,
}

impl Resolution {
    pub fn new(policy: ResolutionPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn swap_if_inverted(mut self) -> Self {
        self.swap_if_inverted = true;
        self
    }

    pub fn allow_empty(mut self) -> Self {
        self.allow_empty = true;
        self
    }

    pub fn discard_trailing(mut self, count: usize) -> Self {
        self.discard_trailing = count;
        self
    }
}

/// Archives whose directory and data live in different files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitLayout {
    /// The opened file is the directory; data lives beside it with this extension.
    DataIn { extension: &'static str },
    /// The opened file holds the data; the directory lives beside it with this extension.
    DirectoryIn { extension: &'static str },
}

/// A complete, immutable description of one archive family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub version: u32,
    pub extensions: Vec<&'static str>,
    pub extension_points: u32,
    pub probes: Vec<Probe>,
    pub header: Vec<HeaderOp>,
    pub directory: Directory,
    pub obfuscation: Vec<Obfuscation>,
    pub decoder: DecoderRule,
    pub resolution: Resolution,
    pub split: Option<SplitLayout>,
    /// Extension given to synthesized names.
    pub default_extension: Option<&'static str>,
}

impl FormatDescriptor {
    pub fn builder(name: &'static str) -> FormatDescriptorBuilder {
        FormatDescriptorBuilder::new(name)
    }

    /// The transform for `scope`, if the descriptor has one.
    pub fn obfuscation_for(&self, scope: Scope) -> Option<&TransformSpec> {
        self.obfuscation
            .iter()
            .find(|o| o.scope == scope)
            .map(|o| &o.transform)
    }

    /// Reject descriptors the engine cannot execute coherently.
    pub fn check(&self) -> Result<(), &'static str> {
        let dir = &self.directory;
        let record = &dir.record;

        if record.ops.is_empty() {
            return Err("directory record has no fields");
        }
        if record.min_size() == 0 {
            return Err("directory record can be zero bytes long");
        }
        if record.has(|op| matches!(op, RecordOp::Align(0))) {
            return Err("record alignment of zero");
        }
        if let DirectoryShape::FixedCount {
            count: Count::SlotDiv { record_size: 0, .. },
        } = dir.shape
        {
            return Err("record size of zero");
        }
        if dir.length_unit == 0 {
            return Err("length unit of zero");
        }
        match dir.offsets {
            OffsetRule::Stored { unit: 0, .. } => return Err("offset unit of zero"),
            OffsetRule::Stored { .. } if !record.stores_offset() => {
                return Err("stored offsets but the record has no offset field")
            }
            OffsetRule::Sequential { align: 0, .. } => return Err("sequential alignment of zero"),
            OffsetRule::Sequential { .. }
                if !record.has(|op| matches!(op, RecordOp::Length(_))) =>
            {
                return Err("sequential offsets need stored lengths")
            }
            _ => {}
        }
        if record.stores_offset() && matches!(dir.offsets, OffsetRule::Sequential { .. }) {
            return Err("sequential offsets but the record stores offsets");
        }
        if matches!(self.resolution.policy, ResolutionPolicy::Explicit) && !record.stores_length() {
            return Err("explicit resolution but the record has no length field");
        }
        if let ResolutionPolicy::PaddingAware { alignment: 0, .. } = self.resolution.policy {
            return Err("padding alignment of zero");
        }
        if record.uses_name_table() != dir.names.is_some() {
            return Err("name references and name table must be used together");
        }
        if let DirectoryShape::Streaming {
            terminator: Terminator::ZeroOffset,
        } = dir.shape
        {
            if !record.stores_offset() {
                return Err("zero-offset terminator without an offset field");
            }
        }
        match &self.decoder {
            DecoderRule::WhenFlagSet(_) if !record.has(|op| matches!(op, RecordOp::Flag(_))) => {
                return Err("flag-driven decoder without a flag field")
            }
            DecoderRule::WhenSizesDiffer(_)
                if !record.stores_decompressed_length()
                    || !matches!(self.resolution.policy, ResolutionPolicy::Explicit) =>
            {
                return Err("size-driven decoder needs both sizes stored")
            }
            _ => {}
        }
        for o in &self.obfuscation {
            if matches!(o.transform, TransformSpec::XorFromSlot(_))
                && matches!(o.scope, Scope::Whole | Scope::Header)
            {
                return Err("header-keyed transform cannot cover the header itself");
            }
        }
        for probe in &self.probes {
            if matches!(probe.step, ProbeStep::Filename(NameEncoding::Ref(_))) {
                return Err("probes cannot follow name references");
            }
        }
        Ok(())
    }
}

/// Builder for [`FormatDescriptor`].
#[derive(Debug, Clone)]
pub struct FormatDescriptorBuilder {
    inner: FormatDescriptor,
}

impl FormatDescriptorBuilder {
    fn new(name: &'static str) -> Self {
        Self {
            inner: FormatDescriptor {
                name,
                description: "",
                version: 1,
                extensions: Vec::new(),
                extension_points: 0,
                probes: Vec::new(),
                header: Vec::new(),
                directory: Directory::new(
                    Anchor::Cursor,
                    DirectoryShape::FixedCount {
                        count: Count::Fixed(0),
                    },
                    RecordLayout::new(),
                ),
                obfuscation: Vec::new(),
                decoder: DecoderRule::None,
                resolution: Resolution::default(),
                split: None,
                default_extension: None,
            },
        }
    }

    pub fn description(mut self, description: &'static str) -> Self {
        self.inner.description = description;
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.inner.version = version;
        self
    }

    pub fn extensions(mut self, extensions: &[&'static str], points: u32) -> Self {
        self.inner.extensions = extensions.to_vec();
        self.inner.extension_points = points;
        self
    }

    pub fn probe(mut self, probe: Probe) -> Self {
        self.inner.probes.push(probe);
        self
    }

    pub fn header(mut self, op: HeaderOp) -> Self {
        self.inner.header.push(op);
        self
    }

    pub fn directory(mut self, directory: Directory) -> Self {
        self.inner.directory = directory;
        self
    }

    pub fn obfuscate(mut self, scope: Scope, transform: TransformSpec) -> Self {
        self.inner.obfuscation.push(Obfuscation { scope, transform });
        self
    }

    pub fn decoder(mut self, rule: DecoderRule) -> Self {
        self.inner.decoder = rule;
        self
    }

    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.inner.resolution = resolution;
        self
    }

    pub fn split(mut self, split: SplitLayout) -> Self {
        self.inner.split = Some(split);
        self
    }

    pub fn default_extension(mut self, extension: &'static str) -> Self {
        self.inner.default_extension = Some(extension);
        self
    }

    pub fn build(self) -> FormatDescriptor {
        self.inner
    }
}
