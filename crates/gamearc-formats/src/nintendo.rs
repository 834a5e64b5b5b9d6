//! Nintendo Switch PFS0 (partition filesystem).
//!
//! ```text
//! 0x00  "PFS0"
//! 0x04  u32le count
//! 0x08  u32le string table size
//! 0x0C  reserved
//! 0x10  { offset u64le, size u64le, name offset u32le, reserved } * count
//!       string table
//!       data (offsets are relative to here)
//! ```

use gamearc_core::descriptor::*;

pub const NAME: &str = "nintendo-pfs0";

pub fn descriptor() -> FormatDescriptor {
    FormatDescriptor::builder(NAME)
        .description("Nintendo Switch partition filesystem (PFS0/NSP)")
        .extensions(&["nsp", "pfs0"], 10)
        .probe(Probe::magic(b"PFS0", 50))
        .probe(Probe::field(Field::U32_LE, Check::Count, 10))
        .probe(Probe::field(Field::U32_LE, Check::Length, 10))
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
        .resolution(Resolution::default().allow_empty())
        .build()
}
