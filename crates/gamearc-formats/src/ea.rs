//! Electronic Arts BIG (Command & Conquer Generals, FIFA).
//!
//! Big-endian apart from the archive size field.
//!
//! ```text
//! 0x00  "BIGF" | "BIG4"
//! 0x04  u32le archive size
//! 0x08  u32be count
//! 0x0C  u32be offset of first file
//! 0x10  { offset u32be, length u32be, name cstring } * count
//! ```

use gamearc_core::descriptor::*;

pub const NAME: &str = "ea-big";

const BIGF: u64 = u32::from_be_bytes(*b"BIGF") as u64;
const BIG4: u64 = u32::from_be_bytes(*b"BIG4") as u64;

pub fn descriptor() -> FormatDescriptor {
    FormatDescriptor::builder(NAME)
        .description("Electronic Arts BIG")
        .extensions(&["big"], 10)
        .probe(Probe::field(Field::U32_BE, Check::OneOf(vec![BIGF, BIG4]), 50))
        .probe(Probe::field(Field::U32_LE, Check::Length, 10))
        .probe(Probe::field(Field::U32_BE, Check::Count, 10))
        .probe(Probe::field(Field::U32_BE, Check::Offset, 5))
        .probe(Probe::skip(8))
        .probe(Probe::filename(NameEncoding::CString, 10))
        .header(HeaderOp::read(Field::U32_BE, Slot::Aux, Check::OneOf(vec![BIGF, BIG4])))
        .header(HeaderOp::Skip(4))
        .header(HeaderOp::read(Field::U32_BE, Slot::Count, Check::Count))
        .header(HeaderOp::read(Field::U32_BE, Slot::DataBase, Check::Offset))
        .directory(Directory::new(
            Anchor::Cursor,
            DirectoryShape::FixedCount {
                count: Count::Slot(Slot::Count),
            },
            RecordLayout::new()
                .offset(Field::U32_BE)
                .length(Field::U32_BE)
                .name(NameEncoding::CString),
        ))
        .resolution(Resolution::default().allow_empty())
        .build()
}
