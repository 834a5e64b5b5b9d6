//! CRI Middleware AFS.
//!
//! ```text
//! 0x00  "AFS\0"
//! 0x04  u32le count
//! 0x08  { offset u32le, length u32le } * count
//! ```
//!
//! Names live in an optional trailing table that many titles omit, so
//! entries get synthesized names.

use gamearc_core::descriptor::*;

pub const NAME: &str = "cri-afs";

pub fn descriptor() -> FormatDescriptor {
    FormatDescriptor::builder(NAME)
        .description("CRI Middleware AFS")
        .extensions(&["afs"], 10)
        .probe(Probe::magic(b"AFS\0", 50))
        .probe(Probe::field(Field::U32_LE, Check::Count, 10))
        .probe(Probe::field(Field::U32_LE, Check::Offset, 15))
        .header(HeaderOp::expect(b"AFS\0"))
        .header(HeaderOp::read(Field::U32_LE, Slot::Count, Check::Count))
        .directory(Directory::new(
            Anchor::Cursor,
            DirectoryShape::FixedCount {
                count: Count::Slot(Slot::Count),
            },
            RecordLayout::new().offset(Field::U32_LE).length(Field::U32_LE),
        ))
        .resolution(Resolution::default().allow_empty())
        .default_extension("bin")
        .build()
}
