//! id Software PAK (Quake, Quake II, Half-Life).
//!
//! ```text
//! 0x00  "PACK"
//! 0x04  u32le directory offset
//! 0x08  u32le directory size (64 bytes per record)
//! dir   { name[56], offset u32le, length u32le } * (size / 64)
//! ```

use gamearc_core::descriptor::*;

pub const NAME: &str = "quake-pak";

pub fn descriptor() -> FormatDescriptor {
    FormatDescriptor::builder(NAME)
        .description("id Software PAK (Quake, Quake II, Half-Life)")
        .extensions(&["pak"], 10)
        .probe(Probe::magic(b"PACK", 50))
        .probe(Probe::field(Field::U32_LE, Check::Offset, 15))
        .probe(Probe::field(Field::U32_LE, Check::Length, 15))
        .header(HeaderOp::expect(b"PACK"))
        .header(HeaderOp::read(Field::U32_LE, Slot::DirectoryOffset, Check::Offset))
        .header(HeaderOp::read(Field::U32_LE, Slot::DirectorySize, Check::Length))
        .directory(Directory::new(
            Anchor::Slot(Slot::DirectoryOffset),
            DirectoryShape::FixedCount {
                count: Count::SlotDiv {
                    slot: Slot::DirectorySize,
                    record_size: 64,
                },
            },
            RecordLayout::new()
                .name(NameEncoding::Fixed(56))
                .offset(Field::U32_LE)
                .length(Field::U32_LE),
        ))
        .resolution(Resolution::default().allow_empty())
        .build()
}
