//! id Software WAD (Doom engine).
//!
//! ```text
//! 0x00  "IWAD" | "PWAD"
//! 0x04  u32le lump count
//! 0x08  u32le directory offset
//! dir   { offset u32le, length u32le, name[8] } * count
//! ```
//!
//! Zero-length marker lumps (`S_START`, `E1M1`, ...) are normal.

use gamearc_core::descriptor::*;

pub const NAME: &str = "doom-wad";

const IWAD: u64 = u32::from_le_bytes(*b"IWAD") as u64;
const PWAD: u64 = u32::from_le_bytes(*b"PWAD") as u64;

pub fn descriptor() -> FormatDescriptor {
    FormatDescriptor::builder(NAME)
        .description("id Software WAD (Doom engine)")
        .extensions(&["wad"], 10)
        .probe(Probe::field(Field::U32_LE, Check::OneOf(vec![IWAD, PWAD]), 50))
        .probe(Probe::field(Field::U32_LE, Check::Count, 10))
        .probe(Probe::field(Field::U32_LE, Check::Offset, 15))
        .header(HeaderOp::read(Field::U32_LE, Slot::Aux, Check::OneOf(vec![IWAD, PWAD])))
        .header(HeaderOp::read(Field::U32_LE, Slot::Count, Check::Count))
        .header(HeaderOp::read(Field::U32_LE, Slot::DirectoryOffset, Check::Offset))
        .directory(Directory::new(
            Anchor::Slot(Slot::DirectoryOffset),
            DirectoryShape::FixedCount {
                count: Count::Slot(Slot::Count),
            },
            RecordLayout::new()
                .offset(Field::U32_LE)
                .length(Field::U32_LE)
                .name(NameEncoding::Fixed(8)),
        ))
        .resolution(Resolution::default().allow_empty())
        .default_extension("lmp")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;
    use gamearc_core::ByteSource;

    #[test]
    fn test_decode_wad_with_markers() {
        let mut data = Vec::new();
        put(&mut data, b"PWAD");
        put_u32le(&mut data, 3);
        put_u32le(&mut data, 16);
        put(&mut data, b"PLAY");
        // directory at 16
        put_u32le(&mut data, 0);
        put_u32le(&mut data, 0);
        put_fixed(&mut data, "S_START", 8);
        put_u32le(&mut data, 12);
        put_u32le(&mut data, 4);
        put_fixed(&mut data, "PLAYA1", 8);
        put_u32le(&mut data, 0);
        put_u32le(&mut data, 0);
        put_fixed(&mut data, "S_END", 8);

        let source = ByteSource::from_vec(data);
        let listing = crate::builtin().decode(&source, None).unwrap();
        assert_eq!(listing.format, NAME);
        let names: Vec<_> = listing.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["S_START", "PLAYA1", "S_END"]);
        assert_eq!(listing.entries[1].offset, 12);
    }
}
