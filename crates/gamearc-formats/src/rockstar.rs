//! Rockstar IMG version 2 (GTA San Andreas).
//!
//! Offsets and sizes are counted in 2048-byte sectors.
//!
//! ```text
//! 0x00  "VER2"
//! 0x04  u32le count
//! 0x08  { offset u32le, size u16le, archive size u16le, name[24] } * count
//! ```

use gamearc_core::descriptor::*;

pub const NAME: &str = "gta-img2";

const SECTOR: u64 = 2048;

pub fn descriptor() -> FormatDescriptor {
    FormatDescriptor::builder(NAME)
        .description("Rockstar IMG v2 (GTA San Andreas)")
        .extensions(&["img"], 10)
        .probe(Probe::magic(b"VER2", 50))
        .probe(Probe::field(Field::U32_LE, Check::Count, 10))
        .probe(Probe::skip(8))
        .probe(Probe::filename(NameEncoding::Fixed(24), 15))
        .header(HeaderOp::expect(b"VER2"))
        .header(HeaderOp::read(Field::U32_LE, Slot::Count, Check::Count))
        .directory(
            Directory::new(
                Anchor::Cursor,
                DirectoryShape::FixedCount {
                    count: Count::Slot(Slot::Count),
                },
                RecordLayout::new()
                    .offset(Field::U32_LE)
                    .length(Field::U16_LE)
                    .skip(2)
                    .name(NameEncoding::Fixed(24)),
            )
            .offsets(OffsetRule::Stored {
                base: OffsetBase::Absolute,
                unit: SECTOR,
            })
            .length_unit(SECTOR),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;
    use gamearc_core::ByteSource;

    #[test]
    fn test_decode_img_sectors() {
        let mut data = Vec::new();
        put(&mut data, b"VER2");
        put_u32le(&mut data, 2);
        put_u32le(&mut data, 1);
        put_u16le(&mut data, 1);
        put_u16le(&mut data, 0);
        put_fixed(&mut data, "player.dff", 24);
        put_u32le(&mut data, 2);
        put_u16le(&mut data, 2);
        put_u16le(&mut data, 0);
        put_fixed(&mut data, "player.txd", 24);
        data.resize(4 * 2048, 0);

        let source = ByteSource::from_vec(data);
        let listing = crate::builtin().decode(&source, None).unwrap();
        assert_eq!(listing.format, NAME);
        assert_eq!(listing.entries[0].offset, 2048);
        assert_eq!(listing.entries[1].offset, 4096);
        assert_eq!(listing.entries[1].length, 4096);
        assert_eq!(listing.entries[1].name, "player.txd");
    }
}
