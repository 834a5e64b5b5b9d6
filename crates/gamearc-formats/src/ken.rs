//! Build engine GRP (Duke Nukem 3D, Shadow Warrior, Blood).
//!
//! ```text
//! 0x00  "KenSilverman"
//! 0x0C  u32le count
//! 0x10  { name[12], length u32le } * count
//!       file data, packed in directory order
//! ```

use gamearc_core::descriptor::*;

pub const NAME: &str = "build-grp";

pub fn descriptor() -> FormatDescriptor {
    FormatDescriptor::builder(NAME)
        .description("Build engine GRP (Duke Nukem 3D)")
        .extensions(&["grp"], 10)
        .probe(Probe::magic(b"KenSilverman", 60))
        .probe(Probe::field(Field::U32_LE, Check::Count, 10))
        .probe(Probe::filename(NameEncoding::Fixed(12), 10))
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
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;
    use gamearc_core::ByteSource;

    #[test]
    fn test_decode_grp() {
        let mut data = Vec::new();
        put(&mut data, b"KenSilverman");
        put_u32le(&mut data, 2);
        put_fixed(&mut data, "GAME.CON", 12);
        put_u32le(&mut data, 5);
        put_fixed(&mut data, "TILES000.ART", 12);
        put_u32le(&mut data, 3);
        put(&mut data, b"defineART");

        let source = ByteSource::from_vec(data);
        let listing = crate::builtin().decode(&source, None).unwrap();
        assert_eq!(listing.format, NAME);
        assert_eq!(listing.entries[0].offset, 48);
        assert_eq!(listing.entries[1].offset, 53);
        assert_eq!(listing.entries[1].name, "TILES000.ART");
    }
}
