//! Westwood PAK, Dune II flavour.
//!
//! ```text
//! 0x00  { offset u32le, name cstring } ...
//!       u32le 0
//!       file data
//! ```
//!
//! Lengths are not stored; each file runs to the next offset and the last
//! one to the end of the archive.

use gamearc_core::descriptor::*;

pub const NAME: &str = "westwood-pak";

pub fn descriptor() -> FormatDescriptor {
    FormatDescriptor::builder(NAME)
        .description("Westwood PAK (Dune II)")
        .extensions(&["pak"], 10)
        .probe(Probe::field(Field::U32_LE, Check::Offset, 20))
        .probe(Probe::filename(NameEncoding::CString, 30))
        .directory(Directory::new(
            Anchor::Start(0),
            DirectoryShape::Streaming {
                terminator: Terminator::Marker {
                    field: Field::U32_LE,
                    value: 0,
                },
            },
            RecordLayout::new()
                .offset(Field::U32_LE)
                .name(NameEncoding::CString),
        ))
        .resolution(Resolution::new(ResolutionPolicy::SortDiff { header_overhead: 0 }).allow_empty())
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;
    use gamearc_core::ByteSource;

    fn archive() -> Vec<u8> {
        // Directory: 13 + 14 + 4 bytes, then 5 and 7 bytes of data.
        let mut data = Vec::new();
        put_u32le(&mut data, 31);
        put(&mut data, b"DUNE.ENG\0");
        put_u32le(&mut data, 36);
        put(&mut data, b"INTRO.VOC\0");
        put_u32le(&mut data, 0);
        put(&mut data, b"hello");
        put(&mut data, b"goodbye");
        data
    }

    #[test]
    fn test_decode_pak() {
        let source = ByteSource::from_vec(archive());
        let listing = crate::builtin().decode(&source, None).unwrap();
        assert_eq!(listing.format, NAME);

        let spans: Vec<_> = listing
            .entries
            .iter()
            .map(|e| (e.name.as_str(), e.offset, e.length))
            .collect();
        assert_eq!(spans, vec![("DUNE.ENG", 31, 5), ("INTRO.VOC", 36, 7)]);
    }

    #[test]
    fn test_unterminated_directory_fails() {
        let mut data = Vec::new();
        put_u32le(&mut data, 20);
        put(&mut data, b"A.TXT\0");
        data.extend_from_slice(&[0xFF; 6]);

        let source = ByteSource::from_vec(data);
        let registry = crate::registry(Default::default()).unwrap();
        let d = registry.get(NAME).unwrap();
        let target = gamearc_core::DecodeTarget::primary(source.len());
        assert!(registry.decode_with(&source, d, &target).is_err());
    }
}
