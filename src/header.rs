use byteorder::{LittleEndian, ReadBytesExt};

use std::io::Read;

use crate::error::Error;
use crate::features::FeatureSet;
use crate::section::FileSection;

/// The on-disk `perf_header`.
///
/// The magic number identifies the perf file and the version. Current perf
/// versions use PERFILE2. Old perf versions generated a version 1 format
/// (PERFFILE), and a byte-swapped magic marks a big-endian file; both are
/// detected and rejected here.
#[derive(Debug, Clone, Copy)]
pub struct FileHeader {
    /// size of the header on disk
    pub header_size: u64,
    /// size of one entry in the attrs section
    pub attr_size: u64,
    pub attr_section: FileSection,
    pub data_section: FileSection,
    /// event_types; ignored in v2
    pub event_types_section: FileSection,
    /// Feature bitmap
    pub features: FeatureSet,
}

impl FileHeader {
    pub const STRUCT_SIZE: u64 = 8 + 8 + 8 + FileSection::STRUCT_SIZE * 3 + 32;

    pub fn parse<R: Read>(mut reader: R) -> Result<Self, Error> {
        let mut magic = [0; 8];
        reader.read_exact(&mut magic)?;
        match &magic {
            b"PERFILE2" => {}
            b"2ELIFREP" => return Err(Error::UnsupportedBigEndian),
            b"PERFFILE" => return Err(Error::UnsupportedVersion1),
            _ => return Err(Error::BadMagic(magic)),
        }

        let header_size = reader.read_u64::<LittleEndian>()?;
        if header_size != Self::STRUCT_SIZE {
            return Err(Error::BadHeaderSize(header_size));
        }
        let attr_size = reader.read_u64::<LittleEndian>()?;
        let attr_section = FileSection::parse(&mut reader)?;
        let data_section = FileSection::parse(&mut reader)?;
        let event_types_section = FileSection::parse(&mut reader)?;
        let features = FeatureSet([
            reader.read_u64::<LittleEndian>()?,
            reader.read_u64::<LittleEndian>()?,
            reader.read_u64::<LittleEndian>()?,
            reader.read_u64::<LittleEndian>()?,
        ]);

        // data_section.size is the last thing written out by perf, so if
        // it's zero we're looking at an interrupted recording.
        if data_section.size == 0 {
            return Err(Error::TruncatedDataSection);
        }

        Ok(Self {
            header_size,
            attr_size,
            attr_section,
            data_section,
            event_types_section,
            features,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(magic: &[u8; 8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(magic);
        out.extend_from_slice(&FileHeader::STRUCT_SIZE.to_le_bytes());
        out.extend_from_slice(&80u64.to_le_bytes());
        // attrs, data, event_types sections
        for section in [(104u64, 80u64), (184, 64), (0, 0)] {
            out.extend_from_slice(&section.0.to_le_bytes());
            out.extend_from_slice(&section.1.to_le_bytes());
        }
        out.extend_from_slice(&[0; 32]);
        out
    }

    #[test]
    fn parses_little_endian_v2() {
        let hdr = FileHeader::parse(&header_bytes(b"PERFILE2")[..]).unwrap();
        assert_eq!(hdr.attr_size, 80);
        assert_eq!(hdr.attr_section.offset, 104);
        assert_eq!(hdr.data_section.size, 64);
        assert!(hdr.features.is_empty());
    }

    #[test]
    fn rejects_foreign_magic() {
        assert!(matches!(
            FileHeader::parse(&header_bytes(b"2ELIFREP")[..]),
            Err(Error::UnsupportedBigEndian)
        ));
        assert!(matches!(
            FileHeader::parse(&header_bytes(b"PERFFILE")[..]),
            Err(Error::UnsupportedVersion1)
        ));
        assert!(matches!(
            FileHeader::parse(&header_bytes(b"NOTPERF!")[..]),
            Err(Error::BadMagic(_))
        ));
    }

    #[test]
    fn rejects_zero_data_section() {
        let mut bytes = header_bytes(b"PERFILE2");
        // zero out the data section size
        let data_size_off = 8 + 8 + 8 + 16 + 8;
        bytes[data_size_off..data_size_off + 8].copy_from_slice(&0u64.to_le_bytes());
        assert!(matches!(
            FileHeader::parse(&bytes[..]),
            Err(Error::TruncatedDataSection)
        ));
    }
}
