use byteorder::{LittleEndian, ReadBytesExt};

use std::io::Read;

/// `perf_file_section`
///
/// A FileSection contains a pointer to another section of the perf file.
/// The header contains three such pointers: for attributes, data and event types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileSection {
    /// offset from start of file
    pub offset: u64,
    /// size of the section
    pub size: u64,
}

impl FileSection {
    pub const STRUCT_SIZE: u64 = 8 + 8;

    pub fn parse<R: Read>(mut reader: R) -> Result<Self, std::io::Error> {
        let offset = reader.read_u64::<LittleEndian>()?;
        let size = reader.read_u64::<LittleEndian>()?;
        Ok(Self { offset, size })
    }

    /// The first byte offset past the end of this section.
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}
