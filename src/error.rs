use std::io;

/// The error type used in this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The data slice was not big enough to read the struct, or we
    /// were trying to follow an invalid offset to somewhere outside
    /// of the data bounds.
    #[error("Read error: {0}")]
    Read(#[from] ReadError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Did not recognize magic value {0:?}")]
    BadMagic([u8; 8]),

    #[error("Big endian profiles are not supported")]
    UnsupportedBigEndian,

    #[error("Version 1 profiles (PERFFILE) are not supported")]
    UnsupportedVersion1,

    #[error("Bad file header size {0}")]
    BadHeaderSize(u64),

    #[error("Data section size is zero; was 'perf record' properly terminated?")]
    TruncatedDataSection,

    #[error("Bad attr size {0}")]
    BadAttrSize(u64),

    #[error("The file contains no event attributes")]
    NoEvents,

    #[error("Too many event attributes or bad attr size")]
    TooManyEvents,

    #[error("Event attr size {0} too large; more recent and unsupported format")]
    EventAttrTooLarge(u32),

    #[error("Unrecognized event configuration in event attr")]
    BadEventConfig,

    #[error("The file has multiple event attributes, but no event IDs")]
    MissingEventIds,

    #[error("Multiple events, but samples have no event ID field")]
    NoSampleIdField,

    #[error("Events have incompatible sample ID offsets {0} and {1}")]
    IncompatibleSampleIdOffsets(usize, usize),

    #[error("Multiple events, but records have no event ID field")]
    NoRecordIdField,

    #[error("Records have incompatible event ID offsets {0} and {1}")]
    IncompatibleRecordIdOffsets(i64, i64),

    #[error("Events have incompatible sample_id_all flags")]
    InconsistentSampleIdAll,

    #[error("Events have incompatible read formats")]
    IncompatibleReadFormats,

    #[error("Samples carry counter reads, but the read format has no ID field")]
    BadReadFormat,

    #[error("Record references unknown event attr ID {0}")]
    UnknownEventId(u64),

    #[error("The record size {0} is smaller than the record header itself")]
    InvalidRecordSize(u16),

    #[error("Section size did not fit into usize")]
    SectionSizeTooBig,

    #[error("Could not parse CPU set: {0}")]
    BadCpuSet(#[from] crate::cpuset::ParseCpuSetError),
}

/// This error indicates that a byte buffer or file section was not
/// large enough to read the respective item.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    #[error("Could not read file header")]
    Header,

    #[error("Could not read event attr")]
    EventAttr,

    #[error("Could not read event attr IDs")]
    AttrIds,

    #[error("Could not read feature section")]
    FeatureSection,

    #[error("Could not read record header")]
    RecordHeader,

    #[error("Could not read record body")]
    RecordBody,

    #[error("Could not read string")]
    String,
}
