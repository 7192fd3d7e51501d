//! A parser for Linux perf.data profiles.
//!
//! This crate reads the files produced by `perf record`: the event
//! attribute table, the feature metadata at the file's tail, and the
//! stream of variable-shape records in between. On top of the decoder it
//! provides a [`Session`] that tracks live processes and their memory
//! maps while records are consumed, and a [`Symbolizer`] that resolves
//! sampled instruction pointers to function names and source lines using
//! the mapped file's DWARF or ELF symbols.
//!
//! ```no_run
//! # fn run() -> Result<(), perf_profile::Error> {
//! use perf_profile::{PerfFile, Record, RecordsOrder, Session};
//!
//! let mut file = PerfFile::open("perf.data")?;
//! println!("hostname: {}", file.meta().hostname);
//!
//! let mut session = Session::new(&file);
//! let mut records = file.records(RecordsOrder::Time)?;
//! while let Some(record) = records.next() {
//!     session.update(record);
//!     if let Record::Sample(sample) = record {
//!         let mmap = session.lookup_mmap(sample.common.pid, sample.ip);
//!         println!("{:#x} in {:?}", sample.ip, mmap.map(|m| &m.filename));
//!     }
//! }
//! if let Some(err) = records.err() {
//!     return Err(std::io::Error::other(err.to_string()).into());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Only little-endian version 2 files are supported; big-endian and
//! version 1 profiles are detected and rejected.

mod attr;
mod buf;
mod buffered_reader;
mod cpuset;
mod datasrc;
mod error;
mod features;
mod header;
mod meta;
mod perf_file;
mod ranges;
mod record;
mod records;
mod section;
mod session;
mod symbolize;

pub use attr::{
    AttrFlags, BranchSampleFormat, EventAttr, EventKind, HardwareCacheId, HardwareCacheOp,
    HardwareCacheOpResult, HardwareEventId, HwBreakpointType, IpPrecision, PmuTypeId, ReadFormat,
    SampleFormat, SamplingPolicy, SoftwareCounterId, WakeupPolicy, PERF_ATTR_SIZE_VER0,
    PERF_ATTR_SIZE_VER1, PERF_ATTR_SIZE_VER2, PERF_ATTR_SIZE_VER3, PERF_ATTR_SIZE_VER4,
    PERF_ATTR_SIZE_VER5, PERF_ATTR_SIZE_VER6, PERF_ATTR_SIZE_VER7, PERF_TYPE_BREAKPOINT,
    PERF_TYPE_HARDWARE, PERF_TYPE_HW_CACHE, PERF_TYPE_RAW, PERF_TYPE_SOFTWARE,
    PERF_TYPE_TRACEPOINT,
};
pub use cpuset::{CpuSet, ParseCpuSetError};
pub use datasrc::{
    DataSrc, DataSrcBlock, DataSrcHops, DataSrcLevel, DataSrcLevelNum, DataSrcLock, DataSrcOp,
    DataSrcSnoop, DataSrcTlb,
};
pub use error::{Error, ReadError};
pub use features::{Feature, FeatureSet, FeatureSetIter};
pub use meta::{
    BuildId, BuildIdInfo, EventDesc, FileMeta, GroupDesc, NumaNode, SampleTimeRange,
};
pub use perf_file::PerfFile;
pub use ranges::Ranges;
pub use record::{
    BranchEntry, BranchFlags, BranchType, Count, CpuMode, KsymbolFlags, KsymbolType, Namespace,
    Record, RecordAux, RecordAuxOutputHardwareId, RecordAuxtrace, RecordAuxtraceInfo,
    RecordBpfEvent, RecordCgroup, RecordComm, RecordCommon, RecordExit, RecordFork,
    RecordItraceStart, RecordKsymbol, RecordLost, RecordLostSamples, RecordMmap, RecordNamespaces,
    RecordSample, RecordSwitch, RecordSwitchCpuWide, RecordTextPoke, RecordThrottle, RecordType,
    RecordUnknown, SampleRegsAbi, Transaction, Weights, AuxFlags, BpfEventType, CALLCHAIN_GUEST,
    CALLCHAIN_GUEST_KERNEL, CALLCHAIN_GUEST_USER, CALLCHAIN_HV, CALLCHAIN_KERNEL, CALLCHAIN_USER,
};
pub use records::{Records, RecordsOrder};
pub use session::{
    ExtraKey, Forkable, ForkableExtras, Mmap, PidInfo, Session, KERNEL_PID,
};
pub use symbolize::{FuncRange, LineEntry, Symbolic, Symbolizer};
