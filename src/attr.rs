use bitflags::bitflags;

use std::num::NonZeroU64;

use crate::buf::BufDecoder;
use crate::error::{Error, ReadError};

pub const PERF_ATTR_SIZE_VER0: u32 = 64;
pub const PERF_ATTR_SIZE_VER1: u32 = 72;
pub const PERF_ATTR_SIZE_VER2: u32 = 80;
pub const PERF_ATTR_SIZE_VER3: u32 = 96;
pub const PERF_ATTR_SIZE_VER4: u32 = 104;
pub const PERF_ATTR_SIZE_VER5: u32 = 112;
pub const PERF_ATTR_SIZE_VER6: u32 = 120;
pub const PERF_ATTR_SIZE_VER7: u32 = 128;

pub const PERF_TYPE_HARDWARE: u32 = 0;
pub const PERF_TYPE_SOFTWARE: u32 = 1;
pub const PERF_TYPE_TRACEPOINT: u32 = 2;
pub const PERF_TYPE_HW_CACHE: u32 = 3;
pub const PERF_TYPE_RAW: u32 = 4;
pub const PERF_TYPE_BREAKPOINT: u32 = 5;

bitflags! {
    /// The fields recorded by a sample. (`perf_event_sample_format`)
    ///
    /// A record's effective mask tells which of the optional fields were
    /// actually present on disk; the event attr's mask tells which fields
    /// every sample of that event carries.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SampleFormat: u64 {
        const IP = 1 << 0;
        const TID = 1 << 1;
        const TIME = 1 << 2;
        const ADDR = 1 << 3;
        const READ = 1 << 4;
        const CALLCHAIN = 1 << 5;
        const ID = 1 << 6;
        const CPU = 1 << 7;
        const PERIOD = 1 << 8;
        const STREAM_ID = 1 << 9;
        const RAW = 1 << 10;
        const BRANCH_STACK = 1 << 11;
        const REGS_USER = 1 << 12;
        const STACK_USER = 1 << 13;
        const WEIGHT = 1 << 14;
        const DATA_SRC = 1 << 15;
        const IDENTIFIER = 1 << 16;
        const TRANSACTION = 1 << 17;
        const REGS_INTR = 1 << 18;
        const PHYS_ADDR = 1 << 19;
        const AUX = 1 << 20;
        const CGROUP = 1 << 21;
        const DATA_PAGE_SIZE = 1 << 22;
        const CODE_PAGE_SIZE = 1 << 23;
        const WEIGHT_STRUCT = 1 << 24;
    }
}

impl SampleFormat {
    /// The byte offset of the event ID within an on-disk sample record
    /// with this format, or `None` if samples carry no ID.
    pub fn sample_id_offset(&self) -> Option<usize> {
        if self.contains(SampleFormat::IDENTIFIER) {
            return Some(0);
        }
        if !self.contains(SampleFormat::ID) {
            return None;
        }
        let mut off = 0;
        for field in [
            SampleFormat::IP,
            SampleFormat::TID,
            SampleFormat::TIME,
            SampleFormat::ADDR,
        ] {
            if self.contains(field) {
                off += 8;
            }
        }
        Some(off)
    }

    /// The byte offset of the event ID in a non-sample record's trailer,
    /// measured from the end of the record, or `None` if there is no ID.
    pub fn record_id_offset(&self) -> Option<i64> {
        if self.contains(SampleFormat::IDENTIFIER) {
            return Some(-8);
        }
        if !self.contains(SampleFormat::ID) {
            return None;
        }
        let mut off = -8i64;
        if self.contains(SampleFormat::CPU) {
            off -= 8;
        }
        if self.contains(SampleFormat::STREAM_ID) {
            off -= 8;
        }
        Some(off)
    }

    /// The length of the `sample_id` trailer carried by non-sample records
    /// when the event has `AttrFlags::SAMPLE_ID_ALL` set.
    pub fn trailer_bytes(&self) -> usize {
        let trailer = *self
            & (SampleFormat::TID
                | SampleFormat::TIME
                | SampleFormat::ID
                | SampleFormat::STREAM_ID
                | SampleFormat::CPU
                | SampleFormat::IDENTIFIER);
        8 * trailer.bits().count_ones() as usize
    }
}

bitflags! {
    /// The fields carried by each event-counter readout. (`perf_event_read_format`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ReadFormat: u64 {
        const TOTAL_TIME_ENABLED = 1 << 0;
        const TOTAL_TIME_RUNNING = 1 << 1;
        const ID = 1 << 2;
        const GROUP = 1 << 3;
    }
}

bitflags! {
    /// Boolean properties of an event, from the `perf_event_attr` flag word.
    ///
    /// The 2-bit `precise_ip` field that lives at bits 15-16 of the on-disk
    /// word is split out into [`IpPrecision`] and masked out of this set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AttrFlags: u64 {
        /// Event is disabled by default
        const DISABLED = 1 << 0;
        /// Children inherit this event
        const INHERIT = 1 << 1;
        /// Event must always be on the PMU
        const PINNED = 1 << 2;
        /// Event is only group on PMU
        const EXCLUSIVE = 1 << 3;
        const EXCLUDE_USER = 1 << 4;
        const EXCLUDE_KERNEL = 1 << 5;
        const EXCLUDE_HV = 1 << 6;
        const EXCLUDE_IDLE = 1 << 7;
        /// Include mmap data
        const MMAP = 1 << 8;
        /// Include comm data
        const COMM = 1 << 9;
        /// Use frequency, not period
        const FREQ = 1 << 10;
        /// Per task counts
        const INHERIT_STAT = 1 << 11;
        /// Next exec enables this event
        const ENABLE_ON_EXEC = 1 << 12;
        /// Trace fork/exit
        const TASK = 1 << 13;
        /// The wakeup field is a byte watermark rather than an event count
        const WAKEUP_WATERMARK = 1 << 14;
        // bits 15-16 are precise_ip
        /// Non-exec mmap data
        const MMAP_DATA = 1 << 17;
        /// Non-sample records carry a sample_id trailer
        const SAMPLE_ID_ALL = 1 << 18;
        const EXCLUDE_HOST = 1 << 19;
        const EXCLUDE_GUEST = 1 << 20;
        const EXCLUDE_CALLCHAIN_KERNEL = 1 << 21;
        const EXCLUDE_CALLCHAIN_USER = 1 << 22;
        /// Include inode data in mmap events (mmap2)
        const MMAP2 = 1 << 23;
        /// Flag comm events that are due to an exec
        const COMM_EXEC = 1 << 24;
        /// Use the clock specified by clockid for time fields
        const USE_CLOCKID = 1 << 25;
        /// Record context switch data
        const CONTEXT_SWITCH = 1 << 26;
        /// Write ring buffer from end to beginning
        const WRITE_BACKWARD = 1 << 27;
        /// Include namespaces data
        const NAMESPACES = 1 << 28;
        /// Include ksymbol events
        const KSYMBOL = 1 << 29;
        /// Include BPF events
        const BPF_EVENT = 1 << 30;
        /// Generate AUX records instead of events
        const AUX_OUTPUT = 1 << 31;
        /// Include cgroup events
        const CGROUP = 1 << 32;
        /// Include text poke events
        const TEXT_POKE = 1 << 33;
        /// Use build ID in mmap2 events instead of inode
        const BUILD_ID = 1 << 34;
        /// Children only inherit if cloned with CLONE_THREAD
        const INHERIT_THREAD = 1 << 35;
        /// Event is removed from the task on exec
        const REMOVE_ON_EXEC = 1 << 36;
        /// Send synchronous SIGTRAP on event
        const SIGTRAP = 1 << 37;
    }
}

const ATTR_FLAG_PRECISE_SHIFT: u64 = 15;
const ATTR_FLAG_PRECISE_MASK: u64 = 0x3 << ATTR_FLAG_PRECISE_SHIFT;

bitflags! {
    /// The types of branches to record in the branch stack, plus what
    /// information to record about each branch. (`perf_branch_sample_type`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BranchSampleFormat: u64 {
        /// User branches
        const USER = 1 << 0;
        /// Kernel branches
        const KERNEL = 1 << 1;
        /// Hypervisor branches
        const HV = 1 << 2;
        /// Any branch types
        const ANY = 1 << 3;
        /// Any call branch
        const ANY_CALL = 1 << 4;
        /// Any return branch
        const ANY_RETURN = 1 << 5;
        /// Indirect calls
        const IND_CALL = 1 << 6;
        /// Transaction aborts
        const ABORT_TX = 1 << 7;
        /// In transaction
        const IN_TX = 1 << 8;
        /// Not in transaction
        const NO_TX = 1 << 9;
        /// Conditional branches
        const COND = 1 << 10;
        /// Call/ret stack
        const CALL_STACK = 1 << 11;
        /// Indirect jumps
        const IND_JUMP = 1 << 12;
        /// Direct call
        const CALL = 1 << 13;
        /// Don't set branch flags
        const NO_FLAGS = 1 << 14;
        /// Don't set branch cycles
        const NO_CYCLES = 1 << 15;
        /// Do set the branch type
        const TYPE_SAVE = 1 << 16;
        /// Samples carry the low-level branch hardware index
        const HW_INDEX = 1 << 17;
    }
}

bitflags! {
    /// The type of access that triggers a hardware breakpoint event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HwBreakpointType: u32 {
        const R = 1 << 0;
        const W = 1 << 1;
        const X = 1 << 2;
    }
}

/// The precision of instruction pointers recorded by an event. This can
/// vary depending on the exact method used to capture IPs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpPrecision {
    #[default]
    ArbitrarySkid,
    ConstantSkid,
    TryZeroSkid,
    ZeroSkid,
}

impl IpPrecision {
    fn from_flag_bits(bits: u64) -> Self {
        match bits {
            1 => Self::ConstantSkid,
            2 => Self::TryZeroSkid,
            3 => Self::ZeroSkid,
            _ => Self::ArbitrarySkid,
        }
    }
}

/// The sampling policy of an event: a fixed period in event counts, a
/// target rate in samples per second, or plain counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingPolicy {
    /// The event is a count, not a sampling event.
    NoSampling,
    /// A sample is taken every `N` events.
    Period(NonZeroU64),
    /// Samples are taken at approximately this rate per second per core,
    /// by letting the kernel adjust the period dynamically.
    Frequency(u64),
}

/// When user space is woken up to consume the ring buffer: every N sample
/// records, or every N bytes of any record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeupPolicy {
    EventCount(u32),
    Watermark(u32),
}

/// PMU type ID, selecting which PMU instance observes a hardware event on
/// hybrid machines. Zero means all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmuTypeId(pub u32);

/// The event being counted or sampled, with its kind-specific configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A hardware event. (`PERF_TYPE_HARDWARE`)
    Hardware(HardwareEventId, PmuTypeId),
    /// A kernel software event. (`PERF_TYPE_SOFTWARE`)
    Software(SoftwareCounterId),
    /// A tracepoint event; the id comes from debugfs. (`PERF_TYPE_TRACEPOINT`)
    Tracepoint(u64),
    /// A hardware cache event. (`PERF_TYPE_HW_CACHE`)
    HwCache(
        HardwareCacheId,
        HardwareCacheOp,
        HardwareCacheOpResult,
        PmuTypeId,
    ),
    /// A hardware breakpoint: an access type, an address, and a length.
    /// (`PERF_TYPE_BREAKPOINT`)
    ///
    /// This is the only event kind that claims the two trailing config
    /// slots; for every other kind they extend the config value.
    Breakpoint(HwBreakpointType, u64, u64),
    /// A dynamic PMU event: `(pmu, config, config1, config2)`.
    ///
    /// `PERF_TYPE_RAW` is handled as part of this; the "raw" type id 4 is
    /// just the usual id of the core CPU PMU.
    DynamicPmu(u32, u64, u64, u64),
}

impl EventKind {
    pub fn parse(
        type_: u32,
        bp_type: u32,
        config: u64,
        config1: u64,
        config2: u64,
    ) -> Option<Self> {
        let kind = match type_ {
            PERF_TYPE_HARDWARE => {
                // Config format: 0xEEEEEEEE000000AA where AA is the hardware
                // event ID and EEEEEEEE the PMU type ID.
                let id = HardwareEventId::parse((config & 0xff) as u8)?;
                Self::Hardware(id, PmuTypeId((config >> 32) as u32))
            }
            PERF_TYPE_SOFTWARE => Self::Software(SoftwareCounterId::parse(config)?),
            PERF_TYPE_TRACEPOINT => Self::Tracepoint(config),
            PERF_TYPE_HW_CACHE => {
                // Config format: 0xEEEEEEEE00DDCCBB with cache ID, op, and
                // result in the low bytes.
                let cache = HardwareCacheId::parse(config as u8)?;
                let op = HardwareCacheOp::parse((config >> 8) as u8)?;
                let result = HardwareCacheOpResult::parse((config >> 16) as u8)?;
                Self::HwCache(cache, op, result, PmuTypeId((config >> 32) as u32))
            }
            PERF_TYPE_BREAKPOINT => Self::Breakpoint(
                HwBreakpointType::from_bits_truncate(bp_type),
                config1,
                config2,
            ),
            _ => Self::DynamicPmu(type_, config, config1, config2),
        };
        Some(kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum HardwareEventId {
    CpuCycles,
    Instructions,
    CacheReferences,
    CacheMisses,
    BranchInstructions,
    BranchMisses,
    BusCycles,
    StalledCyclesFrontend,
    StalledCyclesBackend,
    RefCpuCycles,
}

impl HardwareEventId {
    pub fn parse(id: u8) -> Option<Self> {
        let t = match id {
            0 => Self::CpuCycles,
            1 => Self::Instructions,
            2 => Self::CacheReferences,
            3 => Self::CacheMisses,
            4 => Self::BranchInstructions,
            5 => Self::BranchMisses,
            6 => Self::BusCycles,
            7 => Self::StalledCyclesFrontend,
            8 => Self::StalledCyclesBackend,
            9 => Self::RefCpuCycles,
            _ => return None,
        };
        Some(t)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SoftwareCounterId {
    CpuClock,
    TaskClock,
    PageFaults,
    ContextSwitches,
    CpuMigrations,
    PageFaultsMin,
    PageFaultsMaj,
    AlignmentFaults,
    EmulationFaults,
    Dummy,
    BpfOutput,
    CgroupSwitches,
}

impl SoftwareCounterId {
    pub fn parse(config: u64) -> Option<Self> {
        let t = match config {
            0 => Self::CpuClock,
            1 => Self::TaskClock,
            2 => Self::PageFaults,
            3 => Self::ContextSwitches,
            4 => Self::CpuMigrations,
            5 => Self::PageFaultsMin,
            6 => Self::PageFaultsMaj,
            7 => Self::AlignmentFaults,
            8 => Self::EmulationFaults,
            9 => Self::Dummy,
            10 => Self::BpfOutput,
            11 => Self::CgroupSwitches,
            _ => return None,
        };
        Some(t)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum HardwareCacheId {
    L1d,
    L1i,
    Ll,
    Dtlb,
    Itlb,
    Bpu,
    Node,
}

impl HardwareCacheId {
    pub fn parse(id: u8) -> Option<Self> {
        let t = match id {
            0 => Self::L1d,
            1 => Self::L1i,
            2 => Self::Ll,
            3 => Self::Dtlb,
            4 => Self::Itlb,
            5 => Self::Bpu,
            6 => Self::Node,
            _ => return None,
        };
        Some(t)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareCacheOp {
    Read,
    Write,
    Prefetch,
}

impl HardwareCacheOp {
    pub fn parse(op: u8) -> Option<Self> {
        match op {
            0 => Some(Self::Read),
            1 => Some(Self::Write),
            2 => Some(Self::Prefetch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareCacheOpResult {
    Access,
    Miss,
}

impl HardwareCacheOpResult {
    pub fn parse(result: u8) -> Option<Self> {
        match result {
            0 => Some(Self::Access),
            1 => Some(Self::Miss),
            _ => None,
        }
    }
}

/// An event and how that event should be recorded. (`perf_event_attr`)
///
/// The on-disk structure has been extended seven times; a single in-memory
/// struct holds the union of all versions and fields absent from older
/// files are zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventAttr {
    /// The event that was counted or sampled.
    pub event: EventKind,

    /// How often samples were taken.
    pub sampling: SamplingPolicy,

    /// Which fields each sample of this event carries.
    pub sample_format: SampleFormat,

    /// Which fields each counter readout carries.
    pub read_format: ReadFormat,

    /// Boolean properties, with the precise_ip bits masked out.
    pub flags: AttrFlags,

    /// Precision of the recorded instruction pointers.
    pub precise: IpPrecision,

    /// When user space was woken to collect the ring buffer.
    pub wakeup: WakeupPolicy,

    /// The branches recorded in the branch stack, if
    /// `sample_format` contains `BRANCH_STACK`.
    pub branch_sample_format: BranchSampleFormat,

    /// Bitmask of user-space registers captured at each sample.
    pub sample_regs_user: u64,

    /// Size of the user stack snapshot captured at each sample.
    pub sample_stack_user: u32,

    /// Bitmask of registers captured at each sample at interrupt time, or
    /// at the sampled instruction for precise events.
    pub sample_regs_intr: u64,

    /// Watermark for the AUX area in bytes.
    pub aux_watermark: u32,

    /// Maximum number of frame pointers in a callchain.
    pub sample_max_stack: u16,

    /// Size of AUX area samples included via `SampleFormat::AUX`.
    pub aux_sample_size: u32,

    /// User-provided data passed back in sigcontext when SIGTRAP is used.
    pub sig_data: u64,
}

/// Incremental reader for the versioned tail of a `perf_event_attr`.
/// Fields beyond the declared size stay zero.
struct AttrTail<'b, 'a> {
    bd: &'b mut BufDecoder<'a>,
    remaining: i64,
}

impl AttrTail<'_, '_> {
    fn u64(&mut self) -> Result<u64, ReadError> {
        if self.remaining <= 0 {
            return Ok(0);
        }
        self.remaining -= 8;
        self.bd.u64()
    }

    fn u32(&mut self) -> Result<u32, ReadError> {
        if self.remaining <= 0 {
            return Ok(0);
        }
        self.remaining -= 4;
        self.bd.u32()
    }

    fn u16(&mut self) -> Result<u16, ReadError> {
        if self.remaining <= 0 {
            return Ok(0);
        }
        self.remaining -= 2;
        self.bd.u16()
    }
}

impl EventAttr {
    /// Parses one on-disk `perf_event_attr`, advancing `bd` by exactly the
    /// attr's declared size. Returns the attr and that size.
    pub(crate) fn parse(bd: &mut BufDecoder) -> Result<(Self, u32), Error> {
        let type_ = bd.u32().map_err(Error::Read)?;
        let mut size = bd.u32().map_err(Error::Read)?;
        if size == 0 {
            // Ancient files predate the size field; assume ABI v0.
            size = PERF_ATTR_SIZE_VER0;
        }
        if size < PERF_ATTR_SIZE_VER0 {
            return Err(Error::BadAttrSize(size as u64));
        }
        if size > PERF_ATTR_SIZE_VER7 {
            return Err(Error::EventAttrTooLarge(size));
        }

        let mut body = BufDecoder::new(bd.take(size as usize - 8)?, ReadError::EventAttr);

        let config = body.u64()?;
        let period_or_freq = body.u64()?;
        let sample_format = SampleFormat::from_bits_truncate(body.u64()?);
        let read_format = ReadFormat::from_bits_truncate(body.u64()?);
        let raw_flags = body.u64()?;
        let wakeup_value = body.u32()?;
        let bp_type = body.u32()?;
        let config1 = body.u64()?;

        let mut tail = AttrTail {
            bd: &mut body,
            remaining: size as i64 - PERF_ATTR_SIZE_VER0 as i64,
        };
        let config2 = tail.u64()?; // ABI v1
        let branch_sample_type = tail.u64()?; // ABI v2
        let sample_regs_user = tail.u64()?; // ABI v3
        let sample_stack_user = tail.u32()?;
        let _clock_id = tail.u32()?;
        let sample_regs_intr = tail.u64()?; // ABI v4
        let aux_watermark = tail.u32()?; // ABI v5
        let sample_max_stack = tail.u16()?;
        let _pad = tail.u16()?;
        let aux_sample_size = tail.u32()?; // ABI v6
        let _pad2 = tail.u32()?;
        let sig_data = tail.u64()?; // ABI v7

        let flags = AttrFlags::from_bits_truncate(raw_flags & !ATTR_FLAG_PRECISE_MASK);
        let precise = IpPrecision::from_flag_bits(
            (raw_flags & ATTR_FLAG_PRECISE_MASK) >> ATTR_FLAG_PRECISE_SHIFT,
        );

        let event = EventKind::parse(type_, bp_type, config, config1, config2)
            .ok_or(Error::BadEventConfig)?;

        let sampling = if flags.contains(AttrFlags::FREQ) {
            SamplingPolicy::Frequency(period_or_freq)
        } else if let Some(period) = NonZeroU64::new(period_or_freq) {
            SamplingPolicy::Period(period)
        } else {
            SamplingPolicy::NoSampling
        };

        let wakeup = if flags.contains(AttrFlags::WAKEUP_WATERMARK) {
            WakeupPolicy::Watermark(wakeup_value)
        } else {
            WakeupPolicy::EventCount(wakeup_value)
        };

        Ok((
            Self {
                event,
                sampling,
                sample_format,
                read_format,
                flags,
                precise,
                wakeup,
                branch_sample_format: BranchSampleFormat::from_bits_truncate(branch_sample_type),
                sample_regs_user,
                sample_stack_user,
                sample_regs_intr,
                aux_watermark,
                sample_max_stack,
                aux_sample_size,
                sig_data,
            },
            size,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr_bytes(size: u32, flags: u64) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0u32.to_le_bytes()); // PERF_TYPE_HARDWARE
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes()); // config: cpu-cycles
        out.extend_from_slice(&4000u64.to_le_bytes()); // period or freq
        out.extend_from_slice(&SampleFormat::IP.bits().to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes()); // read format
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes()); // wakeup
        out.extend_from_slice(&0u32.to_le_bytes()); // bp_type
        out.extend_from_slice(&0u64.to_le_bytes()); // config1
        let padding = size as usize - out.len().min(size as usize);
        out.extend(std::iter::repeat(0).take(padding));
        out
    }

    #[test]
    fn size_zero_is_v0() {
        let data = attr_bytes(0, 0);
        // size 0 in the struct, but v0-sized on disk
        let mut data = data;
        data.truncate(64);
        let mut bd = BufDecoder::new(&data, ReadError::EventAttr);
        let (attr, size) = EventAttr::parse(&mut bd).unwrap();
        assert_eq!(size, PERF_ATTR_SIZE_VER0);
        assert_eq!(bd.remaining(), 0);
        assert_eq!(
            attr.sampling,
            SamplingPolicy::Period(NonZeroU64::new(4000).unwrap())
        );
        assert_eq!(attr.wakeup, WakeupPolicy::EventCount(1));
        assert_eq!(attr.sample_format, SampleFormat::IP);
    }

    #[test]
    fn newer_fields_default_to_zero() {
        let data = attr_bytes(PERF_ATTR_SIZE_VER2, 0);
        let mut bd = BufDecoder::new(&data, ReadError::EventAttr);
        let (attr, _) = EventAttr::parse(&mut bd).unwrap();
        assert_eq!(attr.sample_regs_user, 0);
        assert_eq!(attr.sample_max_stack, 0);
        assert_eq!(attr.sig_data, 0);
    }

    #[test]
    fn too_large_size_is_fatal() {
        let data = attr_bytes(PERF_ATTR_SIZE_VER7 + 8, 0);
        let mut bd = BufDecoder::new(&data, ReadError::EventAttr);
        assert!(matches!(
            EventAttr::parse(&mut bd),
            Err(Error::EventAttrTooLarge(_))
        ));
    }

    #[test]
    fn precise_bits_are_split_out() {
        let flags = AttrFlags::FREQ.bits() | (2 << 15) | AttrFlags::SAMPLE_ID_ALL.bits();
        let data = attr_bytes(PERF_ATTR_SIZE_VER0, flags);
        let mut bd = BufDecoder::new(&data, ReadError::EventAttr);
        let (attr, _) = EventAttr::parse(&mut bd).unwrap();
        assert_eq!(attr.precise, IpPrecision::TryZeroSkid);
        assert!(attr.flags.contains(AttrFlags::SAMPLE_ID_ALL));
        assert_eq!(attr.flags.bits() & ATTR_FLAG_PRECISE_MASK, 0);
        assert_eq!(attr.sampling, SamplingPolicy::Frequency(4000));
    }

    #[test]
    fn breakpoint_claims_config_slots() {
        let mut out = Vec::new();
        out.extend_from_slice(&PERF_TYPE_BREAKPOINT.to_le_bytes());
        out.extend_from_slice(&PERF_ATTR_SIZE_VER1.to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&HwBreakpointType::W.bits().to_le_bytes());
        out.extend_from_slice(&0x1000u64.to_le_bytes()); // bp_addr
        out.extend_from_slice(&8u64.to_le_bytes()); // bp_len
        let mut bd = BufDecoder::new(&out, ReadError::EventAttr);
        let (attr, _) = EventAttr::parse(&mut bd).unwrap();
        assert_eq!(
            attr.event,
            EventKind::Breakpoint(HwBreakpointType::W, 0x1000, 8)
        );
    }

    #[test]
    fn id_offsets() {
        let f = SampleFormat::IP | SampleFormat::TID | SampleFormat::TIME | SampleFormat::ID;
        assert_eq!(f.sample_id_offset(), Some(24));
        assert_eq!(f.record_id_offset(), Some(-8));
        assert_eq!(f.trailer_bytes(), 8 * 3);

        let f = SampleFormat::IDENTIFIER | SampleFormat::IP;
        assert_eq!(f.sample_id_offset(), Some(0));
        assert_eq!(f.record_id_offset(), Some(-8));

        let f = SampleFormat::IP | SampleFormat::TIME;
        assert_eq!(f.sample_id_offset(), None);
        assert_eq!(f.record_id_offset(), None);

        let f = SampleFormat::ID | SampleFormat::CPU | SampleFormat::STREAM_ID;
        assert_eq!(f.record_id_offset(), Some(-24));
    }
}
