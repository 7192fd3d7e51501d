use bitflags::bitflags;

use std::fmt;
use std::sync::Arc;

use crate::attr::{EventAttr, SampleFormat};
use crate::datasrc::DataSrc;

/// A record type code from a record header in the data stream.
///
/// Codes below [`RecordType::USER_START`] are written by the kernel;
/// higher codes are synthesized by the perf tool.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordType(pub u32);

impl RecordType {
    pub const MMAP: Self = Self(1);
    pub const LOST: Self = Self(2);
    pub const COMM: Self = Self(3);
    pub const EXIT: Self = Self(4);
    pub const THROTTLE: Self = Self(5);
    pub const UNTHROTTLE: Self = Self(6);
    pub const FORK: Self = Self(7);
    pub const READ: Self = Self(8);
    pub const SAMPLE: Self = Self(9);
    pub const MMAP2: Self = Self(10);
    pub const AUX: Self = Self(11);
    pub const ITRACE_START: Self = Self(12);
    pub const LOST_SAMPLES: Self = Self(13);
    pub const SWITCH: Self = Self(14);
    pub const SWITCH_CPU_WIDE: Self = Self(15);
    pub const NAMESPACES: Self = Self(16);
    pub const KSYMBOL: Self = Self(17);
    pub const BPF_EVENT: Self = Self(18);
    pub const CGROUP: Self = Self(19);
    pub const TEXT_POKE: Self = Self(20);
    pub const AUX_OUTPUT_HW_ID: Self = Self(21);

    /// First record type reserved for the user-space perf tool.
    pub const USER_START: Self = Self(64);

    pub const AUXTRACE_INFO: Self = Self(70);
    pub const AUXTRACE: Self = Self(71);

    /// Whether this type is written by the kernel (as opposed to being
    /// synthesized by the perf tool).
    pub fn is_kernel_type(&self) -> bool {
        self.0 < Self::USER_START.0
    }
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::MMAP => "MMAP".fmt(f),
            Self::LOST => "LOST".fmt(f),
            Self::COMM => "COMM".fmt(f),
            Self::EXIT => "EXIT".fmt(f),
            Self::THROTTLE => "THROTTLE".fmt(f),
            Self::UNTHROTTLE => "UNTHROTTLE".fmt(f),
            Self::FORK => "FORK".fmt(f),
            Self::READ => "READ".fmt(f),
            Self::SAMPLE => "SAMPLE".fmt(f),
            Self::MMAP2 => "MMAP2".fmt(f),
            Self::AUX => "AUX".fmt(f),
            Self::ITRACE_START => "ITRACE_START".fmt(f),
            Self::LOST_SAMPLES => "LOST_SAMPLES".fmt(f),
            Self::SWITCH => "SWITCH".fmt(f),
            Self::SWITCH_CPU_WIDE => "SWITCH_CPU_WIDE".fmt(f),
            Self::NAMESPACES => "NAMESPACES".fmt(f),
            Self::KSYMBOL => "KSYMBOL".fmt(f),
            Self::BPF_EVENT => "BPF_EVENT".fmt(f),
            Self::CGROUP => "CGROUP".fmt(f),
            Self::TEXT_POKE => "TEXT_POKE".fmt(f),
            Self::AUX_OUTPUT_HW_ID => "AUX_OUTPUT_HW_ID".fmt(f),
            Self::AUXTRACE_INFO => "AUXTRACE_INFO".fmt(f),
            Self::AUXTRACE => "AUXTRACE".fmt(f),
            _ => f.write_fmt(format_args!("Unknown RecordType {}", self.0)),
        }
    }
}

// PERF_RECORD_MISC_* bits from the record header misc word.
pub(crate) const MISC_CPUMODE_MASK: u16 = 7;
pub(crate) const MISC_MMAP_DATA: u16 = 1 << 13; // MMAP* records
pub(crate) const MISC_COMM_EXEC: u16 = 1 << 13; // COMM records
pub(crate) const MISC_SWITCH_OUT: u16 = 1 << 13; // SWITCH* records
pub(crate) const MISC_EXACT_IP: u16 = 1 << 14; // SAMPLE records
pub(crate) const MISC_SWITCH_OUT_PREEMPT: u16 = 1 << 14; // SWITCH* records
pub(crate) const MISC_MMAP_BUILD_ID: u16 = 1 << 14; // MMAP2 records

/// The privilege level of a sample or event, from the low bits of the
/// record header misc word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CpuMode {
    #[default]
    Unknown,
    Kernel,
    User,
    Hypervisor,
    GuestKernel,
    GuestUser,
}

impl CpuMode {
    pub fn from_misc(misc: u16) -> Self {
        match misc & MISC_CPUMODE_MASK {
            1 => Self::Kernel,
            2 => Self::User,
            3 => Self::Hypervisor,
            4 => Self::GuestKernel,
            5 => Self::GuestUser,
            _ => Self::Unknown,
        }
    }
}

// Special markers used in `RecordSample::callchain` to mark boundaries
// between types of stacks. The decoder surfaces them verbatim; callers
// switch stack type when walking the chain.
pub const CALLCHAIN_HV: u64 = 0xffff_ffff_ffff_ffe0; // -32
pub const CALLCHAIN_KERNEL: u64 = 0xffff_ffff_ffff_ff80; // -128
pub const CALLCHAIN_USER: u64 = 0xffff_ffff_ffff_fe00; // -512
pub const CALLCHAIN_GUEST: u64 = 0xffff_ffff_ffff_f800; // -2048
pub const CALLCHAIN_GUEST_KERNEL: u64 = 0xffff_ffff_ffff_f780; // -2176
pub const CALLCHAIN_GUEST_USER: u64 = 0xffff_ffff_ffff_f600; // -2560

/// Fields common to all record types, plus decode metadata.
///
/// Many fields are optional; a field is valid iff the corresponding bit of
/// `format` is set. Some record types guarantee that certain fields are
/// filled regardless of the event's sample format.
#[derive(Debug, Clone, Default)]
pub struct RecordCommon {
    /// Byte offset of this record in the perf.data file.
    pub offset: u64,

    /// The optional fields that are valid on this record.
    pub format: SampleFormat,

    /// The event associated with this record, if any.
    pub attr: Option<Arc<EventAttr>>,

    pub pid: i32, // if SampleFormat::TID
    pub tid: i32, // if SampleFormat::TID
    pub time: u64,      // if SampleFormat::TIME
    pub id: u64,        // if SampleFormat::ID or IDENTIFIER
    pub stream_id: u64, // if SampleFormat::STREAM_ID
    pub cpu: u32, // if SampleFormat::CPU
    pub res: u32, // if SampleFormat::CPU
}

/// A record from the data stream of a perf.data file.
///
/// Callers dispatch with a match; every variant exposes the shared fields
/// through [`Record::common`].
#[derive(Debug, Clone)]
pub enum Record {
    Mmap(RecordMmap),
    Lost(RecordLost),
    Comm(RecordComm),
    Exit(RecordExit),
    Throttle(RecordThrottle),
    Fork(RecordFork),
    Sample(RecordSample),
    Aux(RecordAux),
    ItraceStart(RecordItraceStart),
    LostSamples(RecordLostSamples),
    Switch(RecordSwitch),
    SwitchCpuWide(RecordSwitchCpuWide),
    Namespaces(RecordNamespaces),
    Ksymbol(RecordKsymbol),
    BpfEvent(RecordBpfEvent),
    Cgroup(RecordCgroup),
    TextPoke(RecordTextPoke),
    AuxOutputHardwareId(RecordAuxOutputHardwareId),
    AuxtraceInfo(RecordAuxtraceInfo),
    Auxtrace(RecordAuxtrace),
    Unknown(RecordUnknown),
}

impl Record {
    pub fn record_type(&self) -> RecordType {
        match self {
            Record::Mmap(_) => RecordType::MMAP,
            Record::Lost(_) => RecordType::LOST,
            Record::Comm(_) => RecordType::COMM,
            Record::Exit(_) => RecordType::EXIT,
            Record::Throttle(r) => {
                if r.enable {
                    RecordType::THROTTLE
                } else {
                    RecordType::UNTHROTTLE
                }
            }
            Record::Fork(_) => RecordType::FORK,
            Record::Sample(_) => RecordType::SAMPLE,
            Record::Aux(_) => RecordType::AUX,
            Record::ItraceStart(_) => RecordType::ITRACE_START,
            Record::LostSamples(_) => RecordType::LOST_SAMPLES,
            Record::Switch(_) => RecordType::SWITCH,
            Record::SwitchCpuWide(_) => RecordType::SWITCH_CPU_WIDE,
            Record::Namespaces(_) => RecordType::NAMESPACES,
            Record::Ksymbol(_) => RecordType::KSYMBOL,
            Record::BpfEvent(_) => RecordType::BPF_EVENT,
            Record::Cgroup(_) => RecordType::CGROUP,
            Record::TextPoke(_) => RecordType::TEXT_POKE,
            Record::AuxOutputHardwareId(_) => RecordType::AUX_OUTPUT_HW_ID,
            Record::AuxtraceInfo(_) => RecordType::AUXTRACE_INFO,
            Record::Auxtrace(_) => RecordType::AUXTRACE,
            Record::Unknown(r) => r.type_,
        }
    }

    pub fn common(&self) -> &RecordCommon {
        match self {
            Record::Mmap(r) => &r.common,
            Record::Lost(r) => &r.common,
            Record::Comm(r) => &r.common,
            Record::Exit(r) => &r.common,
            Record::Throttle(r) => &r.common,
            Record::Fork(r) => &r.common,
            Record::Sample(r) => &r.common,
            Record::Aux(r) => &r.common,
            Record::ItraceStart(r) => &r.common,
            Record::LostSamples(r) => &r.common,
            Record::Switch(r) => &r.common,
            Record::SwitchCpuWide(r) => &r.common,
            Record::Namespaces(r) => &r.common,
            Record::Ksymbol(r) => &r.common,
            Record::BpfEvent(r) => &r.common,
            Record::Cgroup(r) => &r.common,
            Record::TextPoke(r) => &r.common,
            Record::AuxOutputHardwareId(r) => &r.common,
            Record::AuxtraceInfo(r) => &r.common,
            Record::Auxtrace(r) => &r.common,
            Record::Unknown(r) => &r.common,
        }
    }
}

/// A record of unknown or unimplemented type. The header and raw payload
/// are preserved so callers can skip or inspect it.
#[derive(Debug, Clone, Default)]
pub struct RecordUnknown {
    pub common: RecordCommon,
    pub type_: RecordType,
    pub misc: u16,
    pub data: Vec<u8>,
}

impl Default for RecordType {
    fn default() -> Self {
        RecordType(0)
    }
}

/// A new virtual memory mapping in a profiled process. Mmap records also
/// occur at the beginning of a profile to describe the existing layout.
///
/// Covers both the MMAP and MMAP2 on-disk shapes; the MMAP2 extras are
/// zero / `None` for plain MMAP records.
#[derive(Debug, Clone, Default)]
pub struct RecordMmap {
    /// `pid` and `tid` are always filled.
    pub common: RecordCommon,

    /// The mapping is for data, not executable code. (from header misc)
    pub data: bool,

    /// Virtual address of the start of the mapping.
    pub addr: u64,
    /// Length of the mapping in bytes.
    pub len: u64,
    /// Byte offset in the mapped file of the beginning of the mapping.
    /// (perf calls this "pgoff", but it is in bytes.)
    pub file_offset: u64,

    pub major: u32, // if build_id is None
    pub minor: u32,
    pub ino: u64,
    pub ino_generation: u64,

    /// Build ID of the mapped file, for MMAP2 records written with the
    /// build-ID misc flag. Replaces the device/inode fields.
    pub build_id: Option<Vec<u8>>,

    pub prot: u32,
    pub flags: u32,
    pub filename: String,
}

/// Profiling events were lost because of a ring buffer overflow.
#[derive(Debug, Clone, Default)]
pub struct RecordLost {
    /// `id` and `attr` are always filled.
    pub common: RecordCommon,

    pub num_lost: u64,
}

/// A process set its command name, typically on exec. Comm records also
/// occur at the beginning of a profile to describe existing processes.
#[derive(Debug, Clone, Default)]
pub struct RecordComm {
    /// `pid` and `tid` are always filled.
    pub common: RecordCommon,

    /// The name change came from exec. (from header misc)
    pub exec: bool,

    pub comm: String,
}

/// A process or thread exited.
#[derive(Debug, Clone, Default)]
pub struct RecordExit {
    /// `pid`, `tid` and `time` are always filled.
    pub common: RecordCommon,

    pub ppid: i32,
    pub ptid: i32,
}

/// Interrupt throttling was enabled or disabled.
#[derive(Debug, Clone, Default)]
pub struct RecordThrottle {
    /// `time`, `id`, `stream_id` and `attr` are always filled.
    pub common: RecordCommon,

    /// Throttling was enabled; otherwise it was disabled again.
    pub enable: bool,
}

/// A process called clone, either forking or creating a thread.
#[derive(Debug, Clone, Default)]
pub struct RecordFork {
    /// `pid`, `tid` and `time` are always filled.
    pub common: RecordCommon,

    pub ppid: i32,
    pub ptid: i32,
}

bitflags! {
    /// Flags of a [`RecordAux`], minus the PMU-specific format bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AuxFlags: u64 {
        /// Record was truncated to fit in the ring buffer.
        const TRUNCATED = 1 << 0;
        /// AUX data was collected in overwrite mode.
        const OVERWRITE = 1 << 1;
        /// Record contains gaps.
        const PARTIAL = 1 << 2;
        /// Sample collided with another.
        const COLLISION = 1 << 3;
    }
}

/// Data was added to the AUX buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordAux {
    pub common: RecordCommon,

    pub offset: u64,
    pub size: u64,
    pub flags: AuxFlags,
    /// PMU-specific trace format, from bits 8..16 of the flags word.
    pub pmu_format: u8,
}

/// An instruction trace started.
#[derive(Debug, Clone, Default)]
pub struct RecordItraceStart {
    /// `pid` and `tid` are always filled.
    pub common: RecordCommon,
}

/// The number of dropped or lost samples.
#[derive(Debug, Clone, Default)]
pub struct RecordLostSamples {
    pub common: RecordCommon,

    pub lost: u64,
}

/// A context switch in or out of the monitored process.
#[derive(Debug, Clone, Default)]
pub struct RecordSwitch {
    pub common: RecordCommon,

    /// This is a switch out; otherwise a switch in.
    pub out: bool,
}

/// The CPU-wide variant of [`RecordSwitch`].
#[derive(Debug, Clone, Default)]
pub struct RecordSwitchCpuWide {
    pub common: RecordCommon,

    /// This is a switch out; otherwise a switch in.
    pub out: bool,
    /// The preempted thread was in TASK_RUNNING state, so the switch was
    /// involuntary.
    pub preempt: bool,
    /// The process being switched in or out.
    pub switch_pid: i32,
    pub switch_tid: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Namespace {
    pub dev: u64,
    pub inode: u64,
}

/// The namespaces of a process.
#[derive(Debug, Clone, Default)]
pub struct RecordNamespaces {
    /// `pid` and `tid` are always filled.
    pub common: RecordCommon,

    pub namespaces: Vec<Namespace>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KsymbolType {
    #[default]
    Unknown,
    Bpf,
    Ool,
}

impl KsymbolType {
    pub(crate) fn from_u16(v: u16) -> Self {
        match v {
            1 => Self::Bpf,
            2 => Self::Ool,
            _ => Self::Unknown,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct KsymbolFlags: u16 {
        /// The symbol was unregistered.
        const UNREGISTER = 1 << 0;
    }
}

/// Kernel symbol register/unregister information, for dynamically loaded
/// or JITed kernel functions.
#[derive(Debug, Clone, Default)]
pub struct RecordKsymbol {
    pub common: RecordCommon,

    pub addr: u64,
    pub len: u32,
    pub ksym_type: KsymbolType,
    pub flags: KsymbolFlags,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BpfEventType {
    #[default]
    Unknown,
    ProgLoad,
    ProgUnload,
}

impl BpfEventType {
    pub(crate) fn from_u16(v: u16) -> Self {
        match v {
            1 => Self::ProgLoad,
            2 => Self::ProgUnload,
            _ => Self::Unknown,
        }
    }
}

/// BPF program load/unload information.
#[derive(Debug, Clone, Default)]
pub struct RecordBpfEvent {
    pub common: RecordCommon,

    pub event_type: BpfEventType,
    pub flags: u16,
    pub id: u32,
    pub tag: [u8; 8],
}

/// The association between a cgroup id and its path.
#[derive(Debug, Clone, Default)]
pub struct RecordCgroup {
    pub common: RecordCommon,

    pub id: u64,
    pub path: String,
}

/// A single-instruction change to the kernel text: the modified address
/// and the old and new code bytes.
#[derive(Debug, Clone, Default)]
pub struct RecordTextPoke {
    pub common: RecordCommon,

    pub addr: u64,
    pub old: Vec<u8>,
    pub new: Vec<u8>,
}

/// An architecture-specific hardware ID associated with the AUX data for
/// an event, e.g. to disambiguate PEBS event types under PEBS-via-PT.
#[derive(Debug, Clone, Default)]
pub struct RecordAuxOutputHardwareId {
    pub common: RecordCommon,

    pub hw_id: u64,
}

/// Describes how to decode subsequent [`RecordAuxtrace`] payloads.
#[derive(Debug, Clone, Default)]
pub struct RecordAuxtraceInfo {
    pub common: RecordCommon,

    pub kind: u32,
    pub priv_data: Vec<u64>,
}

/// A block of raw AUX trace data. Only the envelope is decoded; the
/// payload encoding depends on the latest [`RecordAuxtraceInfo`].
#[derive(Debug, Clone, Default)]
pub struct RecordAuxtrace {
    pub common: RecordCommon,

    /// Byte offset of this data in the AUX mmap. Not meaningful in
    /// perf.data files.
    pub offset: u64,
    /// Unique identifier for this auxtrace block.
    pub reference: u64,
    /// Index of the AUX mmap region of this data.
    pub idx: u32,
    pub tid: i32,
    pub cpu: u32,
    /// The raw trace bytes; these follow the record on disk, beyond the
    /// length declared in the record header.
    pub data: Vec<u8>,
}

/// The register ABI of a sample, for architectures with more than one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleRegsAbi {
    #[default]
    None,
    Abi32,
    Abi64,
    Other(u64),
}

impl SampleRegsAbi {
    pub(crate) fn from_u64(v: u64) -> Self {
        match v {
            0 => Self::None,
            1 => Self::Abi32,
            2 => Self::Abi64,
            other => Self::Other(other),
        }
    }
}

/// The raw value of one event counter readout.
///
/// Which fields are set is determined by the event's [`crate::ReadFormat`].
#[derive(Debug, Clone, Default)]
pub struct Count {
    pub value: u64,
    pub time_enabled: u64, // if ReadFormat::TOTAL_TIME_ENABLED
    pub time_running: u64, // if ReadFormat::TOTAL_TIME_RUNNING
    pub attr: Option<Arc<EventAttr>>, // if ReadFormat::ID
}

bitflags! {
    /// Flags of one [`BranchEntry`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BranchFlags: u8 {
        /// Branch target was mispredicted.
        const MISPREDICTED = 1 << 0;
        /// Branch target was predicted. When prediction information is
        /// unavailable, neither flag is set.
        const PREDICTED = 1 << 1;
        /// The branch occurred in a transaction.
        const IN_TRANSACTION = 1 << 2;
        /// The branch was a transaction abort.
        const ABORT = 1 << 3;
    }
}

/// The type of the branch instruction, as classified by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BranchType {
    #[default]
    Unknown,
    Cond,
    Uncond,
    Ind,
    Call,
    IndCall,
    Ret,
    Syscall,
    Sysret,
    CondCall,
    CondRet,
    Eret,
    Irq,
    Other(u8),
}

impl BranchType {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Unknown,
            1 => Self::Cond,
            2 => Self::Uncond,
            3 => Self::Ind,
            4 => Self::Call,
            5 => Self::IndCall,
            6 => Self::Ret,
            7 => Self::Syscall,
            8 => Self::Sysret,
            9 => Self::CondCall,
            10 => Self::CondRet,
            11 => Self::Eret,
            12 => Self::Irq,
            other => Self::Other(other),
        }
    }
}

/// A single branching event from a sample's branch stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct BranchEntry {
    pub from: u64,
    pub to: u64,
    pub flags: BranchFlags,
    /// Cycle count to the last branch, or 0.
    pub cycles: u16,
    /// Only set if the event's branch sample format has `TYPE_SAVE`.
    pub branch_type: BranchType,
}

bitflags! {
    /// Transaction state of a sample. The abort code lives in the high
    /// half of the on-disk word and is surfaced separately.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Transaction: u32 {
        /// From elision
        const ELISION = 1 << 0;
        /// From transaction
        const TRANSACTION = 1 << 1;
        /// Instruction is related
        const SYNC = 1 << 2;
        /// Instruction is not related
        const ASYNC = 1 << 3;
        /// Retry possible
        const RETRY = 1 << 4;
        /// Conflict abort
        const CONFLICT = 1 << 5;
        /// Capacity write abort
        const CAPACITY_WRITE = 1 << 6;
        /// Capacity read abort
        const CAPACITY_READ = 1 << 7;
    }
}

/// The three packed sub-fields of a structured sample weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Weights {
    pub var1: u32,
    pub var2: u16,
    pub var3: u16,
}

impl Weights {
    /// The kernel memcpys the union out as a single u64, so the split is
    /// done with shifts rather than byte offsets.
    pub(crate) fn from_u64(w: u64) -> Self {
        Self {
            var1: w as u32,
            var2: (w >> 32) as u16,
            var3: (w >> 48) as u16,
        }
    }
}

/// A profiling sample.
///
/// Typically only a subset of the fields is used; which ones can be
/// determined from `common.format`.
#[derive(Debug, Clone, Default)]
pub struct RecordSample {
    /// `attr` is always filled; `format` describes the optional fields of
    /// this record, including the optional common fields.
    pub common: RecordCommon,

    pub cpu_mode: CpuMode, // from header misc
    /// The sample IP points at the exact instruction that triggered the
    /// event. (from header misc)
    pub exact_ip: bool,

    pub ip: u64,   // if SampleFormat::IP
    pub addr: u64, // if SampleFormat::ADDR

    /// The number of events on this CPU until the next sample. Fixed in
    /// period sampling mode, dynamically adjusted in frequency mode.
    pub period: u64, // if SampleFormat::PERIOD

    /// Raw event counter values; more than one element for event groups.
    pub read: Vec<Count>, // if SampleFormat::READ

    /// The call stack of the sampled instruction, innermost frame first.
    /// The chain may span several stacks; each stack's frames are preceded
    /// by one of the `CALLCHAIN_*` sentinel values.
    pub callchain: Vec<u64>, // if SampleFormat::CALLCHAIN

    /// Raw tracepoint data.
    pub raw: Vec<u8>, // if SampleFormat::RAW

    /// The low-level index of the raw hardware branch record (e.g. LBR)
    /// for `branch_stack[0]`, or -1 if unknown. Useful for stitching
    /// stacks across samples.
    pub branch_hw_index: i64, // if BranchSampleFormat::HW_INDEX

    pub branch_stack: Vec<BranchEntry>, // if SampleFormat::BRANCH_STACK

    /// ABI and values of the user-space registers as of this sample.
    /// `regs_user[i]` is the register at the i-th set bit of the event's
    /// `sample_regs_user`, even when the sample itself is in the kernel.
    pub regs_user_abi: SampleRegsAbi, // if SampleFormat::REGS_USER
    pub regs_user: Vec<u64>,

    /// ABI and values of the sampled registers; unlike `regs_user` these
    /// can be kernel registers.
    pub regs_intr_abi: SampleRegsAbi, // if SampleFormat::REGS_INTR
    pub regs_intr: Vec<u64>,

    pub stack_user: Vec<u8>, // if SampleFormat::STACK_USER
    pub stack_user_dyn_size: u64,

    pub weight: u64, // if SampleFormat::WEIGHT or WEIGHT_STRUCT
    pub weights: Weights, // if SampleFormat::WEIGHT_STRUCT

    pub data_src: DataSrc, // if SampleFormat::DATA_SRC

    pub transaction: Transaction, // if SampleFormat::TRANSACTION
    pub abort_code: u32,

    pub phys_addr: u64, // if SampleFormat::PHYS_ADDR

    pub cgroup: u64, // if SampleFormat::CGROUP

    pub data_page_size: u64, // if SampleFormat::DATA_PAGE_SIZE
    pub code_page_size: u64, // if SampleFormat::CODE_PAGE_SIZE

    /// A snapshot of the AUX area.
    pub aux: Vec<u8>, // if SampleFormat::AUX
}

impl RecordSample {
    /// The names of the valid fields of this sample, based on
    /// `common.format`. Useful for custom printing.
    pub fn fields(&self) -> Vec<&'static str> {
        let f = self.common.format;
        let mut fs = vec!["Offset", "Format", "EventAttr", "CpuMode", "ExactIP"];
        if f.intersects(SampleFormat::ID | SampleFormat::IDENTIFIER) {
            fs.push("ID");
        }
        if f.contains(SampleFormat::IP) {
            fs.push("IP");
        }
        if f.contains(SampleFormat::TID) {
            fs.push("PID");
            fs.push("TID");
        }
        if f.contains(SampleFormat::TIME) {
            fs.push("Time");
        }
        if f.contains(SampleFormat::ADDR) {
            fs.push("Addr");
        }
        if f.contains(SampleFormat::STREAM_ID) {
            fs.push("StreamID");
        }
        if f.contains(SampleFormat::CPU) {
            fs.push("CPU");
            fs.push("Res");
        }
        if f.contains(SampleFormat::PERIOD) {
            fs.push("Period");
        }
        if f.contains(SampleFormat::READ) {
            fs.push("Read");
        }
        if f.contains(SampleFormat::CALLCHAIN) {
            fs.push("Callchain");
        }
        if f.contains(SampleFormat::RAW) {
            fs.push("Raw");
        }
        if f.contains(SampleFormat::BRANCH_STACK) {
            fs.push("BranchStack");
        }
        if f.contains(SampleFormat::REGS_USER) {
            fs.push("RegsUserABI");
            fs.push("RegsUser");
        }
        if f.contains(SampleFormat::STACK_USER) {
            fs.push("StackUser");
            fs.push("StackUserDynSize");
        }
        if f.contains(SampleFormat::WEIGHT) {
            fs.push("Weight");
        }
        if f.contains(SampleFormat::DATA_SRC) {
            fs.push("DataSrc");
        }
        if f.contains(SampleFormat::TRANSACTION) {
            fs.push("Transaction");
            fs.push("AbortCode");
        }
        if f.contains(SampleFormat::REGS_INTR) {
            fs.push("RegsIntrABI");
            fs.push("RegsIntr");
        }
        if f.contains(SampleFormat::PHYS_ADDR) {
            fs.push("PhysAddr");
        }
        if f.contains(SampleFormat::AUX) {
            fs.push("Aux");
        }
        if f.contains(SampleFormat::CGROUP) {
            fs.push("CGroup");
        }
        if f.contains(SampleFormat::DATA_PAGE_SIZE) {
            fs.push("DataPageSize");
        }
        if f.contains(SampleFormat::CODE_PAGE_SIZE) {
            fs.push("CodePageSize");
        }
        if f.contains(SampleFormat::WEIGHT_STRUCT) {
            fs.push("Weights");
        }
        fs
    }

    /// Clears variable-length storage while keeping its capacity, so the
    /// iterator can reuse one sample across calls.
    pub(crate) fn clear(&mut self) {
        self.read.clear();
        self.callchain.clear();
        self.raw.clear();
        self.branch_stack.clear();
        self.regs_user.clear();
        self.regs_intr.clear();
        self.stack_user.clear();
        self.aux.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_split_by_shifts() {
        let w = Weights::from_u64(0x1234_5678_9abc_def0);
        assert_eq!(w.var1, 0x9abc_def0);
        assert_eq!(w.var2, 0x5678);
        assert_eq!(w.var3, 0x1234);
    }

    #[test]
    fn cpu_mode_from_misc() {
        assert_eq!(CpuMode::from_misc(1), CpuMode::Kernel);
        assert_eq!(CpuMode::from_misc(2 | MISC_EXACT_IP), CpuMode::User);
        assert_eq!(CpuMode::from_misc(7), CpuMode::Unknown);
    }

    #[test]
    fn sample_fields_track_format() {
        let mut sample = RecordSample::default();
        sample.common.format =
            SampleFormat::IP | SampleFormat::TID | SampleFormat::TIME | SampleFormat::PERIOD;
        assert_eq!(
            sample.fields(),
            vec![
                "Offset", "Format", "EventAttr", "CpuMode", "ExactIP", "IP", "PID", "TID", "Time",
                "Period"
            ]
        );
    }
}
