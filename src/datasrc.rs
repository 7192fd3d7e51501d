use bitflags::bitflags;

/// Structured decoding of the 64-bit memory-operation descriptor attached
/// to memory load/store samples. (`perf_mem_data_src`)
///
/// Each sub-field carries a low "not available" bit; the remaining bits
/// encode the value shifted up by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataSrc {
    pub op: DataSrcOp,
    /// If true, `level` specifies a miss rather than a hit.
    pub miss: bool,
    pub level: DataSrcLevel,
    pub snoop: DataSrcSnoop,
    pub locked: DataSrcLock,
    pub tlb: DataSrcTlb,
    pub level_num: DataSrcLevelNum,
    pub remote: bool,
    pub block: DataSrcBlock,
    pub hops: DataSrcHops,
}

bitflags! {
    /// The type of memory operation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DataSrcOp: u64 {
        const LOAD = 1 << 0;
        const STORE = 1 << 1;
        const PREFETCH = 1 << 2;
        const EXEC = 1 << 3;
    }
}

impl DataSrcOp {
    pub const NA: Self = Self::empty();
}

bitflags! {
    /// The memory hierarchy level that served the access.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DataSrcLevel: u64 {
        const L1 = 1 << 0;
        /// Line fill buffer
        const LFB = 1 << 1;
        const L2 = 1 << 2;
        const L3 = 1 << 3;
        /// Local DRAM
        const LOCAL_RAM = 1 << 4;
        /// Remote DRAM (1 hop)
        const REMOTE_RAM1 = 1 << 5;
        /// Remote DRAM (2 hops)
        const REMOTE_RAM2 = 1 << 6;
        /// Remote cache (1 hop)
        const REMOTE_CACHE1 = 1 << 7;
        /// Remote cache (2 hops)
        const REMOTE_CACHE2 = 1 << 8;
        /// I/O memory
        const IO = 1 << 9;
        const UNCACHED = 1 << 10;
    }
}

impl DataSrcLevel {
    pub const NA: Self = Self::empty();
}

bitflags! {
    /// Snoop status of the access.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DataSrcSnoop: u64 {
        const NONE = 1 << 0;
        const HIT = 1 << 1;
        const MISS = 1 << 2;
        /// Snoop hit modified
        const HIT_MODIFIED = 1 << 3;
        /// Forwarded from a peer, from the extended snoop bits.
        const FWD = 1 << 4;
    }
}

impl DataSrcSnoop {
    pub const NA: Self = Self::empty();
}

/// Whether the operation was part of a locked transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataSrcLock {
    #[default]
    Na,
    Unlocked,
    Locked,
}

bitflags! {
    /// TLB status of the access.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DataSrcTlb: u64 {
        const HIT = 1 << 0;
        const MISS = 1 << 1;
        const L1 = 1 << 2;
        const L2 = 1 << 3;
        const HARDWARE_WALKER = 1 << 4;
        const OS_FAULT_HANDLER = 1 << 5;
    }
}

impl DataSrcTlb {
    pub const NA: Self = Self::empty();
}

/// The cache level as a plain number, from the extended descriptor bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataSrcLevelNum {
    L1,
    L2,
    L3,
    L4,
    AnyCache,
    Lfb,
    Ram,
    Pmem,
    #[default]
    Na,
}

impl DataSrcLevelNum {
    fn from_bits(v: u64) -> Self {
        match v {
            0x01 => Self::L1,
            0x02 => Self::L2,
            0x03 => Self::L3,
            0x04 => Self::L4,
            0x0b => Self::AnyCache,
            0x0c => Self::Lfb,
            0x0d => Self::Ram,
            0x0e => Self::Pmem,
            _ => Self::Na,
        }
    }
}

bitflags! {
    /// Access blocked status.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DataSrcBlock: u64 {
        /// Data could not be forwarded.
        const DATA = 1 << 0;
        /// Address conflict.
        const ADDR = 1 << 1;
    }
}

impl DataSrcBlock {
    pub const NA: Self = Self::empty();
}

/// How far away the serving unit was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataSrcHops {
    #[default]
    Na,
    /// Remote core, same node
    Core,
    /// Remote node, same socket
    Node,
    /// Remote socket, same board
    Socket,
    /// Remote board
    Board,
}

impl DataSrcHops {
    fn from_bits(v: u64) -> Self {
        match v {
            0x01 => Self::Core,
            0x02 => Self::Node,
            0x03 => Self::Socket,
            0x04 => Self::Board,
            _ => Self::Na,
        }
    }
}

impl DataSrc {
    /// Unpacks the on-disk 64-bit descriptor.
    pub fn from_u64(d: u64) -> DataSrc {
        let mut out = DataSrc::default();

        let op = d & 0x1f;
        let lvl = (d >> 5) & 0x3fff;
        let snoop = (d >> 19) & 0x1f;
        let lock = (d >> 24) & 0x3;
        let dtlb = (d >> 26) & 0x7f;
        let lvl_num = (d >> 33) & 0xf;
        let remote = (d >> 37) & 0x1;
        let snoopx = (d >> 38) & 0x3;
        let blk = (d >> 40) & 0x7;
        let hops = (d >> 43) & 0x7;

        if op & 0x1 != 0 {
            out.op = DataSrcOp::NA;
        } else {
            out.op = DataSrcOp::from_bits_truncate(op >> 1);
        }

        if lvl & 0x1 != 0 {
            out.miss = false;
            out.level = DataSrcLevel::NA;
        } else {
            out.miss = lvl & 0x4 != 0;
            out.level = DataSrcLevel::from_bits_truncate(lvl >> 3);
        }

        if snoop & 0x1 != 0 {
            out.snoop = DataSrcSnoop::NA;
        } else {
            out.snoop = DataSrcSnoop::from_bits_truncate(snoop >> 1);
        }
        if snoopx & 0x1 != 0 {
            out.snoop |= DataSrcSnoop::FWD;
        }

        out.locked = if lock & 0x1 != 0 || lock == 0 {
            DataSrcLock::Na
        } else if lock & 0x2 != 0 {
            DataSrcLock::Locked
        } else {
            DataSrcLock::Unlocked
        };

        if dtlb & 0x1 != 0 {
            out.tlb = DataSrcTlb::NA;
        } else {
            out.tlb = DataSrcTlb::from_bits_truncate(dtlb >> 1);
        }

        if blk & 0x1 != 0 {
            out.block = DataSrcBlock::NA;
        } else {
            out.block = DataSrcBlock::from_bits_truncate(blk >> 1);
        }

        out.level_num = DataSrcLevelNum::from_bits(lvl_num);
        out.remote = remote != 0;
        out.hops = DataSrcHops::from_bits(hops);

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_marker() {
        let d = DataSrc::from_u64(0x64);
        assert_eq!(d.op, DataSrcOp::STORE);
        assert_eq!(d.level, DataSrcLevel::NA);
        assert_eq!(d.snoop, DataSrcSnoop::NA);
        assert_eq!(d.locked, DataSrcLock::Na);
        assert_eq!(d.tlb, DataSrcTlb::NA);
        assert!(!d.miss);
    }

    #[test]
    fn l1_load_hit() {
        // op = load, level = L1 hit, snoop = none, tlb = L1 hit
        let op = 0b00010u64; // LOAD << 1
        let lvl = (1u64 << 0) << 3; // L1, no miss bit, no NA bit
        let snoop = (1u64 << 0) << 1; // NONE
        let dtlb = ((1u64 << 0) | (1 << 2)) << 1; // HIT | L1
        let d = DataSrc::from_u64(op | (lvl << 5) | (snoop << 19) | (dtlb << 26));
        assert_eq!(d.op, DataSrcOp::LOAD);
        assert_eq!(d.level, DataSrcLevel::L1);
        assert!(!d.miss);
        assert_eq!(d.snoop, DataSrcSnoop::NONE);
        assert_eq!(d.tlb, DataSrcTlb::HIT | DataSrcTlb::L1);
    }

    #[test]
    fn miss_and_lock_bits() {
        // level field: miss bit + LOCAL_RAM, locked, remote, 2 hops
        let lvl = 0x4 | ((1u64 << 4) << 3);
        let lock = 0x2u64;
        let d = DataSrc::from_u64((lvl << 5) | (lock << 24) | (1 << 37) | (0x02 << 43));
        assert!(d.miss);
        assert_eq!(d.level, DataSrcLevel::LOCAL_RAM);
        assert_eq!(d.locked, DataSrcLock::Locked);
        assert!(d.remote);
        assert_eq!(d.hops, DataSrcHops::Node);
    }

    #[test]
    fn extended_fields() {
        // level_num = L3, snoopx fwd, block data
        let d = DataSrc::from_u64((0x03u64 << 33) | (0x1 << 38) | ((0x1 << 1) << 40));
        assert_eq!(d.level_num, DataSrcLevelNum::L3);
        assert!(d.snoop.contains(DataSrcSnoop::FWD));
        assert_eq!(d.block, DataSrcBlock::DATA);
    }
}
