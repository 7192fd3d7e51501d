use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek};
use std::sync::Arc;

use crate::meta::BuildIdInfo;
use crate::perf_file::PerfFile;
use crate::record::{Record, RecordMmap};

/// The PID under which kernel mappings are tracked.
pub const KERNEL_PID: i32 = -1;

/// Auxiliary state that can be attached to a session, process or mapping
/// and that knows how to follow a fork.
///
/// Values that are safe to share across processes (e.g. immutable symbol
/// tables) can return a shared handle from `fork`; mutable values must
/// return a deep copy.
pub trait Forkable: Any {
    /// Produces this value's counterpart for the child process `pid`.
    fn fork(&self, pid: i32) -> Box<dyn Forkable>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// An opaque identity token for a slot in a [`ForkableExtras`] bag.
///
/// Keys compare by identity: two keys created with the same name are
/// distinct. The name is only for diagnostics.
#[derive(Clone)]
pub struct ExtraKey(Arc<str>);

impl ExtraKey {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl PartialEq for ExtraKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ExtraKey {}

impl Hash for ExtraKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as *const u8 as usize).hash(state);
    }
}

impl fmt::Debug for ExtraKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExtraKey({})", self.name())
    }
}

/// A bag of caller-defined [`Forkable`] state, keyed by [`ExtraKey`].
#[derive(Default)]
pub struct ForkableExtras(HashMap<ExtraKey, Box<dyn Forkable>>);

impl ForkableExtras {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ExtraKey) -> Option<&dyn Forkable> {
        self.0.get(key).map(|value| &**value)
    }

    pub fn get_mut(&mut self, key: &ExtraKey) -> Option<&mut dyn Forkable> {
        self.0.get_mut(key).map(|value| &mut **value)
    }

    pub fn set(&mut self, key: ExtraKey, value: Box<dyn Forkable>) {
        self.0.insert(key, value);
    }

    pub fn remove(&mut self, key: &ExtraKey) -> Option<Box<dyn Forkable>> {
        self.0.remove(key)
    }

    /// Forks every value in the bag for the child process `pid`.
    pub fn fork(&self, pid: i32) -> Self {
        Self(
            self.0
                .iter()
                .map(|(key, value)| (key.clone(), value.fork(pid)))
                .collect(),
        )
    }
}

impl fmt::Debug for ForkableExtras {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

/// One virtual memory mapping of a tracked process.
#[derive(Debug)]
pub struct Mmap {
    pub extras: ForkableExtras,

    /// Virtual address of the start of the mapping.
    pub addr: u64,
    /// Length of the mapping in bytes.
    pub len: u64,
    /// Byte offset in the mapped file of the beginning of the mapping.
    pub file_offset: u64,

    pub major: u32,
    pub minor: u32,
    pub ino: u64,
    pub ino_generation: u64,
    pub build_id: Option<Vec<u8>>,

    pub prot: u32,
    pub flags: u32,
    /// The mapping is for data, not executable code.
    pub data: bool,

    pub filename: String,
}

impl Mmap {
    pub fn from_record(record: &RecordMmap) -> Self {
        Self {
            extras: ForkableExtras::new(),
            addr: record.addr,
            len: record.len,
            file_offset: record.file_offset,
            major: record.major,
            minor: record.minor,
            ino: record.ino,
            ino_generation: record.ino_generation,
            build_id: record.build_id.clone(),
            prot: record.prot,
            flags: record.flags,
            data: record.data,
            filename: record.filename.clone(),
        }
    }

    /// The first address past the end of the mapping.
    pub fn end(&self) -> u64 {
        self.addr + self.len
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.addr <= addr && addr < self.end()
    }

    fn dup(&self, pid: i32) -> Self {
        Self {
            extras: self.extras.fork(pid),
            addr: self.addr,
            len: self.len,
            file_offset: self.file_offset,
            major: self.major,
            minor: self.minor,
            ino: self.ino,
            ino_generation: self.ino_generation,
            build_id: self.build_id.clone(),
            prot: self.prot,
            flags: self.flags,
            data: self.data,
            filename: self.filename.clone(),
        }
    }
}

/// The tracked state of one live process: its command name, memory maps,
/// and caller-attached extras.
#[derive(Debug)]
pub struct PidInfo {
    pub comm: String,
    pub extras: ForkableExtras,

    pid: i32,
    maps: Vec<Mmap>,
}

impl PidInfo {
    fn new(pid: i32) -> Self {
        Self {
            comm: String::new(),
            extras: ForkableExtras::new(),
            pid,
            maps: Vec::new(),
        }
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// The process's mappings. Within one process no two maps overlap.
    pub fn maps(&self) -> &[Mmap] {
        &self.maps
    }

    /// Finds the mapping containing `addr` among this process's own maps.
    /// See [`Session::lookup_mmap`] for the variant that also consults
    /// the kernel maps.
    pub fn lookup_mmap(&self, addr: u64) -> Option<&Mmap> {
        self.maps.iter().find(|m| m.contains(addr))
    }

    fn fork(&self, child: i32) -> PidInfo {
        PidInfo {
            comm: self.comm.clone(),
            extras: self.extras.fork(child),
            pid: child,
            maps: self.maps.iter().map(|m| m.dup(child)).collect(),
        }
    }

    /// Removes `[addr, addr+mlen)` from the maps, clipping or splitting
    /// any overlapping mapping. Unmapping a range with no mappings is a
    /// no-op.
    pub fn munmap(&mut self, addr: u64, mlen: u64) {
        let end = addr.saturating_add(mlen);
        let pid = self.pid;
        let mut tails = Vec::new();
        self.maps.retain_mut(|m| {
            if end <= m.addr || addr >= m.end() {
                return true;
            }
            if addr <= m.addr && end >= m.end() {
                // The unmap covers the whole mapping.
                return false;
            }
            if addr <= m.addr {
                // Remove the beginning of the mapping.
                let delta = end - m.addr;
                m.addr += delta;
                m.len -= delta;
                m.file_offset += delta;
            } else if end >= m.end() {
                // Remove the end of the mapping.
                m.len = addr - m.addr;
            } else {
                // Strictly inside; split the mapping in two.
                let mut tail = m.dup(pid);
                tail.addr = end;
                tail.len = m.end() - end;
                tail.file_offset = m.file_offset + (end - m.addr);
                tails.push(tail);
                m.len = addr - m.addr;
            }
            true
        });
        self.maps.append(&mut tails);
    }
}

/// Reconstructs process state while the records of a profile are
/// consumed: which PIDs are alive, their command names, and their
/// memory maps.
///
/// Feed every record to [`Session::update`] in time order; query with
/// [`Session::lookup_pid`] and [`Session::lookup_mmap`] as needed
/// between updates.
#[derive(Debug)]
pub struct Session {
    pids: HashMap<i32, PidInfo>,
    build_ids: Vec<BuildIdInfo>,

    /// Caller-attached session-wide state.
    pub extras: ForkableExtras,
}

impl Session {
    pub fn new<R: Read + Seek>(file: &PerfFile<R>) -> Self {
        let mut kernel = PidInfo::new(KERNEL_PID);
        kernel.comm = "[kernel]".to_string();
        let mut pids = HashMap::new();
        pids.insert(KERNEL_PID, kernel);
        Self {
            pids,
            build_ids: file.meta().build_ids.clone(),
            extras: ForkableExtras::new(),
        }
    }

    fn ensure_pid(&mut self, pid: i32) -> &mut PidInfo {
        self.pids.entry(pid).or_insert_with(|| PidInfo::new(pid))
    }

    /// Applies one record to the session state.
    pub fn update(&mut self, record: &Record) {
        match record {
            Record::Comm(r) => {
                self.ensure_pid(r.common.pid).comm = r.comm.clone();
            }
            Record::Exit(r) => {
                // Only whole-process exits drop the process; a thread
                // exit leaves it alone.
                if r.common.pid == r.common.tid {
                    self.pids.remove(&r.common.pid);
                }
            }
            Record::Fork(r) => {
                // pid == tid is a process fork; otherwise this is thread
                // creation.
                if r.common.pid == r.common.tid {
                    let child = self.ensure_pid(r.ppid).fork(r.common.pid);
                    self.pids.insert(r.common.pid, child);
                }
            }
            Record::Mmap(r) => {
                let info = self.ensure_pid(r.common.pid);
                info.munmap(r.addr, r.len);
                info.maps.push(Mmap::from_record(r));
            }
            Record::Sample(r) => {
                // Early in a profile, kernel samples can precede the
                // process's comm record.
                self.ensure_pid(r.common.pid);
            }
            _ => {}
        }
    }

    pub fn lookup_pid(&self, pid: i32) -> Option<&PidInfo> {
        self.pids.get(&pid)
    }

    pub fn lookup_pid_mut(&mut self, pid: i32) -> Option<&mut PidInfo> {
        self.pids.get_mut(&pid)
    }

    /// Finds the mapping containing `addr`, searching the process's maps
    /// first and the kernel maps second.
    pub fn lookup_mmap(&self, pid: i32, addr: u64) -> Option<&Mmap> {
        if let Some(m) = self.pids.get(&pid).and_then(|p| p.lookup_mmap(addr)) {
            return Some(m);
        }
        self.pids
            .get(&KERNEL_PID)
            .and_then(|p| p.lookup_mmap(addr))
    }

    /// The build IDs recorded in the profile's metadata.
    pub fn build_ids(&self) -> &[BuildIdInfo] {
        &self.build_ids
    }
}
