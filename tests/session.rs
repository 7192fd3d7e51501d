//! Session tracking tests: process lifetimes, mmap arithmetic and
//! forkable extras.

mod common;

use std::any::Any;
use std::io::Cursor;

use common::{record, AttrSpec, Bytes, FileBuilder};
use perf_profile::{
    ExtraKey, Forkable, PerfFile, Record, RecordComm, RecordExit, RecordFork, RecordMmap,
    RecordSample, SampleFormat, Session, KERNEL_PID,
};

fn new_session() -> Session {
    let bytes = FileBuilder::new()
        .attr(AttrSpec {
            sample_format: SampleFormat::IP.bits(),
            ..Default::default()
        })
        .record(record(9, 2, &Bytes::new().u64(1).build()))
        .build();
    let file = PerfFile::parse(Cursor::new(bytes)).unwrap();
    Session::new(&file)
}

fn comm(pid: i32, name: &str) -> Record {
    let mut r = RecordComm {
        comm: name.to_string(),
        ..Default::default()
    };
    r.common.pid = pid;
    r.common.tid = pid;
    Record::Comm(r)
}

fn mmap(pid: i32, addr: u64, len: u64, file_offset: u64, filename: &str) -> Record {
    let mut r = RecordMmap {
        addr,
        len,
        file_offset,
        filename: filename.to_string(),
        ..Default::default()
    };
    r.common.pid = pid;
    r.common.tid = pid;
    Record::Mmap(r)
}

fn fork(pid: i32, tid: i32, ppid: i32) -> Record {
    let mut r = RecordFork {
        ppid,
        ptid: ppid,
        ..Default::default()
    };
    r.common.pid = pid;
    r.common.tid = tid;
    Record::Fork(r)
}

fn exit(pid: i32, tid: i32) -> Record {
    let mut r = RecordExit::default();
    r.common.pid = pid;
    r.common.tid = tid;
    Record::Exit(r)
}

fn sample(pid: i32, ip: u64) -> Record {
    let mut r = RecordSample {
        ip,
        ..Default::default()
    };
    r.common.pid = pid;
    r.common.tid = pid;
    Record::Sample(r)
}

fn assert_no_overlap(session: &Session, pid: i32) {
    let maps = session.lookup_pid(pid).unwrap().maps();
    for a in maps {
        for b in maps {
            if std::ptr::eq(a, b) {
                continue;
            }
            assert!(
                a.end() <= b.addr || b.end() <= a.addr,
                "maps overlap: [{:#x},{:#x}) and [{:#x},{:#x})",
                a.addr,
                a.end(),
                b.addr,
                b.end()
            );
        }
    }
}

/// An interior munmap splits the mapping in two, and the tail's file
/// offset moves with its address.
#[test]
fn munmap_splits_interior_range() {
    let mut session = new_session();
    session.update(&comm(10, "proc"));
    session.update(&mmap(10, 100, 200, 0, "/a"));

    session.lookup_pid_mut(10).unwrap().munmap(150, 20);

    let info = session.lookup_pid(10).unwrap();
    let maps = info.maps();
    assert_eq!(maps.len(), 2);
    assert_eq!((maps[0].addr, maps[0].end(), maps[0].file_offset), (100, 150, 0));
    assert_eq!((maps[1].addr, maps[1].end(), maps[1].file_offset), (170, 300, 70));
    assert_eq!(maps[0].filename, "/a");
    assert_eq!(maps[1].filename, "/a");
    assert_no_overlap(&session, 10);

    assert!(info.lookup_mmap(149).is_some());
    assert!(info.lookup_mmap(150).is_none());
    assert!(info.lookup_mmap(169).is_none());
    assert!(info.lookup_mmap(170).is_some());
}

/// munmap covering the start, end, whole and no part of a mapping.
#[test]
fn munmap_boundary_cases() {
    let mut session = new_session();
    session.update(&mmap(20, 100, 200, 0, "/a"));
    let info = session.lookup_pid_mut(20).unwrap();

    // No overlap on either side.
    info.munmap(0, 100);
    info.munmap(300, 50);
    assert_eq!(info.maps().len(), 1);
    assert_eq!((info.maps()[0].addr, info.maps()[0].end()), (100, 300));

    // Clip the front; the file offset advances with the address.
    info.munmap(50, 100);
    assert_eq!(
        (info.maps()[0].addr, info.maps()[0].end(), info.maps()[0].file_offset),
        (150, 300, 50)
    );

    // Clip the back.
    info.munmap(250, 100);
    assert_eq!((info.maps()[0].addr, info.maps()[0].end()), (150, 250));

    // Remove the whole mapping with an oversized range.
    info.munmap(100, 400);
    assert!(info.maps().is_empty());

    // munmap over nothing is a no-op.
    info.munmap(100, 400);
    assert!(info.maps().is_empty());
}

/// A new overlapping mapping first unmaps whatever it covers.
#[test]
fn new_mmap_replaces_overlap() {
    let mut session = new_session();
    session.update(&mmap(30, 100, 200, 0, "/a"));
    session.update(&mmap(30, 150, 20, 0, "/b"));

    assert_no_overlap(&session, 30);
    let info = session.lookup_pid(30).unwrap();
    assert_eq!(info.maps().len(), 3);
    assert_eq!(info.lookup_mmap(160).unwrap().filename, "/b");
    assert_eq!(info.lookup_mmap(120).unwrap().filename, "/a");
    assert_eq!(info.lookup_mmap(200).unwrap().filename, "/a");
}

/// Forking clones the parent's comm and maps; a sample in the child
/// resolves through the cloned mapping.
#[test]
fn fork_then_sample() {
    let mut session = new_session();
    session.update(&comm(10, "parent"));
    session.update(&mmap(10, 4096, 4096, 0, "/a"));
    session.update(&fork(11, 11, 10));
    session.update(&sample(11, 5000));

    let child = session.lookup_pid(11).unwrap();
    assert_eq!(child.comm, "parent");
    assert_eq!(child.pid(), 11);
    let m = child.lookup_mmap(5000).unwrap();
    assert_eq!(m.filename, "/a");
    assert_eq!((m.addr, m.len), (4096, 4096));

    // The clone matches the parent map-by-map.
    let parent = session.lookup_pid(10).unwrap();
    assert_eq!(parent.maps().len(), child.maps().len());
    for (a, b) in parent.maps().iter().zip(child.maps()) {
        assert_eq!((a.addr, a.len, a.file_offset), (b.addr, b.len, b.file_offset));
        assert_eq!(a.filename, b.filename);
    }
}

/// Thread-level fork and exit records do not touch process state.
#[test]
fn thread_events_are_noops() {
    let mut session = new_session();
    session.update(&comm(10, "proc"));

    // Thread creation: pid != tid.
    session.update(&fork(10, 12, 10));
    assert!(session.lookup_pid(12).is_none());

    // Thread exit: pid != tid.
    session.update(&exit(10, 12));
    assert!(session.lookup_pid(10).is_some());
}

/// A sample creates its process entry, and a whole-process exit removes
/// it.
#[test]
fn sample_then_exit() {
    let mut session = new_session();
    session.update(&sample(5, 0x1000));
    assert!(session.lookup_pid(5).is_some());

    session.update(&exit(5, 5));
    assert!(session.lookup_pid(5).is_none());
}

/// Address lookups fall back to the kernel maps.
#[test]
fn lookup_falls_back_to_kernel_maps() {
    let mut session = new_session();
    session.update(&mmap(KERNEL_PID, 0xffff_0000, 0x1000, 0, "[kernel.kallsyms]_text"));
    session.update(&comm(40, "proc"));
    session.update(&mmap(40, 0x1000, 0x1000, 0, "/a"));

    assert_eq!(session.lookup_pid(KERNEL_PID).unwrap().comm, "[kernel]");
    // Process address resolves to the process map.
    assert_eq!(session.lookup_mmap(40, 0x1800).unwrap().filename, "/a");
    // Kernel address resolves through the fallback, even for a process
    // the session has never seen.
    let m = session.lookup_mmap(40, 0xffff_0800).unwrap();
    assert_eq!(m.filename, "[kernel.kallsyms]_text");
    assert!(session.lookup_mmap(99, 0xffff_0800).is_some());
    assert!(session.lookup_mmap(40, 0x5000_0000).is_none());
}

struct Counter(i32);

impl Forkable for Counter {
    fn fork(&self, _pid: i32) -> Box<dyn Forkable> {
        Box::new(Counter(self.0))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn counter_value(extras: &perf_profile::ForkableExtras, key: &ExtraKey) -> Option<i32> {
    extras
        .get(key)
        .and_then(|value| value.as_any().downcast_ref::<Counter>())
        .map(|counter| counter.0)
}

/// Extras attached to a process are forked into the child; mutating the
/// child's copy leaves the parent alone.
#[test]
fn extras_fork_with_the_process() {
    let key = ExtraKey::new("test.counter");
    let mut session = new_session();
    session.update(&comm(10, "parent"));
    session
        .lookup_pid_mut(10)
        .unwrap()
        .extras
        .set(key.clone(), Box::new(Counter(7)));

    session.update(&fork(11, 11, 10));

    let child = session.lookup_pid_mut(11).unwrap();
    assert_eq!(counter_value(&child.extras, &key), Some(7));
    child
        .extras
        .get_mut(&key)
        .unwrap()
        .as_any_mut()
        .downcast_mut::<Counter>()
        .unwrap()
        .0 = 99;

    assert_eq!(
        counter_value(&session.lookup_pid(11).unwrap().extras, &key),
        Some(99)
    );
    assert_eq!(
        counter_value(&session.lookup_pid(10).unwrap().extras, &key),
        Some(7)
    );
}

/// Keys are identity tokens: a second key with the same name is a
/// different key.
#[test]
fn extra_keys_compare_by_identity() {
    let key1 = ExtraKey::new("name");
    let key2 = ExtraKey::new("name");
    assert_ne!(key1, key2);
    assert_eq!(key1, key1.clone());
    assert_eq!(key1.name(), key2.name());

    let mut session = new_session();
    session.extras.set(key1.clone(), Box::new(Counter(1)));
    assert!(session.extras.get(&key1).is_some());
    assert!(session.extras.get(&key2).is_none());
}

/// Session extras fork too, via the bag's own fork.
#[test]
fn session_extras_bag_forks() {
    let key = ExtraKey::new("bag");
    let mut extras = perf_profile::ForkableExtras::new();
    extras.set(key.clone(), Box::new(Counter(3)));
    let forked = extras.fork(1);
    assert_eq!(counter_value(&forked, &key), Some(3));
}
