use byteorder::{ByteOrder, LittleEndian};

use std::io::{Read, Seek};
use std::sync::Arc;

use crate::attr::{BranchSampleFormat, EventAttr, ReadFormat, SampleFormat};
use crate::buf::BufDecoder;
use crate::datasrc::DataSrc;
use crate::error::{Error, ReadError};
use crate::perf_file::PerfFile;
use crate::record::*;

/// The iteration order of [`Records`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordsOrder {
    /// Records in file order. This is the cheapest order because the data
    /// section is streamed front to back, but records may not be in
    /// time-stamp or even causal order.
    File,

    /// Records in causal order. This is weakly time-ordered: any two
    /// records are in time-stamp order *unless* both are samples. This is
    /// potentially cheaper than `Time`, though currently the
    /// implementation does not distinguish the two.
    Causal,

    /// Records in time-stamp order. The most expensive order: it requires
    /// a first pass over the data section to collect time stamps before
    /// records can be re-read sorted.
    Time,
}

/// An iterator over the records in a perf.data file.
///
/// Typical usage:
///
/// ```no_run
/// # fn run() -> Result<(), perf_profile::Error> {
/// use perf_profile::{PerfFile, Record, RecordsOrder};
///
/// let mut file = PerfFile::open("perf.data")?;
/// let mut records = file.records(RecordsOrder::Time)?;
/// while let Some(record) = records.next() {
///     match record {
///         Record::Sample(sample) => println!("ip {:#x}", sample.ip),
///         _ => {}
///     }
/// }
/// if let Some(err) = records.err() {
///     eprintln!("profile decode failed: {err}");
/// }
/// # Ok(())
/// # }
/// ```
///
/// The record returned by [`Records::next`] borrows scratch storage owned
/// by the iterator; it is only valid until the next call. Callers that
/// need to retain a record must clone it.
pub struct Records<'a, R: Read + Seek> {
    file: &'a mut PerfFile<R>,
    err: Option<Error>,
    done: bool,
    record: Option<Record>,
    /// Payload scratch buffer, grown to the largest record seen.
    buf: Vec<u8>,
    /// Record start offsets for time/causal order; `None` streams in
    /// file order.
    order: Option<Vec<u64>>,
    next_idx: usize,
}

impl<'a, R: Read + Seek> Records<'a, R> {
    pub(crate) fn new(file: &'a mut PerfFile<R>, order: Option<Vec<u64>>) -> Self {
        let data = file.hdr.data_section;
        file.reader.set_window(data.offset, data.end());
        Self {
            file,
            err: None,
            done: false,
            record: None,
            buf: Vec::new(),
            order,
            next_idx: 0,
        }
    }

    /// Decodes the next record. Returns `None` at the end of the stream or
    /// on error; check [`Records::err`] after the loop.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<&Record> {
        if self.done || self.err.is_some() {
            return None;
        }
        match self.step() {
            Ok(true) => self.record.as_ref(),
            Ok(false) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.err = Some(e);
                None
            }
        }
    }

    /// The first error encountered, if any. Once set, `next` keeps
    /// returning `None`.
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    pub(crate) fn take_err(&mut self) -> Option<Error> {
        self.err.take()
    }

    fn step(&mut self) -> Result<bool, Error> {
        match &self.order {
            Some(order) => {
                let Some(&offset) = order.get(self.next_idx) else {
                    return Ok(false);
                };
                self.next_idx += 1;
                self.file.reader.seek_to(offset);
            }
            None => {
                if self.file.reader.at_end() {
                    return Ok(false);
                }
            }
        }

        let offset = self.file.reader.position();

        let mut header = [0u8; 8];
        self.file
            .reader
            .read_exact(&mut header)
            .map_err(|_| ReadError::RecordHeader)?;
        let record_type = RecordType(LittleEndian::read_u32(&header[..4]));
        let misc = LittleEndian::read_u16(&header[4..6]);
        let size = LittleEndian::read_u16(&header[6..8]);
        if (size as usize) < header.len() {
            return Err(Error::InvalidRecordSize(size));
        }

        let mut buf = std::mem::take(&mut self.buf);
        buf.resize(size as usize - header.len(), 0);
        self.file
            .reader
            .read_exact(&mut buf)
            .map_err(|_| ReadError::RecordBody)?;

        let mut scratch = Scratch::reclaim(self.record.take());

        // Auxtrace is the one record type whose payload continues past the
        // size declared in the record header.
        if record_type == RecordType::AUXTRACE && buf.len() >= 8 {
            let aux_len = LittleEndian::read_u64(&buf[..8]);
            scratch.aux_data.clear();
            scratch.aux_data.resize(aux_len as usize, 0);
            self.file
                .reader
                .read_exact(&mut scratch.aux_data)
                .map_err(|_| ReadError::RecordBody)?;
        }

        let record = decode_record(&*self.file, record_type, misc, &buf, offset, scratch)?;
        self.record = Some(record);
        self.buf = buf;
        Ok(true)
    }
}

/// Storage reclaimed from the previously emitted record, so consecutive
/// records of the same shape reuse their allocations.
#[derive(Default)]
struct Scratch {
    sample: RecordSample,
    aux_data: Vec<u8>,
}

impl Scratch {
    fn reclaim(prev: Option<Record>) -> Self {
        match prev {
            Some(Record::Sample(mut sample)) => {
                sample.clear();
                Self {
                    sample,
                    aux_data: Vec::new(),
                }
            }
            Some(Record::Auxtrace(auxtrace)) => Self {
                sample: RecordSample::default(),
                aux_data: auxtrace.data,
            },
            _ => Self::default(),
        }
    }
}

fn decode_record<R: Read + Seek>(
    file: &PerfFile<R>,
    record_type: RecordType,
    misc: u16,
    payload: &[u8],
    offset: u64,
    scratch: Scratch,
) -> Result<Record, Error> {
    let mut common = RecordCommon {
        offset,
        ..Default::default()
    };

    // Non-sample kernel records carry a sample_id trailer when the events
    // request it.
    if file.sample_id_all && record_type != RecordType::SAMPLE && record_type.is_kernel_type() {
        parse_trailer(file, payload, &mut common)?;
    }

    let mut bd = BufDecoder::new(payload, ReadError::RecordBody);
    let record = match record_type {
        RecordType::MMAP => Record::Mmap(decode_mmap(&mut bd, misc, common, false)?),
        RecordType::MMAP2 => Record::Mmap(decode_mmap(&mut bd, misc, common, true)?),
        RecordType::LOST => Record::Lost(decode_lost(file, &mut bd, common)?),
        RecordType::COMM => Record::Comm(decode_comm(&mut bd, misc, common)?),
        RecordType::EXIT => {
            let (common, ppid, ptid) = decode_task(&mut bd, common)?;
            Record::Exit(RecordExit { common, ppid, ptid })
        }
        RecordType::FORK => {
            let (common, ppid, ptid) = decode_task(&mut bd, common)?;
            Record::Fork(RecordFork { common, ppid, ptid })
        }
        RecordType::THROTTLE => Record::Throttle(decode_throttle(file, &mut bd, common, true)?),
        RecordType::UNTHROTTLE => Record::Throttle(decode_throttle(file, &mut bd, common, false)?),
        RecordType::SAMPLE => Record::Sample(decode_sample(file, &mut bd, misc, common, scratch)?),
        RecordType::AUX => Record::Aux(decode_aux(&mut bd, common)?),
        RecordType::ITRACE_START => {
            common.format |= SampleFormat::TID;
            common.pid = bd.i32()?;
            common.tid = bd.i32()?;
            Record::ItraceStart(RecordItraceStart { common })
        }
        RecordType::LOST_SAMPLES => Record::LostSamples(RecordLostSamples {
            common,
            lost: bd.u64()?,
        }),
        RecordType::SWITCH => Record::Switch(RecordSwitch {
            common,
            out: misc & MISC_SWITCH_OUT != 0,
        }),
        RecordType::SWITCH_CPU_WIDE => Record::SwitchCpuWide(RecordSwitchCpuWide {
            out: misc & MISC_SWITCH_OUT != 0,
            preempt: misc & MISC_SWITCH_OUT_PREEMPT != 0,
            switch_pid: bd.i32()?,
            switch_tid: bd.i32()?,
            common,
        }),
        RecordType::NAMESPACES => Record::Namespaces(decode_namespaces(&mut bd, common)?),
        RecordType::KSYMBOL => Record::Ksymbol(RecordKsymbol {
            common,
            addr: bd.u64()?,
            len: bd.u32()?,
            ksym_type: KsymbolType::from_u16(bd.u16()?),
            flags: KsymbolFlags::from_bits_truncate(bd.u16()?),
            name: bd.cstring()?,
        }),
        RecordType::BPF_EVENT => {
            let event_type = BpfEventType::from_u16(bd.u16()?);
            let flags = bd.u16()?;
            let id = bd.u32()?;
            let mut tag = [0u8; 8];
            bd.bytes(&mut tag)?;
            Record::BpfEvent(RecordBpfEvent {
                common,
                event_type,
                flags,
                id,
                tag,
            })
        }
        RecordType::CGROUP => Record::Cgroup(RecordCgroup {
            common,
            id: bd.u64()?,
            path: bd.cstring()?,
        }),
        RecordType::TEXT_POKE => {
            let addr = bd.u64()?;
            let old_len = bd.u16()? as usize;
            let new_len = bd.u16()? as usize;
            Record::TextPoke(RecordTextPoke {
                common,
                addr,
                old: bd.take(old_len)?.to_vec(),
                new: bd.take(new_len)?.to_vec(),
            })
        }
        RecordType::AUX_OUTPUT_HW_ID => Record::AuxOutputHardwareId(RecordAuxOutputHardwareId {
            common,
            hw_id: bd.u64()?,
        }),
        RecordType::AUXTRACE_INFO => {
            let kind = bd.u32()?;
            bd.skip(4)?;
            let mut priv_data = Vec::new();
            let words = bd.remaining() / 8;
            bd.u64s(&mut priv_data, words)?;
            Record::AuxtraceInfo(RecordAuxtraceInfo {
                common,
                kind,
                priv_data,
            })
        }
        RecordType::AUXTRACE => {
            let _size = bd.u64()?;
            Record::Auxtrace(RecordAuxtrace {
                common,
                offset: bd.u64()?,
                reference: bd.u64()?,
                idx: bd.u32()?,
                tid: bd.i32()?,
                cpu: bd.u32()?,
                data: scratch.aux_data,
            })
        }
        _ => Record::Unknown(RecordUnknown {
            common,
            type_: record_type,
            misc,
            data: payload.to_vec(),
        }),
    };
    Ok(record)
}

/// Parses the common `sample_id` structure in the trailer of non-sample
/// records.
fn parse_trailer<R: Read + Seek>(
    file: &PerfFile<R>,
    payload: &[u8],
    common: &mut RecordCommon,
) -> Result<(), Error> {
    let id = match file.record_id_offset {
        None => 0,
        Some(off) => {
            let idx = payload.len() as i64 + off;
            if idx < 0 || idx as usize + 8 > payload.len() {
                return Err(ReadError::RecordBody.into());
            }
            LittleEndian::read_u64(&payload[idx as usize..])
        }
    };
    let attr = file.get_attr(id)?;

    let format = attr.sample_format;
    let trailer_len = format.trailer_bytes();
    common.format = format
        & (SampleFormat::TID
            | SampleFormat::TIME
            | SampleFormat::ID
            | SampleFormat::STREAM_ID
            | SampleFormat::CPU
            | SampleFormat::IDENTIFIER);
    common.attr = Some(attr);
    common.id = id;

    let mut bd = BufDecoder::new(payload, ReadError::RecordBody).tail(trailer_len)?;
    common.pid = bd.i32_if(format.contains(SampleFormat::TID))?;
    common.tid = bd.i32_if(format.contains(SampleFormat::TID))?;
    common.time = bd.u64_if(format.contains(SampleFormat::TIME))?;
    bd.u64_if(format.contains(SampleFormat::ID))?; // superseded by the offset fetch
    common.stream_id = bd.u64_if(format.contains(SampleFormat::STREAM_ID))?;
    common.cpu = bd.u32_if(format.contains(SampleFormat::CPU))?;
    common.res = bd.u32_if(format.contains(SampleFormat::CPU))?;
    Ok(())
}

fn decode_mmap(
    bd: &mut BufDecoder,
    misc: u16,
    mut common: RecordCommon,
    v2: bool,
) -> Result<RecordMmap, Error> {
    common.format |= SampleFormat::TID;
    common.pid = bd.i32()?;
    common.tid = bd.i32()?;

    let mut record = RecordMmap {
        data: misc & MISC_MMAP_DATA != 0,
        addr: bd.u64()?,
        len: bd.u64()?,
        file_offset: bd.u64()?,
        ..Default::default()
    };
    if v2 {
        if misc & MISC_MMAP_BUILD_ID != 0 {
            let build_id_len = bd.u8()?.min(20) as usize;
            bd.skip(3)?;
            let bytes = bd.take(20)?;
            record.build_id = Some(bytes[..build_id_len].to_vec());
        } else {
            record.major = bd.u32()?;
            record.minor = bd.u32()?;
            record.ino = bd.u64()?;
            record.ino_generation = bd.u64()?;
        }
        record.prot = bd.u32()?;
        record.flags = bd.u32()?;
    }
    record.filename = bd.cstring()?;
    record.common = common;
    Ok(record)
}

fn decode_lost<R: Read + Seek>(
    file: &PerfFile<R>,
    bd: &mut BufDecoder,
    mut common: RecordCommon,
) -> Result<RecordLost, Error> {
    common.format |= SampleFormat::ID;
    common.id = bd.u64()?;
    common.attr = Some(file.get_attr(common.id)?);
    Ok(RecordLost {
        num_lost: bd.u64()?,
        common,
    })
}

fn decode_comm(
    bd: &mut BufDecoder,
    misc: u16,
    mut common: RecordCommon,
) -> Result<RecordComm, Error> {
    common.format |= SampleFormat::TID;
    common.pid = bd.i32()?;
    common.tid = bd.i32()?;
    Ok(RecordComm {
        exec: misc & MISC_COMM_EXEC != 0,
        comm: bd.cstring()?,
        common,
    })
}

/// Shared shape of EXIT and FORK records.
fn decode_task(
    bd: &mut BufDecoder,
    mut common: RecordCommon,
) -> Result<(RecordCommon, i32, i32), Error> {
    common.format |= SampleFormat::TID | SampleFormat::TIME;
    common.pid = bd.i32()?;
    let ppid = bd.i32()?;
    common.tid = bd.i32()?;
    let ptid = bd.i32()?;
    common.time = bd.u64()?;
    Ok((common, ppid, ptid))
}

fn decode_throttle<R: Read + Seek>(
    file: &PerfFile<R>,
    bd: &mut BufDecoder,
    mut common: RecordCommon,
    enable: bool,
) -> Result<RecordThrottle, Error> {
    common.format |= SampleFormat::TIME | SampleFormat::ID | SampleFormat::STREAM_ID;
    common.time = bd.u64()?;
    // Throttle events always carry an event attr ID, even when IDs aren't
    // recorded. An unknown ID here falls back to the default event.
    let id = bd.u64()?;
    common.attr = match file.id_to_attr.get(&id) {
        Some(attr) => Some(attr.clone()),
        None => Some(file.get_attr(0)?),
    };
    common.id = id;
    common.stream_id = bd.u64()?;
    Ok(RecordThrottle { common, enable })
}

fn decode_aux(bd: &mut BufDecoder, common: RecordCommon) -> Result<RecordAux, Error> {
    let offset = bd.u64()?;
    let size = bd.u64()?;
    let flags_word = bd.u64()?;
    Ok(RecordAux {
        common,
        offset,
        size,
        flags: AuxFlags::from_bits_truncate(flags_word),
        pmu_format: ((flags_word >> 8) & 0xff) as u8,
    })
}

fn decode_namespaces(
    bd: &mut BufDecoder,
    mut common: RecordCommon,
) -> Result<RecordNamespaces, Error> {
    common.format |= SampleFormat::TID;
    common.pid = bd.i32()?;
    common.tid = bd.i32()?;
    let count = bd.u64()?;
    let mut namespaces = Vec::with_capacity(count.min(64) as usize);
    for _ in 0..count {
        namespaces.push(Namespace {
            dev: bd.u64()?,
            inode: bd.u64()?,
        });
    }
    Ok(RecordNamespaces { common, namespaces })
}

fn decode_sample<R: Read + Seek>(
    file: &PerfFile<R>,
    bd: &mut BufDecoder,
    misc: u16,
    mut common: RecordCommon,
    scratch: Scratch,
) -> Result<RecordSample, Error> {
    // The event attr decides the shape of the rest of the record, so it is
    // fetched out-of-band from the precomputed cross-event offset.
    let id = match file.sample_id_offset {
        None => 0,
        Some(off) => {
            let payload = bd.rest();
            if off + 8 > payload.len() {
                return Err(ReadError::RecordBody.into());
            }
            LittleEndian::read_u64(&payload[off..])
        }
    };
    let attr = file.get_attr(id)?;
    let t = attr.sample_format;
    let branch_format = attr.branch_sample_format;
    let regs_user_mask = attr.sample_regs_user;
    let regs_intr_mask = attr.sample_regs_intr;
    let read_format = attr.read_format;

    common.format = t;
    common.id = id;
    common.attr = Some(attr);

    let mut s = scratch.sample;
    s.cpu_mode = CpuMode::from_misc(misc);
    s.exact_ip = misc & MISC_EXACT_IP != 0;

    bd.u64_if(t.contains(SampleFormat::IDENTIFIER))?;
    s.ip = bd.u64_if(t.contains(SampleFormat::IP))?;
    common.pid = bd.i32_if(t.contains(SampleFormat::TID))?;
    common.tid = bd.i32_if(t.contains(SampleFormat::TID))?;
    common.time = bd.u64_if(t.contains(SampleFormat::TIME))?;
    s.addr = bd.u64_if(t.contains(SampleFormat::ADDR))?;
    bd.u64_if(t.contains(SampleFormat::ID))?; // superseded by the offset fetch
    common.stream_id = bd.u64_if(t.contains(SampleFormat::STREAM_ID))?;
    common.cpu = bd.u32_if(t.contains(SampleFormat::CPU))?;
    common.res = bd.u32_if(t.contains(SampleFormat::CPU))?;
    s.period = bd.u64_if(t.contains(SampleFormat::PERIOD))?;

    if t.contains(SampleFormat::READ) {
        parse_read_format(file, bd, read_format, &mut s.read)?;
    }

    if t.contains(SampleFormat::CALLCHAIN) {
        let depth = bd.u64()? as usize;
        bd.u64s(&mut s.callchain, depth)?;
    }

    if t.contains(SampleFormat::RAW) {
        let raw_size = bd.u32()? as usize;
        s.raw.extend_from_slice(bd.take(raw_size)?);
    }

    if t.contains(SampleFormat::BRANCH_STACK) {
        if branch_format.contains(BranchSampleFormat::HW_INDEX) {
            s.branch_hw_index = bd.i64()?;
        }
        let count = bd.u64()? as usize;
        s.branch_stack.reserve(count.min(1024));
        for _ in 0..count {
            let from = bd.u64()?;
            let to = bd.u64()?;
            // Packed entry info: bits 0-3 flags, 4-19 cycles, 20-23 type.
            let info = bd.u64()?;
            s.branch_stack.push(BranchEntry {
                from,
                to,
                flags: BranchFlags::from_bits_truncate((info & 0xf) as u8),
                cycles: ((info >> 4) & 0xffff) as u16,
                branch_type: BranchType::from_u8(((info >> 20) & 0xf) as u8),
            });
        }
    }

    if t.contains(SampleFormat::REGS_USER) {
        s.regs_user_abi = SampleRegsAbi::from_u64(bd.u64()?);
        if s.regs_user_abi != SampleRegsAbi::None {
            bd.u64s(&mut s.regs_user, regs_user_mask.count_ones() as usize)?;
        }
    }

    if t.contains(SampleFormat::STACK_USER) {
        let size = bd.u64()? as usize;
        if size > 0 {
            s.stack_user.extend_from_slice(bd.take(size)?);
            s.stack_user_dyn_size = bd.u64()?;
        } else {
            s.stack_user_dyn_size = 0;
        }
    }

    s.weight = bd.u64_if(t.contains(SampleFormat::WEIGHT))?;
    if t.contains(SampleFormat::WEIGHT_STRUCT) {
        s.weight = bd.u64()?;
        s.weights = Weights::from_u64(s.weight);
    }

    if t.contains(SampleFormat::DATA_SRC) {
        s.data_src = DataSrc::from_u64(bd.u64()?);
    }

    if t.contains(SampleFormat::TRANSACTION) {
        let word = bd.u64()?;
        s.transaction = Transaction::from_bits_truncate(word as u32);
        s.abort_code = (word >> 32) as u32;
    }

    if t.contains(SampleFormat::REGS_INTR) {
        s.regs_intr_abi = SampleRegsAbi::from_u64(bd.u64()?);
        if s.regs_intr_abi != SampleRegsAbi::None {
            bd.u64s(&mut s.regs_intr, regs_intr_mask.count_ones() as usize)?;
        }
    }

    s.phys_addr = bd.u64_if(t.contains(SampleFormat::PHYS_ADDR))?;
    s.cgroup = bd.u64_if(t.contains(SampleFormat::CGROUP))?;
    s.data_page_size = bd.u64_if(t.contains(SampleFormat::DATA_PAGE_SIZE))?;
    s.code_page_size = bd.u64_if(t.contains(SampleFormat::CODE_PAGE_SIZE))?;

    if t.contains(SampleFormat::AUX) {
        let size = bd.u64()? as usize;
        s.aux.extend_from_slice(bd.take(size)?);
    }

    s.common = common;
    Ok(s)
}

fn parse_read_format<R: Read + Seek>(
    file: &PerfFile<R>,
    bd: &mut BufDecoder,
    f: ReadFormat,
    out: &mut Vec<Count>,
) -> Result<(), Error> {
    fn read_attr<R: Read + Seek>(
        file: &PerfFile<R>,
        bd: &mut BufDecoder,
        f: ReadFormat,
    ) -> Result<Option<Arc<EventAttr>>, Error> {
        if f.contains(ReadFormat::ID) {
            Ok(Some(file.get_attr(bd.u64()?)?))
        } else {
            Ok(None)
        }
    }

    if !f.contains(ReadFormat::GROUP) {
        let value = bd.u64()?;
        let time_enabled = bd.u64_if(f.contains(ReadFormat::TOTAL_TIME_ENABLED))?;
        let time_running = bd.u64_if(f.contains(ReadFormat::TOTAL_TIME_RUNNING))?;
        let attr = read_attr(file, bd, f)?;
        out.push(Count {
            value,
            time_enabled,
            time_running,
            attr,
        });
    } else {
        let count = bd.u64()? as usize;
        let time_enabled = bd.u64_if(f.contains(ReadFormat::TOTAL_TIME_ENABLED))?;
        let time_running = bd.u64_if(f.contains(ReadFormat::TOTAL_TIME_RUNNING))?;
        out.reserve(count.min(1024));
        for _ in 0..count {
            let value = bd.u64()?;
            let attr = read_attr(file, bd, f)?;
            out.push(Count {
                value,
                time_enabled,
                time_running,
                attr,
            });
        }
    }
    Ok(())
}
