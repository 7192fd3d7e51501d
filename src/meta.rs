use linear_map::LinearMap;

use std::fmt;

use crate::attr::EventAttr;
use crate::buf::BufDecoder;
use crate::cpuset::CpuSet;
use crate::error::{Error, ReadError};
use crate::features::Feature;
use crate::record::{CpuMode, MISC_CPUMODE_MASK};

/// A 20-byte ELF build ID, as recorded in the BUILD_ID feature section.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BuildId(pub [u8; 20]);

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// The mapping between a single build ID and the path of an executable
/// with that build ID.
#[derive(Debug, Clone)]
pub struct BuildIdInfo {
    pub cpu_mode: CpuMode,
    /// Usually -1; set for VM kernels.
    pub pid: i32,
    pub build_id: BuildId,
    pub filename: String,
}

/// A single hardware NUMA node.
#[derive(Debug, Clone)]
pub struct NumaNode {
    /// The system identifier of this node.
    pub node: u32,
    /// Total and free memory of this node, in bytes.
    pub mem_total: u64,
    pub mem_free: u64,
    /// The CPUs in this node.
    pub cpus: CpuSet,
}

/// A group of PMU events that are scheduled together.
#[derive(Debug, Clone)]
pub struct GroupDesc {
    pub name: String,
    pub leader: u32,
    pub num_members: u32,
}

/// One entry of the EVENT_DESC feature section: an event attr with its
/// name and event IDs. This is the only place the file records event
/// names.
#[derive(Debug, Clone)]
pub struct EventDesc {
    pub attr: EventAttr,
    pub name: String,
    pub event_ids: Vec<u64>,
}

/// The timestamps of the first and last sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleTimeRange {
    pub first_sample_time: u64,
    pub last_sample_time: u64,
}

/// The optional metadata of a perf.data file, from the feature sections
/// at the file's tail.
///
/// perf writes the feature sections only after the data section is
/// complete, so profiles from interrupted recordings legitimately have
/// none of these; every field has an "unknown" state.
#[derive(Debug, Clone, Default)]
pub struct FileMeta {
    /// Build IDs for processes and libraries hit by this profile, or
    /// empty if unknown.
    pub build_ids: Vec<BuildIdInfo>,

    /// Hostname of the recording machine (`uname -n`), or "" if unknown.
    pub hostname: String,

    /// OS release of the recording machine (`uname -r`), or "" if unknown.
    pub os_release: String,

    /// The perf version that recorded this profile, or "" if unknown.
    pub version: String,

    /// Host architecture (`uname -m`), or "" if unknown.
    pub arch: String,

    /// Number of online and available CPUs, or 0, 0 if unknown.
    pub cpus_online: u32,
    pub cpus_avail: u32,

    /// CPU description, such as "Intel(R) Core(TM) i7-4600U CPU @
    /// 2.10GHz", or "" if unknown.
    pub cpu_desc: String,

    /// Exact CPU type; on x86 "vendor,family,model,stepping", or "" if
    /// unknown.
    pub cpu_id: String,

    /// Total memory of the recording machine in bytes, or 0 if unknown.
    pub total_mem: u64,

    /// The perf command line, or empty if unknown.
    pub cmdline: Vec<String>,

    /// CPU topology: each entry of `core_groups` is the set of CPUs in
    /// one package, each entry of `thread_groups` the hardware threads of
    /// one core. Empty if unknown.
    pub core_groups: Vec<CpuSet>,
    pub thread_groups: Vec<CpuSet>,

    /// NUMA topology, or empty if unknown.
    pub numa_nodes: Vec<NumaNode>,

    /// Map from numeric PMU type ID to name, or empty if unknown.
    pub pmu_mappings: LinearMap<u32, String>,

    /// Event group descriptions, or empty if unknown.
    pub groups: Vec<GroupDesc>,

    /// Event descriptions with names, or empty if unknown.
    pub event_desc: Vec<EventDesc>,

    /// First and last sample time, or `None` if unknown.
    pub sample_time: Option<SampleTimeRange>,
}

impl FileMeta {
    /// Parses one feature section into the matching field. Unrecognized
    /// features are skipped.
    pub(crate) fn parse_feature(&mut self, feature: Feature, data: &[u8]) -> Result<(), Error> {
        let mut bd = BufDecoder::new(data, ReadError::FeatureSection);
        match feature {
            Feature::BUILD_ID => self.parse_build_ids(data)?,
            Feature::HOSTNAME => self.hostname = bd.len_string()?,
            Feature::OSRELEASE => self.os_release = bd.len_string()?,
            Feature::VERSION => self.version = bd.len_string()?,
            Feature::ARCH => self.arch = bd.len_string()?,
            Feature::NRCPUS => {
                self.cpus_online = bd.u32()?;
                self.cpus_avail = bd.u32()?;
            }
            Feature::CPUDESC => self.cpu_desc = bd.len_string()?,
            Feature::CPUID => self.cpu_id = bd.len_string()?,
            Feature::TOTAL_MEM => self.total_mem = bd.u64()?.saturating_mul(1024),
            Feature::CMDLINE => self.cmdline = bd.string_list()?,
            Feature::EVENT_DESC => self.parse_event_desc(&mut bd)?,
            Feature::CPU_TOPOLOGY => {
                for group in bd.string_list()? {
                    self.core_groups.push(group.parse()?);
                }
                for group in bd.string_list()? {
                    self.thread_groups.push(group.parse()?);
                }
            }
            Feature::NUMA_TOPOLOGY => {
                let count = bd.u32()?;
                for _ in 0..count {
                    let node = bd.u32()?;
                    let mem_total = bd.u64()?.saturating_mul(1024);
                    let mem_free = bd.u64()?.saturating_mul(1024);
                    let cpus = bd.len_string()?.parse()?;
                    self.numa_nodes.push(NumaNode {
                        node,
                        mem_total,
                        mem_free,
                        cpus,
                    });
                }
            }
            Feature::PMU_MAPPINGS => {
                let count = bd.u32()?;
                let mut pairs = Vec::with_capacity(count.min(64) as usize);
                for _ in 0..count {
                    let pmu_type = bd.u32()?;
                    pairs.push((pmu_type, bd.len_string()?));
                }
                pairs.sort_by_key(|&(pmu_type, _)| pmu_type);
                self.pmu_mappings = pairs.into_iter().collect();
            }
            Feature::GROUP_DESC => {
                let count = bd.u32()?;
                for _ in 0..count {
                    self.groups.push(GroupDesc {
                        name: bd.len_string()?,
                        leader: bd.u32()?,
                        num_members: bd.u32()?,
                    });
                }
            }
            Feature::SAMPLE_TIME => {
                self.sample_time = Some(SampleTimeRange {
                    first_sample_time: bd.u64()?,
                    last_sample_time: bd.u64()?,
                });
            }
            _ => {}
        }
        Ok(())
    }

    /// The BUILD_ID section is a sequence of entries, each opened by a
    /// record-style header whose size field gives the entry length.
    fn parse_build_ids(&mut self, data: &[u8]) -> Result<(), Error> {
        let mut rest = data;
        while !rest.is_empty() {
            let mut bd = BufDecoder::new(rest, ReadError::FeatureSection);
            let _type = bd.u32()?;
            let misc = bd.u16()?;
            let size = bd.u16()? as usize;
            let pid = bd.i32()?;
            // The build ID is 20 bytes, padded to 24.
            let mut build_id_bytes = [0u8; 24];
            bd.bytes(&mut build_id_bytes)?;
            let mut build_id = BuildId::default();
            build_id.0.copy_from_slice(&build_id_bytes[..20]);
            let filename = bd.cstring()?;
            self.build_ids.push(BuildIdInfo {
                cpu_mode: CpuMode::from_misc(misc & MISC_CPUMODE_MASK),
                pid,
                build_id,
                filename,
            });
            // Advance by the entry's declared size, not by the sum of the
            // field sizes.
            if size == 0 || size > rest.len() {
                break;
            }
            rest = &rest[size..];
        }
        Ok(())
    }

    fn parse_event_desc(&mut self, bd: &mut BufDecoder) -> Result<(), Error> {
        // struct {
        //   uint32_t nr;
        //   uint32_t attr_size;
        //   struct {
        //     struct perf_event_attr attr;
        //     uint32_t nr_ids;
        //     struct perf_header_string event_string;
        //     uint64_t ids[nr_ids];
        //   } events[nr];
        // };
        let count = bd.u32()?;
        let attr_size = bd.u32()? as usize;
        for _ in 0..count {
            let mut attr_bd = BufDecoder::new(bd.take(attr_size)?, ReadError::FeatureSection);
            let (attr, _) = EventAttr::parse(&mut attr_bd)?;
            let nr_ids = bd.u32()?;
            let name = bd.len_string()?;
            let mut event_ids = Vec::with_capacity(nr_ids.min(1024) as usize);
            for _ in 0..nr_ids {
                event_ids.push(bd.u64()?);
            }
            self.event_desc.push(EventDesc {
                attr,
                name,
                event_ids,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_id_entries_advance_by_size() {
        let mut section = Vec::new();
        for (pid, name) in [(-1i32, "/lib/libc.so.6"), (42, "/usr/bin/foo")] {
            let mut entry = Vec::new();
            entry.extend_from_slice(&0u32.to_le_bytes());
            entry.extend_from_slice(&2u16.to_le_bytes()); // misc: user
            let name_space = name.len() + 1 + 7; // over-aligned on purpose
            let size = (8 + 4 + 24 + name_space) as u16;
            entry.extend_from_slice(&size.to_le_bytes());
            entry.extend_from_slice(&pid.to_le_bytes());
            let mut build_id = [0u8; 24];
            build_id[0] = 0xab;
            build_id[19] = 0xcd;
            entry.extend_from_slice(&build_id);
            entry.extend_from_slice(name.as_bytes());
            entry.extend_from_slice(&vec![0; name_space - name.len()]);
            section.extend_from_slice(&entry);
        }

        let mut meta = FileMeta::default();
        meta.parse_feature(Feature::BUILD_ID, &section).unwrap();
        assert_eq!(meta.build_ids.len(), 2);
        assert_eq!(meta.build_ids[0].pid, -1);
        assert_eq!(meta.build_ids[0].filename, "/lib/libc.so.6");
        assert_eq!(meta.build_ids[0].cpu_mode, CpuMode::User);
        assert_eq!(meta.build_ids[0].build_id.0[0], 0xab);
        assert_eq!(meta.build_ids[0].build_id.0[19], 0xcd);
        assert_eq!(meta.build_ids[1].pid, 42);
        assert_eq!(meta.build_ids[1].filename, "/usr/bin/foo");
    }

    #[test]
    fn string_features() {
        let mut data = vec![10u8, 0, 0, 0];
        data.extend_from_slice(b"myhost\0\0\0\0");
        let mut meta = FileMeta::default();
        meta.parse_feature(Feature::HOSTNAME, &data).unwrap();
        assert_eq!(meta.hostname, "myhost");
    }

    #[test]
    fn total_mem_is_scaled_to_bytes() {
        let data = 4096u64.to_le_bytes();
        let mut meta = FileMeta::default();
        meta.parse_feature(Feature::TOTAL_MEM, &data).unwrap();
        assert_eq!(meta.total_mem, 4096 * 1024);
    }

    #[test]
    fn numa_topology() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&16u64.to_le_bytes());
        data.extend_from_slice(&8u64.to_le_bytes());
        data.extend_from_slice(&4u32.to_le_bytes());
        data.extend_from_slice(b"0-1\0");
        let mut meta = FileMeta::default();
        meta.parse_feature(Feature::NUMA_TOPOLOGY, &data).unwrap();
        assert_eq!(meta.numa_nodes.len(), 1);
        assert_eq!(meta.numa_nodes[0].mem_total, 16 * 1024);
        assert_eq!(meta.numa_nodes[0].cpus.cpus(), &[0, 1]);
    }

    #[test]
    fn build_id_display_is_hex() {
        let mut id = BuildId::default();
        id.0[0] = 0x0f;
        id.0[1] = 0xa0;
        assert!(id.to_string().starts_with("0fa0"));
        assert_eq!(id.to_string().len(), 40);
    }
}
