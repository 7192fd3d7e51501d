use std::fmt;
use std::str::FromStr;

/// A set of CPUs by index, in the kernel's comma/range list syntax
/// ("0-3,7,10-11").
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpuSet(Vec<u32>);

/// The error returned when a CPU list fails to parse.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid CPU list {0:?}")]
pub struct ParseCpuSetError(String);

impl CpuSet {
    /// The CPU indexes in this set, sorted ascending without duplicates.
    pub fn cpus(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, cpu: u32) -> bool {
        self.0.binary_search(&cpu).is_ok()
    }
}

impl FromStr for CpuSet {
    type Err = ParseCpuSetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ParseCpuSetError(s.to_string());
        let mut out = Vec::new();
        for range in s.split(',') {
            let (lo, hi) = match range.split_once('-') {
                None => {
                    let cpu: u32 = range.trim().parse().map_err(|_| bad())?;
                    (cpu, cpu)
                }
                Some((lo, hi)) => {
                    let lo: u32 = lo.trim().parse().map_err(|_| bad())?;
                    let hi: u32 = hi.trim().parse().map_err(|_| bad())?;
                    // An inverted range contributes no CPUs.
                    (lo, hi)
                }
            };
            out.extend(lo..=hi);
        }
        out.sort_unstable();
        out.dedup();
        Ok(CpuSet(out))
    }
}

impl fmt::Display for CpuSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut flush = |f: &mut fmt::Formatter<'_>, lo: u32, hi: u32| -> fmt::Result {
            if !first {
                write!(f, ",")?;
            }
            first = false;
            if lo == hi {
                write!(f, "{lo}")
            } else {
                write!(f, "{lo}-{hi}")
            }
        };

        let mut cpus = self.0.iter().copied();
        let Some(mut lo) = cpus.next() else {
            return Ok(());
        };
        let mut hi = lo;
        for cpu in cpus {
            if cpu == hi + 1 {
                hi = cpu;
            } else {
                flush(f, lo, hi)?;
                lo = cpu;
                hi = cpu;
            }
        }
        flush(f, lo, hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ranges_and_singles() {
        let set: CpuSet = "0-3,7,10-11".parse().unwrap();
        assert_eq!(set.cpus(), &[0, 1, 2, 3, 7, 10, 11]);
        assert!(set.contains(7));
        assert!(!set.contains(8));
    }

    #[test]
    fn parse_dedups_and_sorts() {
        let set: CpuSet = "3,1,2-3,1".parse().unwrap();
        assert_eq!(set.cpus(), &[1, 2, 3]);
    }

    #[test]
    fn format_collapses_runs() {
        let set: CpuSet = "0,1,2,3,7,10,11".parse().unwrap();
        assert_eq!(set.to_string(), "0-3,7,10-11");
        let single: CpuSet = "5".parse().unwrap();
        assert_eq!(single.to_string(), "5");
    }

    #[test]
    fn round_trip() {
        for s in ["0-3,7,10-11", "0", "2-4", "0,2,4,6"] {
            let set: CpuSet = s.parse().unwrap();
            let reparsed: CpuSet = set.to_string().parse().unwrap();
            assert_eq!(set, reparsed);
        }
    }

    #[test]
    fn inverted_range_is_empty() {
        let set: CpuSet = "3-1".parse().unwrap();
        assert!(set.is_empty());
        let set: CpuSet = "5,3-1".parse().unwrap();
        assert_eq!(set.cpus(), &[5]);
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<CpuSet>().is_err());
        assert!("a-b".parse::<CpuSet>().is_err());
        assert!("1-".parse::<CpuSet>().is_err());
    }
}
