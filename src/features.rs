use std::fmt;

/// A piece of optional data stored in a perf.data file.
///
/// The file header carries a bitmap with one bit per feature; each set
/// bit owns a "feature section" stored after the data section, ordered
/// from low bit to high bit. The numeric values are the kernel's
/// `HEADER_*` constants from tools/perf/util/header.h.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Feature(pub u32);

/// One table drives both the named constants and the Debug rendering.
macro_rules! features {
    ($($(#[$doc:meta])* $name:ident = $bit:literal,)*) => {
        impl Feature {
            $($(#[$doc])* pub const $name: Self = Self($bit);)*
        }

        impl Feature {
            fn name(self) -> Option<&'static str> {
                match self {
                    $(Self::$name => Some(stringify!($name)),)*
                    _ => None,
                }
            }
        }
    };
}

features! {
    TRACING_DATA = 1,
    BUILD_ID = 2,
    HOSTNAME = 3,
    OSRELEASE = 4,
    VERSION = 5,
    ARCH = 6,
    NRCPUS = 7,
    CPUDESC = 8,
    CPUID = 9,
    TOTAL_MEM = 10,
    CMDLINE = 11,
    EVENT_DESC = 12,
    CPU_TOPOLOGY = 13,
    NUMA_TOPOLOGY = 14,
    BRANCH_STACK = 15,
    PMU_MAPPINGS = 16,
    GROUP_DESC = 17,
    AUXTRACE = 18,
    STAT = 19,
    CACHE = 20,
    SAMPLE_TIME = 21,
    SAMPLE_TOPOLOGY = 22,
    CLOCKID = 23,
    DIR_FORMAT = 24,
    BPF_PROG_INFO = 25,
    BPF_BTF = 26,
    COMPRESSED = 27,
    CPU_PMU_CAPS = 28,
    CLOCK_DATA = 29,
    HYBRID_TOPOLOGY = 30,
    HYBRID_CPU_PMU_CAPS = 31,
}

impl fmt::Debug for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "Unknown Feature {}", self.0),
        }
    }
}

/// The feature bitmap from a perf.data header: four little-endian u64
/// limbs, 256 bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FeatureSet(pub [u64; 4]);

impl FeatureSet {
    pub const MAX_BITS: u32 = 64 * 4;

    /// The number of features in this set, which is also the number of
    /// feature sections in the file.
    pub fn len(&self) -> usize {
        self.0.iter().map(|limb| limb.count_ones() as usize).sum()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&limb| limb == 0)
    }

    /// Checks if the feature is contained in this set.
    #[inline]
    pub fn has_feature(&self, feature: Feature) -> bool {
        match self.0.get((feature.0 / 64) as usize) {
            Some(limb) => limb & (1 << (feature.0 % 64)) != 0,
            None => false,
        }
    }

    /// Returns an iterator over all features in this set, from low to
    /// high. This is the order in which the feature sections are stored
    /// in the file.
    pub fn iter(&self) -> FeatureSetIter {
        FeatureSetIter {
            limbs: self.0,
            limb_index: 0,
        }
    }
}

impl fmt::Debug for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// An iterator over the features of a [`FeatureSet`], from low to high
/// feature bit.
///
/// Each step clears the lowest set bit of the current limb, so iteration
/// cost scales with the number of set bits rather than the bitmap width.
pub struct FeatureSetIter {
    limbs: [u64; 4],
    limb_index: u32,
}

impl Iterator for FeatureSetIter {
    type Item = Feature;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(limb) = self.limbs.get_mut(self.limb_index as usize) {
            if *limb == 0 {
                self.limb_index += 1;
                continue;
            }
            let bit = limb.trailing_zeros();
            *limb &= *limb - 1;
            return Some(Feature(self.limb_index * 64 + bit));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_is_low_to_high() {
        let mut set = FeatureSet::default();
        set.0[0] = 1 << Feature::BUILD_ID.0 | 1 << Feature::HOSTNAME.0;
        set.0[2] = 1 << 2; // bit 130 lives in the third limb
        let features: Vec<Feature> = set.iter().collect();
        assert_eq!(
            features,
            vec![Feature::BUILD_ID, Feature::HOSTNAME, Feature(130)]
        );
        assert_eq!(set.len(), 3);
        assert!(set.has_feature(Feature::HOSTNAME));
        assert!(!set.has_feature(Feature::CMDLINE));
        assert!(!set.has_feature(Feature(999)));
    }

    #[test]
    fn empty_set() {
        let set = FeatureSet::default();
        assert!(set.is_empty());
        assert_eq!(set.iter().count(), 0);
    }

    #[test]
    fn debug_names() {
        assert_eq!(format!("{:?}", Feature::EVENT_DESC), "EVENT_DESC");
        assert_eq!(format!("{:?}", Feature(200)), "Unknown Feature 200");
    }
}
