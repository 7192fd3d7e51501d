//! In-memory perf.data construction for the integration tests.

/// Little-endian byte assembly.
#[derive(Default)]
pub struct Bytes(pub Vec<u8>);

#[allow(dead_code)]
impl Bytes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u16(mut self, v: u16) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i32(mut self, v: i32) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u64(mut self, v: u64) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i64(mut self, v: i64) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn bytes(mut self, v: &[u8]) -> Self {
        self.0.extend_from_slice(v);
        self
    }

    /// A zero-terminated string padded to 8-byte alignment.
    pub fn str0(mut self, s: &str) -> Self {
        self.0.extend_from_slice(s.as_bytes());
        self.0.push(0);
        while self.0.len() % 8 != 0 {
            self.0.push(0);
        }
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.0
    }
}

/// A full on-disk record: header plus payload.
pub fn record(type_: u32, misc: u16, payload: &[u8]) -> Vec<u8> {
    let size = (8 + payload.len()) as u16;
    let mut out = Bytes::new().u32(type_).u16(misc).u16(size).build();
    out.extend_from_slice(payload);
    out
}

/// One event attribute for [`FileBuilder`].
pub struct AttrSpec {
    /// Value of the on-disk size field. 0 and 64 emit a v0 struct (0
    /// exercises the assume-v0 path); 128 emits a full v7 struct with the
    /// extended fields below.
    pub size: u32,
    pub sample_format: u64,
    pub read_format: u64,
    pub flags: u64,
    pub branch_sample_format: u64,
    pub sample_regs_user: u64,
    pub sample_regs_intr: u64,
    pub ids: Vec<u64>,
}

impl Default for AttrSpec {
    fn default() -> Self {
        Self {
            size: 64,
            sample_format: 0,
            read_format: 0,
            flags: 0,
            branch_sample_format: 0,
            sample_regs_user: 0,
            sample_regs_intr: 0,
            ids: Vec::new(),
        }
    }
}

impl AttrSpec {
    /// The on-disk attr struct for a cpu-cycles hardware event: the
    /// 64-byte v0 prefix, optionally extended to the 128-byte v7 form.
    fn to_bytes(&self) -> Vec<u8> {
        let v0 = Bytes::new()
            .u32(0) // PERF_TYPE_HARDWARE
            .u32(self.size)
            .u64(0) // config: cpu-cycles
            .u64(4000) // sample period
            .u64(self.sample_format)
            .u64(self.read_format)
            .u64(self.flags)
            .u32(0) // wakeup_events
            .u32(0) // bp_type
            .u64(0); // config1
        if self.size <= 64 {
            return v0.build();
        }
        v0.u64(0) // config2
            .u64(self.branch_sample_format)
            .u64(self.sample_regs_user)
            .u32(0) // sample_stack_user
            .u32(0) // clockid
            .u64(self.sample_regs_intr)
            .u32(0) // aux_watermark
            .u16(0) // sample_max_stack
            .u16(0)
            .u32(0) // aux_sample_size
            .u32(0)
            .u64(0) // sig_data
            .build()
    }
}

const HEADER_SIZE: u64 = 104;
const ATTR_V7_SIZE: u64 = 128;
const ATTR_SLOT_SIZE: u64 = ATTR_V7_SIZE + 16;

/// Assembles a little-endian v2 perf.data byte stream: header, attr
/// table, per-attr ID lists, data section, feature descriptors and
/// feature sections.
#[derive(Default)]
pub struct FileBuilder {
    attrs: Vec<AttrSpec>,
    data: Vec<u8>,
    features: Vec<(u32, Vec<u8>)>,
}

#[allow(dead_code)]
impl FileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attr(mut self, attr: AttrSpec) -> Self {
        self.attrs.push(attr);
        self
    }

    /// Appends one record (or raw trailing bytes) to the data section.
    pub fn record(mut self, bytes: Vec<u8>) -> Self {
        self.data.extend_from_slice(&bytes);
        self
    }

    pub fn feature(mut self, bit: u32, data: Vec<u8>) -> Self {
        self.features.push((bit, data));
        self
    }

    /// The file offset at which the data section will start, for tests
    /// that assert record offsets.
    pub fn data_offset(&self) -> u64 {
        let ids: u64 = self.attrs.iter().map(|a| a.ids.len() as u64 * 8).sum();
        HEADER_SIZE + self.attrs.len() as u64 * ATTR_SLOT_SIZE + ids
    }

    pub fn build(self) -> Vec<u8> {
        assert!(!self.data.is_empty(), "a perf.data file needs records");

        let attrs_offset = HEADER_SIZE;
        let attrs_size = self.attrs.len() as u64 * ATTR_SLOT_SIZE;

        // ID lists follow the attr table.
        let mut ids_offset = attrs_offset + attrs_size;
        let mut id_sections = Vec::new();
        for attr in &self.attrs {
            let size = attr.ids.len() as u64 * 8;
            id_sections.push((ids_offset, size));
            ids_offset += size;
        }

        let data_offset = ids_offset;
        let data_size = self.data.len() as u64;
        let feature_descs_offset = data_offset + data_size;

        let mut feature_bitmap = [0u64; 4];
        for (bit, _) in &self.features {
            feature_bitmap[(bit / 64) as usize] |= 1 << (bit % 64);
        }

        let mut out = Bytes::new()
            .bytes(b"PERFILE2")
            .u64(HEADER_SIZE)
            .u64(ATTR_SLOT_SIZE)
            .u64(attrs_offset)
            .u64(attrs_size)
            .u64(data_offset)
            .u64(data_size)
            .u64(0) // event_types section
            .u64(0)
            .u64(feature_bitmap[0])
            .u64(feature_bitmap[1])
            .u64(feature_bitmap[2])
            .u64(feature_bitmap[3])
            .build();
        assert_eq!(out.len() as u64, HEADER_SIZE);

        // Each slot: the attr struct, immediately followed by the ID list
        // fileSection, padded out to the slot stride.
        for (attr, &(offset, size)) in self.attrs.iter().zip(&id_sections) {
            let slot_start = out.len();
            out.extend_from_slice(&attr.to_bytes());
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&size.to_le_bytes());
            out.resize(slot_start + ATTR_SLOT_SIZE as usize, 0);
        }
        for attr in &self.attrs {
            for id in &attr.ids {
                out.extend_from_slice(&id.to_le_bytes());
            }
        }

        assert_eq!(out.len() as u64, data_offset);
        out.extend_from_slice(&self.data);

        // Feature descriptors in bit order, then the sections themselves.
        let mut features = self.features;
        features.sort_by_key(|&(bit, _)| bit);
        let mut section_offset = feature_descs_offset + features.len() as u64 * 16;
        let mut descs = Vec::new();
        for (_, data) in &features {
            descs.push((section_offset, data.len() as u64));
            section_offset += data.len() as u64;
        }
        for &(offset, size) in &descs {
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&size.to_le_bytes());
        }
        for (_, data) in &features {
            out.extend_from_slice(data);
        }

        out
    }
}
