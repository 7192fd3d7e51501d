use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::Arc;

use crate::attr::{AttrFlags, EventAttr, ReadFormat, SampleFormat};
use crate::buf::BufDecoder;
use crate::buffered_reader::SectionReader;
use crate::error::{Error, ReadError};
use crate::features::FeatureSet;
use crate::header::FileHeader;
use crate::meta::FileMeta;
use crate::records::{Records, RecordsOrder};
use crate::section::FileSection;

const MAX_EVENT_ATTRS: u64 = 64 * 1024;

/// A parsed perf.data file: the event attributes, the feature metadata,
/// and access to the record stream.
///
/// Opening a file parses the header, the attribute table and the feature
/// sections eagerly; records are decoded on demand through
/// [`PerfFile::records`].
pub struct PerfFile<R: Read + Seek> {
    pub(crate) reader: SectionReader<R>,
    pub(crate) hdr: FileHeader,
    pub(crate) events: Vec<Arc<EventAttr>>,
    pub(crate) id_to_attr: HashMap<u64, Arc<EventAttr>>,
    /// Byte offset of the event ID within sample records, shared by all
    /// events.
    pub(crate) sample_id_offset: Option<usize>,
    /// Byte offset of the event ID within non-sample records, from the
    /// end, shared by all events.
    pub(crate) record_id_offset: Option<i64>,
    /// Non-sample records carry a sample_id trailer.
    pub(crate) sample_id_all: bool,
    pub(crate) meta: FileMeta,
}

impl PerfFile<File> {
    /// Opens the named perf.data file. The file handle is owned by the
    /// returned value and released when it is dropped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::parse(File::open(path)?)
    }
}

impl<R: Read + Seek> PerfFile<R> {
    /// Parses a perf.data file from a seekable reader.
    pub fn parse(reader: R) -> Result<Self, Error> {
        let mut reader = SectionReader::new(reader)?;

        let mut header_bytes = [0u8; FileHeader::STRUCT_SIZE as usize];
        reader
            .read_exact(&mut header_bytes)
            .map_err(|_| ReadError::Header)?;
        let hdr = FileHeader::parse(&header_bytes[..])?;

        // Load the attribute table. The attr size is recorded both in the
        // file header and in each attr; perf trusts the per-attr size for
        // the struct and the header size for the slot stride.
        if hdr.attr_size == 0 {
            return Err(Error::BadAttrSize(0));
        }
        let n_attrs = hdr.attr_section.size / hdr.attr_size;
        if n_attrs == 0 {
            return Err(Error::NoEvents);
        }
        if n_attrs > MAX_EVENT_ATTRS {
            return Err(Error::TooManyEvents);
        }

        let mut events = Vec::with_capacity(n_attrs as usize);
        let mut id_sections = Vec::with_capacity(n_attrs as usize);
        let mut slot = vec![0u8; hdr.attr_size as usize];
        for i in 0..n_attrs {
            reader.seek_to(hdr.attr_section.offset + i * hdr.attr_size);
            reader
                .read_exact(&mut slot)
                .map_err(|_| ReadError::EventAttr)?;
            let mut bd = BufDecoder::new(&slot, ReadError::EventAttr);
            let (attr, _size) = EventAttr::parse(&mut bd)?;
            // The attr struct is followed by the fileSection of its ID list.
            let ids = FileSection {
                offset: bd.u64()?,
                size: bd.u64()?,
            };
            events.push(Arc::new(attr));
            id_sections.push(ids);
        }

        // Read the event ID lists and build the id -> attr map.
        let mut id_to_attr = HashMap::new();
        let mut id_bytes = Vec::new();
        for (attr, ids) in events.iter().zip(&id_sections) {
            id_bytes.resize(ids.size as usize, 0);
            reader.seek_to(ids.offset);
            reader
                .read_exact(&mut id_bytes)
                .map_err(|_| ReadError::AttrIds)?;
            let mut bd = BufDecoder::new(&id_bytes, ReadError::AttrIds);
            for _ in 0..ids.size / 8 {
                id_to_attr.insert(bd.u64()?, attr.clone());
            }
        }
        if id_to_attr.is_empty() && events.len() == 1 {
            // Single-event files may omit IDs entirely; samples then
            // resolve through a synthetic ID of 0.
            id_to_attr.insert(0, events[0].clone());
        }

        // Check that the sample formats are consistent across all events
        // and compute the cross-event ID offsets.
        let first = &events[0];
        let sample_id_offset = first.sample_format.sample_id_offset();
        let record_id_offset = first.sample_format.record_id_offset();
        let sample_id_all = first.flags.contains(AttrFlags::SAMPLE_ID_ALL);
        if events.len() > 1 {
            if id_to_attr.is_empty() {
                return Err(Error::MissingEventIds);
            }
            for attr in &events {
                let sample_off = attr
                    .sample_format
                    .sample_id_offset()
                    .ok_or(Error::NoSampleIdField)?;
                let expected = sample_id_offset.ok_or(Error::NoSampleIdField)?;
                if sample_off != expected {
                    return Err(Error::IncompatibleSampleIdOffsets(expected, sample_off));
                }

                let record_off = attr
                    .sample_format
                    .record_id_offset()
                    .ok_or(Error::NoRecordIdField)?;
                let expected = record_id_offset.ok_or(Error::NoRecordIdField)?;
                if record_off != expected {
                    return Err(Error::IncompatibleRecordIdOffsets(expected, record_off));
                }

                if attr.flags.contains(AttrFlags::SAMPLE_ID_ALL) != sample_id_all {
                    return Err(Error::InconsistentSampleIdAll);
                }

                if attr.read_format != first.read_format {
                    return Err(Error::IncompatibleReadFormats);
                }
            }
            if first.sample_format.contains(SampleFormat::READ)
                && !first.read_format.contains(ReadFormat::ID)
            {
                return Err(Error::BadReadFormat);
            }
        }

        // Load the feature sections. Their descriptors sit immediately
        // after the data section, one per set bit, low bit first.
        let mut meta = FileMeta::default();
        reader.seek_to(hdr.data_section.end());
        let mut descriptor = [0u8; FileSection::STRUCT_SIZE as usize];
        let mut feature_sections = Vec::with_capacity(hdr.features.len());
        for feature in hdr.features.iter() {
            reader
                .read_exact(&mut descriptor)
                .map_err(|_| ReadError::FeatureSection)?;
            feature_sections.push((feature, FileSection::parse(&descriptor[..])?));
        }
        let mut section_data = Vec::new();
        for (feature, section) in feature_sections {
            let size = usize::try_from(section.size).map_err(|_| Error::SectionSizeTooBig)?;
            section_data.resize(size, 0);
            reader.seek_to(section.offset);
            reader
                .read_exact(&mut section_data)
                .map_err(|_| ReadError::FeatureSection)?;
            meta.parse_feature(feature, &section_data)?;
        }

        Ok(Self {
            reader,
            hdr,
            events,
            id_to_attr,
            sample_id_offset,
            record_id_offset,
            sample_id_all,
            meta,
        })
    }

    /// All events that may appear in this profile, in file order.
    pub fn events(&self) -> &[Arc<EventAttr>] {
        &self.events
    }

    /// The profile's metadata.
    pub fn meta(&self) -> &FileMeta {
        &self.meta
    }

    /// The feature bitmap from the file header.
    pub fn features(&self) -> FeatureSet {
        self.hdr.features
    }

    /// Whether non-sample records carry a sample_id trailer.
    pub fn sample_id_all(&self) -> bool {
        self.sample_id_all
    }

    pub(crate) fn get_attr(&self, id: u64) -> Result<Arc<EventAttr>, Error> {
        self.id_to_attr
            .get(&id)
            .cloned()
            .ok_or(Error::UnknownEventId(id))
    }

    /// Returns an iterator over the records in the profile.
    ///
    /// Callers should choose the least resource-intensive order that
    /// satisfies their needs: `File` streams, while `Causal` and `Time`
    /// scan the data section once to collect time stamps, stable-sort,
    /// and then re-read records in sorted order.
    pub fn records(&mut self, order: RecordsOrder) -> Result<Records<'_, R>, Error> {
        let order = match order {
            RecordsOrder::File => None,
            RecordsOrder::Causal | RecordsOrder::Time => {
                let mut pairs: Vec<(u64, u64)> = Vec::new();
                let mut pass = Records::new(self, None);
                while let Some(record) = pass.next() {
                    let common = record.common();
                    pairs.push((common.offset, common.time));
                }
                if let Some(err) = pass.take_err() {
                    return Err(err);
                }
                drop(pass);
                // Stable by time, so records with equal time stamps keep
                // their file order.
                pairs.sort_by_key(|&(_, time)| time);
                Some(pairs.into_iter().map(|(offset, _)| offset).collect())
            }
        };
        Ok(Records::new(self, order))
    }
}
