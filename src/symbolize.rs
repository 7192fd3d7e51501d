use gimli::{AttributeValue, EndianSlice, RunTimeEndian};
use object::{Object, ObjectKind, ObjectSection, ObjectSymbol, SymbolKind};

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::meta::BuildIdInfo;
use crate::session::{Mmap, Session};

/// The result of symbolizing one instruction pointer.
#[derive(Debug, Clone, Default)]
pub struct Symbolic {
    pub func_name: Option<String>,
    pub line: Option<LineEntry>,
}

/// One row of an image's line table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEntry {
    pub address: u64,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub is_stmt: bool,
    /// Marks the first address past a sequence; such a row describes no
    /// instruction.
    pub end_sequence: bool,
}

/// A function's address range in an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncRange {
    pub name: String,
    pub low_pc: u64,
    pub high_pc: u64,
}

#[derive(thiserror::Error, Debug)]
enum ImageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object parse error: {0}")]
    Object(#[from] object::read::Error),

    #[error("DWARF parse error: {0}")]
    Dwarf(#[from] gimli::Error),
}

/// Resolves instruction pointers to function names and source lines.
///
/// Images are loaded on demand, keyed by the mmap's filename: the build-ID
/// cache directory is consulted first when the profile records a build ID
/// for the file, then the original path. Per-image tables are cached for
/// the lifetime of the symbolizer; load failures are cached too, so a
/// missing binary is only probed once.
pub struct Symbolizer {
    build_id_dir: PathBuf,
    images: HashMap<String, Option<Arc<SymbolTable>>>,
}

impl Default for Symbolizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Symbolizer {
    /// Creates a symbolizer using the default perf build-ID cache
    /// directory, `$HOME/.debug`.
    pub fn new() -> Self {
        let build_id_dir = match std::env::var_os("HOME") {
            Some(home) => Path::new(&home).join(".debug"),
            None => PathBuf::from(".debug"),
        };
        Self::with_build_id_dir(build_id_dir)
    }

    pub fn with_build_id_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            build_id_dir: dir.into(),
            images: HashMap::new(),
        }
    }

    /// Symbolizes `ip` within `mmap`. Returns false when no image could
    /// be loaded for the mapping; `out` fields are `None` when the image
    /// has no covering function or line entry.
    pub fn symbolize(
        &mut self,
        session: &Session,
        mmap: &Mmap,
        ip: u64,
        out: &mut Symbolic,
    ) -> bool {
        let Some(table) = self.image_for(session.build_ids(), &mmap.filename) else {
            *out = Symbolic::default();
            return false;
        };

        // For shared objects the table addresses are image-relative;
        // translate the mapped ip back through the mapping.
        let lookup_ip = if table.is_reloc {
            ip.wrapping_sub(mmap.addr.wrapping_sub(mmap.file_offset))
        } else {
            ip
        };

        let (func, line) = table.find_ip(lookup_ip);
        out.func_name = func.map(|f| f.name.clone());
        out.line = line.cloned();
        true
    }

    fn image_for(&mut self, build_ids: &[BuildIdInfo], filename: &str) -> Option<Arc<SymbolTable>> {
        if let Some(cached) = self.images.get(filename) {
            return cached.clone();
        }

        let mut table = None;
        for info in build_ids {
            if info.filename != filename {
                continue;
            }
            let hex = info.build_id.to_string();
            let cached_path = self
                .build_id_dir
                .join(".build-id")
                .join(&hex[..2])
                .join(&hex[2..]);
            match SymbolTable::load(&cached_path) {
                Ok(t) => {
                    table = Some(Arc::new(t));
                    break;
                }
                Err(err) => {
                    log::debug!(
                        "no build-id cache entry for {filename} at {}: {err}",
                        cached_path.display()
                    );
                }
            }
        }

        if table.is_none() {
            match SymbolTable::load(Path::new(filename)) {
                Ok(t) => table = Some(Arc::new(t)),
                Err(err) => log::warn!("cannot symbolize {filename}: {err}"),
            }
        }

        self.images.insert(filename.to_string(), table.clone());
        table
    }
}

/// The cached function and line tables of one loaded image.
struct SymbolTable {
    /// Sorted by `low_pc`.
    functab: Vec<FuncRange>,
    /// Sorted by `address`.
    linetab: Vec<LineEntry>,
    /// The image is a shared object, so symbol addresses are relative to
    /// the image rather than absolute.
    is_reloc: bool,
}

impl SymbolTable {
    fn load(path: &Path) -> Result<Self, ImageError> {
        let data = std::fs::read(path)?;
        let obj = object::File::parse(&data[..])?;
        let is_reloc = obj.kind() == ObjectKind::Dynamic;

        let (functab, linetab) = if obj.section_by_name(".debug_info").is_some() {
            Self::load_dwarf(&obj)?
        } else {
            (Self::load_elf_symbols(&obj), Vec::new())
        };

        Ok(Self {
            functab,
            linetab,
            is_reloc,
        })
    }

    /// Builds the function table from DWARF subprograms and the line
    /// table from every compile unit's line program.
    fn load_dwarf(obj: &object::File) -> Result<(Vec<FuncRange>, Vec<LineEntry>), ImageError> {
        let endian = if obj.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };

        let load_section = |id: gimli::SectionId| -> Result<Cow<[u8]>, gimli::Error> {
            match obj.section_by_name(id.name()) {
                Some(section) => Ok(section
                    .uncompressed_data()
                    .unwrap_or(Cow::Borrowed(&[][..]))),
                None => Ok(Cow::Borrowed(&[][..])),
            }
        };
        let dwarf_sections = gimli::Dwarf::load(&load_section)?;
        let dwarf = dwarf_sections.borrow(|section| EndianSlice::new(section, endian));

        let mut functab = Vec::new();
        let mut linetab = Vec::new();

        let mut units = dwarf.units();
        while let Some(header) = units.next()? {
            let unit = dwarf.unit(header)?;

            let mut entries = unit.entries();
            while let Some((_, entry)) = entries.next_dfs()? {
                if entry.tag() != gimli::DW_TAG_subprogram {
                    continue;
                }
                let Some(name_attr) = entry.attr_value(gimli::DW_AT_name)? else {
                    continue;
                };
                let Ok(name) = dwarf.attr_string(&unit, name_attr) else {
                    continue;
                };
                let Some(AttributeValue::Addr(low_pc)) = entry.attr_value(gimli::DW_AT_low_pc)?
                else {
                    continue;
                };
                let high_pc = match entry.attr_value(gimli::DW_AT_high_pc)? {
                    Some(AttributeValue::Addr(addr)) => addr,
                    Some(AttributeValue::Udata(size)) => low_pc + size,
                    _ => continue,
                };
                functab.push(FuncRange {
                    name: name.to_string_lossy().into_owned(),
                    low_pc,
                    high_pc,
                });
            }

            let Some(program) = unit.line_program.clone() else {
                continue;
            };
            let mut file_names: HashMap<u64, String> = HashMap::new();
            let mut rows = program.rows();
            while let Some((header, row)) = rows.next_row()? {
                let file = match row.file(header) {
                    Some(file_entry) => file_names
                        .entry(row.file_index())
                        .or_insert_with(|| {
                            let name = dwarf
                                .attr_string(&unit, file_entry.path_name())
                                .map(|s| s.to_string_lossy().into_owned())
                                .unwrap_or_default();
                            match file_entry
                                .directory(header)
                                .and_then(|dir| dwarf.attr_string(&unit, dir).ok())
                            {
                                Some(dir) if !name.starts_with('/') => {
                                    format!("{}/{}", dir.to_string_lossy(), name)
                                }
                                _ => name,
                            }
                        })
                        .clone(),
                    None => String::new(),
                };
                linetab.push(LineEntry {
                    address: row.address(),
                    file,
                    line: row.line().map(|l| l.get() as u32).unwrap_or(0),
                    column: match row.column() {
                        gimli::ColumnType::Column(c) => c.get() as u32,
                        gimli::ColumnType::LeftEdge => 0,
                    },
                    is_stmt: row.is_stmt(),
                    end_sequence: row.end_sequence(),
                });
            }
        }

        functab.sort_by_key(|f| f.low_pc);
        linetab.sort_by_key(|l| l.address);
        Ok((functab, linetab))
    }

    /// Falls back to the ELF symbol table: defined function symbols,
    /// with missing sizes closed by the next symbol's start.
    fn load_elf_symbols(obj: &object::File) -> Vec<FuncRange> {
        let mut syms: Vec<(u64, u64, String)> = obj
            .symbols()
            .filter(|sym| sym.kind() == SymbolKind::Text && sym.section_index().is_some())
            .filter_map(|sym| {
                let name = sym.name().ok()?;
                if name.is_empty() {
                    return None;
                }
                Some((sym.address(), sym.size(), name.to_string()))
            })
            .collect();
        syms.sort_by(|a, b| a.0.cmp(&b.0));

        let mut functab = Vec::with_capacity(syms.len());
        for i in 0..syms.len() {
            let (low_pc, size, ref name) = syms[i];
            let high_pc = if size > 0 {
                low_pc + size
            } else {
                match syms.get(i + 1) {
                    Some(&(next_low, _, _)) => next_low,
                    None => low_pc + 1,
                }
            };
            functab.push(FuncRange {
                name: name.clone(),
                low_pc,
                high_pc,
            });
        }
        functab
    }

    fn find_ip(&self, ip: u64) -> (Option<&FuncRange>, Option<&LineEntry>) {
        let mut func = None;
        let i = self.functab.partition_point(|f| f.high_pc <= ip);
        if let Some(candidate) = self.functab.get(i) {
            if candidate.low_pc <= ip && ip < candidate.high_pc {
                func = Some(candidate);
            }
        }

        let mut line = None;
        let i = self.linetab.partition_point(|l| l.address <= ip);
        if i != 0 && !self.linetab[i - 1].end_sequence {
            line = Some(&self.linetab[i - 1]);
        }

        (func, line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(functab: Vec<FuncRange>, linetab: Vec<LineEntry>) -> SymbolTable {
        SymbolTable {
            functab,
            linetab,
            is_reloc: false,
        }
    }

    fn func(name: &str, low_pc: u64, high_pc: u64) -> FuncRange {
        FuncRange {
            name: name.to_string(),
            low_pc,
            high_pc,
        }
    }

    fn line(address: u64, line: u32, end_sequence: bool) -> LineEntry {
        LineEntry {
            address,
            file: "main.c".to_string(),
            line,
            column: 0,
            is_stmt: true,
            end_sequence,
        }
    }

    #[test]
    fn find_ip_binary_search() {
        let t = table(
            vec![func("a", 0x1000, 0x1100), func("b", 0x1100, 0x1240)],
            vec![line(0x1000, 10, false), line(0x1080, 12, false), line(0x1240, 0, true)],
        );

        let (f, l) = t.find_ip(0x1000);
        assert_eq!(f.unwrap().name, "a");
        assert_eq!(l.unwrap().line, 10);

        let (f, l) = t.find_ip(0x10ff);
        assert_eq!(f.unwrap().name, "a");
        assert_eq!(l.unwrap().line, 12);

        let (f, _) = t.find_ip(0x1100);
        assert_eq!(f.unwrap().name, "b");

        // Past the last function and behind an end-of-sequence marker.
        let (f, l) = t.find_ip(0x2000);
        assert!(f.is_none());
        assert!(l.is_none());

        // Before everything.
        let (f, l) = t.find_ip(0x800);
        assert!(f.is_none());
        assert!(l.is_none());
    }

    #[test]
    fn sizeless_symbols_get_synthetic_bounds() {
        // Mirrors what load_elf_symbols produces for size-0 symbols.
        let syms = vec![(0x1000u64, 0u64, "a".to_string()), (0x1040, 0, "b".to_string())];
        let mut functab = Vec::new();
        for i in 0..syms.len() {
            let (low_pc, size, ref name) = syms[i];
            let high_pc = if size > 0 {
                low_pc + size
            } else {
                syms.get(i + 1).map(|s| s.0).unwrap_or(low_pc + 1)
            };
            functab.push(FuncRange {
                name: name.clone(),
                low_pc,
                high_pc,
            });
        }
        assert_eq!(functab[0].high_pc, 0x1040);
        assert_eq!(functab[1].high_pc, 0x1041);
    }

    #[test]
    fn missing_image_is_tombstoned() {
        let mut symbolizer = Symbolizer::with_build_id_dir("/nonexistent");
        assert!(symbolizer.image_for(&[], "/no/such/binary/exists").is_none());
        // The failure is cached as a tombstone.
        assert!(symbolizer.images.contains_key("/no/such/binary/exists"));
        assert!(symbolizer.images["/no/such/binary/exists"].is_none());
    }
}
