//! ELF images as seen by the boot engine
//!
//! Only two things are taken from a binary: its symbol table and its PT_LOAD
//! program headers. The program headers double as the virtual→physical map
//! used to find symbols in target memory.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use fwboot_api::{Error, MemoryRegion, RemoteMemory, Result, Segment};
use xmas_elf::ElfFile;
use xmas_elf::program::Type;
use xmas_elf::sections::SectionData;
use xmas_elf::symbol_table::Entry;

/// Decoded host binary
#[derive(Debug, Clone)]
pub struct ElfImage {
    name: String,
    data: Vec<u8>,
    entry_point: u64,
    symbols: HashMap<String, u64>,
    segments: Vec<Segment>,
}

impl ElfImage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let data = fs::read(path).map_err(|err| Error::binary(&name, err.to_string()))?;
        Self::from_bytes(name, data)
    }

    /// Decodes an image already in memory; `name` is used in errors
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Result<Self> {
        let name = name.into();
        let (entry_point, symbols, segments) = {
            let elf = ElfFile::new(&data).map_err(|reason| Error::binary(&name, reason))?;
            let segments = load_segments(&elf, &name, data.len() as u64)?;
            (elf.header.pt2.entry_point(), symbol_table(&elf), segments)
        };
        if segments.is_empty() {
            return Err(Error::binary(&name, "no PT_LOAD segments"));
        }

        log::debug!(
            "{}: {} segments, {} symbols, entry {:#x}",
            name,
            segments.len(),
            symbols.len(),
            entry_point
        );
        Ok(Self {
            name,
            data,
            entry_point,
            symbols,
            segments,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry_point(&self) -> u64 {
        self.entry_point
    }

    /// Virtual address of `name`
    pub fn symbol(&self, name: &str) -> Result<u64> {
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| Error::SymbolNotFound(name.to_string()))
    }

    /// Physical address backing `address` according to the program headers
    pub fn physical_address(&self, address: u64) -> Result<u64> {
        self.regions()
            .find_map(|region| region.translate(address))
            .ok_or(Error::UnmappedAddress(address))
    }

    pub fn symbol_physical(&self, name: &str) -> Result<u64> {
        self.physical_address(self.symbol(name)?)
    }

    /// Loadable segments in file order
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn regions(&self) -> impl Iterator<Item = MemoryRegion> + '_ {
        self.segments.iter().map(Segment::region)
    }

    /// File bytes of `segment`
    pub fn segment_data(&self, segment: &Segment) -> &[u8] {
        let start = segment.file_offset as usize;
        &self.data[start..start + segment.file_size as usize]
    }

    /// Writes every segment to its physical address and clears its BSS tail
    ///
    /// Returns the entry point.
    pub fn load(&self, fw: &mut dyn RemoteMemory) -> Result<u64> {
        for segment in &self.segments {
            if segment.mem_size == 0 {
                continue;
            }
            let target = self.physical_address(segment.virtual_address)?;
            log::debug!(
                "{}: segment {:#x} -> phys {:#x} ({:#x} file, {:#x} mem)",
                self.name,
                segment.virtual_address,
                target,
                segment.file_size,
                segment.mem_size
            );
            if segment.file_size != 0 {
                fw.write(target, self.segment_data(segment))?;
            }
            let zeros = segment.zero_fill();
            if zeros != 0 {
                fw.write(target + segment.file_size, &vec![0u8; zeros as usize])?;
            }
        }
        Ok(self.entry_point)
    }
}

fn load_segments(elf: &ElfFile<'_>, name: &str, file_len: u64) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    for header in elf.program_iter() {
        if !matches!(header.get_type(), Ok(Type::Load)) {
            continue;
        }
        let segment = Segment {
            file_offset: header.offset(),
            virtual_address: header.virtual_addr(),
            physical_load_hint: header.physical_addr(),
            file_size: header.file_size(),
            mem_size: header.mem_size(),
        };
        let in_file = segment
            .file_offset
            .checked_add(segment.file_size)
            .is_some_and(|end| end <= file_len);
        if !in_file {
            return Err(Error::binary(
                name,
                format!("segment at {:#x} extends past end of file", segment.virtual_address),
            ));
        }
        if segment.mem_size < segment.file_size {
            return Err(Error::binary(
                name,
                format!("segment at {:#x} has memsz below filesz", segment.virtual_address),
            ));
        }
        segments.push(segment);
    }
    Ok(segments)
}

fn symbol_table(elf: &ElfFile<'_>) -> HashMap<String, u64> {
    let mut symbols = HashMap::new();
    for section in elf.section_iter() {
        match section.get_data(elf) {
            Ok(SectionData::SymbolTable32(entries)) => collect_symbols(elf, entries, &mut symbols),
            Ok(SectionData::SymbolTable64(entries)) => collect_symbols(elf, entries, &mut symbols),
            _ => {}
        }
    }
    symbols
}

fn collect_symbols<'a, E: Entry>(elf: &ElfFile<'a>, entries: &'a [E], symbols: &mut HashMap<String, u64>) {
    for entry in entries {
        // undefined
        if entry.shndx() == 0 {
            continue;
        }
        match entry.get_name(elf) {
            Ok(name) if !name.is_empty() => {
                symbols.insert(name.to_string(), entry.value());
            }
            _ => {}
        }
    }
}
