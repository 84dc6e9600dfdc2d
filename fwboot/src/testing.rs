//! In-memory stand-ins for the target node and host binaries
//!
//! `InMemoryTarget` behaves like a node on the bus: sparse byte-addressable
//! memory that records every write in issue order. `ElfBuilder` produces
//! small ELF64 images with PT_LOAD segments and a symbol table.

use std::collections::BTreeMap;

use fwboot_api::constants::{
    AGENT_MODEL_ID, AGENT_VENDOR_ID, CROM_BASE, CROM_CONTROL_BLOCK_QUADLET, CROM_MODEL_QUADLET,
    CROM_VENDOR_QUADLET,
};
use fwboot_api::{Error, RemoteMemory, Result};

/// One write as issued to the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub address: u64,
    pub data: Vec<u8>,
}

impl WriteRecord {
    /// Returns true if the write touched `address`
    pub fn covers(&self, address: u64) -> bool {
        address >= self.address && address - self.address < self.data.len() as u64
    }
}

/// Sparse target memory; unwritten bytes read as zero
#[derive(Debug, Default)]
pub struct InMemoryTarget {
    memory: BTreeMap<u64, u8>,
    writes: Vec<WriteRecord>,
    reads: usize,
    absent: bool,
}

impl InMemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// A node whose configuration ROM carries the boot agent's signature
    /// and points at `control_block`
    pub fn with_agent(control_block: u32) -> Self {
        let mut target = Self::new();
        target.seed_rom(AGENT_VENDOR_ID, AGENT_MODEL_ID, control_block);
        target
    }

    /// Fills the ROM entries the way the agent lays them out
    pub fn seed_rom(&mut self, vendor: u32, model: u32, control_block: u32) {
        self.seed_quadlet(CROM_VENDOR_QUADLET, 0x03 << 24 | vendor);
        self.seed_quadlet(CROM_MODEL_QUADLET, 0x17 << 24 | model);
        self.seed_quadlet(CROM_CONTROL_BLOCK_QUADLET, control_block);
    }

    /// Stores a big-endian configuration ROM quadlet
    pub fn seed_quadlet(&mut self, index: u64, value: u32) {
        self.seed(CROM_BASE + index * 4, &value.to_be_bytes());
    }

    /// Stores bytes without recording a write
    pub fn seed(&mut self, address: u64, data: &[u8]) {
        for (offset, byte) in data.iter().enumerate() {
            self.memory.insert(address + offset as u64, *byte);
        }
    }

    pub fn seed_word(&mut self, address: u64, value: u32) {
        self.seed(address, &value.to_le_bytes());
    }

    pub fn peek(&self, address: u64, length: usize) -> Vec<u8> {
        (0..length as u64)
            .map(|offset| self.memory.get(&(address + offset)).copied().unwrap_or(0))
            .collect()
    }

    pub fn peek_word(&self, address: u64) -> u32 {
        let bytes = self.peek(address, 4);
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn writes(&self) -> &[WriteRecord] {
        &self.writes
    }

    pub fn read_count(&self) -> usize {
        self.reads
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    /// While absent every operation fails like an unplugged node
    pub fn set_absent(&mut self, absent: bool) {
        self.absent = absent;
    }

    fn check_present(&self, op: &str, address: u64) -> Result<()> {
        if self.absent {
            return Err(Error::transport(
                format!("in-memory {op} {address:#x}"),
                "node not present",
            ));
        }
        Ok(())
    }
}

impl RemoteMemory for InMemoryTarget {
    fn read(&mut self, address: u64, length: u32) -> Result<Vec<u8>> {
        self.check_present("read", address)?;
        self.reads += 1;
        Ok(self.peek(address, length as usize))
    }

    fn write(&mut self, address: u64, data: &[u8]) -> Result<()> {
        self.check_present("write", address)?;
        self.seed(address, data);
        self.writes.push(WriteRecord {
            address,
            data: data.to_vec(),
        });
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct BuilderSegment {
    virtual_address: u64,
    physical_address: u64,
    data: Vec<u8>,
    mem_size: u64,
}

/// Builds little-endian x86-64 ELF executables
#[derive(Debug, Clone, Default)]
pub struct ElfBuilder {
    entry: u64,
    segments: Vec<BuilderSegment>,
    symbols: Vec<(String, u64)>,
}

const EHDR_SIZE: usize = 64;
const PHDR_SIZE: usize = 56;
const SHDR_SIZE: usize = 64;
const SYM_SIZE: usize = 24;
const SHN_ABS: u16 = 0xfff1;

impl ElfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, entry: u64) -> Self {
        self.entry = entry;
        self
    }

    /// Adds a PT_LOAD segment; `mem_size` must not be below `data.len()`
    pub fn segment(mut self, virtual_address: u64, physical_address: u64, data: &[u8], mem_size: u64) -> Self {
        self.segments.push(BuilderSegment {
            virtual_address,
            physical_address,
            data: data.to_vec(),
            mem_size,
        });
        self
    }

    pub fn symbol(mut self, name: &str, value: u64) -> Self {
        self.symbols.push((name.to_string(), value));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = vec![0u8; EHDR_SIZE + PHDR_SIZE * self.segments.len()];

        let mut segment_offsets = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            align8(&mut out);
            segment_offsets.push(out.len() as u64);
            out.extend_from_slice(&segment.data);
        }

        align8(&mut out);
        let strtab_offset = out.len() as u64;
        let mut name_offsets = Vec::with_capacity(self.symbols.len());
        out.push(0);
        for (name, _) in &self.symbols {
            name_offsets.push((out.len() as u64 - strtab_offset) as u32);
            out.extend_from_slice(name.as_bytes());
            out.push(0);
        }
        let strtab_size = out.len() as u64 - strtab_offset;

        align8(&mut out);
        let shstrtab_offset = out.len() as u64;
        out.extend_from_slice(b"\0.symtab\0.strtab\0.shstrtab\0");
        let shstrtab_size = out.len() as u64 - shstrtab_offset;

        align8(&mut out);
        let symtab_offset = out.len() as u64;
        out.extend_from_slice(&[0u8; SYM_SIZE]);
        for ((_, value), name) in self.symbols.iter().zip(&name_offsets) {
            put_u32(&mut out, *name);
            out.push(0x12); // global function
            out.push(0);
            put_u16(&mut out, SHN_ABS);
            put_u64(&mut out, *value);
            put_u64(&mut out, 0);
        }
        let symtab_size = out.len() as u64 - symtab_offset;

        align8(&mut out);
        let shoff = out.len() as u64;
        out.extend_from_slice(&[0u8; SHDR_SIZE]);
        section_header(&mut out, 1, 2, symtab_offset, symtab_size, 2, 1, 8, SYM_SIZE as u64);
        section_header(&mut out, 9, 3, strtab_offset, strtab_size, 0, 0, 1, 0);
        section_header(&mut out, 17, 3, shstrtab_offset, shstrtab_size, 0, 0, 1, 0);

        let mut header = Vec::with_capacity(EHDR_SIZE);
        header.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
        header.extend_from_slice(&[0u8; 8]);
        put_u16(&mut header, 2); // ET_EXEC
        put_u16(&mut header, 0x3e); // x86-64
        put_u32(&mut header, 1);
        put_u64(&mut header, self.entry);
        put_u64(&mut header, EHDR_SIZE as u64);
        put_u64(&mut header, shoff);
        put_u32(&mut header, 0);
        put_u16(&mut header, EHDR_SIZE as u16);
        put_u16(&mut header, PHDR_SIZE as u16);
        put_u16(&mut header, self.segments.len() as u16);
        put_u16(&mut header, SHDR_SIZE as u16);
        put_u16(&mut header, 4);
        put_u16(&mut header, 3);
        out[..EHDR_SIZE].copy_from_slice(&header);

        for (index, (segment, offset)) in self.segments.iter().zip(&segment_offsets).enumerate() {
            let mut phdr = Vec::with_capacity(PHDR_SIZE);
            put_u32(&mut phdr, 1); // PT_LOAD
            put_u32(&mut phdr, 7);
            put_u64(&mut phdr, *offset);
            put_u64(&mut phdr, segment.virtual_address);
            put_u64(&mut phdr, segment.physical_address);
            put_u64(&mut phdr, segment.data.len() as u64);
            put_u64(&mut phdr, segment.mem_size);
            put_u64(&mut phdr, 8);
            let at = EHDR_SIZE + index * PHDR_SIZE;
            out[at..at + PHDR_SIZE].copy_from_slice(&phdr);
        }

        out
    }
}

#[allow(clippy::too_many_arguments)]
fn section_header(
    out: &mut Vec<u8>,
    name: u32,
    kind: u32,
    offset: u64,
    size: u64,
    link: u32,
    info: u32,
    align: u64,
    entsize: u64,
) {
    put_u32(out, name);
    put_u32(out, kind);
    put_u64(out, 0);
    put_u64(out, 0);
    put_u64(out, offset);
    put_u64(out, size);
    put_u32(out, link);
    put_u32(out, info);
    put_u64(out, align);
    put_u64(out, entsize);
}

fn align8(out: &mut Vec<u8>) {
    while out.len() % 8 != 0 {
        out.push(0);
    }
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_are_recorded_in_order() {
        let mut target = InMemoryTarget::new();
        target.write(0x2000, &[1, 2]).unwrap();
        target.write_word(0x1000, 5).unwrap();
        let addresses: Vec<u64> = target.writes().iter().map(|w| w.address).collect();
        assert_eq!(addresses, vec![0x2000, 0x1000]);
        assert_eq!(target.peek_word(0x1000), 5);
    }

    #[test]
    fn test_seed_is_not_recorded() {
        let mut target = InMemoryTarget::with_agent(0x9000);
        target.seed_word(0x9000, 1);
        assert!(target.writes().is_empty());
        assert_eq!(target.read(0x9000, 4).unwrap(), vec![1, 0, 0, 0]);
    }

    #[test]
    fn test_absent_node_fails_everything() {
        let mut target = InMemoryTarget::new();
        target.set_absent(true);
        assert!(target.read(0, 4).is_err());
        assert!(target.write(0, &[0]).is_err());
        target.set_absent(false);
        assert!(target.read(0, 4).is_ok());
    }

    #[test]
    fn test_write_record_covers() {
        let record = WriteRecord { address: 0x100, data: vec![0; 4] };
        assert!(record.covers(0x100));
        assert!(record.covers(0x103));
        assert!(!record.covers(0x104));
    }

    #[test]
    fn test_builder_layout() {
        let image = ElfBuilder::new()
            .entry(0x100000)
            .segment(0x100000, 0x100000, &[0xaa; 5], 16)
            .symbol("start", 0x100000)
            .build();
        assert_eq!(&image[..4], b"\x7fELF");
        assert_eq!(image.len() % 8, 0);
        // phnum
        assert_eq!(u16::from_le_bytes([image[56], image[57]]), 1);
    }
}
