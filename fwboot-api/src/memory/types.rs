//! Address-window types decoded from a binary's program headers

/// One contiguous virtual→physical mapping window of a loaded binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    /// First virtual address of the window
    pub virtual_address: u64,
    /// Physical address backing `virtual_address`
    pub physical_address: u64,
    /// Window size in bytes
    pub length: u64,
}

impl MemoryRegion {
    pub const fn new(virtual_address: u64, physical_address: u64, length: u64) -> Self {
        Self {
            virtual_address,
            physical_address,
            length,
        }
    }

    /// Returns true if `address` falls inside the window
    pub fn contains(&self, address: u64) -> bool {
        address >= self.virtual_address && address - self.virtual_address < self.length
    }

    /// Translates a virtual address inside the window to its physical address
    pub fn translate(&self, address: u64) -> Option<u64> {
        self.contains(address)
            .then(|| address - self.virtual_address + self.physical_address)
    }
}

/// One PT_LOAD chunk of a binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub file_offset: u64,
    pub virtual_address: u64,
    /// Physical load address from the program header
    pub physical_load_hint: u64,
    pub file_size: u64,
    /// In-memory size; the bytes past `file_size` are zero-filled
    pub mem_size: u64,
}

impl Segment {
    /// The mapping window this segment contributes
    pub fn region(&self) -> MemoryRegion {
        MemoryRegion::new(self.virtual_address, self.physical_load_hint, self.mem_size)
    }

    /// Number of trailing zero bytes (BSS)
    pub fn zero_fill(&self) -> u64 {
        self.mem_size.saturating_sub(self.file_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_translate_inside_window() {
        let region = MemoryRegion::new(0x100000, 0x000000, 0x2000);
        assert_eq!(region.translate(0x100500), Some(0x000500));
        assert_eq!(region.translate(0x100000), Some(0));
    }

    #[test]
    fn test_window_end_is_exclusive() {
        let region = MemoryRegion::new(0x100000, 0x000000, 0x2000);
        assert!(!region.contains(0x102000));
        assert!(region.contains(0x101fff));
        assert!(!region.contains(0x0fffff));
    }

    #[test]
    fn test_segment_zero_fill() {
        let segment = Segment {
            file_offset: 0x1000,
            virtual_address: 0xc000_0000,
            physical_load_hint: 0x0010_0000,
            file_size: 0x300,
            mem_size: 0x1000,
        };
        assert_eq!(segment.zero_fill(), 0xd00);
        assert_eq!(segment.region(), MemoryRegion::new(0xc000_0000, 0x0010_0000, 0x1000));
    }

    proptest! {
        #[test]
        fn translate_preserves_offset(virt in 0u64..(1 << 40), phys in 0u64..(1 << 40), len in 1u64..(1 << 24), off in 0u64..(1 << 24)) {
            let region = MemoryRegion::new(virt, phys, len);
            let addr = virt + off;
            match region.translate(addr) {
                Some(p) => {
                    prop_assert!(off < len);
                    prop_assert_eq!(p - phys, off);
                }
                None => prop_assert!(off >= len),
            }
        }
    }
}
