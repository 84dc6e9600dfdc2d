//! Multiboot structures as they appear in target memory
//!
//! The target is a 32-bit x86 machine: every field is a little-endian
//! `u32` (or `u16` for interrupt gates).

use bitflags::bitflags;
use static_assertions::assert_eq_size;

use crate::constants::{GATE_SELECTOR, GATE_TYPE_ATTR};

bitflags! {
    /// Multiboot information flags word
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MultibootFlags: u32 {
        const MEM = 1 << 0;
        const CMDLINE = 1 << 2;
        /// `mods_count` and `mods_addr` are valid
        const MODS = 1 << 3;
        const MMAP = 1 << 6;
        const BOOT_LOADER_NAME = 1 << 9;
    }
}

/// Leading seven words of the agent's multiboot information block
///
/// The agent owns this structure. The host only reads it and rewrites
/// individual fields through the offsets below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlBlock {
    pub flags: MultibootFlags,
    pub mem_lower: u32,
    pub mem_upper: u32,
    pub boot_device: u32,
    pub cmdline: u32,
    pub mods_count: u32,
    pub mods_addr: u32,
}

impl ControlBlock {
    /// Bytes covered by the seven leading words
    pub const SIZE: u32 = 28;

    pub const FLAGS_OFFSET: u64 = 0;
    pub const MEM_LOWER_OFFSET: u64 = 4;
    pub const MEM_UPPER_OFFSET: u64 = 8;
    pub const BOOT_DEVICE_OFFSET: u64 = 12;
    pub const CMDLINE_OFFSET: u64 = 16;
    /// The agent polls this word as its go signal
    pub const MODS_COUNT_OFFSET: u64 = 20;
    pub const MODS_ADDR_OFFSET: u64 = 24;

    /// Decodes the block from the bytes read at its base address
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE as usize {
            return None;
        }
        let word = |offset: u64| {
            let at = offset as usize;
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        Some(Self {
            flags: MultibootFlags::from_bits_retain(word(Self::FLAGS_OFFSET)),
            mem_lower: word(Self::MEM_LOWER_OFFSET),
            mem_upper: word(Self::MEM_UPPER_OFFSET),
            boot_device: word(Self::BOOT_DEVICE_OFFSET),
            cmdline: word(Self::CMDLINE_OFFSET),
            mods_count: word(Self::MODS_COUNT_OFFSET),
            mods_addr: word(Self::MODS_ADDR_OFFSET),
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE as usize] {
        let mut out = [0u8; Self::SIZE as usize];
        let fields = [
            (Self::FLAGS_OFFSET, self.flags.bits()),
            (Self::MEM_LOWER_OFFSET, self.mem_lower),
            (Self::MEM_UPPER_OFFSET, self.mem_upper),
            (Self::BOOT_DEVICE_OFFSET, self.boot_device),
            (Self::CMDLINE_OFFSET, self.cmdline),
            (Self::MODS_COUNT_OFFSET, self.mods_count),
            (Self::MODS_ADDR_OFFSET, self.mods_addr),
        ];
        for (offset, value) in fields {
            let at = offset as usize;
            out[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }
        out
    }
}

/// One pushed payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub start: u64,
    /// Exclusive end of the payload
    pub end: u64,
    pub cmdline: String,
}

/// Multiboot module record
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub start: u32,
    pub end: u32,
    pub cmdline: u32,
    pub reserved: u32,
}

assert_eq_size!(ModuleDescriptor, [u8; 16]);

impl ModuleDescriptor {
    pub const SIZE: u64 = 16;

    pub fn new(start: u32, end: u32, cmdline: u32) -> Self {
        Self {
            start,
            end,
            cmdline,
            reserved: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        for (i, value) in [self.start, self.end, self.cmdline, self.reserved]
            .into_iter()
            .enumerate()
        {
            out[i * 4..i * 4 + 4].copy_from_slice(&value.to_le_bytes());
        }
        out
    }
}

/// 32-bit x86 interrupt gate
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptGate {
    pub offset_low: u16,
    pub selector: u16,
    pub type_attr: u16,
    pub offset_high: u16,
}

assert_eq_size!(InterruptGate, [u8; 8]);

impl InterruptGate {
    /// Gate jumping to `handler` through the hypervisor code segment
    pub fn new(handler: u64) -> Self {
        Self {
            offset_low: (handler & 0xffff) as u16,
            selector: GATE_SELECTOR,
            type_attr: GATE_TYPE_ATTR,
            offset_high: ((handler >> 16) & 0xffff) as u16,
        }
    }

    pub fn handler(&self) -> u32 {
        (self.offset_high as u32) << 16 | self.offset_low as u32
    }

    pub fn to_bytes(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        for (i, value) in [self.offset_low, self.selector, self.type_attr, self.offset_high]
            .into_iter()
            .enumerate()
        {
            out[i * 2..i * 2 + 2].copy_from_slice(&value.to_le_bytes());
        }
        out
    }
}
