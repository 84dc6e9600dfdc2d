//! Fixed protocol addresses and encodings
//!
//! These values are shared with the boot agent and the hypervisor and must
//! be preserved bit for bit.

/// Base of the node's configuration ROM in bus address space
pub const CROM_BASE: u64 = 0xffff_f000_0400;

/// Quadlet index of the vendor-id immediate entry
pub const CROM_VENDOR_QUADLET: u64 = 6;
/// Quadlet index of the model-id immediate entry
pub const CROM_MODEL_QUADLET: u64 = 7;
/// Quadlet index holding the agent's multiboot control block pointer
pub const CROM_CONTROL_BLOCK_QUADLET: u64 = 18;

/// Configuration ROM immediate entries carry their value in the low 24 bits
pub const CROM_VALUE_MASK: u32 = 0x00ff_ffff;

pub const AGENT_VENDOR_ID: u32 = 0xCAFFEE;
pub const AGENT_MODEL_ID: u32 = 0x000002;

/// Where the first module lands unless the manifest says otherwise
pub const DEFAULT_LOAD_ADDRESS: u64 = 0x0100_0000;
/// Module start addresses are rounded up to this boundary
pub const MODULE_ALIGN: u64 = 0x1000;
/// Descriptor array placement past the control block
pub const DESCRIPTOR_OFFSET: u64 = 0x4000;

/// Local APIC interrupt command register as seen from the bus
pub const APIC_ICR: u64 = 0xfee0_0000;
pub const APIC_MSG_INIT: u32 = 0x0500;
pub const APIC_MSG_NMI: u32 = 0x0400;

/// IDT slot patched by the reboot path (the NMI vector)
pub const REBOOT_GATE_INDEX: u64 = 2;
/// Size of one 32-bit IDT gate
pub const GATE_SIZE: u64 = 8;
/// Hypervisor code segment selector
pub const GATE_SELECTOR: u16 = 0x0008;
/// Present, DPL 0, 32-bit interrupt gate
pub const GATE_TYPE_ATTR: u16 = 0x8e00;

/// Hypervisor symbols used by the reboot path
pub const DEFAULT_IDT_SYMBOL: &str = "_ZN3Idt3idtE";
pub const DEFAULT_RESET_SYMBOL: &str = "_ZN4Acpi5resetEv";
