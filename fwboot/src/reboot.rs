//! Warm restart of a running hypervisor
//!
//! A running hypervisor no longer listens to the boot agent. Instead the
//! NMI gate of its IDT is redirected to the hypervisor's own ACPI reset
//! routine, then the CPU is sent INIT followed by an NMI through the local
//! APIC's interrupt command register.

use fwboot_api::constants::{
    APIC_ICR, APIC_MSG_INIT, APIC_MSG_NMI, DEFAULT_IDT_SYMBOL, DEFAULT_RESET_SYMBOL, GATE_SIZE,
    REBOOT_GATE_INDEX,
};
use fwboot_api::{InterruptGate, RemoteMemory, Result};

use crate::elf::ElfImage;

/// Messages understood by the interrupt command register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApicMessage {
    Init,
    Nmi,
    /// Fixed delivery of the given vector
    ExtInt(u8),
}

impl ApicMessage {
    pub fn encode(self) -> u32 {
        match self {
            ApicMessage::Init => APIC_MSG_INIT,
            ApicMessage::Nmi => APIC_MSG_NMI,
            ApicMessage::ExtInt(vector) => u32::from(vector),
        }
    }
}

/// Sends `message` to the target CPU; nothing is read back
pub fn signal(fw: &mut dyn RemoteMemory, message: ApicMessage) -> Result<()> {
    log::debug!("signal {:?} ({:#x})", message, message.encode());
    fw.write_word(APIC_ICR, message.encode())
}

pub struct RebootController<'a> {
    image: &'a ElfImage,
    idt_symbol: String,
    reset_symbol: String,
}

impl<'a> RebootController<'a> {
    pub fn new(image: &'a ElfImage) -> Self {
        Self::with_symbols(image, DEFAULT_IDT_SYMBOL, DEFAULT_RESET_SYMBOL)
    }

    pub fn with_symbols(image: &'a ElfImage, idt_symbol: &str, reset_symbol: &str) -> Self {
        Self {
            image,
            idt_symbol: idt_symbol.to_string(),
            reset_symbol: reset_symbol.to_string(),
        }
    }

    /// Physical address of the patched gate
    pub fn gate_address(&self) -> Result<u64> {
        let idt = self.image.symbol_physical(&self.idt_symbol)?;
        Ok(idt + REBOOT_GATE_INDEX * GATE_SIZE)
    }

    pub fn gate(&self) -> Result<InterruptGate> {
        Ok(InterruptGate::new(self.image.symbol(&self.reset_symbol)?))
    }

    /// Redirects the NMI gate to the reset handler
    pub fn patch(&self, fw: &mut dyn RemoteMemory) -> Result<()> {
        let address = self.gate_address()?;
        let gate = self.gate()?;
        log::info!("patching IDT gate at {:#x} -> {:#x}", address, gate.handler());
        fw.write(address, &gate.to_bytes())
    }

    pub fn reboot(&self, fw: &mut dyn RemoteMemory) -> Result<()> {
        self.patch(fw)?;
        signal(fw, ApicMessage::Init)?;
        signal(fw, ApicMessage::Nmi)
    }
}
