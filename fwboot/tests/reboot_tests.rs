//! Hypervisor reboot and image loading against recorded targets

use fwboot::reboot::{self, ApicMessage};
use fwboot::testing::{ElfBuilder, InMemoryTarget};
use fwboot::{ElfImage, RebootController};
use fwboot_api::constants::APIC_ICR;
use fwboot_api::{Error, RemoteMemory, Result};
use mockall::{Sequence, mock};

const IDT_VIRT: u64 = 0xffff_8000_0010_3000;
const RESET_VIRT: u64 = 0xffff_8000_0010_0a40;

mock! {
    pub Node {}
    impl RemoteMemory for Node {
        fn read(&mut self, address: u64, length: u32) -> Result<Vec<u8>>;
        fn write(&mut self, address: u64, data: &[u8]) -> Result<()>;
    }
}

fn hypervisor() -> ElfImage {
    let text: Vec<u8> = (0..0x200u32).map(|i| i as u8).collect();
    let bytes = ElfBuilder::new()
        .entry(0x0010_0000)
        .segment(0x0010_0000, 0x0010_0000, &[0xf4; 0x40], 0x40)
        .segment(0xffff_8000_0010_0000, 0x0100_0000, &text, 0x8000)
        .symbol("_ZN3Idt3idtE", IDT_VIRT)
        .symbol("_ZN4Acpi5resetEv", RESET_VIRT)
        .symbol("__bss_start", 0xffff_8000_0010_0200)
        .build();
    ElfImage::from_bytes("hypervisor", bytes).unwrap()
}

#[test]
fn test_reboot_patches_then_signals() {
    let image = hypervisor();
    let mut node = MockNode::new();
    let mut seq = Sequence::new();

    node.expect_write()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|address, data| {
            *address == 0x0100_3000 + 16
                && data.to_vec() == vec![0x40, 0x0a, 0x08, 0x00, 0x00, 0x8e, 0x10, 0x00]
        })
        .returning(|_, _| Ok(()));
    node.expect_write()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|address, data| *address == APIC_ICR && data.to_vec() == 0x500u32.to_le_bytes().to_vec())
        .returning(|_, _| Ok(()));
    node.expect_write()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|address, data| *address == APIC_ICR && data.to_vec() == 0x400u32.to_le_bytes().to_vec())
        .returning(|_, _| Ok(()));
    node.expect_read().never();

    RebootController::new(&image).reboot(&mut node).unwrap();
}

#[test]
fn test_failed_patch_sends_no_interrupts() {
    let image = hypervisor();
    let mut node = MockNode::new();
    node.expect_write()
        .times(1)
        .returning(|address, _| Err(Error::transport(format!("write {address:#x}"), "no ack")));

    let err = RebootController::new(&image).reboot(&mut node).unwrap_err();
    assert!(matches!(err, Error::Transport { .. }));
}

#[test]
fn test_unmapped_idt_symbol() {
    let mut target = InMemoryTarget::new();
    let bytes = ElfBuilder::new()
        .segment(0x1000, 0x1000, &[0u8; 16], 16)
        .symbol("_ZN3Idt3idtE", 0x9000)
        .symbol("_ZN4Acpi5resetEv", 0x1004)
        .build();
    let stray = ElfImage::from_bytes("stray", bytes).unwrap();
    let err = RebootController::new(&stray).reboot(&mut target).unwrap_err();
    assert!(matches!(err, Error::UnmappedAddress(0x9000)));
    assert!(target.writes().is_empty());
}

#[test]
fn test_load_image_segments() {
    let image = hypervisor();
    let mut target = InMemoryTarget::new();
    target.seed(0x0100_0200, &[0xcc; 16]);

    let entry = image.load(&mut target).unwrap();
    assert_eq!(entry, 0x0010_0000);
    assert_eq!(target.peek(0x0010_0000, 0x40), vec![0xf4; 0x40]);
    assert_eq!(target.peek(0x0100_0000, 4), vec![0, 1, 2, 3]);
    assert_eq!(target.peek(0x0100_01ff, 1), vec![0xff]);
    // BSS tail is cleared even where the node held stale data
    assert_eq!(target.peek(0x0100_0200, 16), vec![0; 16]);

    let bss = target.writes().iter().find(|w| w.address == 0x0100_0200).unwrap();
    assert_eq!(bss.data.len(), 0x8000 - 0x200);
}

#[test]
fn test_external_interrupt() {
    let mut target = InMemoryTarget::new();
    reboot::signal(&mut target, ApicMessage::ExtInt(0x31)).unwrap();
    assert_eq!(target.writes().len(), 1);
    assert_eq!(target.peek_word(APIC_ICR), 0x31);
}
