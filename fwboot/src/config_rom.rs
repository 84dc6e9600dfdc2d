//! Boot agent discovery through the configuration ROM
//!
//! The agent's ROM carries two immediate entries, vendor and model, at fixed
//! quadlet positions, and a pointer to its multiboot information block.
//! ROM quadlets are big-endian.

use std::thread;
use std::time::Duration;

use fwboot_api::constants::{
    AGENT_MODEL_ID, AGENT_VENDOR_ID, CROM_BASE, CROM_CONTROL_BLOCK_QUADLET, CROM_MODEL_QUADLET,
    CROM_VALUE_MASK, CROM_VENDOR_QUADLET,
};
use fwboot_api::{Assertion, RemoteMemory, Result};

/// Outcome of one discovery probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discovery {
    pub is_agent: bool,
    /// Vendor id as read, or 0 if the node did not answer
    pub vendor_id: u32,
    pub model_id: u32,
}

impl Discovery {
    /// Turns a negative probe into a protocol assertion
    pub fn ensure_agent(self) -> Result<Self> {
        if self.is_agent {
            Ok(self)
        } else {
            Err(Assertion::NotAgent {
                vendor: self.vendor_id,
                model: self.model_id,
            }
            .into())
        }
    }
}

fn read_quadlet(fw: &mut dyn RemoteMemory, index: u64) -> Result<u32> {
    let address = CROM_BASE + index * 4;
    let bytes = fw.read(address, 4)?;
    let quadlet: [u8; 4] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| fwboot_api::Error::short_transfer("read", address, 4, bytes.len()))?;
    Ok(u32::from_be_bytes(quadlet))
}

fn read_identity(fw: &mut dyn RemoteMemory) -> Result<(u32, u32)> {
    let vendor = read_quadlet(fw, CROM_VENDOR_QUADLET)? & CROM_VALUE_MASK;
    let model = read_quadlet(fw, CROM_MODEL_QUADLET)? & CROM_VALUE_MASK;
    Ok((vendor, model))
}

/// Probes the node for the boot agent's signature
///
/// The node may not be powered yet, so transport failures count as "not
/// the agent" instead of being returned.
pub fn discover(fw: &mut dyn RemoteMemory) -> Discovery {
    let (vendor_id, model_id) = match read_identity(fw) {
        Ok(identity) => identity,
        Err(err) => {
            log::debug!("discovery probe failed: {}", err);
            (0, 0)
        }
    };
    Discovery {
        is_agent: vendor_id == AGENT_VENDOR_ID && model_id == AGENT_MODEL_ID,
        vendor_id,
        model_id,
    }
}

/// Address of the agent's multiboot information block
///
/// The agent publishes it anew after every restart, so it is read once per
/// session and never cached.
pub fn control_block_address(fw: &mut dyn RemoteMemory) -> Result<u64> {
    read_quadlet(fw, CROM_CONTROL_BLOCK_QUADLET).map(u64::from)
}

/// Spins until the agent answers, sleeping `interval` between probes
pub fn wait_for_agent(fw: &mut dyn RemoteMemory, interval: Duration) -> Discovery {
    loop {
        let discovery = discover(fw);
        if discovery.is_agent {
            return discovery;
        }
        log::debug!(
            "no agent yet (vendor {:#08x}, model {:#08x})",
            discovery.vendor_id,
            discovery.model_id
        );
        thread::sleep(interval);
    }
}

/// Reads the first `quadlets` words of the configuration ROM
pub fn read_rom(fw: &mut dyn RemoteMemory, quadlets: u32) -> Result<Vec<u32>> {
    let bytes = fw.read(CROM_BASE, quadlets * 4)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryTarget;
    use fwboot_api::Error;

    #[test]
    fn test_agent_signature() {
        let mut target = InMemoryTarget::with_agent(0x0009_f000);
        let discovery = discover(&mut target);
        assert!(discovery.is_agent);
        assert_eq!(discovery.vendor_id, 0xCAFFEE);
        assert_eq!(discovery.model_id, 0x000002);
    }

    #[test]
    fn test_high_byte_is_masked() {
        let mut target = InMemoryTarget::new();
        target.seed_quadlet(6, 0xff_CAFFEE);
        target.seed_quadlet(7, 0xab_000002);
        assert!(discover(&mut target).is_agent);
    }

    #[test]
    fn test_other_model_is_not_agent() {
        let mut target = InMemoryTarget::new();
        target.seed_rom(0xCAFFEE, 0x000001, 0x9000);
        let discovery = discover(&mut target);
        assert!(!discovery.is_agent);
        assert_eq!(discovery.model_id, 1);
    }

    #[test]
    fn test_absent_node_is_not_agent() {
        let mut target = InMemoryTarget::with_agent(0x9000);
        target.set_absent(true);
        assert_eq!(
            discover(&mut target),
            Discovery { is_agent: false, vendor_id: 0, model_id: 0 }
        );
    }

    #[test]
    fn test_ensure_agent() {
        let negative = Discovery { is_agent: false, vendor_id: 0x123456, model_id: 7 };
        let err = negative.ensure_agent().unwrap_err();
        assert!(matches!(
            err,
            Error::ProtocolAssertion(Assertion::NotAgent { vendor: 0x123456, model: 7 })
        ));
    }

    #[test]
    fn test_control_block_address_is_big_endian() {
        let mut target = InMemoryTarget::with_agent(0x0009_f000);
        assert_eq!(control_block_address(&mut target).unwrap(), 0x0009_f000);
        assert_eq!(target.peek(CROM_BASE + 18 * 4, 4), vec![0x00, 0x09, 0xf0, 0x00]);
    }

    #[test]
    fn test_control_block_address_propagates_transport_error() {
        let mut target = InMemoryTarget::new();
        target.set_absent(true);
        assert!(control_block_address(&mut target).unwrap_err().is_retryable());
    }

    #[test]
    fn test_read_rom() {
        let mut target = InMemoryTarget::with_agent(0x1234);
        let rom = read_rom(&mut target, 19).unwrap();
        assert_eq!(rom.len(), 19);
        assert_eq!(rom[6], 0x03CA_FFEE);
        assert_eq!(rom[18], 0x1234);
    }

    /// Fails the first probes, then exposes the agent
    struct Booting {
        target: InMemoryTarget,
        failures: usize,
    }

    impl RemoteMemory for Booting {
        fn read(&mut self, address: u64, length: u32) -> Result<Vec<u8>> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(Error::transport("probe", "no node"));
            }
            self.target.read(address, length)
        }

        fn write(&mut self, address: u64, data: &[u8]) -> Result<()> {
            self.target.write(address, data)
        }
    }

    #[test]
    fn test_wait_for_agent_retries_until_present() {
        let mut fw = Booting { target: InMemoryTarget::with_agent(0x9000), failures: 3 };
        let discovery = wait_for_agent(&mut fw, Duration::ZERO);
        assert!(discovery.is_agent);
        assert_eq!(fw.failures, 0);
    }
}
