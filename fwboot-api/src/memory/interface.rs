//! Remote memory transport interface

use crate::error::{Error, Result};

/// Byte-addressable access to the physical memory of one target node
///
/// Implementations are blocking and handle one request at a time; the
/// `&mut self` receivers keep callers from interleaving operations on the
/// same node. A transfer that moves fewer bytes than requested is an error,
/// never a truncated success.
pub trait RemoteMemory {
    /// Reads exactly `length` bytes starting at `address`
    fn read(&mut self, address: u64, length: u32) -> Result<Vec<u8>>;

    /// Writes all of `data` starting at `address`
    fn write(&mut self, address: u64, data: &[u8]) -> Result<()>;

    /// Reads one little-endian 32-bit word
    fn read_word(&mut self, address: u64) -> Result<u32> {
        debug_assert_eq!(address % 4, 0, "unaligned word read at {address:#x}");
        let bytes = self.read(address, 4)?;
        let word: [u8; 4] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::short_transfer("read", address, 4, bytes.len()))?;
        Ok(u32::from_le_bytes(word))
    }

    /// Writes one little-endian 32-bit word
    fn write_word(&mut self, address: u64, value: u32) -> Result<()> {
        debug_assert_eq!(address % 4, 0, "unaligned word write at {address:#x}");
        self.write(address, &value.to_le_bytes())
    }
}

impl<T: RemoteMemory + ?Sized> RemoteMemory for &mut T {
    fn read(&mut self, address: u64, length: u32) -> Result<Vec<u8>> {
        (**self).read(address, length)
    }

    fn write(&mut self, address: u64, data: &[u8]) -> Result<()> {
        (**self).write(address, data)
    }
}

impl<T: RemoteMemory + ?Sized> RemoteMemory for Box<T> {
    fn read(&mut self, address: u64, length: u32) -> Result<Vec<u8>> {
        (**self).read(address, length)
    }

    fn write(&mut self, address: u64, data: &[u8]) -> Result<()> {
        (**self).write(address, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns a fixed payload regardless of the requested length
    struct Stuck(Vec<u8>);

    impl RemoteMemory for Stuck {
        fn read(&mut self, _address: u64, _length: u32) -> Result<Vec<u8>> {
            Ok(self.0.clone())
        }

        fn write(&mut self, _address: u64, data: &[u8]) -> Result<()> {
            self.0 = data.to_vec();
            Ok(())
        }
    }

    #[test]
    fn test_word_roundtrip_is_little_endian() {
        let mut fw = Stuck(Vec::new());
        fw.write_word(0x1000, 0x1234_5678).unwrap();
        assert_eq!(fw.0, vec![0x78, 0x56, 0x34, 0x12]);
        assert_eq!(fw.read_word(0x1000).unwrap(), 0x1234_5678);
    }

    #[test]
    fn test_short_word_read_fails() {
        let mut fw = Stuck(vec![1, 2]);
        let err = fw.read_word(0x2000).unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
    }

    #[test]
    fn test_forwarding_through_mut_ref() {
        let mut inner = Stuck(Vec::new());
        let mut outer: &mut dyn RemoteMemory = &mut inner;
        outer.write_word(0, 7).unwrap();
        assert_eq!(inner.0, vec![7, 0, 0, 0]);
    }
}
