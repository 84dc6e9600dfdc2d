//! Process-backed remote memory transport
//!
//! Each transfer runs the bus-access program once per block geometry:
//!
//! ```text
//! fwcat -n <node> -r -a <address> -s <block size> -c <block count>
//! ```
//!
//! Read data arrives on the child's stdout, write data is fed to its stdin.
//! Anything the program prints on stderr becomes the diagnostic of the
//! resulting transport error.

use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::thread;

use fwboot_api::{Error, RemoteMemory, Result};

use crate::config::TransportConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Read,
    Write,
}

impl Direction {
    fn flag(self) -> &'static str {
        match self {
            Direction::Read => "-r",
            Direction::Write => "-w",
        }
    }
}

/// One invocation of the bus-access program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub address: u64,
    pub block_size: u32,
    pub block_count: u32,
}

impl Transfer {
    pub fn len(&self) -> usize {
        self.block_size as usize * self.block_count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Remote memory reached through an external command per transfer
#[derive(Debug, Clone)]
pub struct ProcessTransport {
    program: String,
    node: u32,
    block_size: u32,
}

impl ProcessTransport {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            program: config.program.clone(),
            node: config.node,
            block_size: config.block_size.max(1),
        }
    }

    pub fn node(&self) -> u32 {
        self.node
    }

    /// Splits `length` bytes into a block-aligned bulk transfer and a tail
    pub fn plan(&self, address: u64, length: usize) -> Vec<Transfer> {
        let block = (self.block_size as usize).min(length);
        if block == 0 {
            return Vec::new();
        }
        let count = length / block;
        let tail = length % block;

        let mut transfers = vec![Transfer {
            address,
            block_size: block as u32,
            block_count: count as u32,
        }];
        if tail != 0 {
            transfers.push(Transfer {
                address: address + (count * block) as u64,
                block_size: tail as u32,
                block_count: 1,
            });
        }
        transfers
    }

    fn command(&self, direction: Direction, transfer: &Transfer) -> (Command, String) {
        let args = [
            "-n".to_string(),
            self.node.to_string(),
            direction.flag().to_string(),
            "-a".to_string(),
            format!("{:#x}", transfer.address),
            "-s".to_string(),
            format!("{:#x}", transfer.block_size),
            "-c".to_string(),
            format!("{:#x}", transfer.block_count),
        ];
        let display = format!("{} {}", self.program, args.join(" "));
        let mut command = Command::new(&self.program);
        command.args(&args);
        (command, display)
    }

    fn read_transfer(&self, transfer: &Transfer, out: &mut Vec<u8>) -> Result<()> {
        let (mut command, display) = self.command(Direction::Read, transfer);
        log::trace!("{}", display);

        let output = command
            .stdin(Stdio::null())
            .output()
            .map_err(|err| Error::transport(&display, err.to_string()))?;
        if !output.status.success() {
            return Err(Error::transport(&display, diagnostic(&output.stderr, output.status)));
        }
        if output.stdout.len() != transfer.len() {
            return Err(Error::transport(
                &display,
                format!("expected {} bytes, got {}", transfer.len(), output.stdout.len()),
            ));
        }
        out.extend_from_slice(&output.stdout);
        Ok(())
    }

    fn write_transfer(&self, transfer: &Transfer, data: &[u8]) -> Result<()> {
        let (mut command, display) = self.command(Direction::Write, transfer);
        log::trace!("{}", display);

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| Error::transport(&display, err.to_string()))?;

        // stdin is fed while stderr is drained
        let stdin = child.stdin.take();
        let (fed, output) = thread::scope(|scope| {
            let feeder = stdin.map(|mut pipe| scope.spawn(move || pipe.write_all(data)));
            let output = child.wait_with_output();
            let fed = match feeder {
                Some(handle) => handle
                    .join()
                    .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked"))),
                None => Ok(()),
            };
            (fed, output)
        });

        let output = output.map_err(|err| Error::transport(&display, err.to_string()))?;
        if !output.status.success() {
            return Err(Error::transport(&display, diagnostic(&output.stderr, output.status)));
        }
        fed.map_err(|err| Error::transport(&display, err.to_string()))
    }
}

fn diagnostic(stderr: &[u8], status: std::process::ExitStatus) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.is_empty() {
        format!("exited with {status}")
    } else {
        format!("{text} ({status})")
    }
}

impl RemoteMemory for ProcessTransport {
    fn read(&mut self, address: u64, length: u32) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(length as usize);
        for transfer in self.plan(address, length as usize) {
            self.read_transfer(&transfer, &mut data)?;
        }
        if data.len() != length as usize {
            return Err(Error::short_transfer("read", address, length as usize, data.len()));
        }
        Ok(data)
    }

    fn write(&mut self, address: u64, data: &[u8]) -> Result<()> {
        let mut offset = 0;
        for transfer in self.plan(address, data.len()) {
            let chunk = &data[offset..offset + transfer.len()];
            self.write_transfer(&transfer, chunk)?;
            offset += transfer.len();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(block_size: u32) -> ProcessTransport {
        ProcessTransport::new(&TransportConfig {
            program: "/nonexistent/fwcat".to_string(),
            node: 1,
            block_size,
        })
    }

    #[test]
    fn test_plan_exact_blocks() {
        let plan = transport(2048).plan(0x1000, 4096);
        assert_eq!(
            plan,
            vec![Transfer { address: 0x1000, block_size: 2048, block_count: 2 }]
        );
    }

    #[test]
    fn test_plan_with_tail() {
        let plan = transport(2048).plan(0x1000, 5000);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0], Transfer { address: 0x1000, block_size: 2048, block_count: 2 });
        assert_eq!(plan[1], Transfer { address: 0x1000 + 4096, block_size: 904, block_count: 1 });
        assert_eq!(plan.iter().map(Transfer::len).sum::<usize>(), 5000);
    }

    #[test]
    fn test_plan_small_transfer_uses_its_own_size() {
        let plan = transport(2048).plan(0xfee0_0000, 4);
        assert_eq!(plan, vec![Transfer { address: 0xfee0_0000, block_size: 4, block_count: 1 }]);
    }

    #[test]
    fn test_plan_empty() {
        assert!(transport(2048).plan(0, 0).is_empty());
    }

    #[test]
    fn test_missing_program_is_transport_error() {
        let mut fw = transport(2048);
        let err = fw.read(0x1000, 4).unwrap_err();
        match err {
            Error::Transport { command, .. } => {
                assert!(command.contains("-n 1 -r -a 0x1000 -s 0x4 -c 0x1"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(fw.write(0x1000, &[1, 2, 3, 4]).is_err());
    }

    /// Installs a shell script standing in for the bus-access program
    #[cfg(unix)]
    fn script(name: &str, body: &str) -> ProcessTransport {
        use std::os::unix::fs::PermissionsExt;

        let path = std::env::temp_dir().join(format!("fwboot-{}-{}", std::process::id(), name));
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        ProcessTransport::new(&TransportConfig {
            program: path.display().to_string(),
            node: 1,
            block_size: 0x40000,
        })
    }

    #[cfg(unix)]
    #[test]
    fn test_write_with_noisy_stderr() {
        // More than a pipe buffer in both directions
        let mut fw = script("noisy", "head -c 200000 /dev/zero >&2\ncat > /dev/null");
        fw.write(0x1000, &vec![0x5a; 200_000]).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_write_failure_carries_stderr() {
        let mut fw = script("nak", "echo 'no ack from node' >&2\nexit 3");
        match fw.write(0x1000, &[1, 2, 3, 4]).unwrap_err() {
            Error::Transport { diagnostic, .. } => assert!(diagnostic.contains("no ack from node")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_block_size_is_clamped() {
        let plan = transport(0).plan(0, 3);
        assert_eq!(plan, vec![Transfer { address: 0, block_size: 1, block_count: 3 }]);
    }
}
