//! Argument handling for the `fwboot` and `fwtool` binaries

use std::path::PathBuf;

/// Exit status for malformed command lines
pub const USAGE_EXIT: u8 = 2;

pub const BOOT_USAGE: &str = "usage: fwboot [--once] <manifest>\n  --once    Don't wait for a node to come up.";

pub const TOOL_USAGE: &str = "usage: fwtool <command>
  reboot [hypervisor]     redirect the NMI gate to the reset handler and kick the CPU
  load <elf>              write an ELF image's segments to their physical addresses
  peek <addr> [len]       dump target memory
  poke <addr> <value>     write one 32-bit word
  crom                    dump the configuration ROM
  extint <vector>         send an external interrupt";

/// Parsed `fwboot` command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootOptions {
    pub manifest: PathBuf,
    /// Skip waiting for the agent to appear
    pub once: bool,
}

impl BootOptions {
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let mut once = false;
        let mut positional = Vec::new();
        for arg in args {
            match arg.as_str() {
                "--once" => once = true,
                flag if flag.starts_with('-') && flag != "-" => {
                    return Err(format!("option {flag} not recognized"));
                }
                other => positional.push(other),
            }
        }
        match positional.as_slice() {
            [manifest] => Ok(Self {
                manifest: PathBuf::from(manifest),
                once,
            }),
            [] => Err("missing manifest".to_string()),
            _ => Err("expected exactly one manifest".to_string()),
        }
    }
}

/// `fwtool` subcommands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCommand {
    Reboot { hypervisor: Option<PathBuf> },
    Load { image: PathBuf },
    Peek { address: u64, length: u32 },
    Poke { address: u64, value: u32 },
    Crom,
    ExtInt { vector: u8 },
}

impl ToolCommand {
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let (command, rest) = args.split_first().ok_or("missing command")?;
        let rest: Vec<&str> = rest.iter().map(String::as_str).collect();
        match (command.as_str(), rest.as_slice()) {
            ("reboot", []) => Ok(ToolCommand::Reboot { hypervisor: None }),
            ("reboot", [path]) => Ok(ToolCommand::Reboot {
                hypervisor: Some(PathBuf::from(path)),
            }),
            ("load", [path]) => Ok(ToolCommand::Load {
                image: PathBuf::from(path),
            }),
            ("peek", [address]) => Ok(ToolCommand::Peek {
                address: parse_number(address)?,
                length: 4,
            }),
            ("peek", [address, length]) => Ok(ToolCommand::Peek {
                address: parse_number(address)?,
                length: narrow(parse_number(length)?, length)?,
            }),
            ("poke", [address, value]) => {
                let address = parse_number(address)?;
                if address % 4 != 0 {
                    return Err(format!("poke address {address:#x} is not word aligned"));
                }
                Ok(ToolCommand::Poke {
                    address,
                    value: narrow(parse_number(value)?, value)?,
                })
            }
            ("crom", []) => Ok(ToolCommand::Crom),
            ("extint", [vector]) => Ok(ToolCommand::ExtInt {
                vector: narrow(parse_number(vector)?, vector)?,
            }),
            (other, _) => Err(format!("bad command or arguments: {other}")),
        }
    }
}

/// Accepts `0x`-prefixed hex or decimal
pub fn parse_number(text: &str) -> Result<u64, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|_| format!("not a number: {text}"))
}

fn narrow<T: TryFrom<u64>>(value: u64, text: &str) -> Result<T, String> {
    T::try_from(value).map_err(|_| format!("out of range: {text}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_boot_options() {
        let options = BootOptions::parse(&args(&["--once", "nova.conf"])).unwrap();
        assert!(options.once);
        assert_eq!(options.manifest, PathBuf::from("nova.conf"));

        let options = BootOptions::parse(&args(&["nova.conf"])).unwrap();
        assert!(!options.once);
    }

    #[test]
    fn test_boot_usage_errors() {
        assert!(BootOptions::parse(&args(&[])).is_err());
        assert!(BootOptions::parse(&args(&["a", "b"])).is_err());
        assert!(BootOptions::parse(&args(&["--forever", "a"])).is_err());
    }

    #[test]
    fn test_tool_commands() {
        assert_eq!(
            ToolCommand::parse(&args(&["peek", "0x1000"])).unwrap(),
            ToolCommand::Peek { address: 0x1000, length: 4 }
        );
        assert_eq!(
            ToolCommand::parse(&args(&["poke", "0xfee00000", "1024"])).unwrap(),
            ToolCommand::Poke { address: 0xfee0_0000, value: 0x400 }
        );
        assert_eq!(
            ToolCommand::parse(&args(&["extint", "0x31"])).unwrap(),
            ToolCommand::ExtInt { vector: 0x31 }
        );
        assert_eq!(
            ToolCommand::parse(&args(&["reboot"])).unwrap(),
            ToolCommand::Reboot { hypervisor: None }
        );
        assert_eq!(ToolCommand::parse(&args(&["crom"])).unwrap(), ToolCommand::Crom);
    }

    #[test]
    fn test_tool_rejects_bad_input() {
        assert!(ToolCommand::parse(&args(&[])).is_err());
        assert!(ToolCommand::parse(&args(&["extint", "0x100"])).is_err());
        assert!(ToolCommand::parse(&args(&["poke", "0x10"])).is_err());
        assert!(ToolCommand::parse(&args(&["poke", "0x1001", "5"])).is_err());
        assert!(ToolCommand::parse(&args(&["peek", "ten"])).is_err());
        assert!(ToolCommand::parse(&args(&["format", "c:"])).is_err());
    }
}
