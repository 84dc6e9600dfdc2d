//! Host-side configuration
//!
//! Loaded from the JSON file named by `FWBOOT_CONFIG`, or `fwboot.json` in
//! the working directory. Every field has a default, so a missing file is
//! not an error.
//!
//! ```json
//! {
//!     "boot_dir": "/srv/boot",
//!     "hypervisor": "/srv/boot/hypervisor",
//!     "transport": { "program": "fwcat", "node": 1, "block_size": 2048 }
//! }
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fwboot_api::constants::{DEFAULT_IDT_SYMBOL, DEFAULT_LOAD_ADDRESS, DEFAULT_RESET_SYMBOL};
use fwboot_api::{Error, Result};
use log::LevelFilter;
use serde::Deserialize;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "FWBOOT_CONFIG";
/// Environment variable overriding the log level
pub const LOG_ENV: &str = "FWBOOT_LOG";
/// Configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "fwboot.json";

/// Bus-access program settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub program: String,
    pub node: u32,
    pub block_size: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            program: "fwcat".to_string(),
            node: 0,
            block_size: 2048,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base directory for relative manifest paths
    pub boot_dir: PathBuf,
    /// Hypervisor binary used by the reboot path
    pub hypervisor: PathBuf,
    pub transport: TransportConfig,
    pub initial_load_address: u64,
    pub poll_interval_ms: u64,
    pub idt_symbol: String,
    pub reset_symbol: String,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            boot_dir: PathBuf::from("/boot"),
            hypervisor: PathBuf::from("/boot/hypervisor"),
            transport: TransportConfig::default(),
            initial_load_address: DEFAULT_LOAD_ADDRESS,
            poll_interval_ms: 1000,
            idt_symbol: DEFAULT_IDT_SYMBOL.to_string(),
            reset_symbol: DEFAULT_RESET_SYMBOL.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads the configuration the binaries run with
    pub fn load() -> Result<Self> {
        let mut config = match env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        if let Ok(level) = env::var(LOG_ENV) {
            config.log_level = level;
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("{}: {}", path.display(), err)))?;
        Self::from_json(&text).map_err(|err| match err {
            Error::Config(reason) => Error::Config(format!("{}: {}", path.display(), reason)),
            other => other,
        })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|err| Error::Config(err.to_string()))?;
        if config.transport.block_size == 0 {
            return Err(Error::Config("transport.block_size must be non-zero".to_string()));
        }
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Parsed log level; unknown names fall back to `info`
    pub fn log_level(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }
}
