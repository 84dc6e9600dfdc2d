//! fwboot - Multiboot a hypervisor through a FireWire remote-memory bus
//!
//! The target runs a small boot agent that publishes a multiboot
//! information block through its configuration ROM and then polls that
//! block's module count. The host pushes every module straight into the
//! target's physical memory, writes the module descriptors, and finally
//! flips the module count.
//!
//! # Modules
//!
//! - [`transport`]: the process-backed [`RemoteMemory`] implementation
//! - [`elf`]: symbol and PT_LOAD extraction, physical loading
//! - [`config_rom`]: agent discovery
//! - [`manifest`]: the recursive boot manifest format
//! - [`multiboot`]: module placement and the arm sequence
//! - [`reboot`]: warm restart of a running hypervisor
//! - [`session`]: one complete boot invocation
//!
//! Every component receives its transport explicitly; there is no global
//! default target.

pub mod cli;
pub mod config;
pub mod config_rom;
pub mod elf;
pub mod logging;
pub mod manifest;
pub mod multiboot;
pub mod reboot;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;

pub use fwboot_api::{Error, RemoteMemory, Result};

pub use crate::config::Config;
pub use crate::elf::ElfImage;
pub use crate::manifest::{FileSource, FsSource, ManifestEntry, MemorySource};
pub use crate::multiboot::{BuilderState, MultibootBuilder};
pub use crate::reboot::{ApicMessage, RebootController};
pub use crate::session::{BootReport, BootSession};
pub use crate::transport::ProcessTransport;
