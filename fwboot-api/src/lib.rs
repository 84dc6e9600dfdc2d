//! fwboot API - Core interfaces and types for FireWire remote boot
//!
//! This crate provides the types shared by every part of the remote boot
//! engine: the remote-memory transport interface, the on-wire layouts the
//! boot agent understands, the fixed protocol constants, and the error
//! taxonomy.
//!
//! # Architecture
//!
//! - **Memory**: the `RemoteMemory` transport trait and the address-window
//!   types decoded from a binary's program headers
//! - **Boot**: multiboot control block, module descriptors and interrupt
//!   gates as they appear in target memory
//! - **Constants**: configuration ROM offsets, agent signature, APIC
//!   message encodings
//! - **Error**: error kinds and the crate-wide `Result`
//!
//! # Usage
//!
//! ```rust
//! use fwboot_api::{RemoteMemory, Result};
//!
//! fn peek(fw: &mut dyn RemoteMemory, address: u64) -> Result<u32> {
//!     fw.read_word(address)
//! }
//! ```

pub mod boot;
pub mod constants;
pub mod error;
pub mod memory;

// Re-export commonly used types
pub use crate::boot::{ControlBlock, InterruptGate, Module, ModuleDescriptor, MultibootFlags};
pub use crate::error::{Assertion, Error, ManifestError, Result};
pub use crate::memory::interface::RemoteMemory;
pub use crate::memory::types::{MemoryRegion, Segment};
