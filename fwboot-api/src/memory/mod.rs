//! Remote memory module

pub mod interface;
pub mod types;

// Re-export commonly used items
pub use interface::RemoteMemory;
pub use types::{MemoryRegion, Segment};
