//! Resource storage for filewatch
//!
//! This crate provides:
//! - `MemoryStore`, an in-memory `ResourceStore` with versioned writes
//!   and change notifications
//! - Status snapshots written atomically as JSON

pub mod memory;
pub mod snapshot;

// Re-exports
pub use memory::MemoryStore;
pub use snapshot::{read_snapshot, write_snapshot};
