//! Resource model for the filewatch controller
//!
//! This crate provides:
//! - `FileWatch` resources (spec + observed status)
//! - `ConfigMap` objects used as external disable gates
//! - Bounded file event history
//! - The `ResourceStore` interface the controller reads and writes through

pub mod config_map;
pub mod filewatch;
pub mod history;
pub mod key;
pub mod store;

// Re-exports
pub use config_map::ConfigMap;
pub use filewatch::{
    ConfigMapDisableSource, DisableSource, DisableStatus, FileEventBatch, FileWatch,
    FileWatchSpec, FileWatchStatus, IgnoreDef, ObjectMeta,
};
pub use history::{EventHistory, MAX_FILE_EVENT_HISTORY};
pub use key::ResourceKey;
pub use store::{ResourceKind, ResourceStore, StoreError, StoreEvent};
