//! Resource store interface
//!
//! The controller never owns resources: it reads specs and writes status
//! through a `ResourceStore`, and learns about changes from the store's
//! event stream.

use crate::config_map::ConfigMap;
use crate::filewatch::{FileWatch, FileWatchStatus};
use crate::key::ResourceKey;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::sync::broadcast;

/// Kinds of objects held by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    FileWatch,
    ConfigMap,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::FileWatch => write!(f, "FileWatch"),
            ResourceKind::ConfigMap => write!(f, "ConfigMap"),
        }
    }
}

/// Errors from store operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} {name:?} not found")]
    NotFound { kind: ResourceKind, name: String },

    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: ResourceKind, name: String },

    #[error("conflict writing {kind} {name:?}: expected version {expected}, found {actual}")]
    Conflict {
        kind: ResourceKind,
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("invalid {kind} {name:?}: {reason}")]
    Invalid {
        kind: ResourceKind,
        name: String,
        reason: String,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(kind: ResourceKind, name: impl fmt::Display) -> Self {
        StoreError::NotFound {
            kind,
            name: name.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Change notification emitted on create, spec update, or delete
///
/// Status writes do not produce events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    FileWatch(ResourceKey),
    ConfigMap(String),
}

/// Declarative store for FileWatch resources and their gate objects
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get_file_watch(&self, key: &ResourceKey) -> Result<FileWatch, StoreError>;

    async fn list_file_watches(&self) -> Result<Vec<FileWatch>, StoreError>;

    /// Store a new resource; its status is reset and a version assigned
    async fn create_file_watch(&self, fw: FileWatch) -> Result<FileWatch, StoreError>;

    /// Replace a resource's spec
    ///
    /// Fails with `Conflict` when `fw.meta.resource_version` is stale.
    async fn update_file_watch(&self, fw: FileWatch) -> Result<FileWatch, StoreError>;

    /// Replace a resource's status without touching its spec
    async fn update_file_watch_status(
        &self,
        key: &ResourceKey,
        status: FileWatchStatus,
    ) -> Result<FileWatch, StoreError>;

    async fn delete_file_watch(&self, key: &ResourceKey) -> Result<(), StoreError>;

    async fn get_config_map(&self, name: &str) -> Result<ConfigMap, StoreError>;

    async fn create_config_map(&self, cm: ConfigMap) -> Result<ConfigMap, StoreError>;

    /// Replace a ConfigMap's data, with the same version check as FileWatch updates
    async fn update_config_map(&self, cm: ConfigMap) -> Result<ConfigMap, StoreError>;

    async fn delete_config_map(&self, name: &str) -> Result<(), StoreError>;

    /// Subscribe to change notifications
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}
