//! Error types for the watcher and reconciler.

use filewatch_core::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Problems with a monitor. These are recorded in status, never escalated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchError {
    #[error("Invalid watched path {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("Invalid ignore pattern {pattern:?} under {base}: {reason}")]
    InvalidIgnore {
        base: PathBuf,
        pattern: String,
        reason: String,
    },

    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("File system event error: {details}")]
    EventError { details: String },
}

impl WatchError {
    /// Wrap an arbitrary runtime error reported by a monitor
    pub fn event(details: impl std::fmt::Display) -> Self {
        WatchError::EventError {
            details: details.to_string(),
        }
    }
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}

/// Failures of a reconcile pass, returned to the trigger for retry
#[derive(Error, Debug, Clone)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to read disable source {name:?}: {source}")]
    DisableLookup { name: String, source: StoreError },
}
