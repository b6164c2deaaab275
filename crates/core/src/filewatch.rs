//! FileWatch resource definition

use crate::history::EventHistory;
use crate::key::ResourceKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identity and bookkeeping shared by stored objects
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,

    /// Store-assigned version, bumped on every write (0 = never stored)
    #[serde(default)]
    pub resource_version: u64,
}

/// A declared set of paths to monitor, plus what the controller observed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileWatch {
    pub meta: ObjectMeta,
    pub spec: FileWatchSpec,
    #[serde(default)]
    pub status: FileWatchStatus,
}

impl FileWatch {
    /// Create a resource with an empty status
    pub fn new(key: ResourceKey, spec: FileWatchSpec) -> Self {
        Self {
            meta: ObjectMeta {
                namespace: key.namespace,
                name: key.name,
                resource_version: 0,
            },
            spec,
            status: FileWatchStatus::default(),
        }
    }

    /// Identity of this resource
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.meta.namespace.clone(), self.meta.name.clone())
    }
}

/// Desired watch configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileWatchSpec {
    /// Roots to watch recursively (absolute paths)
    #[serde(default)]
    pub watched_paths: Vec<PathBuf>,

    /// Paths to exclude from observation
    #[serde(default)]
    pub ignores: Vec<IgnoreDef>,

    /// Optional gate that can switch this watch off
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_source: Option<DisableSource>,
}

impl FileWatchSpec {
    /// True when both specs would produce the same filesystem monitor
    ///
    /// The disable source is not part of the monitor configuration.
    pub fn same_monitor(&self, other: &FileWatchSpec) -> bool {
        self.watched_paths == other.watched_paths && self.ignores == other.ignores
    }
}

/// A base path plus optional glob patterns relative to it
///
/// No patterns means everything beneath `base_path` is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreDef {
    pub base_path: PathBuf,
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl IgnoreDef {
    /// Ignore `base_path` and everything beneath it
    pub fn recursive(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            patterns: Vec::new(),
        }
    }

    /// Ignore paths under `base_path` matching any of `patterns`
    pub fn with_patterns<I, S>(base_path: impl Into<PathBuf>, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            base_path: base_path.into(),
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }
}

/// Reference to an external object whose value disables a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisableSource {
    /// A key inside a named ConfigMap holding "true" or "false"
    ConfigMap(ConfigMapDisableSource),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMapDisableSource {
    pub name: String,
    pub key: String,
}

impl DisableSource {
    /// Gate on `key` of the ConfigMap called `name`
    pub fn config_map(name: impl Into<String>, key: impl Into<String>) -> Self {
        DisableSource::ConfigMap(ConfigMapDisableSource {
            name: name.into(),
            key: key.into(),
        })
    }

    /// Name of the ConfigMap this source reads, if any
    pub fn config_map_name(&self) -> Option<&str> {
        match self {
            DisableSource::ConfigMap(cm) => Some(&cm.name),
        }
    }
}

/// Observed state written by the controller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileWatchStatus {
    /// When the current filesystem monitor started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor_start_time: Option<DateTime<Utc>>,

    /// Bounded, oldest-first history of flushed batches
    #[serde(default)]
    pub file_events: EventHistory,

    /// Flush time of the newest batch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_time: Option<DateTime<Utc>>,

    /// Latest error seen by the monitor (None once superseded or cleared)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Result of the last disable-gate resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_status: Option<DisableStatus>,
}

impl FileWatchStatus {
    /// Record a flushed batch, evicting the oldest entry if the history is full
    pub fn record_batch(&mut self, batch: FileEventBatch) {
        self.last_event_time = Some(batch.time);
        self.file_events.push(batch);
    }
}

/// Outcome of resolving a resource's disable gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisableStatus {
    pub disabled: bool,
    pub last_update_time: DateTime<Utc>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<DisableSource>,
}

/// Paths observed as changed within one debounce window
///
/// Paths are deduplicated, in first-seen order, and never ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEventBatch {
    /// Flush time of the window
    pub time: DateTime<Utc>,
    pub seen_files: Vec<PathBuf>,
}
