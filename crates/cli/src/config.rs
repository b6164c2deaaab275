//! Daemon configuration
//!
//! Loaded from TOML. Every field has a default, so an empty (or missing)
//! file is a valid configuration.

use anyhow::{Context, Result};
use filewatch::RequeueConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "FWATCH_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub log: LogConfig,
    pub controller: ControllerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive, e.g. "info" or "filewatch=debug,info"
    pub level: String,

    /// Also write logs to this file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Full resync interval (1-3600)
    pub requeue_interval_secs: u64,

    /// First retry delay after a failed reconcile
    pub retry_base_ms: u64,

    /// Cap on the retry delay
    pub retry_max_secs: u64,

    /// Where to write status snapshots (disabled when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,

    pub snapshot_interval_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            requeue_interval_secs: 30,
            retry_base_ms: 100,
            retry_max_secs: 30,
            snapshot_path: None,
            snapshot_interval_secs: 2,
        }
    }
}

impl ControllerConfig {
    pub fn requeue(&self) -> RequeueConfig {
        RequeueConfig {
            resync_interval: Duration::from_secs(self.requeue_interval_secs),
            retry_base: Duration::from_millis(self.retry_base_ms),
            retry_max: Duration::from_secs(self.retry_max_secs),
        }
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }
}

impl DaemonConfig {
    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        let c = &self.controller;

        if !(1..=3600).contains(&c.requeue_interval_secs) {
            anyhow::bail!(
                "controller.requeue_interval_secs must be between 1 and 3600 (got {})",
                c.requeue_interval_secs
            );
        }
        if c.retry_base_ms == 0 {
            anyhow::bail!("controller.retry_base_ms must be positive");
        }
        if c.retry_max_secs == 0 || Duration::from_secs(c.retry_max_secs) < Duration::from_millis(c.retry_base_ms) {
            anyhow::bail!(
                "controller.retry_max_secs ({}s) must be at least retry_base_ms ({}ms)",
                c.retry_max_secs,
                c.retry_base_ms
            );
        }
        if c.snapshot_interval_secs == 0 {
            anyhow::bail!("controller.snapshot_interval_secs must be positive");
        }
        if self.log.level.trim().is_empty() {
            anyhow::bail!("log.level must not be empty");
        }

        Ok(())
    }
}

/// Default config file location (`<config dir>/fwatch/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fwatch").join("config.toml"))
}

/// Pick the config file to read: explicit flag, then environment, then
/// the default location if it exists
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    default_config_path().filter(|path| path.exists())
}

/// Load and validate the effective configuration
///
/// Returns the config and the file it came from (None = built-in defaults).
pub fn load(explicit: Option<&Path>) -> Result<(DaemonConfig, Option<PathBuf>)> {
    let path = resolve_config_path(explicit);
    let config = match &path {
        Some(path) => load_file(path)?,
        None => DaemonConfig::default(),
    };
    Ok((config, path))
}

/// Parse and validate a single config file
pub fn load_file(path: &Path) -> Result<DaemonConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: DaemonConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(config)
}

/// Render a config as TOML
pub fn to_toml(config: &DaemonConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize configuration")
}

/// Commented example config file
pub fn example_config() -> &'static str {
    r#"# fwatch configuration
#
# Lookup order: --config <file>, $FWATCH_CONFIG, then
# <config dir>/fwatch/config.toml. Every field is optional.

[log]
# Filter directive; RUST_LOG overrides it
level = "info"
# Also write logs to a file
# file = "/var/log/fwatch.log"

[controller]
# Reconcile every resource this often, even without changes (1-3600)
requeue_interval_secs = 30
# Exponential backoff for failed reconciles
retry_base_ms = 100
retry_max_secs = 30
# Write all resources with their status to this file
# snapshot_path = "/tmp/fwatch-status.json"
snapshot_interval_secs = 2
"#
}
