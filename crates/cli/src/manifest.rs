//! Declarative resource manifest
//!
//! A TOML file listing FileWatch resources and the ConfigMaps gating them:
//!
//! ```toml
//! [[watch]]
//! name = "web"
//! watched_paths = ["src", "static"]
//! ignores = [{ base_path = "src", patterns = ["**/*.tmp"] }]
//! disable_source = { config_map = { name = "web-gate", key = "isDisabled" } }
//!
//! [[config_map]]
//! name = "web-gate"
//! data = { isDisabled = "false" }
//! ```
//!
//! Relative paths resolve against the manifest's directory.

use anyhow::{Context, Result};
use filewatch_core::{
    ConfigMap, DisableSource, FileWatch, FileWatchSpec, IgnoreDef, ResourceKey, ResourceStore,
};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub watch: Vec<WatchEntry>,

    #[serde(default)]
    pub config_map: Vec<ConfigMapEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchEntry {
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    pub watched_paths: Vec<PathBuf>,
    #[serde(default)]
    pub ignores: Vec<IgnoreDef>,
    #[serde(default)]
    pub disable_source: Option<DisableSource>,
}

impl WatchEntry {
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.namespace.clone(), self.name.clone())
    }

    /// Spec with every path made absolute against `base`
    pub fn spec(&self, base: &Path) -> FileWatchSpec {
        FileWatchSpec {
            watched_paths: self
                .watched_paths
                .iter()
                .map(|path| base.join(path))
                .collect(),
            ignores: self
                .ignores
                .iter()
                .map(|def| IgnoreDef {
                    base_path: base.join(&def.base_path),
                    patterns: def.patterns.clone(),
                })
                .collect(),
            disable_source: self.disable_source.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigMapEntry {
    pub name: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

/// A manifest plus the directory its relative paths resolve against
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    pub manifest: Manifest,
    pub base_dir: PathBuf,
}

/// What `apply` changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub pruned: usize,
    pub config_maps: usize,
}

/// Read, parse and validate a manifest file
pub fn load(path: &Path) -> Result<LoadedManifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    let manifest: Manifest = toml::from_str(&content)
        .with_context(|| format!("Failed to parse manifest {}", path.display()))?;
    manifest
        .validate()
        .with_context(|| format!("Invalid manifest {}", path.display()))?;

    let base_dir = path
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", path.display()))?
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"));

    Ok(LoadedManifest { manifest, base_dir })
}

impl Manifest {
    /// Reject duplicates and empty names
    pub fn validate(&self) -> Result<()> {
        let mut keys = BTreeSet::new();
        for entry in &self.watch {
            if entry.name.trim().is_empty() {
                anyhow::bail!("watch entry with empty name");
            }
            if entry.watched_paths.is_empty() {
                anyhow::bail!("watch {:?} has no watched_paths", entry.name);
            }
            if !keys.insert(entry.key()) {
                anyhow::bail!("duplicate watch {}", entry.key());
            }
        }

        let mut names = BTreeSet::new();
        for cm in &self.config_map {
            if cm.name.trim().is_empty() {
                anyhow::bail!("config_map entry with empty name");
            }
            if !names.insert(cm.name.as_str()) {
                anyhow::bail!("duplicate config_map {:?}", cm.name);
            }
        }

        Ok(())
    }
}

impl LoadedManifest {
    /// Make the store match the manifest
    ///
    /// ConfigMaps are written first so gated watches resolve against their
    /// declared values. With `prune`, FileWatches absent from the manifest
    /// are deleted.
    pub async fn apply(&self, store: &dyn ResourceStore, prune: bool) -> Result<ApplySummary> {
        let mut summary = ApplySummary::default();

        for entry in &self.manifest.config_map {
            let cm = ConfigMap {
                name: entry.name.clone(),
                resource_version: 0,
                data: entry.data.clone(),
            };
            match store.get_config_map(&entry.name).await {
                Ok(existing) if existing.data == cm.data => {}
                Ok(existing) => {
                    store
                        .update_config_map(ConfigMap {
                            resource_version: existing.resource_version,
                            ..cm
                        })
                        .await
                        .with_context(|| format!("Failed to update config_map {:?}", entry.name))?;
                }
                Err(e) if e.is_not_found() => {
                    store
                        .create_config_map(cm)
                        .await
                        .with_context(|| format!("Failed to create config_map {:?}", entry.name))?;
                }
                Err(e) => return Err(e.into()),
            }
            summary.config_maps += 1;
        }

        let mut declared = BTreeSet::new();
        for entry in &self.manifest.watch {
            let key = entry.key();
            let spec = entry.spec(&self.base_dir);
            declared.insert(key.clone());

            match store.get_file_watch(&key).await {
                Ok(existing) if existing.spec == spec => summary.unchanged += 1,
                Ok(mut existing) => {
                    existing.spec = spec;
                    store
                        .update_file_watch(existing)
                        .await
                        .with_context(|| format!("Failed to update watch {key}"))?;
                    summary.updated += 1;
                }
                Err(e) if e.is_not_found() => {
                    store
                        .create_file_watch(FileWatch::new(key.clone(), spec))
                        .await
                        .with_context(|| format!("Failed to create watch {key}"))?;
                    summary.created += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        if prune {
            for fw in store.list_file_watches().await? {
                let key = fw.key();
                if !declared.contains(&key) {
                    store
                        .delete_file_watch(&key)
                        .await
                        .with_context(|| format!("Failed to prune watch {key}"))?;
                    summary.pruned += 1;
                }
            }
        }

        info!(
            created = summary.created,
            updated = summary.updated,
            unchanged = summary.unchanged,
            pruned = summary.pruned,
            "applied manifest"
        );
        Ok(summary)
    }
}
