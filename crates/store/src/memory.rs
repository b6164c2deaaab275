//! In-memory resource store

use async_trait::async_trait;
use filewatch_core::{
    ConfigMap, FileWatch, FileWatchStatus, ResourceKey, ResourceKind, ResourceStore, StoreError,
    StoreEvent,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

/// Capacity of the change notification channel
const EVENT_BUFFER: usize = 1024;

/// Resource store held entirely in memory
///
/// Every write is stamped with a value from one monotonic version counter,
/// so versions are unique across kinds. Spec updates carrying a stale
/// version are rejected with `StoreError::Conflict`.
pub struct MemoryStore {
    /// FileWatch resources by identity
    file_watches: RwLock<BTreeMap<ResourceKey, FileWatch>>,
    /// ConfigMaps by name
    config_maps: RwLock<BTreeMap<String, ConfigMap>>,
    /// Monotonic version counter
    version_counter: AtomicU64,
    /// Change notifications
    events: broadcast::Sender<StoreEvent>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            file_watches: RwLock::new(BTreeMap::new()),
            config_maps: RwLock::new(BTreeMap::new()),
            version_counter: AtomicU64::new(1),
            events,
        }
    }

    /// Number of stored FileWatch resources
    pub fn file_watch_count(&self) -> usize {
        self.file_watches.read().len()
    }

    fn next_version(&self) -> u64 {
        self.version_counter.fetch_add(1, Ordering::SeqCst)
    }

    fn notify(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_file_watch(fw: &FileWatch) -> Result<(), StoreError> {
    if fw.meta.name.is_empty() {
        return Err(StoreError::Invalid {
            kind: ResourceKind::FileWatch,
            name: fw.key().to_string(),
            reason: "name must not be empty".to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get_file_watch(&self, key: &ResourceKey) -> Result<FileWatch, StoreError> {
        self.file_watches
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(ResourceKind::FileWatch, key))
    }

    async fn list_file_watches(&self) -> Result<Vec<FileWatch>, StoreError> {
        Ok(self.file_watches.read().values().cloned().collect())
    }

    async fn create_file_watch(&self, mut fw: FileWatch) -> Result<FileWatch, StoreError> {
        validate_file_watch(&fw)?;
        let key = fw.key();

        {
            let mut file_watches = self.file_watches.write();
            if file_watches.contains_key(&key) {
                return Err(StoreError::AlreadyExists {
                    kind: ResourceKind::FileWatch,
                    name: key.to_string(),
                });
            }

            fw.meta.resource_version = self.next_version();
            fw.status = FileWatchStatus::default();
            file_watches.insert(key.clone(), fw.clone());
        }

        tracing::debug!(key = %key, "created FileWatch");
        self.notify(StoreEvent::FileWatch(key));
        Ok(fw)
    }

    async fn update_file_watch(&self, fw: FileWatch) -> Result<FileWatch, StoreError> {
        validate_file_watch(&fw)?;
        let key = fw.key();

        let (updated, spec_changed) = {
            let mut file_watches = self.file_watches.write();
            let existing = file_watches
                .get_mut(&key)
                .ok_or_else(|| StoreError::not_found(ResourceKind::FileWatch, &key))?;

            if existing.meta.resource_version != fw.meta.resource_version {
                return Err(StoreError::Conflict {
                    kind: ResourceKind::FileWatch,
                    name: key.to_string(),
                    expected: fw.meta.resource_version,
                    actual: existing.meta.resource_version,
                });
            }

            let spec_changed = existing.spec != fw.spec;
            existing.spec = fw.spec;
            existing.meta.resource_version = self.next_version();
            (existing.clone(), spec_changed)
        };

        if spec_changed {
            tracing::debug!(key = %key, "updated FileWatch spec");
            self.notify(StoreEvent::FileWatch(key));
        }
        Ok(updated)
    }

    async fn update_file_watch_status(
        &self,
        key: &ResourceKey,
        status: FileWatchStatus,
    ) -> Result<FileWatch, StoreError> {
        let mut file_watches = self.file_watches.write();
        let existing = file_watches
            .get_mut(key)
            .ok_or_else(|| StoreError::not_found(ResourceKind::FileWatch, key))?;

        existing.status = status;
        existing.meta.resource_version = self.next_version();
        Ok(existing.clone())
    }

    async fn delete_file_watch(&self, key: &ResourceKey) -> Result<(), StoreError> {
        if self.file_watches.write().remove(key).is_none() {
            return Err(StoreError::not_found(ResourceKind::FileWatch, key));
        }

        tracing::debug!(key = %key, "deleted FileWatch");
        self.notify(StoreEvent::FileWatch(key.clone()));
        Ok(())
    }

    async fn get_config_map(&self, name: &str) -> Result<ConfigMap, StoreError> {
        self.config_maps
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found(ResourceKind::ConfigMap, name))
    }

    async fn create_config_map(&self, mut cm: ConfigMap) -> Result<ConfigMap, StoreError> {
        if cm.name.is_empty() {
            return Err(StoreError::Invalid {
                kind: ResourceKind::ConfigMap,
                name: cm.name,
                reason: "name must not be empty".to_string(),
            });
        }

        {
            let mut config_maps = self.config_maps.write();
            if config_maps.contains_key(&cm.name) {
                return Err(StoreError::AlreadyExists {
                    kind: ResourceKind::ConfigMap,
                    name: cm.name,
                });
            }
            cm.resource_version = self.next_version();
            config_maps.insert(cm.name.clone(), cm.clone());
        }

        self.notify(StoreEvent::ConfigMap(cm.name.clone()));
        Ok(cm)
    }

    async fn update_config_map(&self, cm: ConfigMap) -> Result<ConfigMap, StoreError> {
        let updated = {
            let mut config_maps = self.config_maps.write();
            let existing = config_maps
                .get_mut(&cm.name)
                .ok_or_else(|| StoreError::not_found(ResourceKind::ConfigMap, &cm.name))?;

            if existing.resource_version != cm.resource_version {
                return Err(StoreError::Conflict {
                    kind: ResourceKind::ConfigMap,
                    name: cm.name,
                    expected: cm.resource_version,
                    actual: existing.resource_version,
                });
            }

            existing.data = cm.data;
            existing.resource_version = self.next_version();
            existing.clone()
        };

        self.notify(StoreEvent::ConfigMap(updated.name.clone()));
        Ok(updated)
    }

    async fn delete_config_map(&self, name: &str) -> Result<(), StoreError> {
        if self.config_maps.write().remove(name).is_none() {
            return Err(StoreError::not_found(ResourceKind::ConfigMap, name));
        }

        self.notify(StoreEvent::ConfigMap(name.to_string()));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}
