//! FileWatch reconciliation
//!
//! Converges the set of running watchers onto the stored resources. Each
//! pass for a key runs under that key's lock and either leaves the current
//! watcher alone, replaces it, or removes it; there is never more than one
//! watcher per key, and an old watcher is fully torn down before its
//! replacement subscribes.

use crate::disable::DisableResolver;
use crate::error::{ReconcileError, WatchError};
use crate::matcher::IgnoreMatcher;
use crate::platform::Subscriber;
use crate::resource::{describe_error, write_status, ResourceWatcher, TaskContext};
use crate::sink::LogSink;
use crate::timer::TimerMaker;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use filewatch_core::{DisableStatus, FileWatch, FileWatchStatus, ResourceKey, ResourceStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Drives watchers for every FileWatch in a store
pub struct Controller {
    store: Arc<dyn ResourceStore>,
    subscriber: Arc<dyn Subscriber>,
    timers: Arc<dyn TimerMaker>,
    sink: Arc<dyn LogSink>,
    resolver: DisableResolver,

    /// Parent of every watcher's token
    shutdown: CancellationToken,

    /// Registry of live watchers; never held across an await
    watchers: Mutex<HashMap<ResourceKey, Arc<ResourceWatcher>>>,

    /// Per-key locks serializing reconcile passes and status writes
    locks: DashMap<ResourceKey, Arc<tokio::sync::Mutex<()>>>,

    /// Last monitor start time handed out per key
    start_times: DashMap<ResourceKey, DateTime<Utc>>,
}

impl Controller {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        subscriber: Arc<dyn Subscriber>,
        timers: Arc<dyn TimerMaker>,
        sink: Arc<dyn LogSink>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            resolver: DisableResolver::new(Arc::clone(&store)),
            store,
            subscriber,
            timers,
            sink,
            shutdown,
            watchers: Mutex::new(HashMap::new()),
            locks: DashMap::new(),
            start_times: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    /// Keys that currently have a registered watcher
    pub fn watched_keys(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<_> = self.watchers.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// The registered watcher for `key`, if any
    pub fn watcher(&self, key: &ResourceKey) -> Option<Arc<ResourceWatcher>> {
        self.watchers.lock().get(key).cloned()
    }

    /// Converge the watcher for `key` onto the stored resource
    ///
    /// Errors are store failures worth retrying; problems with the watch
    /// itself end up in the resource's status instead.
    pub async fn reconcile(&self, key: &ResourceKey) -> Result<(), ReconcileError> {
        let lock = self.key_lock(key);
        let guard = lock.lock().await;

        let fw = match self.store.get_file_watch(key).await {
            Ok(fw) => fw,
            Err(e) if e.is_not_found() => {
                debug!(key = %key, "resource gone, removing watch");
                self.remove_watch(key).await;
                self.start_times.remove(key);
                drop(guard);
                // Only the map and this pass hold the lock: nobody is waiting
                self.locks
                    .remove_if(key, |_, lock| Arc::strong_count(lock) == 2);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let existing = self.watcher(key);
        let previous_disable = existing
            .as_ref()
            .and_then(|w| w.status().disable_status)
            .or_else(|| fw.status.disable_status.clone());
        let disable_status = self
            .resolver
            .disable_status(fw.spec.disable_source.as_ref(), previous_disable.as_ref())
            .await?;

        if disable_status.disabled {
            if existing.is_some() {
                info!(key = %key, reason = %disable_status.reason, "disabling watch");
            }
            self.remove_watch(key).await;

            let status = FileWatchStatus {
                disable_status: Some(disable_status),
                ..Default::default()
            };
            if fw.status != status {
                write_status(self.store.as_ref(), key, status).await?;
            }
            return Ok(());
        }

        match existing {
            Some(watcher) if !watcher.is_done() && watcher.spec().same_monitor(&fw.spec) => {
                let updated = watcher.refresh(&fw.spec, |status| {
                    status.disable_status = Some(disable_status);
                });
                if let Some(status) = updated {
                    write_status(self.store.as_ref(), key, status).await?;
                } else if fw.status != watcher.status() {
                    // Store copy fell behind the watcher (e.g. a failed write)
                    write_status(self.store.as_ref(), key, watcher.status()).await?;
                }
            }
            _ => {
                self.remove_watch(key).await;
                self.start_watch(&fw, disable_status, Arc::clone(&lock)).await?;
            }
        }

        Ok(())
    }

    /// Stop every watcher and refuse to start new ones
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let watchers: Vec<_> = self.watchers.lock().drain().map(|(_, w)| w).collect();
        for watcher in watchers {
            watcher.stop().await;
        }
        info!("controller stopped");
    }

    fn key_lock(&self, key: &ResourceKey) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.entry(key.clone()).or_default().clone()
    }

    /// Unregister and tear down the watcher for `key`, if any
    ///
    /// Callers hold the key lock.
    async fn remove_watch(&self, key: &ResourceKey) {
        let removed = self.watchers.lock().remove(key);
        if let Some(watcher) = removed {
            debug!(key = %key, "stopping watcher");
            watcher.stop().await;
        }
    }

    /// Start a fresh watcher for `fw`; the caller has already removed the
    /// previous one and holds the key lock
    ///
    /// The watcher stays registered even if the status write fails, so a
    /// retried pass only has to rewrite status.
    async fn start_watch(
        &self,
        fw: &FileWatch,
        disable_status: DisableStatus,
        lock: Arc<tokio::sync::Mutex<()>>,
    ) -> Result<(), ReconcileError> {
        let key = fw.key();
        if self.shutdown.is_cancelled() {
            return Ok(());
        }

        let start_time = self.next_start_time(&key, fw.status.monitor_start_time);
        let mut status = FileWatchStatus {
            monitor_start_time: Some(start_time),
            disable_status: Some(disable_status),
            ..Default::default()
        };

        let (paths, mut errors) = split_watched_paths(&fw.spec.watched_paths);
        let (matcher, ignore_errors) = IgnoreMatcher::compile(&fw.spec.ignores);
        errors.extend(ignore_errors);

        let mut subscription = match self.subscriber.subscribe(&paths) {
            Ok(subscription) => subscription,
            Err(e) => {
                errors.push(e);
                status.monitor_start_time = None;
                status.error = self.report(&key, &errors);
                write_status(self.store.as_ref(), &key, status).await?;
                return Ok(());
            }
        };
        errors.append(&mut subscription.rejected);
        status.error = self.report(&key, &errors);

        let watcher = ResourceWatcher::new(
            key.clone(),
            fw.spec.clone(),
            start_time,
            status.clone(),
            self.shutdown.child_token(),
        );
        let ctx = TaskContext {
            store: Arc::clone(&self.store),
            sink: Arc::clone(&self.sink),
            timers: Arc::clone(&self.timers),
            lock,
        };

        {
            // shutdown() cancels before draining, so checking under the
            // registry lock means a drained registry stays empty
            let mut watchers = self.watchers.lock();
            if self.shutdown.is_cancelled() {
                debug!(key = %key, "controller stopping, releasing new monitor");
                return Ok(());
            }
            watcher.spawn(subscription, matcher, ctx);
            watchers.insert(key.clone(), watcher);
        }

        info!(key = %key, paths = paths.len(), "started watch");
        write_status(self.store.as_ref(), &key, status).await?;
        Ok(())
    }

    /// Start time for a new monitor, strictly later than any earlier one
    fn next_start_time(&self, key: &ResourceKey, stored: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let previous = match (self.start_times.get(key).map(|t| *t), stored) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let start_time = later_than(Utc::now(), previous);
        self.start_times.insert(key.clone(), start_time);
        start_time
    }

    /// Log startup problems and join them for status
    fn report(&self, key: &ResourceKey, errors: &[WatchError]) -> Option<String> {
        if errors.is_empty() {
            return None;
        }
        let messages: Vec<String> = errors.iter().map(describe_error).collect();
        for message in &messages {
            self.sink.log(key, &format!("Error: {message}"));
        }
        Some(messages.join("; "))
    }
}

/// `now`, nudged forward if needed so it lands after `previous`
fn later_than(now: DateTime<Utc>, previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match previous {
        Some(prev) if now <= prev => prev + chrono::Duration::microseconds(1),
        _ => now,
    }
}

/// Separate watchable roots from ones rejected up front
fn split_watched_paths(paths: &[PathBuf]) -> (Vec<PathBuf>, Vec<WatchError>) {
    let mut accepted = Vec::with_capacity(paths.len());
    let mut rejected = Vec::new();

    for path in paths {
        if path.is_absolute() {
            accepted.push(path.clone());
        } else {
            rejected.push(WatchError::InvalidPath {
                path: path.clone(),
                reason: "path must be absolute".to_string(),
            });
        }
    }

    (accepted, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{FakeMultiWatcher, Subscription};
    use crate::sink::BufferLogSink;
    use crate::timer::FakeTimerMaker;
    use async_trait::async_trait;
    use filewatch_core::{ConfigMap, FileWatchSpec, StoreError, StoreEvent};
    use filewatch_store::MemoryStore;
    use tokio::sync::broadcast;

    /// Store whose status writes always fail
    struct StatusWriteFails(MemoryStore);

    #[async_trait]
    impl ResourceStore for StatusWriteFails {
        async fn get_file_watch(&self, key: &ResourceKey) -> Result<FileWatch, StoreError> {
            self.0.get_file_watch(key).await
        }

        async fn list_file_watches(&self) -> Result<Vec<FileWatch>, StoreError> {
            self.0.list_file_watches().await
        }

        async fn create_file_watch(&self, fw: FileWatch) -> Result<FileWatch, StoreError> {
            self.0.create_file_watch(fw).await
        }

        async fn update_file_watch(&self, fw: FileWatch) -> Result<FileWatch, StoreError> {
            self.0.update_file_watch(fw).await
        }

        async fn update_file_watch_status(
            &self,
            _key: &ResourceKey,
            _status: FileWatchStatus,
        ) -> Result<FileWatch, StoreError> {
            Err(StoreError::Unavailable("disk full".to_string()))
        }

        async fn delete_file_watch(&self, key: &ResourceKey) -> Result<(), StoreError> {
            self.0.delete_file_watch(key).await
        }

        async fn get_config_map(&self, name: &str) -> Result<ConfigMap, StoreError> {
            self.0.get_config_map(name).await
        }

        async fn create_config_map(&self, cm: ConfigMap) -> Result<ConfigMap, StoreError> {
            self.0.create_config_map(cm).await
        }

        async fn update_config_map(&self, cm: ConfigMap) -> Result<ConfigMap, StoreError> {
            self.0.update_config_map(cm).await
        }

        async fn delete_config_map(&self, name: &str) -> Result<(), StoreError> {
            self.0.delete_config_map(name).await
        }

        fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
            self.0.subscribe()
        }
    }

    /// Subscriber that sees the controller shut down while it subscribes
    struct ShutdownDuringSubscribe {
        inner: FakeMultiWatcher,
        shutdown: CancellationToken,
    }

    impl Subscriber for ShutdownDuringSubscribe {
        fn subscribe(&self, paths: &[PathBuf]) -> Result<Subscription, WatchError> {
            self.shutdown.cancel();
            self.inner.subscribe(paths)
        }
    }

    fn controller(
        store: Arc<dyn ResourceStore>,
        subscriber: Arc<dyn Subscriber>,
        shutdown: CancellationToken,
    ) -> Controller {
        Controller::new(
            store,
            subscriber,
            Arc::new(FakeTimerMaker::new()),
            Arc::new(BufferLogSink::new()),
            shutdown,
        )
    }

    fn web() -> FileWatch {
        FileWatch::new(
            ResourceKey::new("", "web"),
            FileWatchSpec {
                watched_paths: vec![PathBuf::from("/src")],
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_status_write_failure_is_returned() {
        let store = Arc::new(StatusWriteFails(MemoryStore::new()));
        store.create_file_watch(web()).await.unwrap();
        let fake = FakeMultiWatcher::new();
        let controller = controller(store, Arc::new(fake.clone()), CancellationToken::new());
        let key = ResourceKey::new("", "web");

        let err = controller.reconcile(&key).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Store(StoreError::Unavailable(_))));

        // The monitor is up; a retry only has to rewrite status
        assert_eq!(controller.watched_keys(), vec![key.clone()]);
        assert!(controller.reconcile(&key).await.is_err());
        assert_eq!(fake.live_subscriptions(), 1);

        controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_during_start_registers_nothing() {
        let store = Arc::new(MemoryStore::new());
        store.create_file_watch(web()).await.unwrap();
        let fake = FakeMultiWatcher::new();
        let shutdown = CancellationToken::new();
        let subscriber = ShutdownDuringSubscribe {
            inner: fake.clone(),
            shutdown: shutdown.clone(),
        };
        let controller = controller(store, Arc::new(subscriber), shutdown);

        controller.reconcile(&ResourceKey::new("", "web")).await.unwrap();
        controller.shutdown().await;

        assert!(controller.watched_keys().is_empty());
        assert_eq!(fake.live_subscriptions(), 0);
    }

    #[test]
    fn test_later_than_is_strictly_increasing() {
        let now = Utc::now();
        assert_eq!(later_than(now, None), now);

        let earlier = now - chrono::Duration::seconds(1);
        assert_eq!(later_than(now, Some(earlier)), now);

        assert!(later_than(now, Some(now)) > now);

        let future = now + chrono::Duration::seconds(5);
        assert!(later_than(now, Some(future)) > future);
    }

    #[test]
    fn test_relative_paths_rejected() {
        let (accepted, rejected) =
            split_watched_paths(&[PathBuf::from("/abs/dir"), PathBuf::from("rel/dir")]);

        assert_eq!(accepted, vec![PathBuf::from("/abs/dir")]);
        assert_eq!(rejected.len(), 1);
        assert!(matches!(&rejected[0], WatchError::InvalidPath { path, .. } if path == &PathBuf::from("rel/dir")));
    }
}
