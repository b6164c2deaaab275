//! Shared fixture for controller integration tests
//!
//! Wires a `Controller` to an in-memory store, the fan-out fake watcher,
//! immediately-firing timers and a buffered log sink.

#![allow(dead_code)]

use filewatch::{BufferLogSink, Controller, FakeMultiWatcher, FakeTimerMaker, Subscriber};
use filewatch_core::{
    ConfigMap, DisableSource, FileWatch, FileWatchSpec, FileWatchStatus, ResourceKey,
    ResourceStore,
};
use filewatch_store::MemoryStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Name of the ConfigMap key gating test resources
pub const DISABLE_KEY: &str = "isDisabled";

const TIMEOUT: Duration = Duration::from_secs(5);
const POLL: Duration = Duration::from_millis(5);

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub fake: FakeMultiWatcher,
    pub timers: FakeTimerMaker,
    pub sink: BufferLogSink,
    pub controller: Arc<Controller>,
    pub shutdown: CancellationToken,
    pub root: PathBuf,
    _dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let fake = FakeMultiWatcher::new();
        Self::with_subscriber(fake.clone(), Arc::new(fake))
    }

    /// Fixture whose controller subscribes through `subscriber`
    pub fn with_subscriber(fake: FakeMultiWatcher, subscriber: Arc<dyn Subscriber>) -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let store = Arc::new(MemoryStore::new());
        let timers = FakeTimerMaker::new();
        let sink = BufferLogSink::new();
        let shutdown = CancellationToken::new();

        let controller = Arc::new(Controller::new(
            store.clone(),
            subscriber,
            Arc::new(timers.clone()),
            Arc::new(sink.clone()),
            shutdown.clone(),
        ));

        Self {
            store,
            fake,
            timers,
            sink,
            controller,
            shutdown,
            root,
            _dir: dir,
        }
    }

    pub fn key(name: &str) -> ResourceKey {
        ResourceKey::new("", name)
    }

    /// Absolute path under the fixture root
    pub fn path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.root.join(rel)
    }

    /// Spec watching the given paths under the root
    pub fn spec(&self, rels: &[&str]) -> FileWatchSpec {
        FileWatchSpec {
            watched_paths: rels.iter().map(|rel| self.path(rel)).collect(),
            ..Default::default()
        }
    }

    /// Store a resource and reconcile it
    pub async fn create(&self, name: &str, spec: FileWatchSpec) -> FileWatch {
        let fw = self
            .store
            .create_file_watch(FileWatch::new(Self::key(name), spec))
            .await
            .unwrap();
        self.reconcile(name).await;
        fw
    }

    /// Replace a resource's spec and reconcile it
    pub async fn update_spec(&self, name: &str, spec: FileWatchSpec) {
        let mut fw = self.store.get_file_watch(&Self::key(name)).await.unwrap();
        fw.spec = spec;
        self.store.update_file_watch(fw).await.unwrap();
        self.reconcile(name).await;
    }

    pub async fn delete(&self, name: &str) {
        self.store.delete_file_watch(&Self::key(name)).await.unwrap();
        self.reconcile(name).await;
    }

    pub async fn reconcile(&self, name: &str) {
        self.controller.reconcile(&Self::key(name)).await.unwrap();
    }

    pub async fn status(&self, name: &str) -> FileWatchStatus {
        self.store
            .get_file_watch(&Self::key(name))
            .await
            .unwrap()
            .status
    }

    /// Write the gate ConfigMap, creating it on first use
    pub async fn set_config_map(&self, cm_name: &str, disabled: bool) {
        let value = disabled.to_string();
        match self.store.get_config_map(cm_name).await {
            Ok(mut cm) => {
                cm.data.insert(DISABLE_KEY.to_string(), value);
                self.store.update_config_map(cm).await.unwrap();
            }
            Err(_) => {
                self.store
                    .create_config_map(ConfigMap::with_entry(cm_name, DISABLE_KEY, value))
                    .await
                    .unwrap();
            }
        }
    }

    /// Gate `name` on ConfigMap `name-disable`, set it, and reconcile
    pub async fn set_disabled(&self, name: &str, disabled: bool) {
        let cm_name = format!("{name}-disable");
        let source = DisableSource::config_map(&cm_name, DISABLE_KEY);

        let mut fw = self.store.get_file_watch(&Self::key(name)).await.unwrap();
        if fw.spec.disable_source.as_ref() != Some(&source) {
            fw.spec.disable_source = Some(source);
            self.store.update_file_watch(fw).await.unwrap();
        }

        self.set_config_map(&cm_name, disabled).await;
        self.reconcile(name).await;
    }

    /// Emit a change for `rel` under the root; returns receiving subscriptions
    pub fn emit(&self, rel: impl AsRef<Path>) -> usize {
        self.fake.emit(self.path(rel))
    }

    /// Poll the stored status until `pred` holds
    pub async fn wait_for_status(
        &self,
        name: &str,
        pred: impl Fn(&FileWatchStatus) -> bool,
    ) -> FileWatchStatus {
        let deadline = tokio::time::Instant::now() + TIMEOUT;
        loop {
            let status = self.status(name).await;
            if pred(&status) {
                return status;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("status of {name} never matched, last seen: {status:#?}");
            }
            tokio::time::sleep(POLL).await;
        }
    }

    /// Emit one change and wait for the batch containing it
    ///
    /// `rel` must not have been emitted before in the same test.
    pub async fn emit_and_wait(&self, name: &str, rel: &str) {
        let path = self.path(rel);
        assert!(self.fake.emit(&path) > 0, "nobody is watching {}", path.display());

        self.wait_for_status(name, |status| {
            status
                .file_events
                .latest()
                .map(|batch| batch.seen_files.contains(&path))
                .unwrap_or(false)
        })
        .await;
    }
}

/// Poll `check` until it holds or the timeout passes
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL).await;
    }
}
