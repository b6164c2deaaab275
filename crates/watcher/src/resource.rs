//! One live monitor for one FileWatch resource
//!
//! A `ResourceWatcher` moves through Starting -> Running -> Done exactly
//! once. Its background task drains the subscription, drops ignored paths,
//! debounces the rest and publishes each flushed batch into the resource's
//! status. The task only writes status while holding the resource's key
//! lock and never after its token is cancelled, so a replaced watcher can
//! not clobber its successor's status.

use crate::debounce::Debouncer;
use crate::error::WatchError;
use crate::matcher::IgnoreMatcher;
use crate::platform::Subscription;
use crate::sink::LogSink;
use crate::timer::TimerMaker;
use chrono::{DateTime, Utc};
use filewatch_core::{
    FileEventBatch, FileWatchSpec, FileWatchStatus, ResourceKey, ResourceStore, StoreError,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Where to read about ReadDirectoryChangesW buffer overruns
const SHORT_READ_HELP: &str =
    "https://learn.microsoft.com/en-us/windows/win32/api/winbase/nf-winbase-readdirectorychangesw";

/// Shared plumbing a watcher task needs besides its own subscription
#[derive(Clone)]
pub(crate) struct TaskContext {
    pub store: Arc<dyn ResourceStore>,
    pub sink: Arc<dyn LogSink>,
    pub timers: Arc<dyn TimerMaker>,
    /// Per-key lock shared with the reconciler
    pub lock: Arc<tokio::sync::Mutex<()>>,
}

struct WatcherState {
    done: bool,
    spec: FileWatchSpec,
    status: FileWatchStatus,
}

/// Handle to a running (or finished) monitor
pub struct ResourceWatcher {
    key: ResourceKey,
    start_time: DateTime<Utc>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    state: Mutex<WatcherState>,
}

impl ResourceWatcher {
    pub(crate) fn new(
        key: ResourceKey,
        spec: FileWatchSpec,
        start_time: DateTime<Utc>,
        status: FileWatchStatus,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            key,
            start_time,
            cancel,
            task: Mutex::new(None),
            state: Mutex::new(WatcherState {
                done: false,
                spec,
                status,
            }),
        })
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Spec this watcher was started (or last refreshed) with
    pub fn spec(&self) -> FileWatchSpec {
        self.state.lock().spec.clone()
    }

    /// When this watcher's monitor started
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Snapshot of the status this watcher owns
    pub fn status(&self) -> FileWatchStatus {
        self.state.lock().status.clone()
    }

    /// True once the event loop has exited for any reason
    pub fn is_done(&self) -> bool {
        self.state.lock().done
    }

    /// Apply `f` to the in-memory status and spec, returning the new status
    /// if anything changed
    pub(crate) fn refresh(
        &self,
        spec: &FileWatchSpec,
        f: impl FnOnce(&mut FileWatchStatus),
    ) -> Option<FileWatchStatus> {
        let mut state = self.state.lock();
        state.spec = spec.clone();

        let before = state.status.clone();
        f(&mut state.status);
        (state.status != before).then(|| state.status.clone())
    }

    /// Transition to Done; later calls are no-ops
    pub(crate) fn mark_done(&self) {
        let mut state = self.state.lock();
        if !state.done {
            state.done = true;
            debug!(key = %self.key, "watcher done");
        }
    }

    /// Spawn the event loop
    pub(crate) fn spawn(
        self: &Arc<Self>,
        subscription: Subscription,
        matcher: IgnoreMatcher,
        ctx: TaskContext,
    ) {
        let task = WatchTask {
            debouncer: Debouncer::new(Arc::clone(&ctx.timers)),
            watcher: Arc::clone(self),
            subscription,
            matcher,
            ctx,
        };
        *self.task.lock() = Some(tokio::spawn(task.run()));
    }

    /// Cancel the event loop and wait until it has released its monitor
    pub(crate) async fn stop(&self) {
        self.cancel.cancel();

        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(key = %self.key, "watcher task failed: {e}");
            }
        }

        self.mark_done();
    }
}

struct WatchTask {
    watcher: Arc<ResourceWatcher>,
    subscription: Subscription,
    matcher: IgnoreMatcher,
    debouncer: Debouncer,
    ctx: TaskContext,
}

impl WatchTask {
    async fn run(mut self) {
        let cancel = self.watcher.cancel.clone();

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                Some(err) = self.subscription.errors.recv() => {
                    self.handle_error(err).await;
                }

                event = self.subscription.events.recv() => match event {
                    Some(event) => {
                        if !self.matcher.is_ignored(&event.path) {
                            self.debouncer.push(event.path);
                        }
                    }
                    None => {
                        // Monitor went away; publish what we already have
                        if let Some(batch) = self.debouncer.flush() {
                            self.handle_batch(batch).await;
                        }
                        break;
                    }
                },

                Some(batch) = self.debouncer.next_batch() => {
                    self.handle_batch(batch).await;
                }
            }
        }

        // Release the OS monitor before reporting Done
        let WatchTask {
            watcher,
            subscription,
            ..
        } = self;
        drop(subscription);
        watcher.mark_done();
    }

    async fn handle_batch(&mut self, batch: FileEventBatch) {
        debug!(
            key = %self.watcher.key,
            files = batch.seen_files.len(),
            "publishing file event batch"
        );
        self.publish(|status| status.record_batch(batch)).await;
    }

    async fn handle_error(&mut self, err: WatchError) {
        let message = describe_error(&err);
        self.ctx
            .sink
            .log(&self.watcher.key, &format!("Error: {message}"));
        self.publish(|status| status.error = Some(message)).await;
    }

    /// Mutate the owned status and write it through, unless cancelled
    ///
    /// Store failures are logged and dropped; the next batch or the next
    /// reconcile pass writes the full status again.
    async fn publish(&mut self, f: impl FnOnce(&mut FileWatchStatus) + Send) {
        let cancel = &self.watcher.cancel;
        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            guard = self.ctx.lock.lock() => guard,
        };
        if cancel.is_cancelled() {
            return;
        }

        let status = {
            let mut state = self.watcher.state.lock();
            f(&mut state.status);
            state.status.clone()
        };
        if let Err(e) = write_status(self.ctx.store.as_ref(), &self.watcher.key, status).await {
            warn!(key = %self.watcher.key, "failed to write status: {e}");
        }
    }
}

/// Render a monitor error for status and logs
///
/// Short reads on Windows are a known limitation of the OS API and get a
/// pointer to its documentation.
pub(crate) fn describe_error(err: &WatchError) -> String {
    annotate(err.to_string(), cfg!(windows))
}

fn annotate(message: String, windows: bool) -> String {
    if windows && message.contains("short read") {
        format!(
            "{message}\nWindows ReadDirectoryChangesW drops events when many files \
             change at once. See {SHORT_READ_HELP}"
        )
    } else {
        message
    }
}

/// Write a full status, tolerating a resource deleted in the meantime
pub(crate) async fn write_status(
    store: &dyn ResourceStore,
    key: &ResourceKey,
    status: FileWatchStatus,
) -> Result<(), StoreError> {
    match store.update_file_watch_status(key, status).await {
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() => {
            debug!(key = %key, "resource gone, dropping status write");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{FakeMultiWatcher, Subscriber};
    use crate::sink::BufferLogSink;
    use crate::timer::FakeTimerMaker;
    use filewatch_core::FileWatch;
    use filewatch_store::MemoryStore;
    use std::path::PathBuf;
    use std::time::Duration;

    struct Harness {
        store: Arc<MemoryStore>,
        fake: FakeMultiWatcher,
        sink: BufferLogSink,
        watcher: Arc<ResourceWatcher>,
    }

    async fn start(spec: FileWatchSpec) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let key = ResourceKey::new("", "web");
        store
            .create_file_watch(FileWatch::new(key.clone(), spec.clone()))
            .await
            .unwrap();

        let fake = FakeMultiWatcher::new();
        let sink = BufferLogSink::new();
        let sub = fake.subscribe(&spec.watched_paths).unwrap();
        let (matcher, errors) = IgnoreMatcher::compile(&spec.ignores);
        assert!(errors.is_empty());

        let watcher = ResourceWatcher::new(
            key,
            spec,
            Utc::now(),
            FileWatchStatus::default(),
            CancellationToken::new(),
        );
        watcher.spawn(
            sub,
            matcher,
            TaskContext {
                store: store.clone(),
                sink: Arc::new(sink.clone()),
                timers: Arc::new(FakeTimerMaker::new()),
                lock: Arc::new(tokio::sync::Mutex::new(())),
            },
        );

        Harness {
            store,
            fake,
            sink,
            watcher,
        }
    }

    fn spec(root: &str) -> FileWatchSpec {
        FileWatchSpec {
            watched_paths: vec![PathBuf::from(root)],
            ..Default::default()
        }
    }

    async fn wait_for(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_batch_written_to_store() {
        let h = start(spec("/src")).await;

        h.fake.emit("/src/main.rs");
        let stored = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let fw = h.store.get_file_watch(h.watcher.key()).await.unwrap();
                if fw.status.file_events.len() == 1 {
                    return fw;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(stored.status, h.watcher.status());
        assert_eq!(
            stored.status.file_events.latest().unwrap().seen_files,
            vec![PathBuf::from("/src/main.rs")]
        );
    }

    #[tokio::test]
    async fn test_error_logged_and_recorded() {
        let h = start(spec("/src")).await;

        h.fake.emit_error(WatchError::event("short read"));
        wait_for(|| h.watcher.status().error.is_some()).await;

        assert!(h.sink.contains("short read"));
        assert!(h.watcher.status().error.unwrap().contains("short read"));
        assert!(!h.watcher.is_done());
    }

    #[tokio::test]
    async fn test_stop_releases_monitor_and_marks_done() {
        let h = start(spec("/src")).await;
        assert_eq!(h.fake.live_subscriptions(), 1);

        h.watcher.stop().await;

        assert!(h.watcher.is_done());
        assert_eq!(h.fake.live_subscriptions(), 0);

        // Second stop is harmless
        h.watcher.stop().await;
        assert!(h.watcher.is_done());
    }

    #[test]
    fn test_watch_loop_can_be_spawned() {
        fn assert_send<T: Send>(_: &T) {}

        let fake = FakeMultiWatcher::new();
        let timers: Arc<dyn TimerMaker> = Arc::new(FakeTimerMaker::new());
        let task = WatchTask {
            watcher: ResourceWatcher::new(
                ResourceKey::new("", "web"),
                spec("/src"),
                Utc::now(),
                FileWatchStatus::default(),
                CancellationToken::new(),
            ),
            subscription: fake.subscribe(&[PathBuf::from("/src")]).unwrap(),
            matcher: IgnoreMatcher::default(),
            debouncer: Debouncer::new(Arc::clone(&timers)),
            ctx: TaskContext {
                store: Arc::new(MemoryStore::new()),
                sink: Arc::new(BufferLogSink::new()),
                timers,
                lock: Arc::new(tokio::sync::Mutex::new(())),
            },
        };

        assert_send(&task.run());
    }

    #[test]
    fn test_short_read_annotated_only_on_windows() {
        let plain = annotate("short read".to_string(), false);
        assert_eq!(plain, "short read");

        let annotated = annotate("short read".to_string(), true);
        assert!(annotated.starts_with("short read"));
        assert!(annotated.contains(SHORT_READ_HELP));

        assert_eq!(annotate("other".to_string(), true), "other");
    }
}
