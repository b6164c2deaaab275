//! Subscriber backed by the platform's recommended `notify` watcher
//! (inotify, FSEvents, ReadDirectoryChangesW, ...)

use super::{ChangeEvent, Subscriber, Subscription, ERROR_BUFFER, EVENT_BUFFER};
use crate::error::WatchError;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Subscribes through `notify::recommended_watcher`
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifySubscriber;

impl Subscriber for NotifySubscriber {
    fn subscribe(&self, paths: &[PathBuf]) -> Result<Subscription, WatchError> {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (error_tx, error_rx) = mpsc::channel(ERROR_BUFFER);

        // Runs on notify's own thread, so blocking sends are fine
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if event.need_rescan() {
                    let _ = error_tx.blocking_send(WatchError::event(
                        "event queue overflowed, some changes may have been missed",
                    ));
                }
                if matches!(event.kind, EventKind::Access(_)) {
                    return;
                }
                for path in event.paths {
                    if event_tx.blocking_send(ChangeEvent::new(path)).is_err() {
                        // Subscription dropped
                        return;
                    }
                }
            }
            Err(e) => {
                let _ = error_tx.blocking_send(WatchError::event(e));
            }
        })?;

        let mut rejected = Vec::new();
        for path in paths {
            match watcher.watch(path, RecursiveMode::Recursive) {
                Ok(()) => debug!(path = %path.display(), "watching"),
                Err(e) => {
                    warn!(path = %path.display(), "failed to watch: {e}");
                    rejected.push(WatchError::PathWatchFailed {
                        path: path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(Subscription::new(event_rx, error_rx)
            .with_rejected(rejected)
            .with_guard(watcher))
    }
}
