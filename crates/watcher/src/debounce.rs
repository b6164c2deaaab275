//! Batch debouncing for one watcher
//!
//! Collapses a burst of change notifications (a build writing many files,
//! an editor's save dance) into a single `FileEventBatch`, so the status
//! write rate is bounded by the debounce window rather than by the number
//! of files touched.

use crate::timer::{Timer, TimerMaker};
use chrono::Utc;
use filewatch_core::FileEventBatch;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Quiet period after the last change before a batch is flushed
pub const MIN_REST_DURATION: Duration = Duration::from_millis(200);

/// Longest a batch may stay open while changes keep arriving
pub const MAX_BATCH_DURATION: Duration = Duration::from_secs(10);

/// Accumulates changed paths and flushes them as one batch
///
/// Owned by a single watcher task; no internal locking.
pub struct Debouncer {
    timers: Arc<dyn TimerMaker>,
    /// Pending paths in first-seen order
    pending: Vec<PathBuf>,
    /// Membership index for `pending`
    seen: HashSet<PathBuf>,
    /// Reset on every change
    rest: Option<Timer>,
    /// Started by the first change of a window, never reset
    max: Option<Timer>,
}

impl Debouncer {
    pub fn new(timers: Arc<dyn TimerMaker>) -> Self {
        Self {
            timers,
            pending: Vec::new(),
            seen: HashSet::new(),
            rest: None,
            max: None,
        }
    }

    /// Record a changed path and restart the quiet-period timer
    pub fn push(&mut self, path: PathBuf) {
        if self.max.is_none() {
            self.max = Some(self.timers.after(MAX_BATCH_DURATION));
        }
        self.rest = Some(self.timers.after(MIN_REST_DURATION));

        if self.seen.insert(path.clone()) {
            self.pending.push(path);
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Flush the pending set now, stamped with the current time
    ///
    /// Returns None (and emits nothing) when there is nothing pending.
    pub fn flush(&mut self) -> Option<FileEventBatch> {
        self.rest = None;
        self.max = None;

        if self.pending.is_empty() {
            return None;
        }

        self.seen.clear();
        Some(FileEventBatch {
            time: Utc::now(),
            seen_files: std::mem::take(&mut self.pending),
        })
    }

    /// Wait for the current window to close, then flush it
    ///
    /// Never completes while idle. Cancel safe: dropping the future keeps
    /// the pending set and timers intact.
    pub async fn next_batch(&mut self) -> Option<FileEventBatch> {
        match (self.rest.as_mut(), self.max.as_mut()) {
            (Some(rest), Some(max)) => {
                futures::future::select(rest, max).await;
            }
            _ => std::future::pending::<()>().await,
        }
        self.flush()
    }
}
