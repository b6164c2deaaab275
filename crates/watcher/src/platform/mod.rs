//! OS file-notification primitive
//!
//! A `Subscriber` watches one or more roots and delivers change events and
//! errors on channels until the `Subscription` is dropped.

pub mod fake;
pub mod native;

use crate::error::WatchError;
use std::path::PathBuf;
use tokio::sync::mpsc;

pub use fake::FakeMultiWatcher;
pub use native::NotifySubscriber;

/// Capacity of a subscription's event channel
pub const EVENT_BUFFER: usize = 1024;

/// Capacity of a subscription's error channel
pub const ERROR_BUFFER: usize = 64;

/// A single changed path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Absolute path that changed
    pub path: PathBuf,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Live watch on a set of roots
///
/// Dropping the subscription releases the underlying OS resources.
pub struct Subscription {
    pub events: mpsc::Receiver<ChangeEvent>,
    pub errors: mpsc::Receiver<WatchError>,
    /// Roots that could not be watched; the others are still live
    pub rejected: Vec<WatchError>,
    _guard: Option<Box<dyn Send>>,
}

impl Subscription {
    pub fn new(events: mpsc::Receiver<ChangeEvent>, errors: mpsc::Receiver<WatchError>) -> Self {
        Self {
            events,
            errors,
            rejected: Vec::new(),
            _guard: None,
        }
    }

    pub fn with_rejected(mut self, rejected: Vec<WatchError>) -> Self {
        self.rejected = rejected;
        self
    }

    /// Keep `guard` alive for as long as the subscription
    pub fn with_guard<G: Send + 'static>(mut self, guard: G) -> Self {
        self._guard = Some(Box::new(guard));
        self
    }
}

/// Multiplexed "watch these paths" service
pub trait Subscriber: Send + Sync {
    /// Start watching `paths` recursively
    ///
    /// Per-root failures are reported in `Subscription::rejected`; an `Err`
    /// means nothing could be watched at all.
    fn subscribe(&self, paths: &[PathBuf]) -> Result<Subscription, WatchError>;
}
