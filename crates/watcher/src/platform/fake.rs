//! In-process stand-in for the OS watch primitive
//!
//! Tests push synthetic events and errors; each live subscription whose
//! roots contain the path receives a copy.

use super::{ChangeEvent, Subscriber, Subscription, ERROR_BUFFER, EVENT_BUFFER};
use crate::error::WatchError;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

struct FakeSub {
    roots: Vec<PathBuf>,
    events: mpsc::Sender<ChangeEvent>,
    errors: mpsc::Sender<WatchError>,
}

impl FakeSub {
    fn is_live(&self) -> bool {
        !self.events.is_closed()
    }
}

/// Fan-out fake of a multiplexed watcher
#[derive(Clone, Default)]
pub struct FakeMultiWatcher {
    subs: Arc<Mutex<Vec<FakeSub>>>,
}

impl FakeMultiWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a change to every live subscription watching `path`
    ///
    /// Returns how many subscriptions received it. Never blocks: a full
    /// subscription channel drops the event for that subscription.
    pub fn emit(&self, path: impl Into<PathBuf>) -> usize {
        let path = path.into();
        let mut subs = self.subs.lock();
        subs.retain(FakeSub::is_live);

        subs.iter()
            .filter(|sub| sub.roots.iter().any(|root| path.starts_with(root)))
            .filter(|sub| sub.events.try_send(ChangeEvent::new(path.clone())).is_ok())
            .count()
    }

    /// Deliver an error to every live subscription
    pub fn emit_error(&self, err: WatchError) -> usize {
        let mut subs = self.subs.lock();
        subs.retain(FakeSub::is_live);

        subs.iter()
            .filter(|sub| sub.errors.try_send(err.clone()).is_ok())
            .count()
    }

    /// Number of subscriptions that have not been dropped yet
    pub fn live_subscriptions(&self) -> usize {
        let mut subs = self.subs.lock();
        subs.retain(FakeSub::is_live);
        subs.len()
    }
}

impl Subscriber for FakeMultiWatcher {
    fn subscribe(&self, paths: &[PathBuf]) -> Result<Subscription, WatchError> {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (error_tx, error_rx) = mpsc::channel(ERROR_BUFFER);

        self.subs.lock().push(FakeSub {
            roots: paths.to_vec(),
            events: event_tx,
            errors: error_tx,
        });

        Ok(Subscription::new(event_rx, error_rx))
    }
}
