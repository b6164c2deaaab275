//! Single-fire timers for the debouncer
//!
//! A timer is a future that completes once its duration has elapsed.
//! Resetting is done by dropping it and asking the maker for a new one,
//! which also cancels it.

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

/// Pending single-fire timer
pub type Timer = BoxFuture<'static, ()>;

/// Produces timers; injectable so tests control when debounce windows close
pub trait TimerMaker: Send + Sync {
    fn after(&self, duration: Duration) -> Timer;
}

/// Timers backed by `tokio::time::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimerMaker;

impl TimerMaker for TokioTimerMaker {
    fn after(&self, duration: Duration) -> Timer {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Test timers that ignore their duration
///
/// Timers fire as soon as they are polled, unless the gate is held with
/// `hold()`; then every timer waits until the guard is dropped. Holding the
/// gate keeps a debounce window open for as long as the test needs.
#[derive(Debug, Clone, Default)]
pub struct FakeTimerMaker {
    gate: Arc<RwLock<()>>,
}

impl FakeTimerMaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block all timers until the returned guard is dropped
    pub async fn hold(&self) -> OwnedRwLockWriteGuard<()> {
        Arc::clone(&self.gate).write_owned().await
    }
}

impl TimerMaker for FakeTimerMaker {
    fn after(&self, _duration: Duration) -> Timer {
        let gate = Arc::clone(&self.gate);
        Box::pin(async move {
            let _open = gate.read().await;
        })
    }
}
