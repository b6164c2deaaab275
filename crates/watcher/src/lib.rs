//! FileWatch controller
//!
//! This crate provides:
//! - Ignore matching (explicit rules plus built-in editor/OS noise)
//! - Per-watcher debouncing into bounded event batches
//! - OS subscriptions via `notify`, plus an in-process fake for tests
//! - ConfigMap-backed disable gates
//! - The reconciler that keeps exactly one watcher per FileWatch resource,
//!   and the trigger loop that drives it from store notifications

pub mod debounce;
pub mod disable;
pub mod error;
pub mod matcher;
pub mod platform;
pub mod reconcile;
pub mod requeue;
pub mod resource;
pub mod sink;
pub mod timer;

// Re-exports
pub use debounce::{Debouncer, MAX_BATCH_DURATION, MIN_REST_DURATION};
pub use disable::{DisableResolver, Resolution};
pub use error::{ReconcileError, WatchError};
pub use matcher::{is_ephemeral, is_ignored, IgnoreMatcher};
pub use platform::{ChangeEvent, FakeMultiWatcher, NotifySubscriber, Subscriber, Subscription};
pub use reconcile::Controller;
pub use requeue::{RequeueConfig, Requeuer};
pub use resource::ResourceWatcher;
pub use sink::{BufferLogSink, LogSink, TracingLogSink};
pub use timer::{FakeTimerMaker, Timer, TimerMaker, TokioTimerMaker};
