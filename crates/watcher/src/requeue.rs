//! Reconcile triggers
//!
//! Turns store notifications into reconcile passes:
//! - FileWatch changes reconcile that key
//! - ConfigMap changes reconcile every FileWatch gated on that ConfigMap
//! - A periodic resync (and any missed notifications) reconciles everything
//!
//! Failed passes are retried with exponential backoff.

use crate::reconcile::Controller;
use filewatch_core::{ResourceKey, StoreEvent};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Timing knobs for the trigger loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequeueConfig {
    /// How often every resource is reconciled regardless of events
    pub resync_interval: Duration,

    /// First retry delay after a failed pass
    pub retry_base: Duration,

    /// Upper bound on the retry delay
    pub retry_max: Duration,
}

impl Default for RequeueConfig {
    fn default() -> Self {
        Self {
            resync_interval: Duration::from_secs(30),
            retry_base: Duration::from_millis(100),
            retry_max: Duration::from_secs(30),
        }
    }
}

impl RequeueConfig {
    /// Delay before retry number `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.retry_base.saturating_mul(factor).min(self.retry_max)
    }
}

/// A key waiting to be retried
struct Retry {
    key: ResourceKey,
    attempt: u32,
}

/// Event loop feeding the controller
pub struct Requeuer {
    controller: Arc<Controller>,
    config: RequeueConfig,
    shutdown: CancellationToken,
}

impl Requeuer {
    pub fn new(controller: Arc<Controller>, config: RequeueConfig, shutdown: CancellationToken) -> Self {
        Self {
            controller,
            config,
            shutdown,
        }
    }

    /// Run until the shutdown token is cancelled
    ///
    /// The first tick of the resync timer fires immediately, so every
    /// existing resource is reconciled on startup.
    pub async fn run(self) {
        let mut events = self.controller.store().subscribe();
        let (retry_tx, mut retry_rx) = mpsc::unbounded_channel::<Retry>();

        let mut resync = interval(self.config.resync_interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Starting reconcile loop (resync interval: {:?})",
            self.config.resync_interval
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                event = events.recv() => match event {
                    Ok(StoreEvent::FileWatch(key)) => {
                        self.reconcile(key, 0, &retry_tx).await;
                    }
                    Ok(StoreEvent::ConfigMap(name)) => {
                        for key in self.dependents(&name).await {
                            self.reconcile(key, 0, &retry_tx).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("missed {missed} store events, resyncing");
                        self.resync(&retry_tx).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("store closed, stopping reconcile loop");
                        break;
                    }
                },

                Some(retry) = retry_rx.recv() => {
                    self.reconcile(retry.key, retry.attempt, &retry_tx).await;
                }

                _ = resync.tick() => {
                    self.resync(&retry_tx).await;
                }
            }
        }

        debug!("reconcile loop stopped");
    }

    async fn reconcile(&self, key: ResourceKey, attempt: u32, retry_tx: &mpsc::UnboundedSender<Retry>) {
        let err = match self.controller.reconcile(&key).await {
            Ok(()) => return,
            Err(e) => e,
        };

        let delay = self.config.backoff(attempt);
        warn!(key = %key, attempt, "reconcile failed, retrying in {delay:?}: {err}");

        let retry_tx = retry_tx.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = retry_tx.send(Retry {
                        key,
                        attempt: attempt.saturating_add(1),
                    });
                }
            }
        });
    }

    /// Reconcile every stored resource plus every key still being watched
    async fn resync(&self, retry_tx: &mpsc::UnboundedSender<Retry>) {
        let mut keys: BTreeSet<ResourceKey> =
            self.controller.watched_keys().into_iter().collect();

        match self.controller.store().list_file_watches().await {
            Ok(file_watches) => keys.extend(file_watches.iter().map(|fw| fw.key())),
            Err(e) => warn!("failed to list resources for resync: {e}"),
        }

        for key in keys {
            self.reconcile(key, 0, retry_tx).await;
        }
    }

    /// FileWatches gated on the ConfigMap called `name`
    async fn dependents(&self, name: &str) -> Vec<ResourceKey> {
        match self.controller.store().list_file_watches().await {
            Ok(file_watches) => file_watches
                .iter()
                .filter(|fw| {
                    fw.spec
                        .disable_source
                        .as_ref()
                        .and_then(|source| source.config_map_name())
                        == Some(name)
                })
                .map(|fw| fw.key())
                .collect(),
            Err(e) => {
                warn!(config_map = name, "failed to find dependents: {e}");
                Vec::new()
            }
        }
    }
}
