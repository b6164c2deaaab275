//! Run the controller in the foreground
//!
//! Applies the manifest into an in-memory store, then reconciles until
//! Ctrl-C. On Unix, SIGHUP re-reads the manifest.

use crate::config::{self, ControllerConfig};
use crate::logging;
use crate::manifest::{self, LoadedManifest};
use anyhow::{Context, Result};
use filewatch::{Controller, NotifySubscriber, Requeuer, TokioTimerMaker, TracingLogSink};
use filewatch_core::ResourceStore;
use filewatch_store::{write_snapshot, MemoryStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub async fn run(manifest_path: &Path, prune: bool, config_path: Option<&Path>) -> Result<()> {
    // 1. Load configuration and start logging
    let (config, source) = config::load(config_path)?;
    let _log_guard = logging::init(&config.log)?;
    match &source {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("Using default configuration"),
    }

    // 2. Load manifest into the store
    let loaded = manifest::load(manifest_path)?;
    let store = Arc::new(MemoryStore::new());
    loaded
        .apply(store.as_ref(), prune)
        .await
        .context("Failed to apply manifest")?;

    // 3. Wire up the controller
    let shutdown = CancellationToken::new();
    let controller = Arc::new(Controller::new(
        store.clone(),
        Arc::new(NotifySubscriber),
        Arc::new(TokioTimerMaker),
        Arc::new(TracingLogSink),
        shutdown.clone(),
    ));
    let requeuer = Requeuer::new(
        Arc::clone(&controller),
        config.controller.requeue(),
        shutdown.clone(),
    );
    let requeue_task = tokio::spawn(requeuer.run());

    let snapshot_task = config.controller.snapshot_path.clone().map(|path| {
        tokio::spawn(snapshot_loop(
            store.clone(),
            path,
            config.controller.clone(),
            shutdown.clone(),
        ))
    });

    info!(
        "Watching {} resources from {}",
        store.file_watch_count(),
        manifest_path.display()
    );

    // 4. Serve until interrupted
    wait_for_shutdown(manifest_path, store.as_ref(), prune).await?;
    info!("Shutting down");

    // 5. Stop triggers, then every watcher
    shutdown.cancel();
    if let Err(e) = requeue_task.await {
        warn!("Reconcile loop failed: {e}");
    }
    controller.shutdown().await;

    if let Some(task) = snapshot_task {
        if let Err(e) = task.await {
            warn!("Snapshot task failed: {e}");
        }
    }
    if let Some(path) = &config.controller.snapshot_path {
        snapshot(store.as_ref(), path).await;
    }

    Ok(())
}

/// Wait for Ctrl-C, reloading the manifest on SIGHUP
async fn wait_for_shutdown(manifest_path: &Path, store: &dyn ResourceStore, prune: bool) -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangup = signal(SignalKind::hangup()).context("Failed to listen for SIGHUP")?;
        loop {
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    return res.context("Failed to listen for Ctrl-C");
                }
                _ = hangup.recv() => {
                    info!("SIGHUP received, reloading manifest");
                    if let Err(e) = reload(manifest_path, store, prune).await {
                        warn!("Manifest reload failed: {e:#}");
                    }
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = (manifest_path, store, prune);
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")
    }
}

#[cfg_attr(not(unix), allow(dead_code))]
async fn reload(manifest_path: &Path, store: &dyn ResourceStore, prune: bool) -> Result<()> {
    let loaded: LoadedManifest = manifest::load(manifest_path)?;
    loaded.apply(store, prune).await?;
    Ok(())
}

/// Periodically dump every resource to `path` until shutdown
async fn snapshot_loop(
    store: Arc<MemoryStore>,
    path: PathBuf,
    config: ControllerConfig,
    shutdown: CancellationToken,
) {
    let mut timer = interval(config.snapshot_interval());
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = timer.tick() => snapshot(store.as_ref(), &path).await,
        }
    }
}

async fn snapshot(store: &dyn ResourceStore, path: &Path) {
    match store.list_file_watches().await {
        Ok(mut resources) => {
            resources.sort_by_key(|fw| fw.key());
            if let Err(e) = write_snapshot(path, &resources) {
                warn!("Failed to write status snapshot: {e:#}");
            }
        }
        Err(e) => warn!("Failed to list resources for snapshot: {e}"),
    }
}
