//! Periodic eviction of old storage entries

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RetentionConfig;
use crate::metrics::Metrics;
use crate::storage::{StorageArea, StorageKind};

/// Entries removed by one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub inbound_removed: usize,
    pub outbound_removed: usize,
}

impl SweepSummary {
    pub fn total(&self) -> usize {
        self.inbound_removed + self.outbound_removed
    }
}

/// Removes inbound and outbound entries older than the retention threshold
pub struct RetentionSweeper {
    storage: Arc<StorageArea>,
    interval: Duration,
    max_age: Duration,
    metrics: Option<Arc<Metrics>>,
}

/// Running sweeper task
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RetentionSweeper {
    pub fn new(storage: Arc<StorageArea>, interval: Duration, max_age: Duration) -> Self {
        Self {
            storage,
            interval,
            max_age,
            metrics: None,
        }
    }

    pub fn from_config(storage: Arc<StorageArea>, config: &RetentionConfig) -> Self {
        Self::new(storage, config.interval(), config.max_age())
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run one sweep over both roots. Errors are logged, never returned.
    pub async fn sweep_now(&self) -> SweepSummary {
        let mut summary = SweepSummary::default();

        for kind in [StorageKind::Inbound, StorageKind::Outbound] {
            match self.storage.sweep_older_than(kind, self.max_age).await {
                Ok(removed) => match kind {
                    StorageKind::Inbound => summary.inbound_removed = removed,
                    StorageKind::Outbound => summary.outbound_removed = removed,
                },
                Err(e) => {
                    warn!("Retention sweep of {} storage failed: {}", kind, e);
                    if let Some(metrics) = &self.metrics {
                        metrics.record_error("sweep");
                    }
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_sweep(summary.total() as u64);
        }
        if summary.total() > 0 {
            info!(
                "Retention sweep removed {} inbound and {} outbound entr(ies)",
                summary.inbound_removed, summary.outbound_removed
            );
        } else {
            debug!("Retention sweep found nothing to remove");
        }
        summary
    }

    /// Start sweeping every interval until the handle is stopped.
    /// The first sweep runs one interval after start.
    pub fn start(self) -> SweeperHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(
                tokio::time::Instant::now() + self.interval,
                self.interval,
            );
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(
                "Retention sweeper running every {:?}, max age {:?}",
                self.interval, self.max_age
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.sweep_now().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Retention sweeper stopped");
        });

        SweeperHandle { shutdown, task }
    }
}

impl SweeperHandle {
    /// Stop the sweeper and wait for an in-progress sweep to finish
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("Retention sweeper ended abnormally: {}", e);
        }
    }
}
