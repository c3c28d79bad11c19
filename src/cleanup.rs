//! Deferred session cleanup
//!
//! Session directories are removed a short while after they stop being
//! needed. Each pending removal is keyed by (session, kind); scheduling the
//! same key again replaces the earlier timer.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::storage::{SessionId, StorageArea, StorageKind};

type CleanupKey = (SessionId, StorageKind);

struct Pending {
    generation: u64,
    task: JoinHandle<()>,
}

struct Inner {
    storage: Arc<StorageArea>,
    pending: DashMap<CleanupKey, Pending>,
    next_generation: AtomicU64,
}

/// Schedules removal of session directories after a grace period
#[derive(Clone)]
pub struct CleanupScheduler {
    inner: Arc<Inner>,
}

/// Handle to one scheduled removal
#[derive(Debug)]
pub struct CleanupHandle {
    key: CleanupKey,
    generation: u64,
}

impl CleanupScheduler {
    pub fn new(storage: Arc<StorageArea>) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                pending: DashMap::new(),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Remove the session's `kind` directory once `delay` has elapsed
    pub fn schedule(&self, session: &SessionId, kind: StorageKind, delay: Duration) -> CleanupHandle {
        let key = (session.clone(), kind);
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);

        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        // The timer starts only once the entry is registered below
        let (armed_tx, armed_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            if armed_rx.await.is_err() {
                return;
            }
            tokio::time::sleep(delay).await;
            // Only the most recent schedule for this key may fire
            if inner
                .pending
                .remove_if(&task_key, |_, p| p.generation == generation)
                .is_some()
            {
                remove(&inner.storage, &task_key).await;
            }
        });

        if let Some(previous) = self.inner.pending.insert(key.clone(), Pending { generation, task }) {
            previous.task.abort();
        }
        let _ = armed_tx.send(());
        debug!(
            "Scheduled {} cleanup of session {} in {:?}",
            kind, session, delay
        );

        CleanupHandle { key, generation }
    }

    /// Cancel a scheduled removal. Returns false if it already ran or was replaced.
    pub fn cancel(&self, handle: &CleanupHandle) -> bool {
        match self
            .inner
            .pending
            .remove_if(&handle.key, |_, p| p.generation == handle.generation)
        {
            Some((_, pending)) => {
                pending.task.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending removal of the session's directories.
    /// Returns how many were cancelled.
    pub fn cancel_session(&self, session: &SessionId) -> usize {
        let cancelled = [StorageKind::Inbound, StorageKind::Outbound]
            .into_iter()
            .filter_map(|kind| self.pending_handle(session, kind))
            .filter(|handle| self.cancel(handle))
            .count();
        if cancelled > 0 {
            debug!("Cancelled {} pending cleanup(s) of session {}", cancelled, session);
        }
        cancelled
    }

    fn pending_handle(&self, session: &SessionId, kind: StorageKind) -> Option<CleanupHandle> {
        let key = (session.clone(), kind);
        let generation = self.inner.pending.get(&key)?.generation;
        Some(CleanupHandle { key, generation })
    }

    /// Number of removals still waiting for their timer
    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Run every pending removal now. Used on shutdown.
    pub async fn flush(&self) -> usize {
        let keys: Vec<CleanupKey> = self.inner.pending.iter().map(|e| e.key().clone()).collect();

        let mut flushed = 0;
        for key in keys {
            if let Some((_, pending)) = self.inner.pending.remove(&key) {
                pending.task.abort();
                remove(&self.inner.storage, &key).await;
                flushed += 1;
            }
        }
        if flushed > 0 {
            info!("Flushed {} pending cleanup(s)", flushed);
        }
        flushed
    }
}

async fn remove(storage: &StorageArea, (session, kind): &CleanupKey) {
    match storage.remove_session(session, *kind).await {
        Ok(()) => debug!("Removed {} files of session {}", kind, session),
        Err(e) => warn!("Cleanup of session {} failed: {}", session, e),
    }
}
