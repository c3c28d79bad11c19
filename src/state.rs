//! Application state management
//!
//! This module defines the AppState structure that holds:
//! - Server configuration
//! - The session coordinator (storage, batch converter, archiver, cleanup)
//! - The upload policy and access gate used by the HTTP boundary
//! - Metrics

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::batch::BatchConverter;
use crate::config::ServerConfig;
use crate::coordinator::SessionCoordinator;
use crate::http::auth::AccessGate;
use crate::metrics::Metrics;
use crate::storage::StorageArea;
use crate::transcode::{CodecEngine, JobEvent};
use crate::validation::UploadPolicy;

/// Application state shared across all handlers
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,

    pub coordinator: SessionCoordinator,

    /// Shared-secret check for the protected endpoints
    pub gate: AccessGate,

    /// Limits applied to every conversion request
    pub policy: UploadPolicy,

    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Create the state around `engine`, forwarding job lifecycle events to
    /// `events` when given
    pub fn new(
        config: ServerConfig,
        engine: Arc<dyn CodecEngine>,
        events: Option<mpsc::Sender<JobEvent>>,
    ) -> Self {
        let storage = Arc::new(StorageArea::from_config(&config.storage));
        let metrics = Arc::new(Metrics::new());

        let mut converter = BatchConverter::new(engine, config.limits.max_concurrent_jobs)
            .with_timeout(config.limits.job_timeout());
        if let Some(tx) = events {
            converter = converter.with_events(tx);
        }

        let coordinator = SessionCoordinator::new(storage, converter, Arc::clone(&metrics))
            .with_grace(config.cleanup.input_grace(), config.cleanup.output_grace());

        Self {
            gate: AccessGate::new(&config.access_code),
            policy: UploadPolicy::from_limits(&config.limits),
            coordinator,
            metrics,
            config,
        }
    }

    pub fn storage(&self) -> &Arc<StorageArea> {
        self.coordinator.storage()
    }
}
