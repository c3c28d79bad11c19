//! Session coordination
//!
//! Ties storage, batch conversion, archiving and deferred cleanup together
//! for one session:
//! - `convert` runs a batch and packages whatever converted
//! - `retrieve_archive` locates the finished archive
//! - `open_archive` opens it for download and schedules the session's
//!   outbound cleanup

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::archive::Archiver;
use crate::batch::{BatchConverter, BatchReport, InputFile};
use crate::cleanup::CleanupScheduler;
use crate::config::CleanupConfig;
use crate::error::{ConverterError, Result};
use crate::metrics::Metrics;
use crate::storage::{SessionId, StorageArea, StorageKind};
use crate::transcode::TranscodeProfile;

/// An archive opened for download
#[derive(Debug)]
pub struct ArchiveDownload {
    pub file: tokio::fs::File,
    /// Size in bytes
    pub len: u64,
}

#[derive(Clone)]
pub struct SessionCoordinator {
    storage: Arc<StorageArea>,
    converter: BatchConverter,
    archiver: Archiver,
    cleanup: CleanupScheduler,
    profile: TranscodeProfile,
    /// Delay before a session's uploads are removed after conversion
    input_grace: Duration,
    /// Delay before a session's outputs are removed after delivery
    output_grace: Duration,
    metrics: Arc<Metrics>,
}

impl SessionCoordinator {
    pub fn new(storage: Arc<StorageArea>, converter: BatchConverter, metrics: Arc<Metrics>) -> Self {
        let defaults = CleanupConfig::default();
        Self {
            cleanup: CleanupScheduler::new(Arc::clone(&storage)),
            storage,
            converter,
            archiver: Archiver::default(),
            profile: TranscodeProfile::mp3_320(),
            input_grace: defaults.input_grace(),
            output_grace: defaults.output_grace(),
            metrics,
        }
    }

    pub fn with_grace(mut self, input_grace: Duration, output_grace: Duration) -> Self {
        self.input_grace = input_grace;
        self.output_grace = output_grace;
        self
    }

    pub fn storage(&self) -> &Arc<StorageArea> {
        &self.storage
    }

    #[cfg(test)]
    pub fn cleanup(&self) -> &CleanupScheduler {
        &self.cleanup
    }

    /// Take a session (back) into use: removals scheduled by an earlier
    /// request for the same id must not hit the new files.
    pub fn claim_session(&self, session: &SessionId) {
        if self.cleanup.cancel_session(session) > 0 {
            info!("Session {}: reused, pending cleanup cancelled", session);
        }
    }

    /// Convert a session's uploads and archive the successes.
    ///
    /// Per-file failures are part of the report. Storage failures are
    /// returned as errors and discard the partial results. The inbound
    /// directory is always scheduled for removal; the outbound directory too
    /// when nothing is left to download.
    ///
    /// The work runs on its own task and finishes even if the returned
    /// future is dropped.
    pub async fn convert(&self, session: &SessionId, inputs: &[InputFile]) -> Result<BatchReport> {
        let this = self.clone();
        let session = session.clone();
        let inputs = inputs.to_vec();

        tokio::spawn(async move { this.convert_to_completion(&session, &inputs).await })
            .await
            .map_err(|e| ConverterError::Internal(format!("conversion task failed: {}", e)))?
    }

    async fn convert_to_completion(
        &self,
        session: &SessionId,
        inputs: &[InputFile],
    ) -> Result<BatchReport> {
        self.claim_session(session);
        self.metrics.batch_started();
        let result = self.run_batch(session, inputs).await;

        self.cleanup
            .schedule(session, StorageKind::Inbound, self.input_grace);

        match &result {
            Ok(report) => {
                self.metrics
                    .batch_finished(report.successful() as u64, report.failed() as u64);
                if report.archive.is_none() {
                    self.cleanup
                        .schedule(session, StorageKind::Outbound, self.output_grace);
                }
            }
            Err(e) => {
                error!("Session {}: conversion aborted: {}", session, e);
                self.metrics.batch_finished(0, inputs.len() as u64);
                self.metrics.record_error(e.kind());
                self.cleanup
                    .schedule(session, StorageKind::Outbound, self.output_grace);
            }
        }

        result
    }

    async fn run_batch(&self, session: &SessionId, inputs: &[InputFile]) -> Result<BatchReport> {
        let outbound = self
            .storage
            .prepare_session_dir(session, StorageKind::Outbound)
            .await?;
        // A rerun of the same session must not serve the previous archive
        self.archiver.discard(session, &outbound).await?;

        let mut report = self
            .converter
            .convert_all(session, inputs, &outbound, &self.profile)
            .await;

        if !report.successes.is_empty() {
            let locator = self
                .archiver
                .build_archive(session, &report.successes, &outbound)
                .await?;
            self.metrics.record_archive_built();
            report.archive = Some(locator);
        }

        Ok(report)
    }

    /// Path of the session's archive, or `NotFound`
    pub async fn retrieve_archive(&self, session: &SessionId) -> Result<PathBuf> {
        let outbound = self.storage.session_dir(session, StorageKind::Outbound);
        let path = Archiver::archive_path(session, &outbound);

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(ConverterError::NotFound(session.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ConverterError::NotFound(session.to_string()))
            }
            Err(e) => Err(ConverterError::storage("stat", &path, e)),
        }
    }

    /// Open the session's archive for streaming and schedule removal of its
    /// outputs. The output grace period covers the transfer.
    pub async fn open_archive(&self, session: &SessionId) -> Result<ArchiveDownload> {
        let path = self.retrieve_archive(session).await?;
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            // Swept between the lookup and the open
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ConverterError::NotFound(session.to_string()))
            }
            Err(e) => return Err(ConverterError::storage("open", &path, e)),
        };
        let len = file
            .metadata()
            .await
            .map_err(|e| ConverterError::storage("stat", &path, e))?
            .len();

        self.archive_delivered(session, len);
        Ok(ArchiveDownload { file, len })
    }

    /// Record a delivered archive and schedule the outbound cleanup
    fn archive_delivered(&self, session: &SessionId, bytes: u64) {
        info!("Session {}: archive delivered ({} bytes)", session, bytes);
        self.metrics.record_archive_served(bytes);
        self.cleanup
            .schedule(session, StorageKind::Outbound, self.output_grace);
    }

    /// Run every pending cleanup immediately
    pub async fn shutdown(&self) -> usize {
        self.cleanup.flush().await
    }
}
