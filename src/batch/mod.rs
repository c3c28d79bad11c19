//! Batch conversion
//!
//! Runs one transcode job per input file for a session:
//! - All jobs are launched at once; a semaphore bounds how many engine
//!   processes run concurrently
//! - A failing or panicking job only affects its own outcome
//! - Outcomes are collected by input position, so the report keeps the
//!   submission order

pub mod naming;

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};

use crate::archive::ArchiveLocator;
use crate::error::TranscodeFault;
use crate::storage::SessionId;
use crate::transcode::{
    CodecEngine, JobEvent, ProgressReporter, TranscodeFailure, TranscodeJob, TranscodeOutcome,
    TranscodeProfile, TranscodeSuccess,
};
use crate::validation::AudioFormat;

/// Uploaded file stored in a session's inbound directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputFile {
    /// Name as supplied by the uploader (after sanitizing)
    pub original_name: String,
    pub size: u64,
    #[serde(skip)]
    pub path: PathBuf,
    pub format: AudioFormat,
}

/// Aggregate result of one conversion request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub session_id: SessionId,
    /// Converted files, in submission order
    pub successes: Vec<TranscodeSuccess>,
    /// Failed files, in submission order
    pub failures: Vec<TranscodeFailure>,
    /// Present only when at least one file converted
    pub archive: Option<ArchiveLocator>,
}

impl BatchReport {
    pub fn empty(session_id: SessionId) -> Self {
        Self {
            session_id,
            successes: Vec::new(),
            failures: Vec::new(),
            archive: None,
        }
    }

    /// Split outcomes into success and failure lists, keeping their order
    pub fn from_outcomes(session_id: SessionId, outcomes: Vec<TranscodeOutcome>) -> Self {
        let mut report = Self::empty(session_id);
        for outcome in outcomes {
            match outcome {
                TranscodeOutcome::Success(s) => report.successes.push(s),
                TranscodeOutcome::Failure(f) => report.failures.push(f),
            }
        }
        report
    }

    pub fn successful(&self) -> usize {
        self.successes.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn total(&self) -> usize {
        self.successful() + self.failed()
    }
}

/// Runs a session's transcode jobs concurrently
#[derive(Clone)]
pub struct BatchConverter {
    engine: Arc<dyn CodecEngine>,
    permits: Arc<Semaphore>,
    job_timeout: Option<Duration>,
    events: Option<mpsc::Sender<JobEvent>>,
}

impl BatchConverter {
    pub fn new(engine: Arc<dyn CodecEngine>, max_concurrent_jobs: usize) -> Self {
        Self {
            engine,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            job_timeout: None,
            events: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Forward job lifecycle events to `tx`
    pub fn with_events(mut self, tx: mpsc::Sender<JobEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    fn reporter(&self, job: &str) -> ProgressReporter {
        match &self.events {
            Some(tx) => ProgressReporter::new(job, tx.clone()),
            None => ProgressReporter::noop(job),
        }
    }

    /// Convert every input into `outbound_dir` and wait for all of them.
    ///
    /// The report always holds exactly one outcome per input.
    pub async fn convert_all(
        &self,
        session: &SessionId,
        inputs: &[InputFile],
        outbound_dir: &Path,
        profile: &TranscodeProfile,
    ) -> BatchReport {
        if inputs.is_empty() {
            return BatchReport::empty(session.clone());
        }

        let start = Instant::now();
        info!(
            "Session {}: converting {} file(s) with {}",
            session,
            inputs.len(),
            self.engine.name()
        );

        let converted_names =
            naming::output_names(inputs.iter().map(|i| i.original_name.as_str()), profile.extension);

        let handles: Vec<_> = inputs
            .iter()
            .zip(converted_names)
            .map(|(input, converted_name)| {
                let job = TranscodeJob {
                    original_name: input.original_name.clone(),
                    output: outbound_dir.join(&converted_name),
                    converted_name,
                    input: input.path.clone(),
                };
                let engine = Arc::clone(&self.engine);
                let permits = Arc::clone(&self.permits);
                let profile = profile.clone();
                let timeout = self.job_timeout;
                let reporter = self.reporter(&input.original_name);

                tokio::spawn(async move {
                    let _permit = match permits.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return TranscodeOutcome::failure(
                                job.original_name,
                                TranscodeFault::Aborted("worker pool closed".to_string())
                                    .to_string(),
                            )
                        }
                    };
                    job.run(engine.as_ref(), &profile, timeout, &reporter).await
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(inputs.len());
        for (input, handle) in inputs.iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Job for {} did not complete: {}", input.original_name, e);
                    TranscodeOutcome::failure(
                        input.original_name.clone(),
                        TranscodeFault::Aborted("internal error during conversion".to_string())
                            .to_string(),
                    )
                }
            };
            outcomes.push(outcome);
        }

        let report = BatchReport::from_outcomes(session.clone(), outcomes);
        info!(
            "Session {}: {} converted, {} failed in {:?}",
            session,
            report.successful(),
            report.failed(),
            start.elapsed()
        );
        report
    }
}
