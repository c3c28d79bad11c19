//! A single file conversion

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::engine::CodecEngine;
use super::profile::TranscodeProfile;
use super::progress::{ProgressReporter, TranscodeEvent};
use crate::error::TranscodeFault;

/// Converted file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscodeSuccess {
    pub original_name: String,
    pub converted_name: String,
}

/// File that could not be converted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscodeFailure {
    pub original_name: String,
    pub error: String,
}

/// Terminal result of one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeOutcome {
    Success(TranscodeSuccess),
    Failure(TranscodeFailure),
}

impl TranscodeOutcome {
    pub fn failure(original_name: impl Into<String>, error: impl Into<String>) -> Self {
        TranscodeOutcome::Failure(TranscodeFailure {
            original_name: original_name.into(),
            error: error.into(),
        })
    }
}

/// One input file to one output file
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    /// Name as supplied by the uploader
    pub original_name: String,
    /// File name of the output inside the session's outbound directory
    pub converted_name: String,
    pub input: PathBuf,
    pub output: PathBuf,
}

impl TranscodeJob {
    /// Run the job to completion. Never fails: faults become a `Failure` outcome.
    pub async fn run(
        &self,
        engine: &dyn CodecEngine,
        profile: &TranscodeProfile,
        timeout: Option<Duration>,
        reporter: &ProgressReporter,
    ) -> TranscodeOutcome {
        let start = Instant::now();
        info!("Converting {}...", self.original_name);

        let result = match self.execute(engine, profile, timeout, reporter).await {
            Ok(()) => self.verify_output().await,
            Err(fault) => Err(fault),
        };

        match result {
            Ok(()) => {
                info!(
                    "Converted {} -> {} in {:?}",
                    self.original_name,
                    self.converted_name,
                    start.elapsed()
                );
                reporter.report(TranscodeEvent::Finished);
                TranscodeOutcome::Success(TranscodeSuccess {
                    original_name: self.original_name.clone(),
                    converted_name: self.converted_name.clone(),
                })
            }
            Err(fault) => {
                let message = self.scrub(&fault.to_string());
                warn!("Failed to convert {}: {}", self.original_name, message);
                self.discard_partial_output().await;
                reporter.report(TranscodeEvent::Failed {
                    message: message.clone(),
                });
                TranscodeOutcome::failure(self.original_name.clone(), message)
            }
        }
    }

    async fn execute(
        &self,
        engine: &dyn CodecEngine,
        profile: &TranscodeProfile,
        timeout: Option<Duration>,
        reporter: &ProgressReporter,
    ) -> Result<(), TranscodeFault> {
        let conversion = engine.transcode(&self.input, &self.output, profile, reporter);
        match timeout {
            // Dropping the engine future kills the child process
            Some(limit) => tokio::time::timeout(limit, conversion)
                .await
                .map_err(|_| TranscodeFault::Timeout(limit))?,
            None => conversion.await,
        }
    }

    async fn verify_output(&self) -> Result<(), TranscodeFault> {
        match tokio::fs::metadata(&self.output).await {
            Ok(m) if m.is_file() => Ok(()),
            Ok(_) => Err(TranscodeFault::Io(format!(
                "{} is not a regular file",
                self.converted_name
            ))),
            Err(e) => Err(TranscodeFault::Io(format!(
                "{} was not produced: {}",
                self.converted_name, e
            ))),
        }
    }

    async fn discard_partial_output(&self) {
        if let Err(e) = tokio::fs::remove_file(&self.output).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove partial output {}: {}", self.converted_name, e);
            }
        }
    }

    /// Replace internal paths in engine messages with the user-facing names
    fn scrub(&self, message: &str) -> String {
        let mut message = message.to_string();
        for (path, name) in [
            (&self.input, &self.original_name),
            (&self.output, &self.converted_name),
        ] {
            message = replace_path(&message, path, name);
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                message = replace_path(&message, dir, "");
            }
        }
        message
    }
}

fn replace_path(message: &str, path: &Path, replacement: &str) -> String {
    let path = path.to_string_lossy();
    if path.is_empty() {
        return message.to_string();
    }
    message.replace(path.as_ref(), replacement)
}
