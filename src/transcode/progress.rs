//! Job lifecycle events and ffmpeg progress parsing

use regex::Regex;
use std::sync::LazyLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Lifecycle event emitted by a transcode job
#[derive(Debug, Clone, PartialEq)]
pub enum TranscodeEvent {
    /// The engine process was launched
    Started { command_line: String },
    /// Completion estimate in percent (0-100)
    Progress { percent: f32 },
    /// Terminal success
    Finished,
    /// Terminal failure
    Failed { message: String },
}

/// Event tagged with the job it belongs to
#[derive(Debug, Clone)]
pub struct JobEvent {
    pub job: String,
    pub event: TranscodeEvent,
}

/// Best-effort event sink.
///
/// Sends never block; when the receiver is slow or gone, events are dropped.
#[derive(Clone)]
pub struct ProgressReporter {
    job: String,
    tx: Option<mpsc::Sender<JobEvent>>,
}

impl ProgressReporter {
    pub fn new(job: impl Into<String>, tx: mpsc::Sender<JobEvent>) -> Self {
        Self {
            job: job.into(),
            tx: Some(tx),
        }
    }

    pub fn noop(job: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            tx: None,
        }
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    pub fn report(&self, event: TranscodeEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(JobEvent {
                job: self.job.clone(),
                event,
            });
        }
    }

    pub fn progress(&self, percent: f32) {
        self.report(TranscodeEvent::Progress {
            percent: percent.clamp(0.0, 100.0),
        });
    }
}

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("valid duration regex")
});

/// Parse "HH:MM:SS.ms" into seconds
pub fn parse_time(time_str: &str) -> Option<f64> {
    let parts: Vec<&str> = time_str.trim().split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;

    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Input duration from an ffmpeg stderr line such as
/// `  Duration: 00:03:12.45, start: 0.000000, bitrate: 1411 kb/s`
pub fn parse_duration_line(line: &str) -> Option<f64> {
    let caps = DURATION_RE.captures(line)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Encoded position in seconds from an `-progress` key/value line.
///
/// ffmpeg reports `out_time_ms` and `out_time_us` in microseconds, and
/// `out_time` as a clock string.
pub fn parse_out_time(line: &str) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => value.trim().parse::<i64>().ok().map(|us| us.max(0) as f64 / 1_000_000.0),
        "out_time" => parse_time(value),
        _ => None,
    }
}

/// Percentage of `total` seconds covered by `position` seconds
pub fn percent_of(position: f64, total: f64) -> Option<f32> {
    if total <= 0.0 || !total.is_finite() {
        return None;
    }
    Some(((position / total) * 100.0).clamp(0.0, 100.0) as f32)
}

/// Log job events until every sender is gone
pub fn spawn_progress_logger(mut rx: mpsc::Receiver<JobEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(JobEvent { job, event }) = rx.recv().await {
            match event {
                TranscodeEvent::Started { command_line } => {
                    debug!("[{}] started: {}", job, command_line)
                }
                TranscodeEvent::Progress { percent } => trace!("[{}] {:.1}%", job, percent),
                TranscodeEvent::Finished => debug!("[{}] finished", job),
                TranscodeEvent::Failed { message } => debug!("[{}] failed: {}", job, message),
            }
        }
    })
}
