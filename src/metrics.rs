//! Prometheus-compatible metrics

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub batches: u64,
    pub files_converted: u64,
    pub files_failed: u64,
    pub archives_built: u64,
    pub archives_served: u64,
    pub bytes_served: u64,
    pub sweeps: u64,
    pub entries_swept: u64,
    pub active_batches: u64,
}

/// Metrics collector
#[derive(Debug)]
pub struct Metrics {
    /// Server start time
    start_time: Instant,
    /// Conversion requests processed
    batches: RwLock<u64>,
    /// Batches currently converting
    active_batches: RwLock<u64>,
    files_converted: RwLock<u64>,
    files_failed: RwLock<u64>,
    archives_built: RwLock<u64>,
    archives_served: RwLock<u64>,
    bytes_served: RwLock<u64>,
    /// Retention sweeps run
    sweeps: RwLock<u64>,
    entries_swept: RwLock<u64>,
    /// Errors by type
    errors_by_type: RwLock<HashMap<String, u64>>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            batches: RwLock::new(0),
            active_batches: RwLock::new(0),
            files_converted: RwLock::new(0),
            files_failed: RwLock::new(0),
            archives_built: RwLock::new(0),
            archives_served: RwLock::new(0),
            bytes_served: RwLock::new(0),
            sweeps: RwLock::new(0),
            entries_swept: RwLock::new(0),
            errors_by_type: RwLock::new(HashMap::new()),
        }
    }

    /// Mark a batch as started
    pub fn batch_started(&self) {
        *self.batches.write() += 1;
        *self.active_batches.write() += 1;
    }

    /// Record the outcome counts of a finished batch
    pub fn batch_finished(&self, converted: u64, failed: u64) {
        {
            let mut active = self.active_batches.write();
            *active = active.saturating_sub(1);
        }
        *self.files_converted.write() += converted;
        *self.files_failed.write() += failed;
    }

    pub fn record_archive_built(&self) {
        *self.archives_built.write() += 1;
    }

    /// Record a delivered archive
    pub fn record_archive_served(&self, bytes: u64) {
        *self.archives_served.write() += 1;
        *self.bytes_served.write() += bytes;
    }

    /// Record a retention sweep and how many entries it removed
    pub fn record_sweep(&self, removed: u64) {
        *self.sweeps.write() += 1;
        *self.entries_swept.write() += removed;
    }

    /// Record error
    pub fn record_error(&self, error_type: &str) {
        *self
            .errors_by_type
            .write()
            .entry(error_type.to_string())
            .or_insert(0) += 1;
    }

    #[cfg(test)]
    pub fn error_count(&self, error_type: &str) -> u64 {
        self.errors_by_type
            .read()
            .get(error_type)
            .copied()
            .unwrap_or(0)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            batches: *self.batches.read(),
            files_converted: *self.files_converted.read(),
            files_failed: *self.files_failed.read(),
            archives_built: *self.archives_built.read(),
            archives_served: *self.archives_served.read(),
            bytes_served: *self.bytes_served.read(),
            sweeps: *self.sweeps.read(),
            entries_swept: *self.entries_swept.read(),
            active_batches: *self.active_batches.read(),
        }
    }

    /// Export metrics in Prometheus format
    pub fn export_prometheus(&self) -> String {
        let snap = self.snapshot();
        let mut output = String::new();

        let mut metric = |name: &str, kind: &str, help: &str, value: u64| {
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str(&format!("# HELP {} {}\n", name, help));
            output.push_str(&format!("# TYPE {} {}\n", name, kind));
            output.push_str(&format!("{} {}\n", name, value));
        };

        metric(
            "transcoder_uptime_seconds",
            "counter",
            "Server uptime in seconds",
            snap.uptime_secs,
        );
        metric(
            "transcoder_start_time_seconds",
            "gauge",
            "Server start time as Unix timestamp",
            std::time::SystemTime::UNIX_EPOCH
                .elapsed()
                .unwrap_or(Duration::ZERO)
                .as_secs()
                .saturating_sub(snap.uptime_secs),
        );
        metric(
            "transcoder_batches_total",
            "counter",
            "Conversion requests processed",
            snap.batches,
        );
        metric(
            "transcoder_active_batches",
            "gauge",
            "Conversion requests in progress",
            snap.active_batches,
        );
        metric(
            "transcoder_files_converted_total",
            "counter",
            "Files converted successfully",
            snap.files_converted,
        );
        metric(
            "transcoder_files_failed_total",
            "counter",
            "Files that failed to convert",
            snap.files_failed,
        );
        metric(
            "transcoder_archives_built_total",
            "counter",
            "Archives built",
            snap.archives_built,
        );
        metric(
            "transcoder_archives_served_total",
            "counter",
            "Archives downloaded",
            snap.archives_served,
        );
        metric(
            "transcoder_bytes_served_total",
            "counter",
            "Archive bytes served",
            snap.bytes_served,
        );
        metric(
            "transcoder_sweeps_total",
            "counter",
            "Retention sweeps run",
            snap.sweeps,
        );
        metric(
            "transcoder_entries_swept_total",
            "counter",
            "Storage entries removed by retention sweeps",
            snap.entries_swept,
        );

        // Error metrics
        output.push_str("\n# HELP transcoder_errors_total Total errors by type\n");
        output.push_str("# TYPE transcoder_errors_total counter\n");
        let errors = self.errors_by_type.read();
        let mut types: Vec<_> = errors.iter().collect();
        types.sort();
        for (error_type, count) in types {
            output.push_str(&format!(
                "transcoder_errors_total{{type=\"{}\"}} {}\n",
                error_type, count
            ));
        }

        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
