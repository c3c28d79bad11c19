//! Server configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Ephemeral storage layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding both the inbound and outbound trees
    pub root: PathBuf,

    /// Directory name (under root) for uploaded files
    pub inbound_dir: String,

    /// Directory name (under root) for converted files and archives
    pub outbound_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("tmp"),
            inbound_dir: "uploads".to_string(),
            outbound_dir: "output".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn inbound_root(&self) -> PathBuf {
        self.root.join(&self.inbound_dir)
    }

    pub fn outbound_root(&self) -> PathBuf {
        self.root.join(&self.outbound_dir)
    }
}

/// Request and worker limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of files per conversion request
    pub max_files: usize,

    /// Maximum size of a single uploaded file in megabytes
    pub max_file_size_mb: usize,

    /// Maximum number of codec processes running at once
    pub max_concurrent_jobs: usize,

    /// Per-job timeout in seconds (0 disables the timeout)
    pub job_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_files: 50,
            max_file_size_mb: 100,
            max_concurrent_jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            job_timeout_secs: 600,
        }
    }
}

impl LimitsConfig {
    /// Maximum file size in bytes
    pub fn max_file_size_bytes(&self) -> usize {
        self.max_file_size_mb * 1024 * 1024
    }

    /// Upper bound for a whole multipart request body
    pub fn max_request_bytes(&self) -> usize {
        // 1MB of slack for form fields and multipart framing
        self.max_files
            .saturating_mul(self.max_file_size_bytes())
            .saturating_add(1024 * 1024)
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }
}

/// Codec engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeConfig {
    /// Path to the ffmpeg binary
    pub ffmpeg_path: String,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}

/// Retention sweep settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Seconds between sweeps
    pub sweep_interval_secs: u64,

    /// Entries older than this many seconds are removed
    pub max_age_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60 * 60,
            max_age_secs: 24 * 60 * 60,
        }
    }
}

impl RetentionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

/// Grace periods before session directories are removed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Delay before removing a session's uploads after conversion
    pub input_grace_secs: u64,

    /// Delay before removing a session's outputs after the archive was served
    pub output_grace_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            input_grace_secs: 5,
            output_grace_secs: 60,
        }
    }
}

impl CleanupConfig {
    pub fn input_grace(&self) -> Duration {
        Duration::from_secs(self.input_grace_secs)
    }

    pub fn output_grace(&self) -> Duration {
        Duration::from_secs(self.output_grace_secs)
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Shared secret required by the convert and download endpoints
    pub access_code: String,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Limits configuration
    pub limits: LimitsConfig,

    /// Codec engine configuration
    pub transcode: TranscodeConfig,

    /// Retention configuration
    pub retention: RetentionConfig,

    /// Deferred cleanup configuration
    pub cleanup: CleanupConfig,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log output format (pretty, json)
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            access_code: "change-me".to_string(),
            storage: StorageConfig::default(),
            limits: LimitsConfig::default(),
            transcode: TranscodeConfig::default(),
            retention: RetentionConfig::default(),
            cleanup: CleanupConfig::default(),
            cors_enabled: true,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Apply `PORT`, `ACCESS_CODE` and `FFMPEG_PATH` from the environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("PORT") {
            match port.parse() {
                Ok(port) => self.port = port,
                Err(_) => tracing::warn!("Ignoring invalid PORT value: {}", port),
            }
        }
        if let Some(code) = lookup("ACCESS_CODE").filter(|c| !c.is_empty()) {
            self.access_code = code;
        }
        if let Some(path) = lookup("FFMPEG_PATH").filter(|p| !p.is_empty()) {
            self.transcode.ffmpeg_path = path;
        }
    }
}
