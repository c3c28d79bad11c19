//! Configuration file support
//!
//! Loads server configuration from TOML files. Every section is optional;
//! anything left out keeps its default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::{
    CleanupConfig, LimitsConfig, RetentionConfig, ServerConfig, StorageConfig, TranscodeConfig,
};
use crate::error::ConverterError;

/// Configuration file format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Server settings
    pub server: Option<ServerSettings>,
    /// Storage settings
    pub storage: Option<StorageSettings>,
    /// Limits settings
    pub limits: Option<LimitsSettings>,
    /// Codec engine settings
    pub transcode: Option<TranscodeSettings>,
    /// Retention settings
    pub retention: Option<RetentionSettings>,
    /// Deferred cleanup settings
    pub cleanup: Option<CleanupSettings>,
    /// Logging settings
    pub logging: Option<LoggingSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Shared access code
    pub access_code: Option<String>,
    /// Enable CORS
    pub cors_enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Root directory for ephemeral files
    pub root: PathBuf,
    pub inbound_dir: Option<String>,
    pub outbound_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsSettings {
    pub max_files: Option<usize>,
    pub max_file_size_mb: Option<usize>,
    pub max_concurrent_jobs: Option<usize>,
    pub job_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeSettings {
    /// Path to the ffmpeg binary
    pub ffmpeg_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionSettings {
    pub sweep_interval_secs: Option<u64>,
    pub max_age_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupSettings {
    pub input_grace_secs: Option<u64>,
    pub output_grace_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: Option<String>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ConfigFile = toml::from_str(&content)?;
        Ok(config)
    }

    /// Convert to ServerConfig
    pub fn into_server_config(self) -> ServerConfig {
        let defaults = ServerConfig::default();

        let (host, port, access_code, cors_enabled) = match self.server {
            Some(s) => (
                s.host,
                s.port,
                s.access_code.unwrap_or(defaults.access_code),
                s.cors_enabled.unwrap_or(defaults.cors_enabled),
            ),
            None => (
                defaults.host,
                defaults.port,
                defaults.access_code,
                defaults.cors_enabled,
            ),
        };

        let storage = match self.storage {
            Some(s) => StorageConfig {
                root: s.root,
                inbound_dir: s.inbound_dir.unwrap_or(defaults.storage.inbound_dir),
                outbound_dir: s.outbound_dir.unwrap_or(defaults.storage.outbound_dir),
            },
            None => defaults.storage,
        };

        let limits = match self.limits {
            Some(l) => LimitsConfig {
                max_files: l.max_files.unwrap_or(defaults.limits.max_files),
                max_file_size_mb: l.max_file_size_mb.unwrap_or(defaults.limits.max_file_size_mb),
                max_concurrent_jobs: l
                    .max_concurrent_jobs
                    .unwrap_or(defaults.limits.max_concurrent_jobs),
                job_timeout_secs: l.job_timeout_secs.unwrap_or(defaults.limits.job_timeout_secs),
            },
            None => defaults.limits,
        };

        let retention = match self.retention {
            Some(r) => RetentionConfig {
                sweep_interval_secs: r
                    .sweep_interval_secs
                    .unwrap_or(defaults.retention.sweep_interval_secs),
                max_age_secs: r.max_age_secs.unwrap_or(defaults.retention.max_age_secs),
            },
            None => defaults.retention,
        };

        let cleanup = match self.cleanup {
            Some(c) => CleanupConfig {
                input_grace_secs: c.input_grace_secs.unwrap_or(defaults.cleanup.input_grace_secs),
                output_grace_secs: c
                    .output_grace_secs
                    .unwrap_or(defaults.cleanup.output_grace_secs),
            },
            None => defaults.cleanup,
        };

        let (log_level, log_format) = match self.logging {
            Some(l) => (l.level, l.format.unwrap_or(defaults.log_format)),
            None => (defaults.log_level, defaults.log_format),
        };

        ServerConfig {
            host,
            port,
            access_code,
            storage,
            limits,
            transcode: self
                .transcode
                .map(|t| TranscodeConfig {
                    ffmpeg_path: t.ffmpeg_path,
                })
                .unwrap_or(defaults.transcode),
            retention,
            cleanup,
            cors_enabled,
            log_level,
            log_format,
        }
    }
}

/// Load configuration from `path`. A missing file yields the defaults.
pub fn try_load<P: AsRef<Path>>(path: P) -> Result<ServerConfig, ConverterError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(ServerConfig::default());
    }
    ConfigFile::from_file(path)
        .map(ConfigFile::into_server_config)
        .map_err(|e| ConverterError::Config(format!("{}: {}", path.display(), e)))
}
