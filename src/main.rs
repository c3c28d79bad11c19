//! Batch Audio Transcoder
//!
//! An HTTP service that accepts batches of audio uploads, converts each file
//! to MP3 with an external codec engine, and packages the results into one
//! downloadable archive per session. Uploads and outputs are ephemeral and
//! are removed by deferred cleanup and a periodic retention sweep.

mod archive;
mod batch;
mod cleanup;
mod config;
mod config_file;
mod coordinator;
mod error;
mod http;
mod intake;
#[cfg(test)]
mod integration;
mod metrics;
mod retention;
mod state;
mod storage;
mod transcode;
mod validation;

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::error::{ConverterError, Result};
use crate::http::create_router;
use crate::retention::RetentionSweeper;
use crate::state::AppState;
use crate::transcode::{spawn_progress_logger, FfmpegEngine};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "batch-transcoder";

/// Capacity of the job event channel
const EVENT_BUFFER: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let (mut config, load_error) = match config_file::try_load(&config_path) {
        Ok(config) => (config, None),
        Err(e) => (ServerConfig::default(), Some(e)),
    };
    config.apply_env_overrides();

    // Initialize logging
    init_logging(&config);

    tracing::info!("{} v{} starting", APP_NAME, VERSION);
    if let Some(e) = load_error {
        tracing::warn!("{}. Using defaults.", e);
    }
    if config.access_code == ServerConfig::default().access_code {
        tracing::warn!("Using the default access code; set ACCESS_CODE for production");
    }
    tracing::info!("Configuration loaded: {:?}", redacted(&config));

    // Create application state
    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    spawn_progress_logger(events_rx);
    let engine = Arc::new(FfmpegEngine::new(&config.transcode.ffmpeg_path));
    let state = Arc::new(AppState::new(config.clone(), engine, Some(events_tx)));
    state.storage().init().await?;

    let sweeper = RetentionSweeper::from_config(Arc::clone(state.storage()), &config.retention)
        .with_metrics(Arc::clone(&state.metrics))
        .start();

    // Build router
    let app = create_router(state.clone());

    // Start server
    let addr: SocketAddr = config
        .socket_addr()
        .parse()
        .map_err(|e| ConverterError::Config(format!("invalid listen address: {}", e)))?;
    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down");
    sweeper.stop().await;
    state.coordinator.shutdown().await;

    Ok(())
}

/// Initialize logging with tracing
fn init_logging(config: &ServerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("batch_transcoder={},tower_http=debug", config.log_level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Configuration for the startup log line, without the access code
fn redacted(config: &ServerConfig) -> ServerConfig {
    ServerConfig {
        access_code: "<redacted>".to_string(),
        ..config.clone()
    }
}

/// Resolve on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
