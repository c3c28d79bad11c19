//! HTTP request handlers
//!
//! Error mapping plus the service endpoints: health, version, status,
//! access code verification and metrics.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use crate::error::ConverterError;
use crate::state::AppState;
use crate::validation::AudioFormat;

/// HTTP error type
#[derive(Debug)]
pub enum HttpError {
    BadRequest(String),
    Unauthorized,
    NotFound(String),
    InternalError,
}

impl HttpError {
    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            HttpError::BadRequest(_) => "validation",
            HttpError::Unauthorized => "unauthorized",
            HttpError::NotFound(_) => "not_found",
            HttpError::InternalError => "internal",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            HttpError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Invalid request", msg),
            HttpError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Access denied",
                "A valid access code is required".to_string(),
            ),
            HttpError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", msg),
            HttpError::InternalError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                "The request could not be completed".to_string(),
            ),
        };

        (status, Json(ErrorBody { error, message })).into_response()
    }
}

impl From<ConverterError> for HttpError {
    fn from(err: ConverterError) -> Self {
        match err {
            ConverterError::Validation(msg) => HttpError::BadRequest(msg),
            ConverterError::Unauthorized => HttpError::Unauthorized,
            ConverterError::NotFound(_) => {
                HttpError::NotFound("Archive not found or expired".to_string())
            }
            // Details stay in the log; they may contain paths
            other => {
                error!("Request failed: {}", other);
                HttpError::InternalError
            }
        }
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

/// Version endpoint
pub async fn version_check() -> &'static str {
    concat!("batch-transcoder v", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub timestamp: String,
    pub max_files: usize,
    pub max_file_size: String,
    pub supported_formats: Vec<String>,
}

/// Capability listing
/// GET /api/status
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let limits = &state.config.limits;
    Json(StatusResponse {
        status: "online",
        message: "Batch audio converter is running",
        timestamp: chrono::Utc::now().to_rfc3339(),
        max_files: limits.max_files,
        max_file_size: format!("{}MB", limits.max_file_size_mb),
        supported_formats: AudioFormat::ALL.iter().map(AudioFormat::label).collect(),
    })
}

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyCodeResponse {
    pub valid: bool,
    pub message: &'static str,
}

/// Check an access code without doing anything else
/// POST /api/verify-code
pub async fn verify_code(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyCodeRequest>,
) -> (StatusCode, Json<VerifyCodeResponse>) {
    if state.gate.verify(&request.code) {
        (
            StatusCode::OK,
            Json(VerifyCodeResponse {
                valid: true,
                message: "Access granted",
            }),
        )
    } else {
        state.metrics.record_error("unauthorized");
        (
            StatusCode::UNAUTHORIZED,
            Json(VerifyCodeResponse {
                valid: false,
                message: "Invalid access code",
            }),
        )
    }
}

/// Prometheus metrics endpoint
/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.export_prometheus(),
    )
        .into_response()
}
