//! Conversion endpoint
//!
//! POST /api/convert takes a multipart form:
//! - `accessCode` (optional when sent as header or query) and `sessionId`
//!   text fields, both before any file part
//! - one or more file parts (any field name, usually `audioFiles`)
//!
//! File parts are streamed to the session's inbound directory, converted,
//! and the successes are packed into the session archive.

use axum::{
    extract::{Multipart, State},
    http::{HeaderMap, StatusCode, Uri},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::auth::{credential_from_request, normalize_credential, ACCESS_CODE_FIELD};
use super::handlers::HttpError;
use crate::batch::{BatchReport, InputFile};
use crate::intake::Intake;
use crate::state::AppState;
use crate::storage::SessionId;

/// Multipart field carrying the session id
pub const SESSION_ID_FIELD: &str = "sessionId";

#[derive(Debug, Serialize)]
pub struct ConvertedFile {
    pub original: String,
    pub converted: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct FailedFile {
    pub original: String,
    pub error: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    pub session_id: String,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<ConvertedFile>,
    pub errors: Vec<FailedFile>,
    /// Session id to pass to the download endpoint; absent when nothing converted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_locator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl From<BatchReport> for ConvertResponse {
    fn from(report: BatchReport) -> Self {
        let locator = report
            .archive
            .as_ref()
            .map(|archive| archive.session_id.to_string());

        Self {
            session_id: report.session_id.to_string(),
            successful: report.successful(),
            failed: report.failed(),
            results: report
                .successes
                .into_iter()
                .map(|s| ConvertedFile {
                    original: s.original_name,
                    converted: s.converted_name,
                    status: "success",
                })
                .collect(),
            errors: report
                .failures
                .into_iter()
                .map(|f| FailedFile {
                    original: f.original_name,
                    error: f.error,
                    status: "error",
                })
                .collect(),
            download_url: locator.as_ref().map(|id| format!("/api/download/{}", id)),
            download_locator: locator,
        }
    }
}

/// Convert uploaded audio files
/// POST /api/convert
pub async fn convert(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    mut multipart: Multipart,
) -> Result<Json<ConvertResponse>, HttpError> {
    let mut intake = None;
    let received = receive(&state, &headers, &uri, &mut multipart, &mut intake).await;

    let (session, inputs) = match received.and_then(|()| finish(intake.take())) {
        Ok(staged) => staged,
        Err(e) => {
            if let Some(intake) = intake {
                intake.abort().await;
            }
            state.metrics.record_error(e.kind());
            return Err(e);
        }
    };

    info!(
        "Session {}: received {} file(s) for conversion",
        session,
        inputs.len()
    );
    let report = state.coordinator.convert(&session, &inputs).await?;

    Ok(Json(ConvertResponse::from(report)))
}

/// Read the form, staging every file part through `intake`
async fn receive(
    state: &AppState,
    headers: &HeaderMap,
    uri: &Uri,
    multipart: &mut Multipart,
    intake: &mut Option<Intake>,
) -> Result<(), HttpError> {
    let mut credential = credential_from_request(headers, uri);
    let mut requested_session: Option<String> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if field.file_name().is_none() {
            let value = field.text().await.map_err(multipart_error)?;
            match name.as_str() {
                ACCESS_CODE_FIELD | SESSION_ID_FIELD if intake.is_some() => {
                    return Err(HttpError::BadRequest(format!(
                        "the {} field must come before the files",
                        name
                    )));
                }
                ACCESS_CODE_FIELD => {
                    if credential.is_none() {
                        credential = normalize_credential(&value);
                    }
                }
                SESSION_ID_FIELD => requested_session = Some(value),
                _ => warn!("Ignoring unexpected form field {:?}", name),
            }
            continue;
        }

        if intake.is_none() {
            // Nothing touches the disk before the caller is authorized
            state.gate.check(credential.as_deref())?;
            let session = SessionId::parse_or_generate(requested_session.as_deref())?;
            state.coordinator.claim_session(&session);
            *intake = Some(Intake::new(
                Arc::clone(state.storage()),
                state.policy.clone(),
                session,
            ));
        }
        let Some(current) = intake.as_mut() else {
            return Err(HttpError::InternalError);
        };

        let filename = field.file_name().unwrap_or_default().to_string();
        let mime = field.content_type().map(str::to_string);
        let mut upload = current.begin(&filename, mime.as_deref()).await?;
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            current.write_chunk(&mut upload, &chunk).await?;
        }
        current.commit(upload).await?;
    }

    if intake.is_none() {
        state.gate.check(credential.as_deref())?;
    }
    Ok(())
}

fn finish(intake: Option<Intake>) -> Result<(SessionId, Vec<InputFile>), HttpError> {
    match intake {
        Some(intake) => Ok(intake.finish()?),
        None => Err(HttpError::BadRequest("no files were submitted".to_string())),
    }
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> HttpError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        HttpError::BadRequest("upload exceeds the request size limit".to_string())
    } else {
        HttpError::BadRequest(format!("malformed upload: {}", err.body_text()))
    }
}
