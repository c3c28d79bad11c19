//! Archive download endpoint

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use super::handlers::HttpError;
use crate::archive::archive_name;
use crate::state::AppState;
use crate::storage::SessionId;

/// Stream a session's archive
/// GET /api/download/{session_id}
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Response, HttpError> {
    // An id that could never have been issued has no archive either
    let session = SessionId::parse(&session_id)
        .map_err(|_| HttpError::NotFound("Archive not found or expired".to_string()))?;

    let archive = match state.coordinator.open_archive(&session).await {
        Ok(archive) => archive,
        Err(e) => {
            state.metrics.record_error(e.kind());
            return Err(e.into());
        }
    };

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(archive.len));
    let disposition = format!("attachment; filename=\"{}\"", archive_name(&session));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition).map_err(|_| HttpError::InternalError)?,
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    let body = Body::from_stream(ReaderStream::new(archive.file));
    Ok((headers, body).into_response())
}
