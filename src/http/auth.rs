//! Access code gate
//!
//! The protected endpoints take the shared access code from the
//! `x-access-code` header or the `code` query parameter. The convert
//! endpoint also accepts it as an `accessCode` form field.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, Request, Uri},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use super::handlers::HttpError;
use crate::state::AppState;

/// Header carrying the access code
pub const ACCESS_CODE_HEADER: &str = "x-access-code";

/// Multipart field carrying the access code
pub const ACCESS_CODE_FIELD: &str = "accessCode";

/// Compares caller-supplied codes against the configured secret
#[derive(Clone)]
pub struct AccessGate {
    code: Vec<u8>,
}

impl std::fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGate").finish_non_exhaustive()
    }
}

impl AccessGate {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.as_bytes().to_vec(),
        }
    }

    /// True if `candidate` matches the access code.
    /// Runs in time independent of where the first mismatch is.
    pub fn verify(&self, candidate: &str) -> bool {
        constant_time_eq(&self.code, candidate.as_bytes())
    }

    /// Check an optional credential, mapping absence or mismatch to 401
    pub fn check(&self, candidate: Option<&str>) -> Result<(), HttpError> {
        match candidate {
            Some(code) if self.verify(code) => Ok(()),
            _ => Err(HttpError::Unauthorized),
        }
    }
}

fn constant_time_eq(expected: &[u8], candidate: &[u8]) -> bool {
    let mut diff = expected.len() ^ candidate.len();
    for i in 0..expected.len().max(candidate.len()) {
        let a = expected.get(i).copied().unwrap_or(0);
        let b = candidate.get(i).copied().unwrap_or(0);
        diff |= usize::from(a ^ b);
    }
    diff == 0
}

#[derive(Debug, Deserialize)]
struct CodeQuery {
    code: Option<String>,
}

/// Trimmed credential, or `None` when blank. Applied to every channel the
/// code can arrive on.
pub fn normalize_credential(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Access code from the header, else from the `code` query parameter
pub fn credential_from_request(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let header_value = headers
        .get(ACCESS_CODE_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(normalize_credential);
    if header_value.is_some() {
        return header_value;
    }

    Query::<CodeQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(q)| q.code)
        .and_then(|code| normalize_credential(&code))
}

/// Middleware rejecting requests without a valid access code
pub async fn require_access_code(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, HttpError> {
    let credential = credential_from_request(req.headers(), req.uri());
    if let Err(e) = state.gate.check(credential.as_deref()) {
        warn!("Rejected {} {}: invalid access code", req.method(), req.uri().path());
        state.metrics.record_error("unauthorized");
        return Err(e);
    }
    Ok(next.run(req).await)
}
