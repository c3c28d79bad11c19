//! Axum router configuration

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

use super::auth::{require_access_code, ACCESS_CODE_HEADER};
use super::convert::convert;
use super::download::download;
use super::handlers::{health_check, metrics_handler, status, verify_code, version_check};

/// Create the Axum router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.limits.max_request_bytes();
    let cors_enabled = state.config.cors_enabled;

    let router = Router::new()
        // Health and version endpoints
        .route("/health", get(health_check))
        .route("/version", get(version_check))
        .route("/metrics", get(metrics_handler))
        // API
        .route("/api/status", get(status))
        .route("/api/verify-code", post(verify_code))
        .route(
            "/api/convert",
            post(convert).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route(
            "/api/download/{session_id}",
            get(download).route_layer(middleware::from_fn_with_state(
                state.clone(),
                require_access_code,
            )),
        )
        .layer(TraceLayer::new_for_http());

    let router = if cors_enabled {
        router.layer(cors_layer())
    } else {
        router
    };

    router.with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::ACCEPT,
            header::CONTENT_TYPE,
            header::ORIGIN,
            HeaderName::from_static(ACCESS_CODE_HEADER),
        ])
        .expose_headers([header::CONTENT_DISPOSITION])
        .max_age(Duration::from_secs(3600))
}
