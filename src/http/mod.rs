//! HTTP server module
//!
//! This module handles HTTP request routing and handling:
//! - Axum router with the service and API endpoints
//! - Access code gate for the convert and download endpoints
//! - Multipart intake for conversion requests
//! - Archive downloads
//! - CORS and request tracing middleware

pub mod auth;
pub mod convert;
pub mod download;
pub mod handlers;
pub mod routes;

pub use routes::create_router;
