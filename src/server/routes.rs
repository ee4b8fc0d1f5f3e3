//! Router configuration for the web server.

use axum::extract::DefaultBodyLimit;
use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;
use super::{AppState, MAX_UPLOAD_BYTES};

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/upload", post(handlers::upload))
        .route("/health", get(handlers::health))
        // Results and downloads
        .route("/sessions/:session_id", get(handlers::session_view))
        .route("/sessions/:session_id/combined", get(handlers::download_combined))
        .route(
            "/sessions/:session_id/documents/:doc/text",
            get(handlers::download_text),
        )
        .route(
            "/sessions/:session_id/documents/:doc/markdown",
            get(handlers::download_markdown),
        )
        .route(
            "/sessions/:session_id/documents/:doc/pages/:page_file",
            get(handlers::page_image),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}
