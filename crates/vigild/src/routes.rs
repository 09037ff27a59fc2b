use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::SharedState;

/// Multipart uploads carry full camera frames; 16 MiB leaves generous room.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/upload_frame", post(handlers::upload_frame))
        .route("/get_frame", get(handlers::get_frame))
        .route("/notification", post(handlers::notification))
        .route("/get_detection", get(handlers::get_detection))
        .route("/register_face", post(handlers::register_face))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
