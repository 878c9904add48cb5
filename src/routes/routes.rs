//! Defines routes for the upload and streaming API.
//!
//! ## Structure
//! - **Upload endpoints**
//!   - `POST /upload/init`     — open a resumable upload session
//!   - `POST /upload/chunk`    — send one chunk (`multipart/form-data`)
//!   - `POST /upload/complete` — assemble the final object
//!   - `POST /upload/cancel`   — abort and discard a session
//!
//! - **File endpoints**
//!   - `GET  /files`                 — list the caller's stored objects
//!   - `POST /files/streaming-token` — mint a short-lived streaming token
//!   - `GET  /stream`                — ranged, token-authorized object read
//!
//! - `GET /health` — liveness probe
//!
//! CORS is permissive: the API is consumed by browser clients on
//! arbitrary origins, and authorization rides in request bodies and
//! streaming tokens rather than cookies.

use crate::{
    handlers::{
        health_handlers::health,
        stream_handlers::{request_streaming_token, stream_file},
        upload_handlers::{cancel_upload, complete_upload, init_upload, list_files, upload_chunk},
    },
    services::upload_service::MAX_CHUNK_SIZE,
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::header,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Room for multipart framing and text fields around a maximum-size chunk.
const BODY_LIMIT: usize = MAX_CHUNK_SIZE as usize + 1024 * 1024;

/// Build and return the router for the whole HTTP surface.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            header::CONTENT_LENGTH,
            header::CONTENT_TYPE,
            header::CONTENT_RANGE,
            header::ACCEPT_RANGES,
            header::CONTENT_DISPOSITION,
        ]);

    Router::new()
        .route("/health", get(health))
        // Upload session routes
        .route("/upload/init", post(init_upload))
        .route("/upload/chunk", post(upload_chunk))
        .route("/upload/complete", post(complete_upload))
        .route("/upload/cancel", post(cancel_upload))
        // Stored-file routes
        .route("/files", get(list_files))
        .route("/files/streaming-token", post(request_streaming_token))
        .route("/stream", get(stream_file))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
