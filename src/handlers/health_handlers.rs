//! Health handler.
//!
//! - GET /health -> simple liveness probe

use axum::{Json, response::IntoResponse};
use chrono::Utc;
use serde::Serialize;

/// `GET /health`
///
/// Cheap liveness probe — always returns 200 OK and never performs I/O.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        time: Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    time: String,
}
