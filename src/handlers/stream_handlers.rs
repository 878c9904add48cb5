//! HTTP handlers for token minting and authorized streaming.
//!
//! Streams object bodies straight through to the client and translates
//! `Range` headers into object-store range reads; storage concerns live
//! in `StreamingService`.

use axum::{
    Json,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::services::streaming_service::{ObjectSlice, RangeRequest};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamingTokenRequest {
    pub email_id: String,
    pub s3_key: String,
}

#[derive(Debug, Serialize)]
pub struct StreamingTokenResponse {
    pub token: String,
    pub expires_in: u64,
    pub s3_key: String,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub token: Option<String>,
}

/// POST `/files/streaming-token`
pub async fn request_streaming_token(
    State(state): State<AppState>,
    Json(req): Json<StreamingTokenRequest>,
) -> Result<Json<StreamingTokenResponse>, AppError> {
    let minted = state.streaming.mint_token(&req.email_id, &req.s3_key)?;
    Ok(Json(StreamingTokenResponse {
        token: minted.token,
        expires_in: minted.expires_in,
        s3_key: minted.object_key,
    }))
}

/// GET `/stream?token=…` with an optional `Range: bytes=a-b` header.
///
/// Responds 206 with `Content-Range` for ranged reads, 200 otherwise;
/// either way the body is streamed, never buffered.
pub async fn stream_file(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::new(StatusCode::UNAUTHORIZED, "Missing streaming token"))?;

    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_range_header);

    let slice = state.streaming.fetch(&token, range).await?;
    Ok(slice_response(slice))
}

fn slice_response(slice: ObjectSlice) -> Response {
    let mut response = Response::new(Body::from_stream(slice.body));
    let basename = slice
        .object_key
        .rsplit('/')
        .next()
        .unwrap_or(slice.object_key.as_str())
        .to_owned();

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&slice.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    // inline disposition so browsers preview instead of downloading
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("inline; filename=\"{}\"", basename))
            .unwrap_or_else(|_| HeaderValue::from_static("inline")),
    );

    match slice.range {
        Some((start, end)) => {
            if let Ok(content_range) =
                HeaderValue::from_str(&format!("bytes {}-{}/{}", start, end, slice.total_size))
            {
                headers.insert(header::CONTENT_RANGE, content_range);
            }
            headers.insert(
                header::CONTENT_LENGTH,
                HeaderValue::from(end - start + 1),
            );
            *response.status_mut() = StatusCode::PARTIAL_CONTENT;
        }
        None => {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(slice.total_size));
        }
    }

    response
}

/// Parse `Range: bytes=a-b`.
///
/// Only the single-range form is understood; anything else (multi-range,
/// suffix ranges, an end before the start) is ignored and the whole
/// object is served.
fn parse_range_header(value: &str) -> Option<RangeRequest> {
    let spec = value.strip_prefix("bytes=")?;
    let (start_raw, end_raw) = spec.split_once('-')?;
    let start: u64 = start_raw.trim().parse().ok()?;
    let end_raw = end_raw.trim();
    let end = if end_raw.is_empty() {
        None
    } else {
        Some(end_raw.parse::<u64>().ok()?)
    };
    if matches!(end, Some(end) if end < start) {
        return None;
    }
    Some(RangeRequest { start, end })
}
