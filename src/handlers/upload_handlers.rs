//! HTTP handlers for the upload verbs.
//!
//! Decodes JSON and `multipart/form-data` request shapes and delegates
//! all coordination to `UploadCoordinator`.

use axum::{
    Json,
    extract::{Multipart, Query, State},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::services::object_store::ObjectSummary;
use crate::services::upload_service::{CancelOutcome, ChunkOutcome, CompletedUpload, FinalizeOutcome};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InitUploadRequest {
    pub email_id: String,
    pub filename: String,
    pub file_size: u64,
    pub total_chunks: u32,
    pub chunk_size: u64,
}

#[derive(Debug, Serialize)]
pub struct InitUploadResponse {
    pub session_id: String,
    pub s3_key: String,
    pub upload_id: String,
}

#[derive(Debug, Serialize)]
pub struct ChunkAckResponse {
    pub success: bool,
    pub duplicate: bool,
    pub chunk_index: u32,
    pub received: u32,
    pub total: u32,
    /// Percentage in [0, 100].
    pub progress: f64,
}

/// Completion echo, shared by the final chunk response and
/// `/upload/complete` replays.
#[derive(Debug, Serialize)]
pub struct CompletionResponse {
    pub success: bool,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
}

impl CompletionResponse {
    fn completed(done: CompletedUpload) -> Self {
        Self {
            success: true,
            completed: true,
            s3_key: Some(done.object_key),
            file_size: Some(done.total_size),
            status: None,
        }
    }

    fn finalizing() -> Self {
        Self {
            success: true,
            completed: true,
            s3_key: None,
            file_size: None,
            status: Some("finalizing"),
        }
    }

    fn from_outcome(outcome: FinalizeOutcome) -> Self {
        match outcome {
            FinalizeOutcome::Completed(done) => Self::completed(done),
            FinalizeOutcome::Finalizing => Self::finalizing(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub email_id: String,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ListFilesQuery {
    pub email_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub files: Vec<ObjectSummary>,
    pub count: usize,
}

/// POST `/upload/init`
pub async fn init_upload(
    State(state): State<AppState>,
    Json(req): Json<InitUploadRequest>,
) -> Result<Json<InitUploadResponse>, AppError> {
    let initiated = state
        .uploads
        .init_upload(
            &req.email_id,
            &req.filename,
            req.file_size,
            req.total_chunks,
            req.chunk_size,
        )
        .await?;

    Ok(Json(InitUploadResponse {
        session_id: initiated.session_id,
        s3_key: initiated.object_key,
        upload_id: initiated.upload_id,
    }))
}

/// POST `/upload/chunk` — `multipart/form-data` with fields `email_id`,
/// `session_id`, `chunk_index` and the `chunk` payload.
pub async fn upload_chunk(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut email_id: Option<String> = None;
    let mut session_id: Option<String> = None;
    let mut chunk_index_raw: Option<String> = None;
    let mut chunk: Option<Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid multipart body: {err}")))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("email_id") => email_id = Some(read_text_field(field, "email_id").await?),
            Some("session_id") => session_id = Some(read_text_field(field, "session_id").await?),
            Some("chunk_index") => {
                chunk_index_raw = Some(read_text_field(field, "chunk_index").await?)
            }
            Some("chunk") => {
                chunk = Some(field.bytes().await.map_err(|err| {
                    AppError::bad_request(format!("failed to read chunk data: {err}"))
                })?)
            }
            _ => {}
        }
    }

    let email_id = require_field(email_id, "email_id")?;
    let session_id = require_field(session_id, "session_id")?;
    let chunk_index_raw = require_field(chunk_index_raw, "chunk_index")?;
    let chunk = chunk.ok_or_else(|| AppError::bad_request("chunk is required"))?;

    let chunk_index: u32 = chunk_index_raw
        .trim()
        .parse()
        .map_err(|_| AppError::bad_request("chunk_index must be an unsigned integer"))?;

    let outcome = state
        .uploads
        .upload_chunk(&email_id, &session_id, chunk_index, chunk)
        .await?;

    Ok(match outcome {
        ChunkOutcome::Progress {
            duplicate,
            chunk_index,
            received,
            total,
        } => Json(ChunkAckResponse {
            success: true,
            duplicate,
            chunk_index,
            received,
            total,
            progress: percent(received, total),
        })
        .into_response(),
        ChunkOutcome::Finalized(outcome) => {
            Json(CompletionResponse::from_outcome(outcome)).into_response()
        }
    })
}

/// POST `/upload/complete`
pub async fn complete_upload(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> Result<Json<CompletionResponse>, AppError> {
    let outcome = state
        .uploads
        .complete_upload(&req.email_id, &req.session_id)
        .await?;
    Ok(Json(CompletionResponse::from_outcome(outcome)))
}

/// POST `/upload/cancel`
pub async fn cancel_upload(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> Result<Json<CancelResponse>, AppError> {
    let outcome = state
        .uploads
        .cancel_upload(&req.email_id, &req.session_id)
        .await?;
    Ok(Json(CancelResponse {
        status: match outcome {
            CancelOutcome::Cancelled => "cancelled",
            CancelOutcome::NotFound => "session_not_found_or_already_deleted",
        },
    }))
}

/// GET `/files?email_id=…`
pub async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<ListFilesQuery>,
) -> Result<Json<FileListResponse>, AppError> {
    let email_id = query
        .email_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::bad_request("email_id is required"))?;

    let files = state.uploads.list_files(&email_id).await?;
    let count = files.len();
    Ok(Json(FileListResponse { files, count }))
}

async fn read_text_field(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|err| AppError::bad_request(format!("failed to read field {name}: {err}")))
}

fn require_field(value: Option<String>, name: &str) -> Result<String, AppError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::bad_request(format!("{name} is required")))
}

fn percent(received: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    f64::from(received) / f64::from(total) * 100.0
}
