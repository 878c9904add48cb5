//! src/services/upload_service.rs
//!
//! UploadCoordinator — orchestrates the five upload verbs (init, chunk,
//! complete, cancel, list) on top of the session table and the object
//! store. Chunks are deduplicated by SHA-256 before any store traffic so
//! client retries never re-upload a part, and finalization is guarded by
//! a compare-and-set on the session state so `complete_multipart` is
//! issued at most once per session.

use bytes::Bytes;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::media;
use crate::models::session::{
    ChunkInfo, ChunkProbe, FinalizeGate, RecordOutcome, SessionState, UploadSession,
};
use crate::services::object_store::{ObjectStore, ObjectSummary, StoreError};
use crate::services::session_table::SessionTable;

/// Smallest chunk the backing store accepts for a non-final part (5 MiB).
pub const MIN_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Largest chunk a client may send (100 MiB).
pub const MAX_CHUNK_SIZE: u64 = 100 * 1024 * 1024;

/// Largest file a session may describe (10 GiB).
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("file size {size} exceeds the maximum of {max} bytes")]
    OversizeFile { size: u64, max: u64 },
    #[error("chunk size {0} is outside the allowed range")]
    InvalidChunkSize(u64),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("unknown upload session: {0}")]
    InvalidSession(String),
    #[error("session is not owned by the caller")]
    OwnerMismatch,
    #[error("chunk index {index} is out of range for {total} chunks")]
    InvalidChunkIndex { index: u32, total: u32 },
    #[error("chunk {index} was re-sent with different content")]
    HashMismatch { index: u32 },
    #[error("upload is incomplete: {received}/{total} chunks received")]
    Incomplete { received: u32, total: u32 },
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type UploadResult<T> = Result<T, UploadError>;

/// Handles returned by a successful `init`.
#[derive(Debug, Clone)]
pub struct InitiatedUpload {
    pub session_id: String,
    pub object_key: String,
    pub upload_id: String,
}

/// The stable completion echo: identical for the request that finishes
/// the upload and for every idempotent replay afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedUpload {
    pub object_key: String,
    pub total_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    Completed(CompletedUpload),
    /// Another request is already driving `complete_multipart`.
    Finalizing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    Progress {
        duplicate: bool,
        chunk_index: u32,
        received: u32,
        total: u32,
    },
    /// This chunk was the last one missing; the upload finalized inline.
    Finalized(FinalizeOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// Unknown session ids acknowledge as success: the client's goal
    /// (no live session) already holds.
    NotFound,
}

pub struct UploadCoordinator {
    store: Arc<dyn ObjectStore>,
    sessions: SessionTable,
}

impl UploadCoordinator {
    pub fn new(store: Arc<dyn ObjectStore>, sessions: SessionTable) -> Self {
        Self { store, sessions }
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Validate the upload description, open a multipart upload, and
    /// register the session.
    pub async fn init_upload(
        &self,
        owner_id: &str,
        filename: &str,
        file_size: u64,
        total_chunks: u32,
        chunk_size: u64,
    ) -> UploadResult<InitiatedUpload> {
        if owner_id.is_empty() {
            return Err(UploadError::InvalidRequest("email_id is required".into()));
        }
        ensure_filename_safe(filename)?;

        let extension = media::extension_of(filename)
            .ok_or_else(|| UploadError::UnsupportedType("(no extension)".into()))?;
        let content_type = media::content_type_for_extension(&extension)
            .ok_or_else(|| UploadError::UnsupportedType(extension.clone()))?;

        if file_size == 0 {
            return Err(UploadError::InvalidRequest("file_size must be positive".into()));
        }
        if file_size > MAX_FILE_SIZE {
            return Err(UploadError::OversizeFile {
                size: file_size,
                max: MAX_FILE_SIZE,
            });
        }
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&chunk_size) {
            return Err(UploadError::InvalidChunkSize(chunk_size));
        }
        if total_chunks == 0 {
            return Err(UploadError::InvalidRequest("total_chunks must be at least 1".into()));
        }
        // The chunk grid must cover the file exactly: the last chunk is the
        // only one allowed to be short.
        let covered = total_chunks as u64 * chunk_size;
        let before_last = (total_chunks as u64 - 1) * chunk_size;
        if covered < file_size || file_size <= before_last {
            return Err(UploadError::InvalidRequest(
                "total_chunks and chunk_size do not match file_size".into(),
            ));
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let object_key = format!("{owner_id}/{timestamp}/{filename}");
        let upload_id = self.store.init_multipart(&object_key, content_type).await?;

        let session_id = Uuid::new_v4().to_string();
        let session = Arc::new(UploadSession::new(
            session_id.clone(),
            owner_id.to_string(),
            filename.to_string(),
            extension,
            content_type.to_string(),
            object_key.clone(),
            total_chunks,
            chunk_size,
            file_size,
            upload_id.clone(),
        ));
        if !self.sessions.create(session) {
            return Err(UploadError::Internal("session id collision".into()));
        }

        info!(
            session_id = %session_id,
            owner_id,
            filename,
            file_size,
            total_chunks,
            "created upload session"
        );
        Ok(InitiatedUpload {
            session_id,
            object_key,
            upload_id,
        })
    }

    /// Accept one chunk.
    ///
    /// The duplicate check runs before any store traffic: a retried chunk
    /// with an unchanged hash is acknowledged without a second
    /// `upload_part`, preserving the original part ETag. When the final
    /// missing chunk lands, finalization happens inline.
    pub async fn upload_chunk(
        &self,
        owner_id: &str,
        session_id: &str,
        chunk_index: u32,
        chunk: Bytes,
    ) -> UploadResult<ChunkOutcome> {
        let session = self.session_for(owner_id, session_id)?;
        if chunk_index >= session.total_chunks {
            return Err(UploadError::InvalidChunkIndex {
                index: chunk_index,
                total: session.total_chunks,
            });
        }

        let sha256_hex = hex::encode(Sha256::digest(&chunk));

        match session.check_chunk(chunk_index, &sha256_hex) {
            ChunkProbe::Duplicate => {
                let (received, total) = session.progress();
                debug!(session_id, chunk_index, "duplicate chunk acknowledged");
                return Ok(ChunkOutcome::Progress {
                    duplicate: true,
                    chunk_index,
                    received,
                    total,
                });
            }
            ChunkProbe::Mismatch => {
                warn!(session_id, chunk_index, "chunk re-sent with different content");
                return Err(UploadError::HashMismatch { index: chunk_index });
            }
            ChunkProbe::Missing => {}
        }

        match session.state() {
            SessionState::Initialized | SessionState::Uploading => {}
            SessionState::Finalizing | SessionState::Completed => {
                return Err(UploadError::InvalidRequest(
                    "upload is already being finalized".into(),
                ));
            }
            SessionState::Cancelled | SessionState::Failed => {
                return Err(UploadError::InvalidSession(session_id.to_string()));
            }
        }

        let part_number = chunk_index as i32 + 1;
        let size = chunk.len() as u64;
        let etag = self
            .store
            .upload_part(
                &session.object_key,
                &session.multipart_upload_id,
                part_number,
                chunk,
            )
            .await?;

        let received = match session.record_chunk(
            chunk_index,
            ChunkInfo {
                size,
                sha256_hex,
                part_number,
                etag,
                uploaded_at: Utc::now(),
            },
        ) {
            RecordOutcome::Recorded { received } => received,
            RecordOutcome::Duplicate { received } => {
                // a concurrent retry won the race; its part receipt stands
                return Ok(ChunkOutcome::Progress {
                    duplicate: true,
                    chunk_index,
                    received,
                    total: session.total_chunks,
                });
            }
            RecordOutcome::Mismatch => {
                return Err(UploadError::HashMismatch { index: chunk_index });
            }
        };

        debug!(
            session_id,
            chunk_index,
            received,
            total = session.total_chunks,
            "chunk recorded"
        );

        if received == session.total_chunks {
            return Ok(ChunkOutcome::Finalized(self.finalize(&session).await?));
        }

        Ok(ChunkOutcome::Progress {
            duplicate: false,
            chunk_index,
            received,
            total: session.total_chunks,
        })
    }

    /// Explicit completion endpoint: requires all chunks, then behaves
    /// exactly like the inline finalize (idempotent on replay).
    pub async fn complete_upload(
        &self,
        owner_id: &str,
        session_id: &str,
    ) -> UploadResult<FinalizeOutcome> {
        let session = self.session_for(owner_id, session_id)?;
        if !session.is_complete() {
            let (received, total) = session.progress();
            return Err(UploadError::Incomplete { received, total });
        }
        self.finalize(&session).await
    }

    /// Cancel a session: best-effort abort of the multipart upload, then
    /// removal. An unknown session id is reported as success.
    pub async fn cancel_upload(
        &self,
        owner_id: &str,
        session_id: &str,
    ) -> UploadResult<CancelOutcome> {
        let Some(session) = self.sessions.get(session_id) else {
            return Ok(CancelOutcome::NotFound);
        };
        if session.owner_id != owner_id {
            return Err(UploadError::OwnerMismatch);
        }

        session.mark_cancelled();
        if let Err(err) = self
            .store
            .abort_multipart(&session.object_key, &session.multipart_upload_id)
            .await
        {
            warn!(session_id, error = %err, "failed to abort multipart upload on cancel");
        }
        self.sessions.remove(session_id);
        info!(session_id, owner_id, "cancelled upload session");
        Ok(CancelOutcome::Cancelled)
    }

    /// Every stored object belonging to the owner.
    pub async fn list_files(&self, owner_id: &str) -> UploadResult<Vec<ObjectSummary>> {
        if owner_id.is_empty() {
            return Err(UploadError::InvalidRequest("email_id is required".into()));
        }
        let summaries = self.store.list_prefix(&format!("{owner_id}/")).await?;
        Ok(summaries)
    }

    fn session_for(&self, owner_id: &str, session_id: &str) -> UploadResult<Arc<UploadSession>> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| UploadError::InvalidSession(session_id.to_string()))?;
        if session.owner_id != owner_id {
            return Err(UploadError::OwnerMismatch);
        }
        Ok(session)
    }

    /// Drive `complete_multipart` exactly once.
    ///
    /// The session-state CAS decides a single winner; losers observe
    /// `Finalizing` or the cached completion echo. On store failure the
    /// state reverts to `Initialized` so the client may retry.
    async fn finalize(&self, session: &Arc<UploadSession>) -> UploadResult<FinalizeOutcome> {
        let parts = match session.begin_finalize() {
            FinalizeGate::AlreadyCompleted => {
                return Ok(FinalizeOutcome::Completed(CompletedUpload {
                    object_key: session.object_key.clone(),
                    total_size: session.total_size,
                }));
            }
            FinalizeGate::InFlight => return Ok(FinalizeOutcome::Finalizing),
            FinalizeGate::Rejected(_) => {
                return Err(UploadError::InvalidSession(session.session_id.clone()));
            }
            FinalizeGate::Proceed(parts) => parts,
        };

        match self
            .store
            .complete_multipart(&session.object_key, &session.multipart_upload_id, parts)
            .await
        {
            Ok(()) => {
                session.mark_completed();
                info!(
                    session_id = %session.session_id,
                    key = %session.object_key,
                    size = session.total_size,
                    "upload completed"
                );
                Ok(FinalizeOutcome::Completed(CompletedUpload {
                    object_key: session.object_key.clone(),
                    total_size: session.total_size,
                }))
            }
            Err(err) => {
                session.abort_finalize();
                warn!(
                    session_id = %session.session_id,
                    error = %err,
                    "complete_multipart failed; session reverted for retry"
                );
                Err(err.into())
            }
        }
    }
}

/// Reject filenames that could smuggle path segments into the object key.
fn ensure_filename_safe(filename: &str) -> UploadResult<()> {
    if filename.is_empty() {
        return Err(UploadError::InvalidRequest("filename is required".into()));
    }
    if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
        return Err(UploadError::InvalidRequest(
            "filename must not contain path separators".into(),
        ));
    }
    if filename.bytes().any(|b| b.is_ascii_control()) {
        return Err(UploadError::InvalidRequest(
            "filename must not contain control characters".into(),
        ));
    }
    Ok(())
}
