//! Upload session state.
//!
//! An [`UploadSession`] coordinates one object-store multipart upload
//! across many independent chunk requests. The immutable identity of the
//! session (owner, key, sizes, multipart upload id) is fixed at creation;
//! the mutable bookkeeping (`received`, `completed_parts`, `state`,
//! `updated_at`) lives behind a mutex that is only held for short,
//! I/O-free critical sections.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::services::object_store::CompletedPart;

/// Lifecycle of an upload session.
///
/// `Initialized` and `Uploading` accept chunks; `Finalizing` marks an
/// in-flight `complete_multipart` call and reverts to `Initialized` on
/// failure so the client can retry. `Completed` and `Cancelled` are
/// terminal. `Failed` is reserved for sessions explicitly marked
/// unrecoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initialized,
    Uploading,
    Finalizing,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Initialized => "initialized",
            SessionState::Uploading => "uploading",
            SessionState::Finalizing => "finalizing",
            SessionState::Completed => "completed",
            SessionState::Cancelled => "cancelled",
            SessionState::Failed => "failed",
        }
    }

    /// Terminal states linger briefly for idempotent replay, then expire.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Failed
        )
    }
}

/// Bookkeeping for a single received chunk; immutable once inserted.
#[derive(Debug, Clone)]
pub struct ChunkInfo {
    /// Chunk payload size in bytes.
    pub size: u64,

    /// Hex-encoded SHA-256 of the chunk payload, used for duplicate detection.
    pub sha256_hex: String,

    /// Object-store part number (`chunk_index + 1`).
    pub part_number: i32,

    /// ETag returned by the store for this part.
    pub etag: String,

    /// When the chunk was accepted.
    pub uploaded_at: DateTime<Utc>,
}

/// Result of probing a chunk index against the received map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkProbe {
    /// No chunk recorded at this index yet.
    Missing,
    /// Same index, same hash: an idempotent retry.
    Duplicate,
    /// Same index, different hash: the client sent conflicting content.
    Mismatch,
}

/// Result of recording a freshly uploaded chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded { received: u32 },
    /// A concurrent retry recorded the same chunk first.
    Duplicate { received: u32 },
    Mismatch,
}

/// Gate returned by [`UploadSession::begin_finalize`].
#[derive(Debug)]
pub enum FinalizeGate {
    /// The session may proceed; carries the parts list in arrival order.
    Proceed(Vec<CompletedPart>),
    /// Another task holds the finalize slot.
    InFlight,
    /// The session already completed; reply with the cached result.
    AlreadyCompleted,
    /// The session was cancelled or failed underneath the caller.
    Rejected(SessionState),
}

/// In-memory coordination record for one multipart upload.
pub struct UploadSession {
    pub session_id: String,
    pub owner_id: String,
    pub filename: String,
    pub extension: String,
    pub content_type: String,
    pub object_key: String,
    pub total_chunks: u32,
    pub chunk_size: u64,
    pub total_size: u64,
    pub multipart_upload_id: String,
    pub created_at: DateTime<Utc>,
    inner: Mutex<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    received: HashMap<u32, ChunkInfo>,
    completed_parts: Vec<CompletedPart>,
    updated_at: DateTime<Utc>,
}

#[allow(clippy::too_many_arguments)]
impl UploadSession {
    pub fn new(
        session_id: String,
        owner_id: String,
        filename: String,
        extension: String,
        content_type: String,
        object_key: String,
        total_chunks: u32,
        chunk_size: u64,
        total_size: u64,
        multipart_upload_id: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            owner_id,
            filename,
            extension,
            content_type,
            object_key,
            total_chunks,
            chunk_size,
            total_size,
            multipart_upload_id,
            created_at: now,
            inner: Mutex::new(SessionInner {
                state: SessionState::Initialized,
                received: HashMap::new(),
                completed_parts: Vec::new(),
                updated_at: now,
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().unwrap().state
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.inner.lock().unwrap().updated_at
    }

    /// Number of chunks received so far and the expected total.
    pub fn progress(&self) -> (u32, u32) {
        let inner = self.inner.lock().unwrap();
        (inner.received.len() as u32, self.total_chunks)
    }

    pub fn is_complete(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.received.len() as u32 == self.total_chunks
    }

    /// Compare an incoming chunk against the received map without
    /// mutating anything. Callers upload to the store only on `Missing`.
    pub fn check_chunk(&self, index: u32, sha256_hex: &str) -> ChunkProbe {
        let inner = self.inner.lock().unwrap();
        match inner.received.get(&index) {
            None => ChunkProbe::Missing,
            Some(existing) if existing.sha256_hex == sha256_hex => ChunkProbe::Duplicate,
            Some(_) => ChunkProbe::Mismatch,
        }
    }

    /// Record an uploaded chunk and append its part receipt.
    ///
    /// Re-checks the map under the lock: the store upload happens outside
    /// any critical section, so a concurrent retry may have recorded the
    /// same index in the meantime. Part numbers stay unique either way.
    pub fn record_chunk(&self, index: u32, info: ChunkInfo) -> RecordOutcome {
        let mut inner = self.inner.lock().unwrap();
        match inner.received.get(&index) {
            Some(existing) if existing.sha256_hex == info.sha256_hex => {
                return RecordOutcome::Duplicate {
                    received: inner.received.len() as u32,
                };
            }
            Some(_) => return RecordOutcome::Mismatch,
            None => {}
        }

        inner.completed_parts.push(CompletedPart {
            part_number: info.part_number,
            etag: info.etag.clone(),
        });
        inner.received.insert(index, info);
        if inner.state == SessionState::Initialized {
            inner.state = SessionState::Uploading;
        }
        inner.updated_at = Utc::now();
        RecordOutcome::Recorded {
            received: inner.received.len() as u32,
        }
    }

    /// Attempt to take the finalize slot.
    ///
    /// At most one caller observes `Proceed`; everyone else gets a
    /// replay-safe answer. The store call itself must happen after this
    /// returns, outside the session lock.
    pub fn begin_finalize(&self) -> FinalizeGate {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            SessionState::Completed => FinalizeGate::AlreadyCompleted,
            SessionState::Finalizing => FinalizeGate::InFlight,
            SessionState::Initialized | SessionState::Uploading => {
                inner.state = SessionState::Finalizing;
                inner.updated_at = Utc::now();
                FinalizeGate::Proceed(inner.completed_parts.clone())
            }
            state @ (SessionState::Cancelled | SessionState::Failed) => {
                FinalizeGate::Rejected(state)
            }
        }
    }

    /// Mark the multipart upload as successfully assembled.
    pub fn mark_completed(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = SessionState::Completed;
        inner.updated_at = Utc::now();
    }

    /// Revert a failed finalize so the client may retry.
    pub fn abort_finalize(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == SessionState::Finalizing {
            inner.state = SessionState::Initialized;
        }
        inner.updated_at = Utc::now();
    }

    pub fn mark_cancelled(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = SessionState::Cancelled;
        inner.updated_at = Utc::now();
    }
}
