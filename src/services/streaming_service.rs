//! src/services/streaming_service.rs
//!
//! StreamingService — mints capability tokens scoped to an owner/object
//! pair and serves authorized reads, translating client byte ranges into
//! object-store range requests.

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::models::media;
use crate::services::object_store::{ObjectByteStream, ObjectStore, StoreError};
use crate::services::token_cache::{StreamTokenCache, TOKEN_TTL};

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("caller does not own the requested object")]
    NotOwner,
    #[error("invalid or expired streaming token")]
    TokenInvalid,
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("requested range starts beyond the end of the object ({size} bytes)")]
    RangeNotSatisfiable { size: u64 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type StreamResult<T> = Result<T, StreamError>;

/// A freshly minted token plus its advertised lifetime.
#[derive(Debug, Clone)]
pub struct MintedToken {
    pub token: String,
    pub expires_in: u64,
    pub object_key: String,
}

/// A byte range requested by the client: `start` is required, `end`
/// (inclusive) is clamped to the object size when absent or past the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRequest {
    pub start: u64,
    pub end: Option<u64>,
}

/// An authorized read, ready to be forwarded to the client.
pub struct ObjectSlice {
    pub object_key: String,
    pub content_type: String,
    pub total_size: u64,
    /// Resolved inclusive range when the request carried one.
    pub range: Option<(u64, u64)>,
    pub body: ObjectByteStream,
}

impl std::fmt::Debug for ObjectSlice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectSlice")
            .field("object_key", &self.object_key)
            .field("content_type", &self.content_type)
            .field("total_size", &self.total_size)
            .field("range", &self.range)
            .field("body", &"<stream>")
            .finish()
    }
}

pub struct StreamingService {
    store: Arc<dyn ObjectStore>,
    tokens: StreamTokenCache,
}

impl StreamingService {
    pub fn new(store: Arc<dyn ObjectStore>, tokens: StreamTokenCache) -> Self {
        Self { store, tokens }
    }

    /// Issue a token for an object the caller owns.
    ///
    /// Ownership is prefix-scoped: the key must live under the caller's
    /// own namespace.
    pub fn mint_token(&self, owner_id: &str, object_key: &str) -> StreamResult<MintedToken> {
        if owner_id.is_empty() {
            return Err(StreamError::InvalidRequest("email_id is required".into()));
        }
        if object_key.is_empty() {
            return Err(StreamError::InvalidRequest("s3_key is required".into()));
        }
        if !object_key.starts_with(&format!("{owner_id}/")) {
            return Err(StreamError::NotOwner);
        }

        let token = self.tokens.mint(owner_id, object_key);
        Ok(MintedToken {
            token: token.token,
            expires_in: TOKEN_TTL.as_secs(),
            object_key: object_key.to_string(),
        })
    }

    /// Resolve a token and open the (optionally ranged) object read.
    pub async fn fetch(
        &self,
        token: &str,
        range: Option<RangeRequest>,
    ) -> StreamResult<ObjectSlice> {
        let grant = self.tokens.validate(token).ok_or(StreamError::TokenInvalid)?;
        // The mint path enforces this already; re-check in case a grant
        // was ever constructed some other way.
        if !grant
            .object_key
            .starts_with(&format!("{}/", grant.owner_id))
        {
            return Err(StreamError::TokenInvalid);
        }

        let head = match self.store.head(&grant.object_key).await {
            Ok(head) => head,
            Err(StoreError::NotFound(key)) => return Err(StreamError::NotFound(key)),
            Err(err) => return Err(err.into()),
        };

        let content_type = resolve_content_type(head.content_type, &grant.object_key);

        match range {
            Some(range) => {
                if range.start >= head.size {
                    return Err(StreamError::RangeNotSatisfiable { size: head.size });
                }
                let end = match range.end {
                    Some(end) if end < head.size => end,
                    _ => head.size - 1,
                };
                debug!(key = %grant.object_key, start = range.start, end, "serving ranged read");
                let body = self
                    .store
                    .get_range(&grant.object_key, range.start, end)
                    .await?;
                Ok(ObjectSlice {
                    object_key: grant.object_key,
                    content_type,
                    total_size: head.size,
                    range: Some((range.start, end)),
                    body,
                })
            }
            None => {
                debug!(key = %grant.object_key, size = head.size, "serving whole-object read");
                let body = self.store.get_whole(&grant.object_key).await?;
                Ok(ObjectSlice {
                    object_key: grant.object_key,
                    content_type,
                    total_size: head.size,
                    range: None,
                    body,
                })
            }
        }
    }
}

/// Prefer the stored content type; a missing or generic one is re-derived
/// from the key's extension before falling back to octet-stream.
fn resolve_content_type(stored: Option<String>, key: &str) -> String {
    match stored {
        Some(ct) if !ct.is_empty() && ct != "application/octet-stream" => ct,
        _ => media::extension_of(key)
            .and_then(|ext| media::content_type_for_extension(&ext))
            .unwrap_or("application/octet-stream")
            .to_string(),
    }
}
