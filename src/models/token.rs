//! Short-lived streaming capability tokens.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sha2::{Digest, Sha256};
use std::time::Duration;
use uuid::Uuid;

/// An opaque capability authorizing ranged reads of one object on behalf
/// of one owner. Immutable once minted; expiry is enforced on lookup and
/// by the cache janitor.
#[derive(Debug, Clone)]
pub struct StreamToken {
    /// 64 hex characters (256 bits).
    pub token: String,
    pub owner_id: String,
    pub object_key: String,
    pub expires_at: DateTime<Utc>,
}

impl StreamToken {
    /// Mint a fresh token for `(owner_id, object_key)`.
    ///
    /// The token is `SHA-256(owner_id:object_key:uuid_v4)`; the v4 UUID
    /// is drawn from the OS CSPRNG, so tokens are unique per mint and
    /// not predictable from the owner, key, or mint time.
    pub fn issue(owner_id: &str, object_key: &str, ttl: Duration) -> Self {
        let nonce = Uuid::new_v4();
        let mut hasher = Sha256::new();
        hasher.update(owner_id.as_bytes());
        hasher.update(b":");
        hasher.update(object_key.as_bytes());
        hasher.update(b":");
        hasher.update(nonce.as_bytes());
        let token = hex::encode(hasher.finalize());

        let ttl = ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::zero());
        Self {
            token,
            owner_id: owner_id.to_string(),
            object_key: object_key.to_string(),
            expires_at: Utc::now() + ttl,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
