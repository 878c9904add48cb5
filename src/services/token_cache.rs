//! Cache of live streaming tokens.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::models::token::StreamToken;
use crate::services::expiring_map::ExpiringMap;

/// How long a minted token authorizes reads.
pub const TOKEN_TTL: Duration = Duration::from_secs(5 * 60);

const JANITOR_INTERVAL: Duration = Duration::from_secs(60);

/// Token-indexed registry; multiple live tokens per `(owner, key)` pair
/// may coexist, and tokens are not consumed by use.
#[derive(Clone)]
pub struct StreamTokenCache {
    tokens: Arc<ExpiringMap<StreamToken>>,
}

impl Default for StreamTokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamTokenCache {
    pub fn new() -> Self {
        Self {
            tokens: Arc::new(ExpiringMap::new()),
        }
    }

    /// Mint a token with the default TTL.
    pub fn mint(&self, owner_id: &str, object_key: &str) -> StreamToken {
        self.mint_with_ttl(owner_id, object_key, TOKEN_TTL)
    }

    /// Mint a token with an explicit TTL.
    pub fn mint_with_ttl(&self, owner_id: &str, object_key: &str, ttl: Duration) -> StreamToken {
        let token = StreamToken::issue(owner_id, object_key, ttl);
        // 256-bit tokens do not collide in practice; a clash would mean a
        // broken entropy source, so refuse to overwrite the earlier grant.
        let stored = self.tokens.insert(token.token.clone(), token.clone());
        debug_assert!(stored, "streaming token collision");
        debug!(owner_id, object_key, "minted streaming token");
        token
    }

    /// Resolve a presented token, enforcing expiry on the spot. Expired
    /// entries that the janitor has not swept yet are still rejected.
    pub fn validate(&self, token: &str) -> Option<StreamToken> {
        let entry = self.tokens.get(token)?;
        if entry.is_expired_at(Utc::now()) {
            return None;
        }
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Start the background sweep; expired tokens need no teardown action.
    pub fn spawn_janitor(&self) -> JoinHandle<()> {
        self.tokens.spawn_janitor(
            JANITOR_INTERVAL,
            |token: &StreamToken, now| token.is_expired_at(now),
            |_, token: StreamToken| async move {
                debug!(owner_id = %token.owner_id, "expired streaming token");
            },
        )
    }
}
