//! Concurrent registry of live upload sessions.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::models::session::{SessionState, UploadSession};
use crate::services::expiring_map::ExpiringMap;
use crate::services::object_store::ObjectStore;

/// Idle sessions are reclaimed after this long without activity.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// Completed and cancelled sessions linger briefly for idempotent replay.
pub const FINISHED_LINGER: Duration = Duration::from_secs(60 * 60);

const JANITOR_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Owns every [`UploadSession`]; the coordinator borrows them by id for
/// the duration of a single request.
#[derive(Clone)]
pub struct SessionTable {
    sessions: Arc<ExpiringMap<Arc<UploadSession>>>,
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTable {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(ExpiringMap::new()),
        }
    }

    /// Register a freshly constructed session. Returns false if the id is
    /// already taken.
    #[must_use]
    pub fn create(&self, session: Arc<UploadSession>) -> bool {
        self.sessions
            .insert(session.session_id.clone(), session)
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<UploadSession>> {
        self.sessions.get(session_id)
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<UploadSession>> {
        self.sessions.remove(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Start the background sweep.
    ///
    /// Sessions idle past their deadline are dropped; any that never
    /// completed get a best-effort `abort_multipart` so the store does not
    /// accumulate orphaned parts. Abort failures are logged, never
    /// propagated.
    pub fn spawn_janitor(&self, store: Arc<dyn ObjectStore>) -> JoinHandle<()> {
        self.sessions.spawn_janitor(
            JANITOR_INTERVAL,
            |session: &Arc<UploadSession>, now| {
                let limit = if session.state().is_terminal() {
                    FINISHED_LINGER
                } else {
                    SESSION_TIMEOUT
                };
                now.signed_duration_since(session.updated_at())
                    .to_std()
                    .map(|idle| idle > limit)
                    .unwrap_or(false)
            },
            move |session_id, session: Arc<UploadSession>| {
                let store = Arc::clone(&store);
                async move {
                    info!(
                        session_id = %session_id,
                        state = session.state().as_str(),
                        "expiring idle upload session"
                    );
                    if session.state() != SessionState::Completed {
                        if let Err(err) = store
                            .abort_multipart(&session.object_key, &session.multipart_upload_id)
                            .await
                        {
                            warn!(
                                session_id = %session_id,
                                key = %session.object_key,
                                error = %err,
                                "failed to abort multipart upload for expired session"
                            );
                        }
                    }
                }
            },
        )
    }
}
