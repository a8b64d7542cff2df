use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::constants::SESSION_IDLE_TIMEOUT;
use crate::session::SessionState;

struct SessionEntry {
    state: Arc<Mutex<SessionState>>,
    last_seen: Instant,
}

/// In-memory sessions keyed by the id carried in the session cookie.
///
/// Each session sits behind its own mutex, so a turn holding it blocks any
/// other action on the same session until it completes. Sessions not touched
/// within the idle timeout are dropped by [`SessionStore::evict_idle`].
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
    idle_timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_idle_timeout(SESSION_IDLE_TIMEOUT)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_timeout,
        }
    }

    /// Returns the live session for `id` and marks it as just used.
    pub async fn get(&self, id: &Uuid) -> Option<Arc<Mutex<SessionState>>> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(id)?;
        entry.last_seen = Instant::now();
        Some(entry.state.clone())
    }

    /// Returns the session for `id`, creating a fresh one when the id is
    /// missing or unknown. The returned id is the one to hand back to the client.
    pub async fn get_or_create(&self, id: Option<Uuid>) -> (Uuid, Arc<Mutex<SessionState>>) {
        if let Some(id) = id {
            if let Some(session) = self.get(&id).await {
                return (id, session);
            }
        }

        let id = Uuid::new_v4();
        let state = Arc::new(Mutex::new(SessionState::new()));
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            id,
            SessionEntry {
                state: state.clone(),
                last_seen: Instant::now(),
            },
        );
        info!(session_id = %id, total = sessions.len(), "Created new session");
        (id, state)
    }

    /// Drops every session idle for longer than the timeout. Returns how many went.
    pub async fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| now.duration_since(entry.last_seen) <= self.idle_timeout);
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, remaining = sessions.len(), "Evicted idle sessions");
        }
        evicted
    }

    /// Runs [`SessionStore::evict_idle`] every `period` until the task is aborted.
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let evicted = store.evict_idle().await;
                debug!(evicted, "Session sweep finished");
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
