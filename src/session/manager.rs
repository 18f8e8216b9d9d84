//! Session contexts

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::store::StoredItem;

/// A DELETE waiting for the user's yes/no
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteConfirmation {
    /// Exactly the rows that were previewed
    pub ids: Vec<i64>,
    /// The previewed rows, shown to the user
    pub items: Vec<StoredItem>,
    /// Unix millis
    pub created_at: i64,
}

impl DeleteConfirmation {
    pub fn new(items: Vec<StoredItem>) -> Self {
        Self {
            ids: items.iter().map(|i| i.id).collect(),
            items,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Per-session conversational state
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub pending_confirmation: Option<DeleteConfirmation>,
    /// Unix millis
    pub last_activity: i64,
}

impl SessionContext {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            pending_confirmation: None,
            last_activity: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Sessions idle this long are dropped, pending confirmation included
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Session contexts keyed by session id
#[derive(Debug)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, SessionContext>>>,
    idle_ttl: Duration,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::with_idle_ttl(DEFAULT_SESSION_TTL)
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_ttl,
        }
    }

    /// Record activity, creating the context on first use.
    ///
    /// Contexts idle past the TTL are evicted first, so a stale DELETE
    /// confirmation never consumes a later message.
    pub async fn touch(&self, session_id: &str) {
        let now = chrono::Utc::now().timestamp_millis();
        let mut sessions = self.sessions.write().await;
        evict_idle(&mut sessions, now - self.idle_ttl.as_millis() as i64);
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionContext::new(session_id))
            .last_activity = now;
    }

    /// Snapshot of a session
    pub async fn get(&self, session_id: &str) -> Option<SessionContext> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Park a DELETE until the next message of the session
    pub async fn set_pending(&self, session_id: &str, confirmation: DeleteConfirmation) {
        let mut sessions = self.sessions.write().await;
        let context = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionContext::new(session_id));
        if context.pending_confirmation.is_some() {
            tracing::debug!(session_id = session_id, "Replacing pending delete confirmation");
        }
        context.pending_confirmation = Some(confirmation);
        context.last_activity = chrono::Utc::now().timestamp_millis();
    }

    /// Remove and return the pending DELETE, if any
    pub async fn take_pending(&self, session_id: &str) -> Option<DeleteConfirmation> {
        self.sessions
            .write()
            .await
            .get_mut(session_id)
            .and_then(|c| c.pending_confirmation.take())
    }

    pub async fn has_pending(&self, session_id: &str) -> bool {
        self.sessions
            .read()
            .await
            .get(session_id)
            .is_some_and(|c| c.pending_confirmation.is_some())
    }

    /// Drop every context, returning how many there were
    pub async fn clear(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let n = sessions.len();
        sessions.clear();
        n
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

fn evict_idle(sessions: &mut HashMap<String, SessionContext>, cutoff: i64) -> usize {
    let before = sessions.len();
    sessions.retain(|_, c| c.last_activity >= cutoff);
    let evicted = before - sessions.len();
    if evicted > 0 {
        tracing::debug!(evicted, remaining = sessions.len(), "Evicted idle sessions");
    }
    evicted
}
