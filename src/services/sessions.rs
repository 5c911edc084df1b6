use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::models::Session;

pub type SharedSession = Arc<tokio::sync::Mutex<Session>>;

/// Live conversations keyed by session id. Turns on one session are
/// serialized by its own lock; the map lock is never held across an await.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, SharedSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Session) -> SharedSession {
        let id = session.id;
        let shared = Arc::new(tokio::sync::Mutex::new(session));
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(id, Arc::clone(&shared));
        }
        shared
    }

    /// Returns the session unless it has expired, in which case it is dropped.
    pub async fn get(&self, id: Uuid, now: NaiveDateTime) -> Option<SharedSession> {
        let shared = {
            let sessions = self.sessions.lock().ok()?;
            sessions.get(&id).cloned()?
        };
        if shared.lock().await.is_expired(now) {
            tracing::info!(session_id = %id, "session expired");
            self.remove(id);
            return None;
        }
        Some(shared)
    }

    pub fn remove(&self, id: Uuid) -> Option<SharedSession> {
        self.sessions.lock().ok()?.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops idle sessions. Sessions mid-turn are skipped and looked at again
    /// on the next sweep.
    pub fn purge_expired(&self, now: NaiveDateTime) -> usize {
        let Ok(mut sessions) = self.sessions.lock() else {
            return 0;
        };
        let before = sessions.len();
        sessions.retain(|_, shared| match shared.try_lock() {
            Ok(session) => !session.is_expired(now),
            Err(_) => true,
        });
        let purged = before - sessions.len();
        if purged > 0 {
            tracing::info!(purged, remaining = sessions.len(), "purged idle sessions");
        }
        purged
    }
}
