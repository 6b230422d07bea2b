use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use nodeflow_core::types::SessionId;

/// One question/answer exchange.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub human: String,
    pub ai: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub history: Vec<ChatTurn>,
    pub last_workflow: Option<String>,
}

impl Session {
    fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            last_active: now,
            history: Vec::new(),
            last_workflow: None,
        }
    }
}

/// In-memory session store.
pub struct SessionManager {
    sessions: Mutex<HashMap<SessionId, Session>>,
    history_limit: usize,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::with_history_limit(10)
    }

    /// `history_limit` caps what [`recent_history`](Self::recent_history) returns.
    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            history_limit,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Session>> {
        // A panic while holding the lock leaves the map itself consistent
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a session, generating an id when none is given. An existing
    /// session with the same id is reset.
    pub fn create(&self, id: Option<SessionId>) -> SessionId {
        let id = id.unwrap_or_default();
        self.lock().insert(id.clone(), Session::new(id.clone()));
        debug!(session_id = %id, "Created session");
        id
    }

    pub fn get_or_create(&self, id: &SessionId) -> SessionId {
        let mut sessions = self.lock();
        let session = sessions
            .entry(id.clone())
            .or_insert_with(|| Session::new(id.clone()));
        session.last_active = Utc::now();
        session.id.clone()
    }

    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.lock().get(id).cloned()
    }

    /// Append an exchange, creating the session on demand.
    pub fn record_exchange(
        &self,
        id: &SessionId,
        human: impl Into<String>,
        ai: impl Into<String>,
        workflow: Option<&str>,
    ) {
        let mut sessions = self.lock();
        let session = sessions
            .entry(id.clone())
            .or_insert_with(|| Session::new(id.clone()));
        let now = Utc::now();
        session.history.push(ChatTurn {
            human: human.into(),
            ai: ai.into(),
            timestamp: now,
        });
        session.last_active = now;
        if let Some(workflow) = workflow {
            session.last_workflow = Some(workflow.to_string());
        }
    }

    /// The last `limit` exchanges, oldest first.
    pub fn history(&self, id: &SessionId, limit: usize) -> Vec<ChatTurn> {
        self.lock()
            .get(id)
            .map(|s| {
                let skip = s.history.len().saturating_sub(limit);
                s.history[skip..].to_vec()
            })
            .unwrap_or_default()
    }

    pub fn recent_history(&self, id: &SessionId) -> Vec<ChatTurn> {
        self.history(id, self.history_limit)
    }

    /// Drop sessions idle for longer than `max_age`; returns how many went.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::zero());
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, s| s.last_active >= cutoff);
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, "Cleaned up idle sessions");
        }
        removed
    }

    /// List active session ids.
    pub fn list(&self) -> Vec<SessionId> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_with_and_without_id() {
        let manager = SessionManager::new();
        let generated = manager.create(None);
        let named = manager.create(Some(SessionId::from_str("session_0")));
        assert_eq!(named.as_str(), "session_0");
        assert_ne!(generated, named);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_get_or_create_is_stable() {
        let manager = SessionManager::new();
        let id = SessionId::from_str("s1");
        assert_eq!(manager.get_or_create(&id), id);
        assert_eq!(manager.get_or_create(&id), id);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_record_and_history() {
        let manager = SessionManager::with_history_limit(2);
        let id = SessionId::from_str("s1");
        for i in 0..3 {
            manager.record_exchange(&id, format!("q{i}"), format!("a{i}"), Some("wf_1"));
        }

        let history = manager.history(&id, 10);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].human, "q0");

        let recent = manager.recent_history(&id);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].ai, "a1");

        let session = manager.get(&id).unwrap();
        assert_eq!(session.last_workflow.as_deref(), Some("wf_1"));
        assert!(manager.history(&SessionId::from_str("missing"), 5).is_empty());
    }

    #[test]
    fn test_cleanup() {
        let manager = SessionManager::new();
        let id = manager.create(None);
        assert_eq!(manager.cleanup(Duration::from_secs(3600)), 0);

        if let Some(session) = manager.lock().get_mut(&id) {
            session.last_active = Utc::now() - chrono::Duration::hours(25);
        }
        assert_eq!(manager.cleanup(Duration::from_secs(86_400)), 1);
        assert!(manager.is_empty());
    }
}
