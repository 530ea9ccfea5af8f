//! Scoped execution contexts owned by a single runner.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// An execution context with an identity and an expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub app_name: String,
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl Session {
    /// Returns `true` once more than `ttl` has passed since creation.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Expiry check against an explicit clock reading.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let ttl = ChronoDuration::from_std(self.ttl).unwrap_or(ChronoDuration::MAX);
        now.signed_duration_since(self.created_at) > ttl
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        ChronoDuration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| self.created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Creates sessions and keeps track of the ones still alive.
///
/// Each runner holds its own manager. Sessions are never shared between
/// managers, so a session id is only meaningful to the manager that issued it.
#[derive(Debug, Clone)]
pub struct SessionManager {
    app_name: String,
    ttl: Duration,
    sessions: HashMap<String, Session>,
}

impl SessionManager {
    pub fn new(app_name: impl Into<String>, ttl: Duration) -> Self {
        Self {
            app_name: app_name.into(),
            ttl,
            sessions: HashMap::new(),
        }
    }

    /// Issues a new session with a fresh id. An empty `user_id` becomes `"anonymous"`.
    pub fn create_session(&mut self, user_id: &str) -> Session {
        let user_id = match user_id.trim() {
            "" => "anonymous",
            trimmed => trimmed,
        };

        let session = Session {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            app_name: self.app_name.clone(),
            created_at: Utc::now(),
            ttl: self.ttl,
        };

        info!(
            session_id = %session.session_id,
            user_id = %session.user_id,
            ttl_secs = self.ttl.as_secs(),
            "Session created"
        );
        self.sessions
            .insert(session.session_id.clone(), session.clone());
        session
    }

    pub fn get_session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    /// Returns `true` if this manager issued the session and still holds it.
    pub fn owns(&self, session: &Session) -> bool {
        self.sessions
            .get(&session.session_id)
            .is_some_and(|held| held == session)
    }

    pub fn is_expired(&self, session: &Session) -> bool {
        session.is_expired()
    }

    /// Drops a session. Returns the removed session, if it was held.
    pub fn close_session(&mut self, session_id: &str) -> Option<Session> {
        let removed = self.sessions.remove(session_id);
        if removed.is_some() {
            debug!(session_id = %session_id, "Session closed");
        }
        removed
    }

    /// Removes every expired session and returns how many were dropped.
    pub fn purge_expired(&mut self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired_at(now));
        let purged = before - self.sessions.len();
        if purged > 0 {
            debug!(purged, "Purged expired sessions");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
