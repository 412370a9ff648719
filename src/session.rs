use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::limits::*;
use crate::observability;
use crate::orchestrator::{IntentUpdate, ReservationIntent};

#[derive(Debug, Clone)]
pub struct Session {
    pub intent: ReservationIntent,
    touched_at: Instant,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SessionError {
    UnknownUser,
    UserKeyTooLong,
    TooManySessions,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::UnknownUser => write!(f, "no session; say hello first"),
            SessionError::UserKeyTooLong => {
                write!(f, "user key exceeds {MAX_USER_KEY_LEN} bytes")
            }
            SessionError::TooManySessions => write!(f, "too many open sessions"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Per-user dialogue state: the reservation the user is assembling. Roles
/// are not kept here; each connection holds the role its own `hello`
/// established. Idle sessions are dropped by [`SessionStore::expire_idle`].
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Create or refresh a session. An existing intent survives a repeated
    /// hello.
    pub fn start(&self, user: &str) -> Result<Session, SessionError> {
        if user.len() > MAX_USER_KEY_LEN {
            return Err(SessionError::UserKeyTooLong);
        }
        if let Some(mut s) = self.sessions.get_mut(user) {
            s.touched_at = Instant::now();
            return Ok(s.clone());
        }
        if self.sessions.len() >= MAX_SESSIONS {
            return Err(SessionError::TooManySessions);
        }
        let session = Session {
            intent: ReservationIntent::default(),
            touched_at: Instant::now(),
        };
        self.sessions.insert(user.to_string(), session.clone());
        metrics::gauge!(observability::SESSIONS_ACTIVE).set(self.sessions.len() as f64);
        Ok(session)
    }

    /// Snapshot of the session, refreshing its idle timer.
    pub fn get(&self, user: &str) -> Result<Session, SessionError> {
        let mut s = self.sessions.get_mut(user).ok_or(SessionError::UnknownUser)?;
        s.touched_at = Instant::now();
        Ok(s.clone())
    }

    pub fn update_intent(&self, user: &str, update: IntentUpdate) -> Result<ReservationIntent, SessionError> {
        let mut s = self.sessions.get_mut(user).ok_or(SessionError::UnknownUser)?;
        s.intent.apply(update);
        s.touched_at = Instant::now();
        Ok(s.intent.clone())
    }

    /// Clear the intent, e.g. after a commit or an explicit reset.
    pub fn reset_intent(&self, user: &str) -> Result<(), SessionError> {
        let mut s = self.sessions.get_mut(user).ok_or(SessionError::UnknownUser)?;
        s.intent = ReservationIntent::default();
        s.touched_at = Instant::now();
        Ok(())
    }

    /// Drop sessions idle for longer than the TTL. Returns how many went.
    pub fn expire_idle(&self) -> usize {
        self.expire_idle_at(Instant::now())
    }

    fn expire_idle_at(&self, now: Instant) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, s| now.saturating_duration_since(s.touched_at) < self.ttl);
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            debug!("expired {removed} idle sessions");
            metrics::gauge!(observability::SESSIONS_ACTIVE).set(self.sessions.len() as f64);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TablePreference;

    #[test]
    fn intent_lives_until_reset() {
        let store = SessionStore::new(Duration::from_secs(60));
        assert_eq!(store.get("u1").unwrap_err(), SessionError::UnknownUser);
        store.start("u1").unwrap();

        let update = IntentUpdate {
            table_preference: Some(TablePreference::Table(2)),
            client_name: Some("Ann".into()),
            ..Default::default()
        };
        let intent = store.update_intent("u1", update).unwrap();
        assert_eq!(intent.table_preference, TablePreference::Table(2));

        // A repeated hello keeps the intent.
        let again = store.start("u1").unwrap();
        assert_eq!(again.intent.client_name.as_deref(), Some("Ann"));
        assert_eq!(store.len(), 1);

        store.reset_intent("u1").unwrap();
        assert_eq!(store.get("u1").unwrap().intent, ReservationIntent::default());
    }

    #[test]
    fn idle_sessions_expire() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.start("a").unwrap();
        store.start("b").unwrap();
        assert_eq!(store.expire_idle(), 0);

        let later = Instant::now() + Duration::from_secs(61);
        assert_eq!(store.expire_idle_at(later), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn long_user_key_rejected() {
        let store = SessionStore::new(Duration::from_secs(60));
        let key = "x".repeat(MAX_USER_KEY_LEN + 1);
        assert_eq!(store.start(&key).unwrap_err(), SessionError::UserKeyTooLong);
    }
}
