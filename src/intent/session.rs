//! Conversation sessions keyed by session id

use std::time::Duration;

use mini_moka::sync::Cache;

use super::command::Command;

/// Idle time after which an abandoned conversation is forgotten
pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(300);

const MAX_SESSIONS: u64 = 10_000;

/// Per-conversation state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// The conversation stays open after the current turn
    pub active: bool,
    /// Command waiting for a room answer; at most one
    pub pending: Option<Command>,
}

impl Session {
    /// Whether there is nothing worth keeping
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        !self.active && self.pending.is_none()
    }
}

/// Storage for conversation sessions
///
/// Concurrent turns of the same session are not serialized.
pub trait SessionStore: Send + Sync {
    fn get(&self, id: &str) -> Option<Session>;

    /// Insert or replace a session
    fn put(&self, id: &str, session: Session);

    fn delete(&self, id: &str);
}

/// In-memory store evicting sessions after an idle period
#[derive(Clone)]
pub struct MemorySessionStore {
    cache: Cache<String, Session>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new(idle: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(MAX_SESSIONS)
                .time_to_idle(idle)
                .build(),
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_IDLE)
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, id: &str) -> Option<Session> {
        self.cache.get(&id.to_string())
    }

    fn put(&self, id: &str, session: Session) {
        tracing::trace!(session = id, active = session.active, pending = session.pending.is_some(), "storing session");
        self.cache.insert(id.to_string(), session);
    }

    fn delete(&self, id: &str) {
        self.cache.invalidate(&id.to_string());
    }
}
