//! Session context store
//!
//! Keyed, TTL-bound session state with merge-upsert semantics. A record whose
//! TTL has elapsed since its last update is reported exactly like a missing
//! one. Writes are last-writer-wins per session id; callers serialize
//! pipeline executions for a given session.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::debug;

use super::clock::{Clock, SystemClock};
use super::types::{Session, SessionPatch};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    /// TTL elapsed; handled exactly like `NotFound`
    #[error("Session expired: {0}")]
    Expired(String),

    #[error("Invalid session id: {0:?}")]
    InvalidId(String),

    #[error("Session storage error: {0}")]
    Storage(String),
}

impl SessionError {
    /// True for `NotFound` and `Expired`
    pub fn is_absent(&self) -> bool {
        matches!(self, SessionError::NotFound(_) | SessionError::Expired(_))
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Session, SessionError>;

    /// Merges `patch` into the live record, or into a fresh one when the
    /// record is absent or expired, and returns the stored result
    async fn upsert(&self, session_id: &str, patch: SessionPatch) -> Result<Session, SessionError>;

    fn name(&self) -> &str;
}

pub(crate) fn check_id(session_id: &str) -> Result<(), SessionError> {
    if session_id.trim().is_empty() {
        return Err(SessionError::InvalidId(session_id.to_string()));
    }
    Ok(())
}

/// Process-local store
///
/// Entries do not outlive the process and expire by TTL exactly like the
/// durable store.
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    clock: Arc<dyn Clock>,
    default_ttl_secs: u64,
}

impl InMemorySessionStore {
    pub fn new(default_ttl_secs: u64) -> Self {
        Self::with_clock(default_ttl_secs, Arc::new(SystemClock))
    }

    pub fn with_clock(default_ttl_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            clock,
            default_ttl_secs,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every expired record, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        match self.sessions.write() {
            Ok(mut sessions) => {
                let before = sessions.len();
                sessions.retain(|_, s| !s.is_expired(now));
                before - sessions.len()
            }
            Err(_) => 0,
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Session, SessionError> {
        check_id(session_id)?;
        let now = self.clock.now();
        let sessions = self
            .sessions
            .read()
            .map_err(|e| SessionError::Storage(e.to_string()))?;

        match sessions.get(session_id) {
            Some(session) if session.is_expired(now) => {
                debug!(session = session_id, "Session expired");
                Err(SessionError::Expired(session_id.to_string()))
            }
            Some(session) => Ok(session.clone()),
            None => Err(SessionError::NotFound(session_id.to_string())),
        }
    }

    async fn upsert(&self, session_id: &str, patch: SessionPatch) -> Result<Session, SessionError> {
        check_id(session_id)?;
        let now = self.clock.now();
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| SessionError::Storage(e.to_string()))?;

        let mut session = match sessions.get(session_id) {
            Some(existing) if !existing.is_expired(now) => existing.clone(),
            _ => Session::new(session_id, self.default_ttl_secs, now),
        };
        session.apply(&patch, now);
        sessions.insert(session_id.to_string(), session.clone());

        Ok(session)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
