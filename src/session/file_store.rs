//! JSON file session store
//!
//! One `<id>.json` document per session under a directory. Writes go to a
//! temporary file first and are renamed into place, so a reader never sees a
//! partially written record.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};
use super::store::{check_id, SessionError, SessionStore};
use super::types::{Session, SessionPatch};

pub struct FileSessionStore {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
    default_ttl_secs: u64,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>, default_ttl_secs: u64) -> Self {
        Self::with_clock(dir, default_ttl_secs, Arc::new(SystemClock))
    }

    pub fn with_clock(
        dir: impl Into<PathBuf>,
        default_ttl_secs: u64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dir: dir.into(),
            clock,
            default_ttl_secs,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `session_id`, with path-hostile characters replaced
    pub fn session_path(&self, session_id: &str) -> PathBuf {
        let safe_name =
            session_id.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|', '.'], "_");
        self.dir.join(format!("{}.json", safe_name))
    }

    async fn read(&self, session_id: &str) -> Result<Option<Session>, SessionError> {
        let path = self.session_path(session_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SessionError::Storage(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let session: Session = serde_json::from_slice(&bytes).map_err(|e| {
            SessionError::Storage(format!("corrupt session file {}: {}", path.display(), e))
        })?;

        // Sanitising can map two ids onto one file
        if session.session_id != session_id {
            warn!(
                session = session_id,
                stored = %session.session_id,
                "Session file belongs to a different id"
            );
            return Ok(None);
        }

        Ok(Some(session))
    }

    async fn write(&self, session: &Session) -> Result<(), SessionError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            SessionError::Storage(format!("failed to create {}: {}", self.dir.display(), e))
        })?;

        let path = self.session_path(&session.session_id);
        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));
        let json = serde_json::to_vec_pretty(session)
            .map_err(|e| SessionError::Storage(format!("failed to serialize session: {}", e)))?;

        tokio::fs::write(&tmp, json).await.map_err(|e| {
            SessionError::Storage(format!("failed to write {}: {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            SessionError::Storage(format!("failed to rename into {}: {}", path.display(), e))
        })?;

        debug!(session = %session.session_id, path = %path.display(), "Session persisted");
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self, session_id: &str) -> Result<Session, SessionError> {
        check_id(session_id)?;
        match self.read(session_id).await? {
            Some(session) if session.is_expired(self.clock.now()) => {
                debug!(session = session_id, "Session expired");
                Err(SessionError::Expired(session_id.to_string()))
            }
            Some(session) => Ok(session),
            None => Err(SessionError::NotFound(session_id.to_string())),
        }
    }

    async fn upsert(&self, session_id: &str, patch: SessionPatch) -> Result<Session, SessionError> {
        check_id(session_id)?;
        let now = self.clock.now();

        let mut session = match self.read(session_id).await? {
            Some(existing) if !existing.is_expired(now) => existing,
            _ => Session::new(session_id, self.default_ttl_secs, now),
        };
        session.apply(&patch, now);
        self.write(&session).await?;

        Ok(session)
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::clock::ManualClock;
    use crate::session::types::Location;
    use crate::tools::{ArtifactRef, ToolName};
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_session_path_sanitizes() {
        let store = FileSessionStore::new("/tmp/sessions", 60);
        assert_eq!(
            store.session_path("user/chat:42"),
            PathBuf::from("/tmp/sessions/user_chat_42.json")
        );
        assert_eq!(
            store.session_path("../escape"),
            PathBuf::from("/tmp/sessions/___escape.json")
        );
    }

    #[tokio::test]
    async fn test_round_trip_through_disk() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path().join("sessions"), 3600);

        store
            .upsert(
                "chat-1",
                SessionPatch::new()
                    .with_location(Location::new(35.067482, -101.395466))
                    .with_stage_result(
                        ToolName::Terrain,
                        vec![ArtifactRef::new("terrain", "blob://t/1")],
                    ),
            )
            .await
            .unwrap();

        let reopened = FileSessionStore::new(dir.path().join("sessions"), 3600);
        let session = reopened.get("chat-1").await.unwrap();
        assert_eq!(session.last_location.as_ref().unwrap().lat, 35.067482);
        assert_eq!(
            session.latest_artifact(ToolName::Terrain).unwrap().location_ref,
            "blob://t/1"
        );
    }

    #[tokio::test]
    async fn test_missing_and_expired() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let store = FileSessionStore::with_clock(dir.path(), 60, clock.clone());

        assert!(matches!(store.get("s1").await, Err(SessionError::NotFound(_))));

        store.upsert("s1", SessionPatch::new()).await.unwrap();
        clock.advance(Duration::seconds(61));
        assert!(matches!(store.get("s1").await, Err(SessionError::Expired(_))));

        let fresh = store
            .upsert("s1", SessionPatch::new().with_request_seq(1))
            .await
            .unwrap();
        assert_eq!(fresh.request_seq, 1);
        assert!(store.get("s1").await.is_ok());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path(), 60);
        std::fs::write(store.session_path("s1"), "{not json").unwrap();

        assert!(matches!(store.get("s1").await, Err(SessionError::Storage(_))));
    }

    #[tokio::test]
    async fn test_colliding_ids_do_not_leak() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path(), 60);
        store
            .upsert("a/b", SessionPatch::new().with_location(Location::new(1.0, 1.0)))
            .await
            .unwrap();

        assert!(matches!(store.get("a:b").await, Err(SessionError::NotFound(_))));
    }
}
