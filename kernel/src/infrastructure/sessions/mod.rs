use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;

use crate::application::ports::session_store::{SessionError, SessionStore};
use crate::domain::session::Session;

/// Chance that starting a session also purges expired ones.
const GC_PROBABILITY: f64 = 0.01;

/// Stores each session as `<dir>/<id>.sess` holding its JSON form.
#[derive(Debug, Clone)]
pub struct FsSessionStore {
    dir: PathBuf,
    expire: Option<i64>,
}

impl FsSessionStore {
    /// `expire` is the idle lifetime in seconds; `None` keeps sessions until deleted.
    pub fn new(dir: impl Into<PathBuf>, expire: Option<u64>) -> Self {
        Self {
            dir: dir.into(),
            expire: expire.map(|e| e as i64),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.sess"))
    }

    /// Deletes sessions whose file has not been written for the idle
    /// lifetime. Returns how many were removed; a no-op without expiry.
    pub async fn purge_expired(&self) -> Result<usize, SessionError> {
        let Some(expire) = self.expire else {
            return Ok(0);
        };
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(expire as u64))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .context("session_gc_read_dir")
            .map_err(SessionError::Storage)?;
        let mut purged = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .context("session_gc_next_entry")
            .map_err(SessionError::Storage)?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("sess") {
                continue;
            }
            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "session_gc_stat_failed");
                    continue;
                }
            };
            if modified <= cutoff && remove(&path).await {
                purged += 1;
            }
        }
        if purged > 0 {
            tracing::debug!(purged, "sessions_purged");
        }
        Ok(purged)
    }

    async fn write(&self, session: &Session) -> Result<(), SessionError> {
        let json = serde_json::to_vec(session)
            .context("session_serialize")
            .map_err(SessionError::Storage)?;
        tokio::fs::write(self.path(session.id()), json)
            .await
            .context("session_write")
            .map_err(SessionError::Storage)
    }
}

#[async_trait]
impl SessionStore for FsSessionStore {
    async fn start(&self) -> Result<Session, SessionError> {
        if self.expire.is_some() && rand::random::<f64>() < GC_PROBABILITY {
            if let Err(e) = self.purge_expired().await {
                tracing::warn!(error = %e, "session_gc_failed");
            }
        }

        let now = Utc::now().timestamp();
        let mut session = Session::new(now);
        if tokio::fs::try_exists(self.path(session.id())).await.unwrap_or(false) {
            session = Session::new(now);
        }
        self.write(&session).await?;
        tracing::debug!(session = %&session.id()[..8], "session_started");
        Ok(session)
    }

    async fn resume(&self, id: &str) -> Result<Session, SessionError> {
        if !Session::is_valid_id(id) {
            return Err(SessionError::InvalidId);
        }

        let bytes = match tokio::fs::read(self.path(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(SessionError::NotFound),
            Err(e) => return Err(SessionError::Storage(anyhow::Error::new(e).context("session_read"))),
        };
        let mut session: Session = serde_json::from_slice(&bytes)
            .context("session_decode")
            .map_err(SessionError::Storage)?;

        let now = Utc::now().timestamp();
        if let Some(expire) = self.expire {
            if now - session.last_used_on() >= expire {
                remove(&self.path(id)).await;
                return Err(SessionError::Expired);
            }
        }

        session.flash_mut().rotate();
        session.touch(now);
        Ok(session)
    }

    async fn save(&self, session: &Session) -> Result<(), SessionError> {
        self.write(session).await
    }

    async fn delete(&self, id: &str) -> Result<bool, SessionError> {
        if !Session::is_valid_id(id) {
            return Err(SessionError::InvalidId);
        }
        match tokio::fs::remove_file(self.path(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SessionError::Storage(anyhow::Error::new(e).context("session_delete"))),
        }
    }
}

/// Removes a session file, logging failures other than a missing file.
async fn remove(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "session_remove_failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn start_save_resume() {
        let tmp = TempDir::new().unwrap();
        let store = FsSessionStore::new(tmp.path(), None);

        let mut session = store.start().await.unwrap();
        session.data_mut().set("user", 42);
        session.flash_mut().current_mut().set("notice", "saved");
        store.save(&session).await.unwrap();

        let resumed = store.resume(session.id()).await.unwrap();
        assert_eq!(resumed.data().get_i64("user"), Some(42));
        assert!(resumed.flash().current().is_empty());
        assert_eq!(resumed.flash().last().get_str("notice"), Some("saved"));
    }

    #[tokio::test]
    async fn resume_errors() {
        let tmp = TempDir::new().unwrap();
        let store = FsSessionStore::new(tmp.path(), None);
        assert!(matches!(store.resume("nope").await, Err(SessionError::InvalidId)));
        assert!(matches!(
            store.resume(&"a".repeat(64)).await,
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn idle_sessions_expire() {
        let tmp = TempDir::new().unwrap();
        let store = FsSessionStore::new(tmp.path(), Some(60));
        let mut session = store.start().await.unwrap();
        session.touch(Utc::now().timestamp() - 120);
        store.save(&session).await.unwrap();
        assert!(matches!(store.resume(session.id()).await, Err(SessionError::Expired)));
        assert!(!store.delete(session.id()).await.unwrap());
    }

    fn age(path: &Path, secs: u64) {
        std::fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(secs))
            .unwrap();
    }

    #[tokio::test]
    async fn purge_removes_abandoned_sessions() {
        let tmp = TempDir::new().unwrap();
        let store = FsSessionStore::new(tmp.path(), Some(60));
        let stale = store.start().await.unwrap();
        let fresh = store.start().await.unwrap();
        age(&store.path(stale.id()), 300);
        std::fs::write(tmp.path().join("notes.txt"), "keep").unwrap();
        age(&tmp.path().join("notes.txt"), 300);

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(!store.path(stale.id()).exists());
        assert!(store.path(fresh.id()).exists());
        assert!(tmp.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn purge_without_expiry_keeps_everything() {
        let tmp = TempDir::new().unwrap();
        let store = FsSessionStore::new(tmp.path(), None);
        let session = store.start().await.unwrap();
        age(&store.path(session.id()), 86_400);
        assert_eq!(store.purge_expired().await.unwrap(), 0);
        assert!(store.path(session.id()).exists());
    }
}
