use async_trait::async_trait;

use crate::domain::session::Session;

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("Invalid session ID")]
    InvalidId,
    #[error("Session not found")]
    NotFound,
    #[error("Session has expired")]
    Expired,
    #[error("Session storage error")]
    Storage(#[source] anyhow::Error),
}

#[async_trait]
pub trait SessionStore: std::fmt::Debug + Send + Sync {
    /// Creates and persists a new session.
    async fn start(&self) -> Result<Session, SessionError>;
    /// Loads an existing session and rotates its flash bags.
    async fn resume(&self, id: &str) -> Result<Session, SessionError>;
    async fn save(&self, session: &Session) -> Result<(), SessionError>;
    async fn delete(&self, id: &str) -> Result<bool, SessionError>;
}
