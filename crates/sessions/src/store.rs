use async_trait::async_trait;

use crate::{Result, session::Session};

/// Persistence contract for sessions, keyed by `"<platform>:<sessionKey>"`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Prepare the backend. Called at most once per bot before the first read.
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Returns `None` for unknown or expired sessions.
    async fn read(&self, key: &str) -> Result<Option<Session>>;

    /// Persist `session`, stamping its last activity.
    async fn write(&self, key: &str, session: &Session) -> Result<()>;

    async fn destroy(&self, key: &str) -> Result<()>;

    /// Every live session.
    async fn all(&self) -> Result<Vec<Session>>;
}
