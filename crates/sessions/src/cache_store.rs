use std::sync::Arc;

use {async_trait::async_trait, tracing::warn};

#[cfg(feature = "metrics")]
use parley_metrics::{counter, labels, session as session_metrics};

use crate::{
    Result,
    cache::{CacheStore, MemoryCacheStore},
    session::{Session, now_ms},
    store::SessionStore,
};

/// One year, in minutes.
pub const DEFAULT_EXPIRES_IN: u64 = 365 * 24 * 60;

/// Session store over any [`CacheStore`].
///
/// Entries live for `expires_in` minutes after their last write; reads also
/// reject sessions whose `lastActivity` is older than that.
pub struct CacheBasedSessionStore {
    cache: Arc<dyn CacheStore>,
    expires_in: u64,
}

impl CacheBasedSessionStore {
    pub fn new(cache: Arc<dyn CacheStore>, expires_in: Option<u64>) -> Self {
        Self {
            cache,
            expires_in: expires_in
                .filter(|m| *m > 0)
                .unwrap_or(DEFAULT_EXPIRES_IN),
        }
    }

    fn decode(key: &str, value: serde_json::Value) -> Option<Session> {
        match serde_json::from_value(value) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(key, error = %e, "dropping undecodable cached session");
                None
            },
        }
    }
}

#[async_trait]
impl SessionStore for CacheBasedSessionStore {
    async fn read(&self, key: &str) -> Result<Option<Session>> {
        #[cfg(feature = "metrics")]
        counter!(session_metrics::READS_TOTAL, labels::DRIVER => "cache").increment(1);

        let Some(value) = self.cache.get(key).await? else {
            return Ok(None);
        };
        Ok(Self::decode(key, value).filter(|s| !s.is_expired(Some(self.expires_in), now_ms())))
    }

    async fn write(&self, key: &str, session: &Session) -> Result<()> {
        let mut session = session.clone();
        session.touch();
        let value = serde_json::to_value(&session)?;
        self.cache.put(key, value, self.expires_in).await?;

        #[cfg(feature = "metrics")]
        counter!(session_metrics::WRITES_TOTAL, labels::DRIVER => "cache").increment(1);

        Ok(())
    }

    async fn destroy(&self, key: &str) -> Result<()> {
        self.cache.forget(key).await
    }

    async fn all(&self) -> Result<Vec<Session>> {
        let now = now_ms();
        Ok(self
            .cache
            .all()
            .await?
            .into_iter()
            .filter_map(|value| Self::decode("*", value))
            .filter(|s| !s.is_expired(Some(self.expires_in), now))
            .collect())
    }
}

/// In-memory session store: an LRU of at most `max_size` sessions.
pub struct MemorySessionStore {
    inner: CacheBasedSessionStore,
}

impl MemorySessionStore {
    pub fn new(max_size: u64, expires_in: Option<u64>) -> Self {
        let cache = Arc::new(MemoryCacheStore::new(max_size, None));
        Self {
            inner: CacheBasedSessionStore::new(cache, expires_in),
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(MemoryCacheStore::DEFAULT_CAPACITY, None)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn read(&self, key: &str) -> Result<Option<Session>> {
        self.inner.read(key).await
    }

    async fn write(&self, key: &str, session: &Session) -> Result<()> {
        self.inner.write(key, session).await
    }

    async fn destroy(&self, key: &str) -> Result<()> {
        self.inner.destroy(key).await
    }

    async fn all(&self) -> Result<Vec<Session>> {
        self.inner.all().await
    }
}
