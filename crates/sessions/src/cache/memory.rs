use std::time::{Duration, Instant};

use {
    async_trait::async_trait,
    moka::{Expiry, future::Cache},
    serde_json::Value,
};

use {super::CacheStore, crate::Result};

#[derive(Clone)]
struct Entry {
    value: Value,
    ttl: Option<Duration>,
}

/// Per-entry lifetime; a `put` restarts the clock.
struct EntryTtl;

impl Expiry<String, Entry> for EntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _at: Instant) -> Option<Duration> {
        entry.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _at: Instant,
        _remaining: Option<Duration>,
    ) -> Option<Duration> {
        entry.ttl
    }
}

/// In-process LRU cache with optional per-entry TTL, backed by moka.
///
/// Values are cloned in and out, so callers never share a mutable value
/// through the cache.
pub struct MemoryCacheStore {
    cache: Cache<String, Entry>,
    default_ttl: Option<Duration>,
}

impl MemoryCacheStore {
    pub const DEFAULT_CAPACITY: u64 = 500;

    /// `minutes` is the default lifetime for entries put without one.
    pub fn new(max_size: u64, minutes: Option<u64>) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_size)
            .expire_after(EntryTtl)
            .build();
        Self {
            cache,
            default_ttl: minutes
                .filter(|m| *m > 0)
                .map(|m| Duration::from_secs(m.saturating_mul(60))),
        }
    }

    /// Current number of entries. Pending evictions may lag briefly.
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY, None)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.cache.get(key).await.map(|entry| entry.value))
    }

    async fn all(&self) -> Result<Vec<Value>> {
        Ok(self
            .cache
            .iter()
            .map(|(_, entry)| entry.value)
            .collect())
    }

    async fn put(&self, key: &str, value: Value, minutes: u64) -> Result<()> {
        let ttl = if minutes > 0 {
            Some(Duration::from_secs(minutes.saturating_mul(60)))
        } else {
            self.default_ttl
        };
        self.cache
            .insert(key.to_string(), Entry { value, ttl })
            .await;
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        self.cache.run_pending_tasks().await;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        Ok(())
    }
}
