//! Generic key/value cache layer that session stores can sit on.

mod memory;

pub use memory::MemoryCacheStore;

use {async_trait::async_trait, serde_json::Value};

use crate::Result;

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn all(&self) -> Result<Vec<Value>>;

    /// Store `value` for `minutes`; `0` uses the store's default lifetime.
    async fn put(&self, key: &str, value: Value, minutes: u64) -> Result<()>;

    async fn forget(&self, key: &str) -> Result<()>;

    async fn flush(&self) -> Result<()>;

    /// Prefix the backend puts in front of every key.
    fn prefix(&self) -> &str {
        ""
    }
}
