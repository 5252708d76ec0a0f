//! TTL-keyed cache abstraction standing in for the original Redis `SETEX`
//! (spec.md §6 TTL cache keys: `streamer:online:<login>` → channel-id, 180s).

use async_trait::async_trait;
use clipwatch_core::Result;
use moka::future::Cache;
use std::time::Duration;

/// A `SETEX`-shaped key/value TTL cache, keyed by opaque string keys.
///
/// `set_if_absent` reports whether the key was newly inserted, which the
/// fleet monitor uses to decide whether an "online" lifecycle event is a
/// duplicate of one it already emitted.
#[async_trait]
pub trait OnlineCache: Send + Sync {
    async fn set_if_absent(&self, key: &str, value: u64) -> Result<bool>;
    async fn get(&self, key: &str) -> Result<Option<u64>>;
    async fn contains(&self, key: &str) -> Result<bool>;
}

pub fn streamer_key(login: &str) -> String {
    format!("streamer:online:{login}")
}

/// `moka`-backed in-process cache. A single clipwatch deployment runs one
/// fleet monitor instance, so this replaces the original's shared Redis
/// without losing the single-writer-per-key property the monitor relies on.
pub struct MokaOnlineCache {
    inner: Cache<String, u64>,
}

impl MokaOnlineCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder().time_to_live(ttl).build(),
        }
    }
}

#[async_trait]
impl OnlineCache for MokaOnlineCache {
    async fn set_if_absent(&self, key: &str, value: u64) -> Result<bool> {
        if self.inner.get(key).await.is_some() {
            self.inner.insert(key.to_string(), value).await;
            return Ok(false);
        }
        self.inner.insert(key.to_string(), value).await;
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<u64>> {
        Ok(self.inner.get(key).await)
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.inner.get(key).await.is_some())
    }
}
