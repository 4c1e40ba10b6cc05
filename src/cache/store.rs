//! In-memory cache backend.
//!
//! Bounded LRU of rendered pages, each with its own expiry instant. Expired
//! entries read as absent and are dropped on the read that notices them.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use metrics::counter;
use tracing::debug;

use super::backend::{CacheBackend, CacheError};
use super::config::CacheConfig;
use super::lock::rw_write;

pub(crate) const METRIC_PAGE_CACHE_EVICT_TOTAL: &str = "coursepages_page_cache_evict_total";

#[derive(Clone)]
struct StoredPage {
    html: String,
    /// `None` when the ttl reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl StoredPage {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

pub struct MemoryBackend {
    pages: RwLock<LruCache<String, StoredPage>>,
}

impl MemoryBackend {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            pages: RwLock::new(LruCache::new(config.capacity_non_zero())),
        }
    }

    fn lookup(&self, key: &str, now: Instant) -> Option<String> {
        let mut pages = rw_write(&self.pages, "get");
        let expired = pages.get(key)?.is_expired(now);
        if expired {
            pages.pop(key);
            debug!(target = "coursepages::cache", key, "dropped expired page");
            return None;
        }
        pages.peek(key).map(|page| page.html.clone())
    }

    fn insert(&self, key: &str, html: String, ttl: Duration, now: Instant) {
        let page = StoredPage {
            html,
            expires_at: now.checked_add(ttl),
        };
        let evicted = rw_write(&self.pages, "set").push(key.to_string(), page);
        if let Some((evicted_key, _)) = evicted
            && evicted_key != key
        {
            counter!(METRIC_PAGE_CACHE_EVICT_TOTAL).increment(1);
            debug!(
                target = "coursepages::cache",
                key = %evicted_key,
                "evicted page at capacity"
            );
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.lookup(key, Instant::now()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.insert(key, value, ttl, Instant::now());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        rw_write(&self.pages, "delete").pop(key);
        Ok(())
    }
}
