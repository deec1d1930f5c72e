use super::{AggregateCache, CacheStats, CachedCount};
use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct TtlEntry {
    value: CachedCount,
    ttl: Duration,
}

/// Expires each entry after the TTL it was written with.
struct PerEntryTtl;

impl Expiry<String, TtlEntry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &TtlEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &TtlEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// An in-process aggregate cache, backed by `moka`.
#[derive(Debug)]
pub struct InMemoryCacheProvider {
    cache: Cache<String, TtlEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
    admitted: AtomicU64,
}

impl InMemoryCacheProvider {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            cache: Cache::builder().max_capacity(max_capacity).expire_after(PerEntryTtl).build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            admitted: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl AggregateCache for InMemoryCacheProvider {
    async fn get(&self, key: &str) -> Option<CachedCount> {
        match self.cache.get(key).await {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(%key, count = entry.value.count, "Aggregate cache hit");
                Some(entry.value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn set(&self, key: String, value: CachedCount, ttl: Duration) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
        self.cache.insert(key, TtlEntry { value, ttl }).await;
    }

    async fn stats(&self) -> CacheStats {
        CacheStats::new(
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.admitted.load(Ordering::Relaxed),
        )
    }
}
