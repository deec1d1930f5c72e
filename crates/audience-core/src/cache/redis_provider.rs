use super::{AggregateCache, CachedCount};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisResult};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Redis-backed implementation of `AggregateCache`, shared across engine instances.
///
/// Redis errors are logged and treated as misses so checks keep working while
/// the cache is unavailable.
#[derive(Clone)]
pub struct RedisCacheProvider {
    redis_conn: MultiplexedConnection,
}

impl fmt::Debug for RedisCacheProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCacheProvider").finish_non_exhaustive()
    }
}

impl RedisCacheProvider {
    pub async fn new(redis_url: &str) -> RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let redis_conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { redis_conn })
    }

    fn count_key(key: &str) -> String {
        format!("audience:count:{}", key)
    }
}

/// Redis expiry has second granularity; round up so short TTLs still expire.
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 { secs + 1 } else { secs.max(1) }
}

#[async_trait]
impl AggregateCache for RedisCacheProvider {
    async fn get(&self, key: &str) -> Option<CachedCount> {
        let mut conn = self.redis_conn.clone();
        let redis_key = Self::count_key(key);

        let raw: Option<String> = match conn.get(&redis_key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(%key, "Redis GET failed: {}", e);
                return None;
            }
        };

        match serde_json::from_str(&raw?) {
            Ok(cached) => {
                debug!(%key, "Aggregate cache hit");
                Some(cached)
            }
            Err(e) => {
                error!("Failed to deserialize cached count for key {}: {}", key, e);
                None
            }
        }
    }

    async fn set(&self, key: String, value: CachedCount, ttl: Duration) {
        let payload = match serde_json::to_string(&value) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Serialize cached count failed: {}", e);
                return;
            }
        };

        let mut conn = self.redis_conn.clone();
        let redis_key = Self::count_key(&key);
        let res: RedisResult<()> = conn.set_ex(&redis_key, payload, ttl_seconds(ttl)).await;
        match res {
            Ok(()) => debug!(key = %redis_key, "Cache set OK"),
            Err(e) => error!(key = %redis_key, "Redis SET failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_rounds_up_to_whole_seconds() {
        assert_eq!(ttl_seconds(Duration::from_millis(1)), 1);
        assert_eq!(ttl_seconds(Duration::from_secs(120)), 120);
        assert_eq!(ttl_seconds(Duration::from_millis(1500)), 2);
    }

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(RedisCacheProvider::count_key("user:u1,1"), "audience:count:user:u1,1");
    }
}
