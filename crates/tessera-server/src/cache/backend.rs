//! Cache backend with L1 (DashMap) and optional L2 (Redis) tiers.

use async_trait::async_trait;
use dashmap::DashMap;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tessera_auth::storage::DistributedCache;

use super::pubsub::INVALIDATION_CHANNEL;

/// A cached value with its TTL. Session snapshots are small, so values are
/// held inline rather than behind an `Arc`.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Vec<u8>,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    pub fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data,
            cached_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// Two-tier cache backend behind the
/// [`DistributedCache`](tessera_auth::storage::DistributedCache) seam.
///
/// - **Local**: single-instance mode, DashMap only
/// - **Redis**: multi-instance mode, DashMap (L1) + Redis (L2)
///
/// Redis writes and deletes are fire-and-forget; reads treat any transport
/// failure as a miss.
#[derive(Clone)]
pub enum CacheBackend {
    /// Single-instance: local DashMap only.
    Local(Arc<DashMap<String, CachedEntry>>),

    /// Multi-instance: Redis + local L1.
    Redis {
        redis: Pool,
        local: Arc<DashMap<String, CachedEntry>>,
    },
}

impl CacheBackend {
    pub fn new_local() -> Self {
        CacheBackend::Local(Arc::new(DashMap::new()))
    }

    pub fn new_redis(redis_pool: Pool) -> Self {
        CacheBackend::Redis {
            redis: redis_pool,
            local: Arc::new(DashMap::new()),
        }
    }

    /// "local" or "redis", for health messages and stats.
    pub fn mode(&self) -> &'static str {
        match self {
            CacheBackend::Local(_) => "local",
            CacheBackend::Redis { .. } => "redis",
        }
    }

    /// L1 statistics.
    pub fn stats(&self) -> CacheBackendStats {
        let local = self.local();
        CacheBackendStats {
            local_entries: local.len(),
            mode: self.mode(),
        }
    }

    /// Drop expired L1 entries, returning how many were removed.
    ///
    /// Expired entries are otherwise only dropped lazily when read.
    pub fn purge_expired(&self) -> usize {
        let local = self.local();
        let before = local.len();
        local.retain(|_, entry| !entry.is_expired());
        before - local.len()
    }

    /// The L1 map, shared with the invalidation listener.
    pub fn local(&self) -> &Arc<DashMap<String, CachedEntry>> {
        match self {
            CacheBackend::Local(map) => map,
            CacheBackend::Redis { local, .. } => local,
        }
    }

    fn local_get(&self, key: &str) -> Option<Vec<u8>> {
        let local = self.local();
        if let Some(entry) = local.get(key) {
            if !entry.is_expired() {
                return Some(entry.data.clone());
            }
            drop(entry);
            local.remove(key);
        }
        None
    }
}

#[async_trait]
impl DistributedCache for CacheBackend {
    /// Lookup order: L1, then L2. An L2 hit is promoted into L1.
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        if let Some(data) = self.local_get(key) {
            tracing::debug!(key = %key, "cache hit (L1)");
            return Some(data);
        }

        let CacheBackend::Redis { redis, local } = self else {
            return None;
        };

        match redis.get().await {
            Ok(mut conn) => match conn.get::<_, Option<Vec<u8>>>(key).await {
                Ok(Some(data)) => {
                    tracing::debug!(key = %key, "cache hit (L2)");
                    local.insert(
                        key.to_string(),
                        CachedEntry::new(data.clone(), Duration::from_secs(3600)),
                    );
                    Some(data)
                }
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Redis GET error");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "failed to get Redis connection");
                None
            }
        }
    }

    /// Writes L1 synchronously; the L2 write is fire-and-forget.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        match self {
            CacheBackend::Local(map) => {
                map.insert(key.to_string(), CachedEntry::new(value, ttl));
            }
            CacheBackend::Redis { redis, local } => {
                local.insert(key.to_string(), CachedEntry::new(value.clone(), ttl));

                let redis = redis.clone();
                let key = key.to_string();
                let ttl_secs = ttl.as_secs().max(1);
                tokio::spawn(async move {
                    if let Ok(mut conn) = redis.get().await
                        && let Err(e) = conn.set_ex::<_, _, ()>(&key, &value, ttl_secs).await
                    {
                        tracing::warn!(key = %key, error = %e, "Redis SET error");
                    }
                });
            }
        }
    }

    /// Removes from L1, then fire-and-forget deletes from L2 and publishes
    /// the invalidation so peer instances drop their L1 copies.
    async fn delete(&self, key: &str) {
        match self {
            CacheBackend::Local(map) => {
                map.remove(key);
                tracing::debug!(key = %key, "cache invalidated (local)");
            }
            CacheBackend::Redis { redis, local } => {
                local.remove(key);

                let redis = redis.clone();
                let key = key.to_string();
                tokio::spawn(async move {
                    if let Ok(mut conn) = redis.get().await {
                        if let Err(e) = conn.del::<_, ()>(&key).await {
                            tracing::warn!(key = %key, error = %e, "Redis DEL error");
                        }
                        if let Err(e) = conn.publish::<_, _, ()>(INVALIDATION_CHANNEL, &key).await {
                            tracing::warn!(key = %key, error = %e, "Redis PUBLISH error");
                        } else {
                            tracing::debug!(key = %key, "cache invalidated (L1+L2+pub/sub)");
                        }
                    }
                });
            }
        }
    }

    async fn is_available(&self) -> bool {
        match self {
            CacheBackend::Local(_) => true,
            CacheBackend::Redis { redis, .. } => redis.get().await.is_ok(),
        }
    }
}

/// L1 statistics for the observability endpoints.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheBackendStats {
    pub local_entries: usize,
    pub mode: &'static str,
}
