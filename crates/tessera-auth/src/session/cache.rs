//! Two-tier in-process session cache.
//!
//! The hot tier is a small recency-bounded map sized for the working set of
//! active editors; the warm tier is a larger TTL cache that absorbs the long
//! tail. A warm hit is promoted back into the hot tier. Distributed caching
//! and the auth backend sit behind this cache, not inside it.

use crate::config::SessionConfig;
use crate::session::{SessionEntry, SessionId};
use dashmap::DashMap;
use metrics::counter;
use moka::future::Cache;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

struct HotEntry {
    entry: SessionEntry,
    last_touched: AtomicU64,
}

/// Process-local session cache with a hot and a warm tier.
///
/// A miss here only means "not cached"; callers fall through to the
/// distributed cache and then the auth backend.
pub struct SessionCache {
    hot: DashMap<SessionId, HotEntry>,
    warm: Cache<SessionId, SessionEntry>,
    hot_capacity: usize,
    ttl: Duration,
    clock: AtomicU64,
    hot_hits: AtomicU64,
    warm_hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    promotions: AtomicU64,
}

impl SessionCache {
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_sizing(config.hot_capacity, config.warm_capacity, config.cache_ttl)
    }

    pub fn with_sizing(hot_capacity: usize, warm_capacity: u64, ttl: Duration) -> Self {
        Self {
            hot: DashMap::new(),
            warm: Cache::builder()
                .max_capacity(warm_capacity)
                .time_to_live(ttl)
                .build(),
            hot_capacity,
            ttl,
            clock: AtomicU64::new(0),
            hot_hits: AtomicU64::new(0),
            warm_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            promotions: AtomicU64::new(0),
        }
    }

    /// Look up a session. Entries past their TTL are invisible even before
    /// any sweep has dropped them.
    pub async fn get(&self, id: &SessionId) -> Option<SessionEntry> {
        let mut hot_stale = false;
        if let Some(hot) = self.hot.get(id) {
            if hot.entry.is_fresh(self.ttl) {
                hot.last_touched.store(self.tick(), Ordering::Relaxed);
                self.hot_hits.fetch_add(1, Ordering::Relaxed);
                counter!("tessera_session_cache_hits_total", "tier" => "hot").increment(1);
                return Some(hot.entry.clone());
            }
            hot_stale = true;
        }
        if hot_stale {
            self.hot.remove(id);
            self.warm.invalidate(id).await;
            self.evictions.fetch_add(1, Ordering::Relaxed);
            self.record_miss();
            return None;
        }

        if let Some(entry) = self.warm.get(id).await {
            if entry.is_fresh(self.ttl) {
                self.insert_hot(id.clone(), entry.clone());
                self.warm_hits.fetch_add(1, Ordering::Relaxed);
                self.promotions.fetch_add(1, Ordering::Relaxed);
                counter!("tessera_session_cache_hits_total", "tier" => "warm").increment(1);
                return Some(entry);
            }
            self.warm.invalidate(id).await;
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }

        self.record_miss();
        None
    }

    /// Cache a validated session in both tiers.
    pub async fn insert(&self, id: SessionId, entry: SessionEntry) {
        self.insert_hot(id.clone(), entry.clone());
        self.warm.insert(id, entry).await;
    }

    /// Drop a session from both tiers.
    pub async fn invalidate(&self, id: &SessionId) {
        self.hot.remove(id);
        self.warm.invalidate(id).await;
    }

    /// Drop everything. Used when a deployment-wide invalidation arrives.
    pub fn clear(&self) {
        self.hot.clear();
        self.warm.invalidate_all();
    }

    /// Remove hot-tier entries past their TTL and flush pending warm-tier
    /// maintenance. Returns how many hot entries were dropped.
    ///
    /// Freshness on the read path never depends on this having run.
    pub async fn cleanup_expired(&self) -> usize {
        let before = self.hot.len();
        self.hot.retain(|_, hot| hot.entry.is_fresh(self.ttl));
        let removed = before.saturating_sub(self.hot.len());
        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        }
        self.warm.run_pending_tasks().await;
        removed
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hot_entries: self.hot.len(),
            warm_entries: self.warm.entry_count(),
            hot_hits: self.hot_hits.load(Ordering::Relaxed),
            warm_hits: self.warm_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!("tessera_session_cache_misses_total").increment(1);
    }

    /// Insert into the hot tier, evicting the least recently touched entry
    /// when the tier overflows.
    fn insert_hot(&self, id: SessionId, entry: SessionEntry) {
        let tick = self.tick();
        self.hot.insert(
            id,
            HotEntry {
                entry,
                last_touched: AtomicU64::new(tick),
            },
        );
        while self.hot.len() > self.hot_capacity {
            let oldest = self
                .hot
                .iter()
                .min_by_key(|item| item.value().last_touched.load(Ordering::Relaxed))
                .map(|item| item.key().clone());
            let Some(key) = oldest else { break };
            if self.hot.remove(&key).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Counters exposed on the state endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hot_entries: usize,
    pub warm_entries: u64,
    pub hot_hits: u64,
    pub warm_hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub promotions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hot_hits + self.warm_hits;
        let total = hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }
}
