//! Redis Pub/Sub for cross-instance session invalidation.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::backend::CachedEntry;

/// Channel carrying invalidated session cache keys between instances.
pub const INVALIDATION_CHANNEL: &str = "tessera:session:invalidate";

/// Listener that keeps L1 caches synchronized across instances.
///
/// When any instance deletes a session (logout, eviction, rotation), it
/// publishes the cache key on [`INVALIDATION_CHANNEL`]; every listener
/// removes that key from its own L1 map. Without this, a revoked session
/// could stay live on other instances for a full L1 TTL.
pub struct InvalidationListener {
    pub redis_url: String,
    pub local_cache: Arc<DashMap<String, CachedEntry>>,
}

impl InvalidationListener {
    /// Spawn the subscriber loop.
    ///
    /// Reconnects with exponential backoff when the connection drops, and
    /// exits when `shutdown` flips to `true`.
    pub fn start(self, mut shutdown: watch::Receiver<bool>) {
        tokio::spawn(async move {
            let mut backoff = Duration::from_secs(1);
            const MAX_BACKOFF: Duration = Duration::from_secs(300);

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            tracing::debug!("invalidation listener shutting down");
                            return;
                        }
                    }
                    result = self.run() => {
                        match result {
                            Ok(()) => {
                                backoff = Duration::from_secs(1);
                            }
                            Err(e) => {
                                tracing::error!(
                                    error = %e,
                                    backoff_secs = backoff.as_secs(),
                                    "invalidation listener error, reconnecting"
                                );
                                tokio::time::sleep(backoff).await;
                                backoff = (backoff * 2).min(MAX_BACKOFF);
                            }
                        }
                    }
                }
            }
        });
    }

    async fn run(&self) -> Result<(), String> {
        use futures_util::StreamExt;

        // Pub/sub needs a dedicated connection outside the pool.
        let client = redis::Client::open(self.redis_url.clone())
            .map_err(|e| format!("failed to create Redis client: {e}"))?;

        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| format!("failed to get pub/sub connection: {e}"))?;

        pubsub
            .subscribe(INVALIDATION_CHANNEL)
            .await
            .map_err(|e| format!("failed to subscribe: {e}"))?;

        tracing::info!(channel = INVALIDATION_CHANNEL, "subscribed for session invalidations");

        let mut stream = pubsub.on_message();
        loop {
            match stream.next().await {
                Some(msg) => {
                    if let Ok(key) = msg.get_payload::<String>() {
                        tracing::debug!(key = %key, "received session invalidation");
                        self.local_cache.remove(&key);
                    } else {
                        tracing::warn!("failed to parse invalidation message payload");
                    }
                }
                None => {
                    return Err("pub/sub connection closed".to_string());
                }
            }
        }
    }
}
