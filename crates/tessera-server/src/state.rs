//! Shared application state and background maintenance.

use crate::cache::{CacheBackend, InvalidationListener};
use crate::config::shared::SharedConfig;
use crate::config::{AppConfig, RedisConfig};
use crate::metrics;
use crate::readiness::SystemStateMachine;
use crate::retry::{BackoffPolicy, ResilientBackend};
use std::sync::Arc;
use tessera_auth::gate::AuthenticationGate;
use tessera_auth::http::{LoginState, LogoutState};
use tessera_auth::session::cache::SessionCache;
use tessera_auth::session::rotation::SessionRotator;
use tessera_auth::storage::memory::MemoryAuthBackend;
use tessera_auth::storage::{AuthBackend, DistributedCache};
use tessera_auth::tenant::TenantResolver;
use tokio::sync::watch;
use tracing::debug;

/// Everything the server shares across requests and background tasks.
///
/// Construction wires the full authentication pipeline: store, retrying
/// backend seam, session cache, distributed cache tier, rotator, tenant
/// resolver and gate, plus the readiness machine that gates traffic on
/// initialization.
pub struct AppContext {
    pub config: Arc<SharedConfig>,
    /// Concrete store handle, used by bootstrap seeding and the state
    /// endpoint's counts.
    pub store: Arc<MemoryAuthBackend>,
    /// Retry-wrapped backend seam everything else talks to.
    pub backend: Arc<dyn AuthBackend>,
    pub session_cache: Arc<SessionCache>,
    pub cache_backend: CacheBackend,
    pub distributed: Arc<dyn DistributedCache>,
    pub rotator: Arc<SessionRotator>,
    pub tenants: Arc<TenantResolver>,
    pub gate: Arc<AuthenticationGate>,
    pub readiness: Arc<SystemStateMachine>,
    shutdown_tx: watch::Sender<bool>,
}

impl AppContext {
    pub async fn new(config: AppConfig, config_path: Option<String>) -> Arc<Self> {
        let store = Arc::new(MemoryAuthBackend::new());
        let backend: Arc<dyn AuthBackend> =
            Arc::new(ResilientBackend::new(store.clone(), BackoffPolicy::default()));

        let session_cache = Arc::new(SessionCache::new(&config.auth.session));
        let cache_backend = create_cache_backend(&config.redis).await;
        let distributed: Arc<dyn DistributedCache> = Arc::new(cache_backend.clone());

        let mut tenants = TenantResolver::new(config.auth.tenancy.clone());
        if config.auth.tenancy.demo {
            tenants = tenants.with_provisioner(Arc::new(
                crate::bootstrap::DemoTenantProvisioner::new(store.clone()),
            ));
        }
        let tenants = Arc::new(tenants);

        let rotator = Arc::new(SessionRotator::new(
            backend.clone(),
            session_cache.clone(),
            distributed.clone(),
            &config.auth,
        ));
        let gate = Arc::new(AuthenticationGate::new(
            &config.auth,
            tenants.clone(),
            session_cache.clone(),
            distributed.clone(),
            backend.clone(),
            rotator.clone(),
        ));
        let readiness = Arc::new(SystemStateMachine::new(config.readiness.init_timeout));

        let (shutdown_tx, _) = watch::channel(false);
        let redis_url = config.redis.url.clone();

        let ctx = Arc::new(Self {
            config: Arc::new(SharedConfig::new(config, config_path)),
            store,
            backend,
            session_cache,
            cache_backend,
            distributed,
            rotator,
            tenants,
            gate,
            readiness,
            shutdown_tx,
        });

        if matches!(ctx.cache_backend, CacheBackend::Redis { .. }) {
            InvalidationListener {
                redis_url,
                local_cache: ctx.cache_backend.local().clone(),
            }
            .start(ctx.shutdown_tx.subscribe());
        }
        ctx.spawn_maintenance();

        ctx
    }

    /// State for the login endpoint.
    pub fn login_state(&self) -> LoginState {
        let config = self.config.current();
        LoginState {
            backend: self.backend.clone(),
            cache: self.session_cache.clone(),
            distributed: self.distributed.clone(),
            rotator: self.rotator.clone(),
            tenants: self.tenants.clone(),
            cookies: config.auth.cookie.clone(),
            session_lifetime: config.auth.session.lifetime,
            cache_ttl: config.auth.session.cache_ttl,
        }
    }

    /// State for the logout endpoint.
    pub fn logout_state(&self) -> LogoutState {
        let config = self.config.current();
        LogoutState {
            backend: self.backend.clone(),
            cache: self.session_cache.clone(),
            distributed: self.distributed.clone(),
            tenants: self.tenants.clone(),
            cookies: config.auth.cookie.clone(),
        }
    }

    /// Stop the maintenance sweeper and the invalidation listener.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Periodic sweep dropping expired cache entries, idle rotation records
    /// and elapsed lookup cooldowns.
    fn spawn_maintenance(self: &Arc<Self>) {
        let ctx = self.clone();
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let interval = ctx.config.current().auth.session.sweep_interval;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => ctx.sweep().await,
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("maintenance sweeper stopped");
        });
    }

    async fn sweep(&self) {
        let expired = self.session_cache.cleanup_expired().await;
        let rotations = self.rotator.prune_stale();
        let cooldowns = self.gate.prune_cooldown();
        let l1_entries = self.cache_backend.purge_expired();

        let stats = self.session_cache.stats();
        metrics::set_session_cache_entries("hot", stats.hot_entries);
        metrics::set_session_cache_entries("warm", stats.warm_entries as usize);
        metrics::set_rotation_records(self.rotator.record_count());

        if expired + rotations + cooldowns + l1_entries > 0 {
            debug!(
                expired,
                rotations, cooldowns, l1_entries, "maintenance sweep"
            );
        }
    }
}

/// Create the distributed cache tier from configuration.
///
/// Redis failures degrade to local-only mode; the server starts either way.
pub async fn create_cache_backend(config: &RedisConfig) -> CacheBackend {
    use std::time::Duration;

    if !config.enabled {
        tracing::info!("Redis disabled, using local cache only");
        return CacheBackend::new_local();
    }

    tracing::info!(url = %config.url, "connecting to Redis");

    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    if let Some(ref mut pool_config) = redis_config.pool {
        pool_config.max_size = config.pool_size;
        pool_config.timeouts.wait = Some(Duration::from_millis(config.timeout_ms));
        pool_config.timeouts.create = Some(Duration::from_millis(config.timeout_ms));
        pool_config.timeouts.recycle = Some(Duration::from_millis(config.timeout_ms));
    }

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(error = %e, "failed to create Redis pool, falling back to local cache");
            return CacheBackend::new_local();
        }
    };

    match pool.get().await {
        Ok(_) => {
            tracing::info!("connected to Redis");
            CacheBackend::new_redis(pool)
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to connect to Redis, falling back to local cache");
            CacheBackend::new_local()
        }
    }
}
