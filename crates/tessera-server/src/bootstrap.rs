//! Startup initialization.
//!
//! Runs exactly once through the readiness machine: probes each service,
//! reports its health, and seeds the bootstrap admin account on first start.
//! Critical probe failures abort initialization; optional ones only degrade.

use crate::state::AppContext;
use async_trait::async_trait;
use std::sync::Arc;
use tessera_auth::storage::memory::MemoryAuthBackend;
use tessera_auth::storage::{AuthBackend, DistributedCache};
use tessera_auth::tenant::TenantProvisioner;
use tessera_auth::{AuthError, AuthResult};
use tessera_core::{Role, ServiceHealth, TenantId, User};
use tracing::{debug, info};
use uuid::Uuid;

/// Initialize the system, reporting per-service health along the way.
///
/// # Errors
///
/// Returns a message describing the first critical failure; optional
/// services never fail initialization.
pub async fn initialize(ctx: Arc<AppContext>) -> Result<(), String> {
    info!("starting system initialization");

    // Database: the session store must answer before anything is served.
    match ctx.backend.ping().await {
        Ok(()) => {
            ctx.readiness
                .update_service_health("database", ServiceHealth::healthy("connected"));
        }
        Err(e) => {
            ctx.readiness
                .update_service_health("database", ServiceHealth::unhealthy(e.to_string()));
            return Err(format!("database: {e}"));
        }
    }

    // Auth: seed the bootstrap admin, then declare the pipeline ready.
    match seed_admin_user(&ctx).await {
        Ok(seeded) => {
            let message = if seeded {
                "ready (bootstrap admin created)"
            } else {
                "ready"
            };
            ctx.readiness
                .update_service_health("auth", ServiceHealth::healthy(message));
        }
        Err(e) => {
            ctx.readiness
                .update_service_health("auth", ServiceHealth::unhealthy(e.clone()));
            return Err(format!("auth: {e}"));
        }
    }

    // Distributed cache: optional, losing it only degrades.
    if ctx.distributed.is_available().await {
        ctx.readiness.update_service_health(
            "cache",
            ServiceHealth::healthy(format!("mode: {}", ctx.cache_backend.mode())),
        );
    } else {
        ctx.readiness
            .update_service_health("cache", ServiceHealth::unhealthy("redis unreachable"));
    }

    // Theme manager: optional presentation layer.
    ctx.readiness
        .update_service_health("theme_manager", ServiceHealth::healthy("default theme loaded"));

    info!("system initialization complete");
    Ok(())
}

/// Create the configured bootstrap admin on an empty store.
///
/// Returns whether an account was created.
async fn seed_admin_user(ctx: &AppContext) -> Result<bool, String> {
    let config = ctx.config.current();
    let Some(admin) = config.bootstrap.admin_user.as_ref() else {
        return Ok(false);
    };

    if ctx.store.user_count() > 0 {
        debug!("accounts already exist, skipping bootstrap admin");
        return Ok(false);
    }

    let mut user = User::new(Uuid::new_v4(), &admin.email, Role::Admin);
    if let Some(name) = &admin.name {
        user = user.with_name(name);
    }
    let user = ctx
        .store
        .create_user(user, &admin.password)
        .map_err(|e| e.to_string())?;

    info!(user_id = %user.id, email = %user.email, "bootstrap admin created");
    Ok(true)
}

/// Seeds an owner account for tenants generated in demo mode.
///
/// The one-time password is printed to the log, the same way development
/// servers hand out their initial credentials.
pub struct DemoTenantProvisioner {
    store: Arc<MemoryAuthBackend>,
}

impl DemoTenantProvisioner {
    pub fn new(store: Arc<MemoryAuthBackend>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TenantProvisioner for DemoTenantProvisioner {
    async fn provision(&self, tenant: &TenantId) -> AuthResult<()> {
        let email = format!("owner@{tenant}.demo");
        let password = Uuid::new_v4().simple().to_string();
        let user = User::new(Uuid::new_v4(), email, Role::Admin).with_tenant(tenant.clone());

        match self.store.create_user(user, &password) {
            Ok(user) => {
                info!(
                    tenant = %tenant,
                    email = %user.email,
                    password = %password,
                    "demo tenant provisioned with one-time owner credentials"
                );
                Ok(())
            }
            // The owner already exists: provisioning ran before.
            Err(AuthError::Storage { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdminUserConfig, AppConfig};
    use tessera_core::SystemState;

    fn config_with_admin() -> AppConfig {
        let mut config = AppConfig::default();
        config.bootstrap.admin_user = Some(AdminUserConfig {
            email: "admin@example.com".to_string(),
            password: "correct horse battery".to_string(),
            name: Some("Site Admin".to_string()),
        });
        config
    }

    #[tokio::test]
    async fn test_initialize_reports_all_services() {
        let ctx = AppContext::new(AppConfig::default(), None).await;
        ctx.readiness.set_state(SystemState::Initializing, "test");

        initialize(ctx.clone()).await.unwrap();

        let health = ctx.readiness.service_health();
        for service in ["database", "auth", "cache", "theme_manager"] {
            assert!(health[service].is_healthy(), "{service} should be healthy");
        }
        assert_eq!(ctx.readiness.state(), SystemState::Ready);
        ctx.shutdown();
    }

    #[tokio::test]
    async fn test_initialize_fails_when_store_is_down() {
        let ctx = AppContext::new(AppConfig::default(), None).await;
        ctx.readiness.set_state(SystemState::Initializing, "test");
        ctx.store.set_available(false);

        let err = initialize(ctx.clone()).await.unwrap_err();
        assert!(err.starts_with("database:"));
        assert!(ctx.readiness.service_health()["database"].is_unhealthy());
        ctx.shutdown();
    }

    #[tokio::test]
    async fn test_admin_seeded_exactly_once() {
        let ctx = AppContext::new(config_with_admin(), None).await;

        initialize(ctx.clone()).await.unwrap();
        assert_eq!(ctx.store.user_count(), 1);

        initialize(ctx.clone()).await.unwrap();
        assert_eq!(ctx.store.user_count(), 1);

        let found = ctx
            .store
            .verify_credentials("admin@example.com", "correct horse battery")
            .await
            .unwrap();
        assert!(found.unwrap().is_admin());
        ctx.shutdown();
    }

    #[tokio::test]
    async fn test_seed_skipped_when_accounts_exist() {
        let ctx = AppContext::new(config_with_admin(), None).await;
        ctx.store
            .create_user(
                User::new(Uuid::new_v4(), "existing@example.com", Role::Editor),
                "pw012345",
            )
            .unwrap();

        initialize(ctx.clone()).await.unwrap();
        assert_eq!(ctx.store.user_count(), 1);
        ctx.shutdown();
    }

    #[tokio::test]
    async fn test_demo_provisioner_is_idempotent() {
        let store = Arc::new(MemoryAuthBackend::new());
        let provisioner = DemoTenantProvisioner::new(store.clone());
        let tenant = TenantId::new("demo-abc123xyz0").unwrap();

        provisioner.provision(&tenant).await.unwrap();
        provisioner.provision(&tenant).await.unwrap();
        assert_eq!(store.user_count(), 1);
    }
}
