//! Request authentication gate.
//!
//! Every request passes through [`AuthenticationGate::authenticate`], which
//! resolves the tenant, looks the session cookie up through the cache tiers,
//! enforces tenant isolation and drives session rotation. The resulting
//! [`AuthContext`] is stored in request extensions by the server middleware
//! and read back by the [`CurrentUser`] and [`MaybeUser`] extractors.
//!
//! Lookup order for a presented session cookie:
//!
//! 1. local cache (hot, then warm tier)
//! 2. distributed cache, promoting hits into the local tiers
//! 3. the authentication backend, unless the session is in lookup cooldown
//!
//! A backend miss is authoritative and clears the cookie. A backend failure
//! is not: the request is served unauthenticated and the session enters a
//! cooldown so retries do not hammer a struggling backend.

use crate::AuthResult;
use crate::config::AuthConfig;
use crate::cookie::{CookieConfig, cookie_value};
use crate::error::AuthError;
use crate::session::cache::SessionCache;
use crate::session::cooldown::LookupCooldown;
use crate::session::rotation::SessionRotator;
use crate::session::{SessionEntry, SessionId};
use crate::storage::{AuthBackend, DistributedCache, decode_user, encode_user, session_key};
use crate::tenant::TenantResolver;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use metrics::counter;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::{TenantId, User};
use tracing::{debug, warn};
use uuid::Uuid;

/// Identity attached to a request after the gate has run.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Authenticated user, `None` for anonymous requests.
    pub user: Option<Arc<User>>,
    /// Tenant the request is scoped to, `None` in single-tenant mode.
    pub tenant: Option<TenantId>,
    /// Session backing the authentication, tracking rotation.
    pub session_id: Option<SessionId>,
}

impl AuthContext {
    pub fn anonymous(tenant: Option<TenantId>) -> Self {
        Self {
            user: None,
            tenant,
            session_id: None,
        }
    }

    pub fn authenticated(user: Arc<User>, tenant: Option<TenantId>, session_id: SessionId) -> Self {
        Self {
            user: Some(user),
            tenant,
            session_id: Some(session_id),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user.as_ref().map(|user| user.id)
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(|user| user.is_admin())
    }
}

/// What the gate decided for one request.
#[derive(Debug)]
pub struct GateOutcome {
    pub context: AuthContext,
    /// `Set-Cookie` values the response must carry (rotation, demo tenant,
    /// or clearing a dead session cookie).
    pub set_cookies: Vec<String>,
}

/// Authenticates requests from their host, cookies and client IP.
pub struct AuthenticationGate {
    tenants: Arc<TenantResolver>,
    cache: Arc<SessionCache>,
    distributed: Arc<dyn DistributedCache>,
    backend: Arc<dyn AuthBackend>,
    rotator: Arc<SessionRotator>,
    cooldown: LookupCooldown,
    cookies: CookieConfig,
    cache_ttl: Duration,
}

impl AuthenticationGate {
    pub fn new(
        config: &AuthConfig,
        tenants: Arc<TenantResolver>,
        cache: Arc<SessionCache>,
        distributed: Arc<dyn DistributedCache>,
        backend: Arc<dyn AuthBackend>,
        rotator: Arc<SessionRotator>,
    ) -> Self {
        Self {
            tenants,
            cache,
            distributed,
            backend,
            rotator,
            cooldown: LookupCooldown::new(config.session.lookup_cooldown),
            cookies: config.cookie.clone(),
            cache_ttl: config.session.cache_ttl,
        }
    }

    /// Authenticate one request.
    ///
    /// Anonymous outcomes are the common non-error case: no cookie, an
    /// expired session, or a backend outage all produce `Ok` with no user.
    ///
    /// # Errors
    ///
    /// - [`AuthError::TenantNotFound`] when the host resolves to no tenant.
    /// - [`AuthError::TenantIsolation`] when the session belongs to a
    ///   different tenant than the request host.
    /// - [`AuthError::InvalidSession`] when the session vanished mid-rotation.
    pub async fn authenticate(
        &self,
        host: &str,
        cookie_header: Option<&str>,
        client_ip: IpAddr,
    ) -> AuthResult<GateOutcome> {
        let resolution = self.tenants.resolve(host, cookie_header).await?;
        let tenant = resolution.tenant;
        let mut set_cookies = Vec::new();
        if let Some(cookie) = resolution.set_cookie {
            set_cookies.push(cookie);
        }

        let Some(raw) = cookie_header.and_then(|header| cookie_value(header, &self.cookies.name))
        else {
            return Ok(GateOutcome {
                context: AuthContext::anonymous(tenant),
                set_cookies,
            });
        };
        let session_id = SessionId::new(raw);
        let key = session_key(tenant.as_ref(), &session_id);

        let mut from_backend = false;
        let user: Arc<User> = if let Some(entry) = self.cache.get(&session_id).await {
            entry.user
        } else if let Some(user) = self.distributed_lookup(&key).await {
            counter!("tessera_session_cache_hits_total", "tier" => "distributed").increment(1);
            let user = Arc::new(user);
            self.cache
                .insert(session_id.clone(), SessionEntry::new(user.clone()))
                .await;
            user
        } else if self.cooldown.is_cooling(&session_id) {
            debug!(session = %session_id, "session lookup cooling down");
            counter!("tessera_session_lookup_cooldowns_total").increment(1);
            return Ok(GateOutcome {
                context: AuthContext::anonymous(tenant),
                set_cookies,
            });
        } else {
            match self.backend.validate_session(&session_id).await {
                Ok(Some(user)) => {
                    self.cooldown.clear(&session_id);
                    counter!("tessera_session_backend_lookups_total", "result" => "valid")
                        .increment(1);
                    from_backend = true;
                    Arc::new(user)
                }
                Ok(None) => {
                    // Authoritative miss: the cookie points at nothing.
                    self.cooldown.clear(&session_id);
                    self.evict(&session_id, &key).await;
                    set_cookies.push(self.cookies.build_clear_cookie());
                    debug!(session = %session_id, "session unknown or expired, clearing cookie");
                    counter!("tessera_session_backend_lookups_total", "result" => "invalid")
                        .increment(1);
                    return Ok(GateOutcome {
                        context: AuthContext::anonymous(tenant),
                        set_cookies,
                    });
                }
                Err(e) if e.is_transient() => {
                    self.cooldown.record_failure(&session_id);
                    warn!(error = %e, "session backend unavailable, serving unauthenticated");
                    counter!("tessera_session_backend_lookups_total", "result" => "error")
                        .increment(1);
                    return Ok(GateOutcome {
                        context: AuthContext::anonymous(tenant),
                        set_cookies,
                    });
                }
                Err(e) => return Err(e),
            }
        };

        // A session from another tenant must never be served, and must not
        // linger in any cache tier. Users without a tenant are platform
        // staff and pass.
        if let (Some(request_tenant), Some(session_tenant)) =
            (tenant.as_ref(), user.tenant_id.as_ref())
            && request_tenant != session_tenant
        {
            self.evict(&session_id, &key).await;
            warn!(
                request_tenant = %request_tenant,
                session_tenant = %session_tenant,
                "cross-tenant session rejected"
            );
            counter!("tessera_tenant_isolation_rejections_total").increment(1);
            return Err(AuthError::tenant_isolation(
                request_tenant.as_str(),
                session_tenant.as_str(),
            ));
        }

        // Only cache after the isolation check has passed.
        if from_backend {
            self.cache
                .insert(session_id.clone(), SessionEntry::new(user.clone()))
                .await;
            if let Ok(bytes) = encode_user(&user) {
                self.distributed.set(&key, bytes, self.cache_ttl).await;
            }
        }

        let mut session_id = session_id;
        if let Some(rotated) = self
            .rotator
            .maybe_rotate(client_ip, user.clone(), &session_id, tenant.as_ref())
            .await?
        {
            set_cookies.push(rotated.set_cookie);
            session_id = rotated.session.id;
        }

        Ok(GateOutcome {
            context: AuthContext::authenticated(user, tenant, session_id),
            set_cookies,
        })
    }

    /// Drop expired lookup cooldowns. Called by the background sweep.
    pub fn prune_cooldown(&self) -> usize {
        self.cooldown.prune()
    }

    async fn distributed_lookup(&self, key: &str) -> Option<User> {
        let bytes = self.distributed.get(key).await?;
        match decode_user(&bytes) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "discarding undecodable distributed session entry");
                self.distributed.delete(key).await;
                None
            }
        }
    }

    async fn evict(&self, id: &SessionId, key: &str) {
        self.cache.invalidate(id).await;
        self.distributed.delete(key).await;
    }
}

/// Extractor for handlers that require an authenticated user.
///
/// Rejects with 401 when the request is anonymous.
pub struct CurrentUser(pub Arc<User>);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or_else(|| AuthError::internal("authentication middleware not installed"))?;
        context
            .user
            .map(CurrentUser)
            .ok_or_else(|| AuthError::unauthorized("Authentication required"))
    }
}

/// Extractor for handlers that adapt to authentication without requiring it.
pub struct MaybeUser(pub Option<Arc<User>>);

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .extensions
            .get::<AuthContext>()
            .and_then(|context| context.user.clone());
        Ok(MaybeUser(user))
    }
}
