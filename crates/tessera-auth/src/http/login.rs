//! Login endpoint handler.
//!
//! `POST /auth/login` verifies credentials against the backend, opens a
//! session and hands the browser a session cookie. The fresh session is
//! written through to the local and distributed caches so the next request
//! does not need the backend at all.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{AppendHeaders, IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::AuthResult;
use crate::cookie::CookieConfig;
use crate::error::AuthError;
use crate::session::cache::SessionCache;
use crate::session::rotation::SessionRotator;
use crate::session::{NewSession, SessionEntry};
use crate::storage::{AuthBackend, DistributedCache, encode_user, session_key};
use crate::tenant::TenantResolver;
use tessera_core::User;

/// State required for the login endpoint.
#[derive(Clone)]
pub struct LoginState {
    /// Backend verifying credentials and storing sessions.
    pub backend: Arc<dyn AuthBackend>,
    /// Local session cache, primed with the fresh session.
    pub cache: Arc<SessionCache>,
    /// Distributed cache shared with other instances.
    pub distributed: Arc<dyn DistributedCache>,
    /// Rotator, told about the new session so it is not rotated early.
    pub rotator: Arc<SessionRotator>,
    /// Tenant resolution for scoping the session.
    pub tenants: Arc<TenantResolver>,
    /// Session cookie attributes.
    pub cookies: CookieConfig,
    /// How long issued sessions live.
    pub session_lifetime: Duration,
    /// How long cached snapshots stay valid.
    pub cache_ttl: Duration,
}

/// Credentials posted to the login endpoint.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response from a successful login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: User,
}

/// Handler for `POST /auth/login`.
///
/// # Errors
///
/// Returns 401 for wrong credentials (without distinguishing unknown email
/// from wrong password), 404 for an unresolvable host, and 503 when the
/// backend is unavailable.
pub async fn login_handler(
    State(state): State<LoginState>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> AuthResult<Response> {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let cookie_header = headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok());
    let resolution = state.tenants.resolve(host, cookie_header).await?;
    let tenant = resolution.tenant;

    let user = state
        .backend
        .verify_credentials(&request.email, &request.password)
        .await?
        .ok_or_else(|| AuthError::unauthorized("Invalid email or password"))?;

    // A tenant user may only open sessions on their own tenant's host.
    // Reported identically to bad credentials so probing reveals nothing.
    if let (Some(request_tenant), Some(user_tenant)) = (tenant.as_ref(), user.tenant_id.as_ref())
        && request_tenant != user_tenant
    {
        debug!(
            email = %request.email,
            request_tenant = %request_tenant,
            "login rejected: user belongs to a different tenant"
        );
        return Err(AuthError::unauthorized("Invalid email or password"));
    }

    let session = state
        .backend
        .create_session(NewSession::expiring_in(
            user.id,
            user.tenant_id.clone(),
            state.session_lifetime,
        ))
        .await?;
    state.rotator.note_created(&session.id);

    let user = Arc::new(user);
    state
        .cache
        .insert(session.id.clone(), SessionEntry::new(user.clone()))
        .await;
    if let Ok(bytes) = encode_user(&user) {
        let key = session_key(tenant.as_ref(), &session.id);
        state.distributed.set(&key, bytes, state.cache_ttl).await;
    }

    info!(user_id = %user.id, "user logged in");

    let mut cookies = vec![
        state
            .cookies
            .build_cookie(session.id.as_str(), state.session_lifetime),
    ];
    if let Some(tenant_cookie) = resolution.set_cookie {
        cookies.push(tenant_cookie);
    }
    let set_cookies: Vec<(header::HeaderName, String)> = cookies
        .into_iter()
        .map(|cookie| (header::SET_COOKIE, cookie))
        .collect();

    Ok((
        StatusCode::OK,
        [(header::CACHE_CONTROL, "no-store")],
        AppendHeaders(set_cookies),
        Json(LoginResponse {
            user: (*user).clone(),
        }),
    )
        .into_response())
}
