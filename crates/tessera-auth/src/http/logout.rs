//! Logout endpoint handler.
//!
//! `POST /auth/logout` destroys the session and evicts it from every cache
//! tier. The endpoint is lenient: it returns 200 OK even when no session
//! was found, so the cookie is always cleared on the client.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{debug, info};

use crate::cookie::{CookieConfig, cookie_from_headers};
use crate::session::SessionId;
use crate::session::cache::SessionCache;
use crate::storage::{AuthBackend, DistributedCache, session_key};
use crate::tenant::TenantResolver;

/// State required for the logout endpoint.
#[derive(Clone)]
pub struct LogoutState {
    /// Backend holding the session to destroy.
    pub backend: Arc<dyn AuthBackend>,
    /// Local session cache to evict from.
    pub cache: Arc<SessionCache>,
    /// Distributed cache to evict from.
    pub distributed: Arc<dyn DistributedCache>,
    /// Tenant resolution, needed to compute the distributed cache key.
    pub tenants: Arc<TenantResolver>,
    /// Session cookie attributes for the clearing cookie.
    pub cookies: CookieConfig,
}

/// Response from the logout endpoint.
#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
    pub message: String,
}

/// Handler for `POST /auth/logout`.
pub async fn logout_handler(State(state): State<LogoutState>, headers: HeaderMap) -> Response {
    if let Some(raw) = cookie_from_headers(&headers, &state.cookies.name) {
        let session_id = SessionId::new(raw);

        let host = headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        let cookie_header = headers
            .get(header::COOKIE)
            .and_then(|value| value.to_str().ok());
        // Resolution failure still lets logout proceed, just without the
        // tenant-scoped cache key.
        let tenant = match state.tenants.resolve(host, cookie_header).await {
            Ok(resolution) => resolution.tenant,
            Err(_) => None,
        };

        match state.backend.destroy_session(&session_id).await {
            Ok(()) => info!(session = %session_id, "session destroyed"),
            Err(e) => {
                debug!(session = %session_id, error = %e, "session destroy failed during logout");
            }
        }

        state.cache.invalidate(&session_id).await;
        let key = session_key(tenant.as_ref(), &session_id);
        state.distributed.delete(&key).await;
    } else {
        debug!("logout without session cookie, clearing only");
    }

    let clear_cookie = state.cookies.build_clear_cookie();
    (
        StatusCode::OK,
        [
            (header::SET_COOKIE, clear_cookie.as_str()),
            (header::CACHE_CONTROL, "no-store"),
        ],
        Json(LogoutResponse {
            success: true,
            message: "Logged out successfully".to_string(),
        }),
    )
        .into_response()
}
