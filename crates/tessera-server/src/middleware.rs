//! Request middleware: readiness gating, session authentication, request
//! ids and HTTP metrics.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, MatchedPath, State};
use axum::response::IntoResponse;
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request, header},
    middleware::Next,
    response::Response,
};
use tracing::warn;
use uuid::Uuid;

use crate::bootstrap;
use crate::state::AppContext;

/// Gate requests on system readiness.
///
/// The first gated request kicks off initialization; concurrent requests
/// wait on the same attempt. Operational and static endpoints bypass the
/// gate so health checks and a stuck system's reset path stay reachable.
pub async fn readiness_middleware(
    State(ctx): State<Arc<AppContext>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if bypasses_readiness(req.uri().path()) {
        return next.run(req).await;
    }

    let init_ctx = ctx.clone();
    if let Err(e) = ctx
        .readiness
        .ensure_initialized(move || bootstrap::initialize(init_ctx))
        .await
    {
        return e.into_response();
    }
    next.run(req).await
}

/// Authenticate the request and attach its [`AuthContext`] extension.
///
/// Success paths carry their cookies in the gate outcome; error paths that
/// invalidate the session cookie get the clearing cookie appended here.
///
/// [`AuthContext`]: tessera_auth::gate::AuthContext
pub async fn session_middleware(
    State(ctx): State<Arc<AppContext>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if skips_session(req.uri().path()) {
        return next.run(req).await;
    }

    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let cookie_header = req
        .headers()
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    match ctx
        .gate
        .authenticate(&host, cookie_header.as_deref(), addr.ip())
        .await
    {
        Ok(outcome) => {
            req.extensions_mut().insert(outcome.context);
            let mut response = next.run(req).await;
            append_cookies(&mut response, &outcome.set_cookies);
            response
        }
        Err(e) => {
            if e.is_security_event() {
                warn!(error = %e, host = %host, "request rejected by authentication gate");
            }
            let clear = e
                .clears_session_cookie()
                .then(|| ctx.config.current().auth.cookie.build_clear_cookie());
            let mut response = e.into_response();
            if let Some(cookie) = clear {
                append_cookies(&mut response, std::slice::from_ref(&cookie));
            }
            response
        }
    }
}

/// Ensure each request has an `X-Request-Id` and mirror it on the response.
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static("x-request-id");

    let req_id_value = req
        .headers()
        .get(&header_name)
        .cloned()
        .unwrap_or_else(|| {
            HeaderValue::from_str(&Uuid::new_v4().to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("invalid"))
        });

    req.extensions_mut().insert(req_id_value.clone());

    let mut res = next.run(req).await;
    res.headers_mut().insert(header_name, req_id_value);
    res
}

/// Record request count and latency against the matched route.
pub async fn track_metrics(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let started = Instant::now();
    let response = next.run(req).await;

    crate::metrics::record_http_request(
        method.as_str(),
        &route,
        response.status().as_u16(),
        started.elapsed(),
    );
    response
}

fn append_cookies(response: &mut Response, cookies: &[String]) {
    for cookie in cookies {
        if let Ok(value) = HeaderValue::from_str(cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
}

/// Paths served regardless of system state.
fn bypasses_readiness(path: &str) -> bool {
    let exact = [
        "/",
        "/healthz",
        "/readyz",
        "/state",
        "/metrics",
        "/favicon.ico",
        "/admin/reinitialize",
        "/admin/reload",
    ];
    if exact.contains(&path) {
        return true;
    }
    let prefixes = ["/setup", "/assets/", "/static/"];
    prefixes.iter().any(|prefix| path.starts_with(prefix))
}

/// Paths that never carry a session: infrastructure endpoints, and the
/// login/logout handlers that manage their cookies themselves.
fn skips_session(path: &str) -> bool {
    let exact = [
        "/healthz",
        "/readyz",
        "/metrics",
        "/favicon.ico",
        "/auth/login",
        "/auth/logout",
    ];
    exact.contains(&path) || path.starts_with("/admin/")
}
