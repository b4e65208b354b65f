use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use tessera_auth::gate::CurrentUser;

use crate::state::AppContext;

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

pub async fn root() -> impl IntoResponse {
    let body = json!({
        "service": "Tessera CMS",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(body))
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// Readiness probe backed by the system state machine. Load balancers pull
/// an instance out of rotation on 503 without killing it.
pub async fn readyz(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    let state = ctx.readiness.state();
    if state.is_operational() {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": state.to_string() })),
        )
    }
}

/// Full operational snapshot: system state, per-service health and the
/// session subsystem's counters.
pub async fn system_state(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    let body = json!({
        "state": ctx.readiness.state(),
        "failure_reason": ctx.readiness.failure_reason(),
        "services": ctx.readiness.service_health(),
        "sessions": {
            "cache": ctx.session_cache.stats(),
            "rotation_records": ctx.rotator.record_count(),
            "users": ctx.store.user_count(),
            "active": ctx.store.session_count(),
        },
        "distributed_cache": ctx.cache_backend.stats(),
    });
    (StatusCode::OK, Json(body))
}

/// Who the current session belongs to.
pub async fn me(CurrentUser(user): CurrentUser) -> impl IntoResponse {
    let body = json!({
        "id": user.id,
        "email": user.email,
        "name": user.name,
        "tenant": user.tenant_id,
        "role": user.role,
        "permissions": user.permissions,
    });
    (StatusCode::OK, Json(body))
}

/// Reset a failed system so the next request retries initialization.
///
/// Deliberately reachable without a session: a failed auth backend must not
/// lock operators out of the reset path. Deployments protect `/admin` at
/// the network layer.
pub async fn reinitialize(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    info!("explicit reinitialization requested");
    ctx.readiness.reinitialize().await;
    (StatusCode::OK, Json(json!({ "status": "reinitializing" })))
}

/// Re-read the config file and swap the shared snapshot.
///
/// The logging level applies immediately; authentication components keep
/// the snapshot they were built with until restart.
pub async fn reload_config(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    match ctx.config.reload() {
        Ok(config) => {
            crate::observability::apply_logging_level(&config.logging.level);
            info!("configuration reloaded");
            (StatusCode::OK, Json(json!({ "status": "reloaded" })))
        }
        Err(e) => {
            error!(error = %e, "configuration reload failed");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": { "code": "reload_failed", "message": e } })),
            )
        }
    }
}

pub async fn metrics() -> impl IntoResponse {
    let body = crate::metrics::render_metrics().unwrap_or_default();
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

pub async fn favicon() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use tessera_core::{ServiceHealth, SystemState};

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_readyz_follows_system_state() {
        let ctx = AppContext::new(AppConfig::default(), None).await;

        let response = readyz(State(ctx.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["status"], "idle");

        ctx.readiness.set_state(SystemState::Ready, "test");
        let response = readyz(State(ctx.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        ctx.shutdown();
    }

    #[tokio::test]
    async fn test_state_endpoint_reports_services_and_counters() {
        let ctx = AppContext::new(AppConfig::default(), None).await;
        ctx.readiness.set_state(SystemState::Initializing, "test");
        ctx.readiness
            .update_service_health("database", ServiceHealth::healthy("connected"));

        let response = system_state(State(ctx.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["services"]["database"]["status"], "healthy");
        assert_eq!(body["sessions"]["users"], 0);
        assert_eq!(body["distributed_cache"]["mode"], "local");
        ctx.shutdown();
    }

    #[tokio::test]
    async fn test_reinitialize_resets_failed_state() {
        let ctx = AppContext::new(AppConfig::default(), None).await;
        ctx.readiness.set_state(SystemState::Failed, "backend down");

        let response = reinitialize(State(ctx.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(ctx.readiness.state(), SystemState::Idle);
        assert_eq!(ctx.readiness.failure_reason(), None);
        ctx.shutdown();
    }
}
