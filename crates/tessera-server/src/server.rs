use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{handlers, middleware as app_middleware, state::AppContext};

pub struct TesseraServer {
    addr: SocketAddr,
    ctx: Arc<AppContext>,
    app: Router,
}

pub fn build_app(ctx: Arc<AppContext>) -> Router {
    let body_limit = ctx.config.current().server.body_limit_bytes;

    let api = Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/state", get(handlers::system_state))
        .route("/metrics", get(handlers::metrics))
        // Browser favicon shortcut
        .route("/favicon.ico", get(handlers::favicon))
        // Session-protected sample endpoint
        .route("/me", get(handlers::me))
        // Operational endpoints
        .route("/admin/reinitialize", post(handlers::reinitialize))
        .route("/admin/reload", post(handlers::reload_config))
        .with_state(ctx.clone());

    // Login and logout carry their own state so the auth crate stays
    // independent of the server's context type.
    let login = Router::new()
        .route("/auth/login", post(tessera_auth::http::login_handler))
        .with_state(ctx.login_state());
    let logout = Router::new()
        .route("/auth/logout", post(tessera_auth::http::logout_handler))
        .with_state(ctx.logout_state());

    api.merge(login)
        .merge(logout)
        // Runs after routing so the matched template is available
        .route_layer(middleware::from_fn(app_middleware::track_metrics))
        // Middleware stack (request flow: body limit -> request id -> trace
        // -> cors -> compression -> readiness gate -> session)
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            app_middleware::session_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            app_middleware::readiness_middleware,
        ))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    // Skip creating a span for browser favicon requests to avoid noisy logs
                    if req.uri().path() == "/favicon.ico" {
                        return tracing::span!(tracing::Level::TRACE, "noop");
                    }
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %method,
                        http.target = %uri,
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        if let Some(meta) = span.metadata()
                            && meta.name() != "noop"
                        {
                            tracing::info!(
                                http.status = %res.status().as_u16(),
                                elapsed_ms = %latency.as_millis(),
                                "request handled"
                            );
                        }
                    },
                ),
        )
        // Outside the trace layer so generated ids land in the span
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    ctx: Arc<AppContext>,
}

impl ServerBuilder {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            addr: ctx.config.current().addr(),
            ctx,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn build(self) -> TesseraServer {
        let app = build_app(self.ctx.clone());

        TesseraServer {
            addr: self.addr,
            ctx: self.ctx,
            app,
        }
    }
}

impl TesseraServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;
        self.ctx.shutdown();
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
