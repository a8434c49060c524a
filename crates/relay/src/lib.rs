pub mod api;
pub mod auth;
pub mod config;
pub mod cors;
pub mod error;
pub mod events;
pub mod fanout;
pub mod hub;
pub mod metrics;
pub mod notifications;
pub mod presence;
pub mod registry;
pub mod validation;
pub mod ws;

use std::{sync::Arc, time::Instant};

use anyhow::Context;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tracing::{error, info};

use crate::auth::{hook::HookSecret, jwt::JwtAccessTokenService};
use crate::config::RelayConfig;
use crate::error::{
    attach_request_id_header, request_id_from_headers_or_generate, with_request_id_scope,
    ErrorCode, RelayError,
};
use crate::hub::{RealtimeHub, SessionLimits};
use crate::metrics::RelayMetrics;
use crate::validation::MAX_REST_BODY_BYTES;

/// Builds the hub and the full HTTP application for `config`.
pub fn build_app(config: &RelayConfig) -> anyhow::Result<(Router, RealtimeHub)> {
    let jwt_service = Arc::new(
        JwtAccessTokenService::new(&config.jwt_secret).context("invalid relay JWT secret")?,
    );
    let hook_secret = config
        .hook_secret
        .as_deref()
        .map(HookSecret::new)
        .transpose()
        .context("invalid relay hook secret")?
        .map(Arc::new);
    metrics::set_global_metrics(Arc::new(RelayMetrics::default()));

    let hub = RealtimeHub::new(SessionLimits::from(config));
    let app = build_router(hub.clone(), jwt_service, hook_secret, config.cors_origins.as_deref());
    Ok((app, hub))
}

pub fn build_router(
    hub: RealtimeHub,
    jwt_service: Arc<JwtAccessTokenService>,
    hook_secret: Option<Arc<HookSecret>>,
    cors_origins: Option<&str>,
) -> Router {
    apply_middleware(
        Router::new()
            .route("/healthz", get(healthz))
            .route("/metrics", get(render_metrics))
            .merge(ws::router(hub.clone()))
            .merge(api::router(hub, jwt_service, hook_secret)),
    )
    .layer(cors::cors_layer(cors_origins))
}

pub fn apply_middleware(router: Router) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn(panic_handler))
            .layer(middleware::from_fn(request_context_middleware))
            .layer(DefaultBodyLimit::max(MAX_REST_BODY_BYTES)),
    )
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn render_metrics() -> Response {
    let body = metrics::global_metrics()
        .map(|metrics| metrics.render_prometheus())
        .unwrap_or_default();
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response()
}

async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            RelayError::from_code(ErrorCode::InternalError).into_response()
        }
    }
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request_id_from_headers_or_generate(request.headers());

    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response = with_request_id_scope(request_id.clone(), next.run(request)).await;
    attach_request_id_header(&mut response, &request_id);

    let latency_ms = started_at.elapsed().as_millis() as u64;
    if let Some(metrics) = metrics::global_metrics() {
        metrics.record_http_request(method.as_str(), &path, response.status().as_u16(), latency_ms);
    }

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms,
        "request completed"
    );

    response
}
