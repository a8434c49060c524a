// REST surface over the realtime hub: presence status, the caller's
// notification log, and the hooks the task service calls after a mutation.

pub mod events;
pub mod notifications;

use std::sync::Arc;

use axum::{middleware, routing::get, Extension, Json, Router};
use tasklive_common::types::PresenceSnapshot;

use crate::{
    auth::{
        hook::{require_hook_secret, HookSecret},
        jwt::JwtAccessTokenService,
        middleware::{require_bearer_auth, AuthenticatedUser},
    },
    hub::RealtimeHub,
};

/// End-user routes take the caller's JWT. The `/v1/events/*` hooks take the
/// task service's credential instead and are only mounted when one is set.
pub fn router(
    hub: RealtimeHub,
    jwt_service: Arc<JwtAccessTokenService>,
    hook_secret: Option<Arc<HookSecret>>,
) -> Router {
    let user_routes = Router::new()
        .route("/v1/presence", get(presence))
        .merge(notifications::routes())
        .route_layer(middleware::from_fn_with_state(jwt_service, require_bearer_auth));

    let router = match hook_secret {
        Some(secret) => user_routes.merge(
            events::routes()
                .route_layer(middleware::from_fn_with_state(secret, require_hook_secret)),
        ),
        None => user_routes,
    };

    router.layer(Extension(hub))
}

async fn presence(
    Extension(hub): Extension<RealtimeHub>,
    Extension(_user): Extension<AuthenticatedUser>,
) -> Json<PresenceSnapshot> {
    Json(hub.presence_snapshot().await)
}
