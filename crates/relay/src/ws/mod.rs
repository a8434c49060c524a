pub mod handler;
pub mod protocol;
mod session;

use axum::{
    extract::{State, WebSocketUpgrade},
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Router,
};

use crate::error::{request_id_from_headers_or_generate, with_request_id_scope};
use crate::hub::RealtimeHub;
use crate::validation::MAX_WS_FRAME_BYTES;

/// Hard cap enforced by the transport. Frames between this and
/// [`MAX_WS_FRAME_BYTES`] get an error reply instead of a disconnect.
const MAX_TRANSPORT_MESSAGE_BYTES: usize = MAX_WS_FRAME_BYTES * 4;

/// Connections are anonymous until they send `user:join`; identity is
/// claimed in-band, so the upgrade itself is unauthenticated.
pub fn router(hub: RealtimeHub) -> Router {
    Router::new().route("/v1/ws", get(ws_upgrade)).with_state(hub)
}

async fn ws_upgrade(
    State(hub): State<RealtimeHub>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let request_id = request_id_from_headers_or_generate(&headers);
    ws.max_message_size(MAX_TRANSPORT_MESSAGE_BYTES).on_upgrade(move |socket| async move {
        with_request_id_scope(request_id, session::run_session(hub, socket)).await;
    })
}
