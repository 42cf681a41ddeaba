use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod games;
pub mod health;
pub mod sse;
pub mod websocket;

/// Lobby HTTP surface: WebSocket upgrade, read-only REST, SSE feed and API docs.
pub fn router(state: SharedState) -> Router<()> {
    Router::new()
        .merge(websocket::router())
        .merge(games::router())
        .merge(sse::router())
        .merge(health::router())
        .merge(docs::router())
        .with_state(state)
}
