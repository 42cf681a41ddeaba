use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report lobby counters and whether storage is reachable.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    if let Some(store) = state.game_store().await {
        if let Err(err) = store.health_check().await {
            warn!(error = %err, "storage health check failed");
        }
    } else if state.config().storage.enabled() {
        warn!("storage unavailable (degraded mode)");
    }

    let games = state.registry().read().await.len();
    let connections = state.connections().len();
    if state.is_degraded() {
        HealthResponse::degraded(games, connections)
    } else {
        HealthResponse::ok(games, connections)
    }
}
