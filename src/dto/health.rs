use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Games currently held by the registry.
    pub games: usize,
    /// Live WebSocket connections.
    pub connections: usize,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(games: usize, connections: usize) -> Self {
        Self {
            status: "ok".to_string(),
            games,
            connections,
        }
    }

    /// Create a health response indicating the storage backend is unreachable.
    pub fn degraded(games: usize, connections: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            games,
            connections,
        }
    }
}
