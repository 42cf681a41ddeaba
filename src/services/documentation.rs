use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the bingo lobby backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::games::list_games,
        crate::routes::games::get_game,
        crate::routes::sse::lobby_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::game::GameView,
            crate::dto::game::PlayerView,
            crate::dto::game::PlayerEvent,
            crate::dto::game::StatusChange,
            crate::dto::ws::GameRef,
            crate::dto::ws::JoinGame,
            crate::dto::ws::PlayerRef,
            crate::dto::ws::ErrorPayload,
            crate::dto::sse::Handshake,
            crate::error::ErrorKind,
            crate::state::game::GameStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "games", description = "Read-only lobby snapshots"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "lobby", description = "WebSocket session protocol for lobby clients"),
    )
)]
/// OpenAPI document of the lobby HTTP surface.
pub struct ApiDoc;
