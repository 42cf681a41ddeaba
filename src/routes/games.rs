use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::{game::GameView, ws::ErrorPayload},
    error::AppError,
    services::lobby_service,
    state::SharedState,
};

/// Read-only lobby snapshots.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/games", get(list_games))
        .route("/games/{id}", get(get_game))
}

#[utoipa::path(
    get,
    path = "/games",
    tag = "games",
    responses((status = 200, description = "Every game in creation order", body = [GameView]))
)]
/// Return every game currently held by the lobby.
pub async fn list_games(State(state): State<SharedState>) -> Json<Vec<GameView>> {
    Json(lobby_service::list_games(&state).await)
}

#[utoipa::path(
    get,
    path = "/games/{id}",
    tag = "games",
    params(("id" = Uuid, Path, description = "Game identifier")),
    responses(
        (status = 200, description = "Game snapshot", body = GameView),
        (status = 404, description = "Unknown game", body = ErrorPayload)
    )
)]
/// Return a single game with its players.
pub async fn get_game(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GameView>, AppError> {
    let game = lobby_service::get_game(&state, id).await?;
    Ok(Json(game))
}
