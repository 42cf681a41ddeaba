use uuid::Uuid;

use crate::{dto::game::GameView, error::ServiceError, state::SharedState};

/// Snapshot every game in creation order.
pub async fn list_games(state: &SharedState) -> Vec<GameView> {
    let registry = state.registry().read().await;
    registry.list_games().iter().map(GameView::from).collect()
}

/// Load a single game by identifier.
pub async fn get_game(state: &SharedState, id: Uuid) -> Result<GameView, ServiceError> {
    let registry = state.registry().read().await;
    let game = registry.get_game(id)?;
    Ok(game.into())
}
