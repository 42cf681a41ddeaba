use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::rfc3339,
    state::game::{Game, GameId, GameStatus, Player, UserId},
};

/// Wire representation of a game shared by lobby lists and game pushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameView {
    /// Game identifier.
    pub id: Uuid,
    /// Seats in join order.
    pub players: Vec<PlayerView>,
    /// Lifecycle status.
    pub status: GameStatus,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// Wire representation of a seat inside a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    /// Seat occupant.
    #[schema(value_type = String)]
    pub user_id: UserId,
    /// RFC 3339 join timestamp.
    pub joined_at: String,
    /// False while the player is inside the reconnect grace period.
    pub connected: bool,
}

/// A player event scoped to the game it happened in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerEvent {
    /// Game the seat belongs to.
    pub game_id: Uuid,
    /// The seat, flattened next to `gameId`.
    #[serde(flatten)]
    pub player: PlayerView,
}

/// Status change announced to every lobby client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    /// Game whose status changed.
    pub game_id: Uuid,
    /// New status.
    pub status: GameStatus,
}

impl From<&Player> for PlayerView {
    fn from(player: &Player) -> Self {
        Self {
            user_id: player.user_id.clone(),
            joined_at: rfc3339(player.joined_at),
            connected: player.is_connected(),
        }
    }
}

impl From<&Game> for GameView {
    fn from(game: &Game) -> Self {
        Self {
            id: game.id,
            players: game.players.iter().map(PlayerView::from).collect(),
            status: game.status,
            created_at: rfc3339(game.created_at),
        }
    }
}

impl From<Game> for GameView {
    fn from(game: Game) -> Self {
        (&game).into()
    }
}

impl PlayerEvent {
    /// Tag a player view with the game it belongs to.
    pub fn new(game_id: GameId, player: &Player) -> Self {
        Self {
            game_id,
            player: player.into(),
        }
    }
}
