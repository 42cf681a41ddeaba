use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::state::game::GameStatus;

/// Seat of a user inside a persisted game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Identifier chosen by the client for the user.
    pub user_id: String,
    /// When the user first joined the game.
    pub joined_at: SystemTime,
}

/// Aggregate game entity persisted by the storage layer.
///
/// Connection bindings are transient and never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameEntity {
    /// Primary key of the game.
    pub id: Uuid,
    /// Lifecycle status at the time of the write.
    pub status: GameStatus,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last time the game entity was written.
    pub updated_at: SystemTime,
    /// Seats in join order.
    pub players: Vec<PlayerEntity>,
}
