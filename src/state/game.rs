use std::{
    fmt,
    time::{Instant, SystemTime},
};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::{GameEntity, PlayerEntity};

/// Opaque unique key of a game.
pub type GameId = Uuid;
/// Transport-level identity of a live WebSocket session.
pub type ConnectionId = Uuid;

/// Identifier supplied by the client to name the user behind a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap an already validated identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lifecycle status of a bingo game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Lobby is open and players may join.
    Waiting,
    /// Numbers are being drawn.
    InProgress,
    /// The game is over; it stays listed until deleted.
    Finished,
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

/// Membership record of a user inside a game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// User owning this seat.
    pub user_id: UserId,
    /// Live connection, `None` while the user is disconnected but not yet removed.
    pub connection_id: Option<ConnectionId>,
    /// When the user first joined the game.
    pub joined_at: SystemTime,
    /// Set when the connection dropped; compared by the grace timer before removal.
    pub disconnected_at: Option<Instant>,
}

impl Player {
    /// Build a freshly joined, connected player.
    pub fn new(user_id: UserId, connection_id: ConnectionId) -> Self {
        Self {
            user_id,
            connection_id: Some(connection_id),
            joined_at: SystemTime::now(),
            disconnected_at: None,
        }
    }

    /// Whether a live connection is currently attached.
    pub fn is_connected(&self) -> bool {
        self.connection_id.is_some()
    }
}

/// Aggregated state of a single bingo game held by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    /// Primary key of the game.
    pub id: GameId,
    /// Players in join order; never holds the same user twice.
    pub players: Vec<Player>,
    /// Current lifecycle status.
    pub status: GameStatus,
    /// Creation timestamp.
    pub created_at: SystemTime,
}

impl Game {
    /// Allocate an empty game waiting for players.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            players: Vec::new(),
            status: GameStatus::Waiting,
            created_at: SystemTime::now(),
        }
    }

    /// Look up the player record of `user_id`.
    pub fn player(&self, user_id: &UserId) -> Option<&Player> {
        self.players.iter().find(|player| &player.user_id == user_id)
    }

    /// Mutable variant of [`Game::player`].
    pub fn player_mut(&mut self, user_id: &UserId) -> Option<&mut Player> {
        self.players
            .iter_mut()
            .find(|player| &player.user_id == user_id)
    }

    /// Whether `user_id` already holds a seat.
    pub fn has_player(&self, user_id: &UserId) -> bool {
        self.player(user_id).is_some()
    }

    /// Connections of players currently attached to this game.
    pub fn connected_players(&self) -> impl Iterator<Item = (&UserId, ConnectionId)> {
        self.players
            .iter()
            .filter_map(|player| player.connection_id.map(|conn| (&player.user_id, conn)))
    }

    /// True when every user id appears at most once.
    pub(crate) fn members_are_unique(&self) -> bool {
        self.players.iter().enumerate().all(|(index, player)| {
            self.players[index + 1..]
                .iter()
                .all(|other| other.user_id != player.user_id)
        })
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&Game> for GameEntity {
    fn from(value: &Game) -> Self {
        Self {
            id: value.id,
            status: value.status,
            created_at: value.created_at,
            updated_at: SystemTime::now(),
            players: value
                .players
                .iter()
                .map(|player| PlayerEntity {
                    user_id: player.user_id.to_string(),
                    joined_at: player.joined_at,
                })
                .collect(),
        }
    }
}

impl Game {
    /// Rebuild a game from storage; every restored seat starts disconnected at `now`.
    pub fn restored(entity: GameEntity, now: Instant) -> Self {
        let mut players: Vec<Player> = Vec::with_capacity(entity.players.len());
        for player in entity.players {
            let user_id = UserId::new(player.user_id);
            if players.iter().any(|existing| existing.user_id == user_id) {
                continue;
            }
            players.push(Player {
                user_id,
                connection_id: None,
                joined_at: player.joined_at,
                disconnected_at: Some(now),
            });
        }

        Self {
            id: entity.id,
            players,
            status: entity.status,
            created_at: entity.created_at,
        }
    }
}
