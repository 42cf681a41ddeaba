use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::{
        game::{GameView, PlayerEvent, StatusChange},
        validation::validate_user_id,
    },
    error::{ErrorKind, ServiceError},
    state::game::{GameId, UserId},
};

/// Events accepted from lobby WebSocket clients.
///
/// Frames look like `{"event": "join_game", "data": {"gameId": "…", "userId": "…"}}`;
/// `data` is omitted for events without payload.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    ViewGames,
    CreateGame,
    DeleteGame(GameRef),
    JoinGame(JoinGame),
    RemovePlayer(PlayerRef),
    LeaveGame(GameRef),
    StartGame(GameRef),
    FinishGame(GameRef),
}

/// Payload naming a game.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameRef {
    /// Target game identifier.
    pub game_id: String,
}

/// Payload of a join request.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinGame {
    /// Game to join.
    pub game_id: String,
    /// Identity taking the seat.
    #[serde(default)]
    pub user_id: String,
}

/// Payload naming a seat inside a game.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRef {
    /// Game holding the seat.
    pub game_id: String,
    /// Occupant of the seat.
    pub user_id: String,
}

impl Validate for JoinGame {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_user_id(&self.user_id) {
            errors.add("user_id", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Validate for PlayerRef {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_user_id(&self.user_id) {
            errors.add("user_id", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl ClientMessage {
    /// Parse a text frame and validate its payload.
    ///
    /// An invalid identity on `join_game` is reported as unauthorized; any
    /// other malformed frame is invalid input.
    pub fn from_json_str(text: &str) -> Result<Self, ServiceError> {
        let message: Self = serde_json::from_str(text)
            .map_err(|err| ServiceError::InvalidInput(format!("malformed message: {err}")))?;

        match &message {
            Self::JoinGame(payload) => payload
                .validate()
                .map_err(|err| ServiceError::Unauthorized(format!("invalid user identity: {err}")))?,
            Self::RemovePlayer(payload) => payload
                .validate()
                .map_err(|err| ServiceError::InvalidInput(format!("invalid player reference: {err}")))?,
            _ => {}
        }

        Ok(message)
    }

    /// Wire name of the event, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ViewGames => "view_games",
            Self::CreateGame => "create_game",
            Self::DeleteGame(_) => "delete_game",
            Self::JoinGame(_) => "join_game",
            Self::RemovePlayer(_) => "remove_player",
            Self::LeaveGame(_) => "leave_game",
            Self::StartGame(_) => "start_game",
            Self::FinishGame(_) => "finish_game",
        }
    }
}

/// Events pushed from the server to lobby clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full lobby snapshot, answer to `view_games`.
    GamesList(Vec<GameView>),
    /// A game was created; sent to everyone.
    GameCreated(GameView),
    /// A game was deleted; sent to everyone.
    GameDeleted(GameId),
    /// The requester is now seated in this game.
    GameJoined(GameView),
    /// Another player took a seat in a game the recipient belongs to.
    PlayerJoined(PlayerEvent),
    /// A disconnected player came back.
    PlayerReconnected(UserId),
    /// A player's connection dropped.
    PlayerDisconnected(UserId),
    /// A player lost their seat.
    PlayerRemoved(PlayerEvent),
    /// A game moved to a new status; sent to everyone.
    GameStatusChanged(StatusChange),
    /// An operation of the recipient failed.
    Error(ErrorPayload),
}

impl ServerMessage {
    /// Wire name of the event, used for SSE event names and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GamesList(_) => "games_list",
            Self::GameCreated(_) => "game_created",
            Self::GameDeleted(_) => "game_deleted",
            Self::GameJoined(_) => "game_joined",
            Self::PlayerJoined(_) => "player_joined",
            Self::PlayerReconnected(_) => "player_reconnected",
            Self::PlayerDisconnected(_) => "player_disconnected",
            Self::PlayerRemoved(_) => "player_removed",
            Self::GameStatusChanged(_) => "game_status_changed",
            Self::Error(_) => "error",
        }
    }
}

/// Error details sent back to the originating connection only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ErrorPayload {
    /// Human-readable reason.
    pub message: String,
    /// Category clients branch on.
    pub kind: ErrorKind,
}

impl From<&ServiceError> for ErrorPayload {
    fn from(err: &ServiceError) -> Self {
        Self {
            message: err.to_string(),
            kind: err.kind(),
        }
    }
}
