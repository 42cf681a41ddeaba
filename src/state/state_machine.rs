use thiserror::Error;

use crate::state::game::GameStatus;

/// Events that move a game through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// Players are seated; drawing begins.
    Start,
    /// The game is over, either after play or abandoned from the lobby.
    Finish,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from}")]
pub struct InvalidTransition {
    /// The status the game was in when the invalid event was received.
    pub from: GameStatus,
    /// The event that cannot be applied from this status.
    pub event: StatusEvent,
}

/// Compute the status reached by applying `event` to `from`.
pub fn next_status(from: GameStatus, event: StatusEvent) -> Result<GameStatus, InvalidTransition> {
    let next = match (from, event) {
        (GameStatus::Waiting, StatusEvent::Start) => GameStatus::InProgress,
        (GameStatus::Waiting, StatusEvent::Finish) => GameStatus::Finished,
        (GameStatus::InProgress, StatusEvent::Finish) => GameStatus::Finished,
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}
