use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::{
    dao::storage::StorageError,
    dto::ws::ErrorPayload,
    state::{presence::PresenceError, registry::RegistryError, state_machine::InvalidTransition},
};

/// Stable error category exposed to clients so they can branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Referenced game or player is absent.
    NotFound,
    /// Duplicate join of a connected member.
    AlreadyMember,
    /// Missing or invalid user identity.
    Unauthorized,
    /// Operation disallowed in the current game status.
    InvalidState,
    /// Frame could not be parsed or validated.
    InvalidInput,
    /// A resource limit or backend prevented the operation.
    Unavailable,
}

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// A configured resource limit was hit.
    #[error("resource exhausted: {0}")]
    Exhausted(String),
    /// Missing or invalid user identity.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// The user already holds a seat in the game.
    #[error("already member: {0}")]
    AlreadyMember(String),
}

impl ServiceError {
    /// Wire category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Unavailable(_) | ServiceError::Exhausted(_) => ErrorKind::Unavailable,
            ServiceError::Unauthorized(_) => ErrorKind::Unauthorized,
            ServiceError::InvalidInput(_) => ErrorKind::InvalidInput,
            ServiceError::InvalidState(_) => ErrorKind::InvalidState,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::AlreadyMember(_) => ErrorKind::AlreadyMember,
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<RegistryError> for ServiceError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::GameNotFound(_) | RegistryError::PlayerNotFound { .. } => {
                ServiceError::NotFound(err.to_string())
            }
            RegistryError::AlreadyMember { .. } => ServiceError::AlreadyMember(err.to_string()),
            RegistryError::Exhausted { .. } => ServiceError::Exhausted(err.to_string()),
        }
    }
}

impl From<PresenceError> for ServiceError {
    fn from(err: PresenceError) -> Self {
        match err {
            PresenceError::UnknownConnection(_) => ServiceError::InvalidState(err.to_string()),
            PresenceError::UserMismatch { .. } => ServiceError::Unauthorized(err.to_string()),
        }
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

impl ErrorKind {
    /// HTTP status used when the error answers a REST request.
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::AlreadyMember | ErrorKind::InvalidState => StatusCode::CONFLICT,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// [`ServiceError`] answered over HTTP, with the body of the WebSocket `error` event.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct AppError(#[from] ServiceError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let payload = ErrorPayload::from(&self.0);
        (payload.kind.status(), Json(payload)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::state::game::UserId;

    #[test]
    fn registry_errors_map_to_wire_kinds() {
        let game_id = Uuid::new_v4();
        let cases = [
            (RegistryError::GameNotFound(game_id), ErrorKind::NotFound),
            (
                RegistryError::PlayerNotFound {
                    game_id,
                    user_id: UserId::from("u1"),
                },
                ErrorKind::NotFound,
            ),
            (
                RegistryError::AlreadyMember {
                    game_id,
                    user_id: UserId::from("u1"),
                },
                ErrorKind::AlreadyMember,
            ),
            (RegistryError::Exhausted { limit: 3 }, ErrorKind::Unavailable),
        ];

        for (err, kind) in cases {
            assert_eq!(ServiceError::from(err).kind(), kind);
        }
    }

    #[test]
    fn user_mismatch_is_unauthorized() {
        let err: ServiceError = PresenceError::UserMismatch {
            bound: UserId::from("a"),
            requested: UserId::from("b"),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn rest_errors_share_the_websocket_body() {
        let response = AppError::from(ServiceError::NotFound("game".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["kind"], "not_found");
        assert_eq!(value["message"], "not found: game");
    }

    #[test]
    fn limits_and_storage_answer_503() {
        let err = ServiceError::Exhausted("max games".into());
        assert_eq!(err.kind().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
