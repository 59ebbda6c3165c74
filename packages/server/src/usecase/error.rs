//! UseCase 層のエラー型

use thiserror::Error;

use studyroom_shared::protocol::dto::{AckErrorBody, AckErrorDto, JoinRoomFailureResponse};

use crate::domain::{MessagePushError, RepositoryError, RoomError};

/// 接続時のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("user '{0}' is already connected")]
    DuplicateUserId(String),

    #[error(transparent)]
    Push(MessagePushError),
}

/// ルーム内の操作のエラー。ACK の `{ "error": {...} }` として返される
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UseCaseError {
    #[error(transparent)]
    Room(#[from] RoomError),

    #[error("room '{0}' not found")]
    RoomNotFound(String),

    #[error("join a waiting room first")]
    NoRoom,

    #[error("already in room '{0}'")]
    AlreadyInRoom(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("'{0}' cannot be sent by a client")]
    UnexpectedEvent(String),

    #[error(transparent)]
    Push(#[from] MessagePushError),

    #[error("failed to encode message: {0}")]
    Encode(String),
}

impl From<RepositoryError> for UseCaseError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::RoomNotFound(id) | RepositoryError::RoomAlreadyExists(id) => {
                UseCaseError::RoomNotFound(id)
            }
            RepositoryError::Room(e) => UseCaseError::Room(e),
        }
    }
}

impl From<serde_json::Error> for UseCaseError {
    fn from(error: serde_json::Error) -> Self {
        UseCaseError::Encode(error.to_string())
    }
}

impl UseCaseError {
    /// Machine-readable `type` of the rejection on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            UseCaseError::Room(e) => e.kind(),
            UseCaseError::RoomNotFound(_) => "room-not-found",
            UseCaseError::NoRoom => "no-room",
            UseCaseError::AlreadyInRoom(_) => "already-in-room",
            UseCaseError::InvalidPayload(_) => "invalid-payload",
            UseCaseError::UnexpectedEvent(_) => "unexpected-event",
            UseCaseError::Push(_) => "push-failed",
            UseCaseError::Encode(_) => "internal",
        }
    }

    pub fn to_ack_body(&self) -> AckErrorBody {
        AckErrorBody {
            error: AckErrorDto {
                r#type: self.kind().to_string(),
                message: Some(self.to_string()),
            },
        }
    }

    /// `join-room` answers admission refusals in its own type-discriminated shape
    pub fn to_join_rejection(&self) -> Option<JoinRoomFailureResponse> {
        match self {
            UseCaseError::Room(e @ (RoomError::BadPassword | RoomError::Full | RoomError::Blocked)) => {
                Some(JoinRoomFailureResponse {
                    r#type: e.kind().to_string(),
                    message: Some(e.to_string()),
                })
            }
            _ => None,
        }
    }
}
