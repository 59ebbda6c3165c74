//! ドメイン層のエラー型

use thiserror::Error;

/// Room の不変条件に違反する操作
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("the room password is incorrect")]
    BadPassword,

    #[error("the study room is full")]
    Full,

    #[error("user is blocked from this room")]
    Blocked,

    #[error("only the room master can do this")]
    NotMaster,

    #[error("user '{0}' is not in the study room")]
    NotInRoom(String),

    #[error("invalid timer property: {0}")]
    InvalidTimerProperty(String),

    #[error("unknown producer '{0}'")]
    UnknownProducer(String),

    #[error("unknown user '{0}'")]
    UnknownUser(String),
}

impl RoomError {
    /// Machine-readable `type` of the rejection on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            RoomError::BadPassword => "bad-password",
            RoomError::Full => "room-full",
            RoomError::Blocked => "blocked",
            RoomError::NotMaster => "not-master",
            RoomError::NotInRoom(_) => "not-in-room",
            RoomError::InvalidTimerProperty(_) => "invalid-timer-property",
            RoomError::UnknownProducer(_) => "unknown-producer",
            RoomError::UnknownUser(_) => "unknown-user",
        }
    }
}

/// Repository のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("room '{0}' not found")]
    RoomNotFound(String),

    #[error("room '{0}' already exists")]
    RoomAlreadyExists(String),

    #[error(transparent)]
    Room(#[from] RoomError),
}

/// MessagePusher のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagePushError {
    #[error("client '{0}' not found")]
    ClientNotFound(String),

    #[error("client '{0}' is already connected")]
    AlreadyRegistered(String),

    #[error("failed to push message: {0}")]
    PushFailed(String),
}
