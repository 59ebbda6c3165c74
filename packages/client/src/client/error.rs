//! Error types of the CLI client.

use thiserror::Error;

use crate::error::{ChannelError, SessionError};

/// CLI-specific errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server URL or user id could not be used
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A typed line is not a valid command
    #[error("{0}")]
    InvalidCommand(String),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// Every reconnect attempt failed
    #[error("gave up after {0} reconnect attempts")]
    ReconnectExhausted(u32),

    /// The room ended the session (kicked, blocked, protocol violation)
    #[error("session ended: {0}")]
    Ended(String),
}
