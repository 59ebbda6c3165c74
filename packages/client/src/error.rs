//! Error types of the session engine.

use std::fmt;

use studyroom_shared::protocol::{EventName, MediaKind};
use thiserror::Error;

use crate::domain::{TimerPropertyError, ValueObjectError};

/// Transport channel errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The socket could not be established
    #[error("connection error: {0}")]
    Connect(String),

    /// No acknowledgement arrived within the configured bound
    #[error("timed out waiting for the server")]
    Timeout,

    /// The channel went away while the call was in flight
    #[error("channel disconnected")]
    Disconnected,

    /// The channel has not been connected yet
    #[error("channel is not connected")]
    NotConnected,

    /// A frame could not be written
    #[error("failed to send frame: {0}")]
    Send(String),
}

/// The server explicitly rejected a request (wrong password, room full, ...)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("request rejected by server: {kind}")]
pub struct FailureResponse {
    /// Machine-readable rejection type (e.g. `bad-password`)
    pub kind: String,
    /// Optional server-provided detail
    pub message: Option<String>,
}

/// Malformed or undecodable payloads
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown event '{0}'")]
    UnknownEvent(String),

    #[error("event '{0}' is not expected from the server")]
    UnexpectedEvent(EventName),

    #[error("malformed '{context}' payload: {reason}")]
    Malformed { context: String, reason: String },

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),
}

impl From<ValueObjectError> for ProtocolError {
    fn from(error: ValueObjectError) -> Self {
        ProtocolError::InvalidValue(error.to_string())
    }
}

/// Step of a media negotiation sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationStep {
    Load,
    TransportCreate,
    TransportConnect,
    Produce,
    Consume,
    Resume,
}

impl fmt::Display for NegotiationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            NegotiationStep::Load => "load",
            NegotiationStep::TransportCreate => "transport-create",
            NegotiationStep::TransportConnect => "transport-connect",
            NegotiationStep::Produce => "produce",
            NegotiationStep::Consume => "consume",
            NegotiationStep::Resume => "resume",
        };
        f.write_str(step)
    }
}

/// Media signaling errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// A step of a negotiation sequence failed; the whole sequence was rolled back
    #[error("media negotiation failed at {step}: {reason}")]
    Negotiation {
        step: NegotiationStep,
        reason: String,
    },

    /// A produce call for this kind is still pending
    #[error("a {0} produce call is already in progress")]
    AlreadyInProgress(MediaKind),

    /// The device has not been loaded with router capabilities yet
    #[error("media device is not loaded")]
    NotLoaded,

    /// The adapter has been released for this session
    #[error("media adapter has been released")]
    Released,
}

impl MediaError {
    pub(crate) fn negotiation(step: NegotiationStep, reason: impl fmt::Display) -> Self {
        MediaError::Negotiation {
            step,
            reason: reason.to_string(),
        }
    }
}

/// Errors surfaced by the session command surface
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Rejected(#[from] FailureResponse),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    InvalidTimerProperty(#[from] TimerPropertyError),

    /// Re-entrancy guard: the same operation is still pending
    #[error("{0} is already in progress")]
    AlreadyInProgress(&'static str),

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("only the room master can {0}")]
    NotMaster(&'static str),

    #[error("no media engine is available")]
    MediaUnavailable,

    #[error("chat message is empty")]
    EmptyMessage,

    #[error("operation was cancelled")]
    Cancelled,

    #[error("the session has been closed")]
    SessionClosed,
}
