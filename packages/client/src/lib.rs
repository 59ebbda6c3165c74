//! Study room session engine.
//!
//! Client-side counterpart of the study room SFU signaling protocol: a room
//! state machine (waiting room → study room) driving media negotiation,
//! peers, the shared pomodoro timer and chat over one WebSocket.

// layers
pub mod domain;
pub mod infrastructure;
pub mod session;

// CLI front-end
pub mod client;

pub mod error;

#[cfg(test)]
mod testing;

pub use error::{
    ChannelError, FailureResponse, MediaError, NegotiationStep, ProtocolError, SessionError,
};
pub use session::{RoomSessionHandle, SessionConfig};
