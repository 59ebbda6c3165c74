//! Domain logic for client-side operations.
//!
//! This module contains pure functions that implement business logic
//! without side effects, making them easy to test.

use crate::domain::{DisconnectReason, RoomState, StudyRoomState, WaitingRoomState};

/// How one interactive session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// `/quit` or end of input
    Quit,
    /// The socket dropped or the connect failed; worth retrying
    ConnectionLost,
    /// The room ended the session; retrying would not help
    Ended(String),
}

/// Classify a published state as the end of a session.
///
/// # Returns
///
/// `None` while the session is still running
pub fn outcome_of(state: &RoomState) -> Option<SessionOutcome> {
    match state {
        RoomState::Disconnected {
            reason: Some(DisconnectReason::UserRequested | DisconnectReason::Disposed),
        } => Some(SessionOutcome::Quit),
        RoomState::Disconnected {
            reason: Some(DisconnectReason::SocketClosed),
        } => Some(SessionOutcome::ConnectionLost),
        RoomState::Disconnected {
            reason: Some(reason),
        } => Some(SessionOutcome::Ended(reason.label().to_string())),
        RoomState::WaitingRoom(WaitingRoomState::FailedToConnect { .. })
        | RoomState::StudyRoom(StudyRoomState::Disconnected { .. }) => {
            Some(SessionOutcome::ConnectionLost)
        }
        RoomState::StudyRoom(StudyRoomState::Error { message }) => {
            Some(SessionOutcome::Ended(message.clone()))
        }
        _ => None,
    }
}

/// Check if the client should attempt to reconnect.
///
/// # Arguments
///
/// * `outcome` - How the last session ended
/// * `current_attempt` - The current reconnection attempt count (0-indexed)
/// * `max_attempts` - The maximum number of reconnection attempts allowed
pub fn should_attempt_reconnect(
    outcome: &SessionOutcome,
    current_attempt: u32,
    max_attempts: u32,
) -> bool {
    match outcome {
        SessionOutcome::ConnectionLost => current_attempt < max_attempts,
        SessionOutcome::Quit | SessionOutcome::Ended(_) => false,
    }
}
