//! Room session states published to the UI.

use super::{
    entity::{ChatMessage, PeerOverview, PomodoroTimer, WaitingRoomData},
    registry::PeerMediaRegistry,
    value_object::{RoomId, UserId},
};

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called
    UserRequested,
    Kicked,
    Blocked,
    SocketClosed,
    ProtocolViolation,
    /// Every handle was dropped
    Disposed,
}

impl DisconnectReason {
    pub fn label(&self) -> &'static str {
        match self {
            DisconnectReason::UserRequested => "left the room",
            DisconnectReason::Kicked => "kicked by the room master",
            DisconnectReason::Blocked => "blocked by the room master",
            DisconnectReason::SocketClosed => "connection closed",
            DisconnectReason::ProtocolViolation => "protocol violation",
            DisconnectReason::Disposed => "session disposed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingRoom {
    pub room_id: RoomId,
    pub data: WaitingRoomData,
    /// A `join-room` request is in flight
    pub joining: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitingRoomState {
    Connected(WaitingRoom),
    /// Retryable with `connect`
    FailedToConnect { room_id: RoomId, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyRoom {
    pub room_id: RoomId,
    pub me: UserId,
    pub master_id: UserId,
    pub peers: PeerMediaRegistry,
    pub timer: PomodoroTimer,
    /// Arrival order, never re-sorted
    pub chat: Vec<ChatMessage>,
    pub blacklist: Vec<PeerOverview>,
    pub microphone_enabled: bool,
    pub video_enabled: bool,
    pub headset_muted: bool,
}

impl StudyRoom {
    pub fn is_master(&self) -> bool {
        self.me == self.master_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudyRoomState {
    Active(StudyRoom),
    /// The socket dropped; retryable with `connect`
    Disconnected { room_id: RoomId },
    /// Terminal
    Error { message: String },
}

/// Lifecycle of one room session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomState {
    Disconnected { reason: Option<DisconnectReason> },
    Connecting { room_id: RoomId },
    WaitingRoom(WaitingRoomState),
    StudyRoom(StudyRoomState),
}

impl RoomState {
    /// Initial state of a fresh session
    pub fn initial() -> Self {
        RoomState::Disconnected { reason: None }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RoomState::Disconnected { .. } => "disconnected",
            RoomState::Connecting { .. } => "connecting",
            RoomState::WaitingRoom(WaitingRoomState::Connected(_)) => "in the waiting room",
            RoomState::WaitingRoom(WaitingRoomState::FailedToConnect { .. }) => {
                "failed to connect"
            }
            RoomState::StudyRoom(StudyRoomState::Active(_)) => "in the study room",
            RoomState::StudyRoom(StudyRoomState::Disconnected { .. }) => {
                "disconnected from the study room"
            }
            RoomState::StudyRoom(StudyRoomState::Error { .. }) => "in an error state",
        }
    }

    /// `connect` is accepted from these states
    pub fn can_connect(&self) -> bool {
        matches!(
            self,
            RoomState::Disconnected { .. }
                | RoomState::WaitingRoom(WaitingRoomState::FailedToConnect { .. })
                | RoomState::StudyRoom(StudyRoomState::Disconnected { .. })
        )
    }

    pub fn waiting_room(&self) -> Option<&WaitingRoom> {
        match self {
            RoomState::WaitingRoom(WaitingRoomState::Connected(room)) => Some(room),
            _ => None,
        }
    }

    pub fn study_room(&self) -> Option<&StudyRoom> {
        match self {
            RoomState::StudyRoom(StudyRoomState::Active(room)) => Some(room),
            _ => None,
        }
    }
}

/// One-shot notification for the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    /// Dismissible message, with optional server-provided detail
    Message { text: String, detail: Option<String> },
    Disconnected { reason: DisconnectReason },
}

impl SideEffect {
    pub fn message(text: impl Into<String>, detail: Option<String>) -> Self {
        SideEffect::Message {
            text: text.into(),
            detail,
        }
    }
}
