//! Room namespace wire protocol.
//!
//! Every WebSocket text message is one JSON [`Frame`]:
//!
//! ```text
//! { "event": "join-room", "ack": 7, "data": { ... } }   client request
//! { "event": "mute-headset", "data": {} }                client emit
//! { "ack": 7, "data": { ... } }                          server acknowledgement
//! { "event": "new-producer", "data": { ... } }           server event
//! ```

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod dto;

/// Path of the room namespace on the signaling server.
pub const ROOM_NAMESPACE: &str = "/room";

/// Closed vocabulary of command and event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    JoinWaitingRoom,
    JoinRoom,
    CreateTransport,
    TransportProduce,
    TransportProducerConnected,
    TransportReceiverConnected,
    Consume,
    ConsumerResume,
    GetProducers,
    NewProducer,
    ProducerClosed,
    CloseVideoProducer,
    CloseAudioProducer,
    MuteHeadset,
    UnmuteHeadset,
    PeerStateChanged,
    OtherPeerJoined,
    OtherPeerExited,
    OtherPeerDisconnected,
    SendChat,
    StartTimer,
    StartShortBreak,
    StartLongBreak,
    EditAndStopTimer,
    KickUser,
    BlockUser,
    UnblockUser,
}

impl EventName {
    /// Every name of the vocabulary
    pub const ALL: [EventName; 27] = [
        EventName::JoinWaitingRoom,
        EventName::JoinRoom,
        EventName::CreateTransport,
        EventName::TransportProduce,
        EventName::TransportProducerConnected,
        EventName::TransportReceiverConnected,
        EventName::Consume,
        EventName::ConsumerResume,
        EventName::GetProducers,
        EventName::NewProducer,
        EventName::ProducerClosed,
        EventName::CloseVideoProducer,
        EventName::CloseAudioProducer,
        EventName::MuteHeadset,
        EventName::UnmuteHeadset,
        EventName::PeerStateChanged,
        EventName::OtherPeerJoined,
        EventName::OtherPeerExited,
        EventName::OtherPeerDisconnected,
        EventName::SendChat,
        EventName::StartTimer,
        EventName::StartShortBreak,
        EventName::StartLongBreak,
        EventName::EditAndStopTimer,
        EventName::KickUser,
        EventName::BlockUser,
        EventName::UnblockUser,
    ];

    /// Wire representation (kebab-case)
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::JoinWaitingRoom => "join-waiting-room",
            EventName::JoinRoom => "join-room",
            EventName::CreateTransport => "create-transport",
            EventName::TransportProduce => "transport-produce",
            EventName::TransportProducerConnected => "transport-producer-connected",
            EventName::TransportReceiverConnected => "transport-receiver-connected",
            EventName::Consume => "consume",
            EventName::ConsumerResume => "consumer-resume",
            EventName::GetProducers => "get-producers",
            EventName::NewProducer => "new-producer",
            EventName::ProducerClosed => "producer-closed",
            EventName::CloseVideoProducer => "close-video-producer",
            EventName::CloseAudioProducer => "close-audio-producer",
            EventName::MuteHeadset => "mute-headset",
            EventName::UnmuteHeadset => "unmute-headset",
            EventName::PeerStateChanged => "peer-state-changed",
            EventName::OtherPeerJoined => "other-peer-joined",
            EventName::OtherPeerExited => "other-peer-exited",
            EventName::OtherPeerDisconnected => "other-peer-disconnected",
            EventName::SendChat => "send-chat",
            EventName::StartTimer => "start-timer",
            EventName::StartShortBreak => "start-short-break",
            EventName::StartLongBreak => "start-long-break",
            EventName::EditAndStopTimer => "edit-and-stop-timer",
            EventName::KickUser => "kick-user",
            EventName::BlockUser => "block-user",
            EventName::UnblockUser => "unblock-user",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not part of the vocabulary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventName(pub String);

impl fmt::Display for UnknownEventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event name '{}'", self.0)
    }
}

impl std::error::Error for UnknownEventName {}

impl FromStr for EventName {
    type Err = UnknownEventName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| UnknownEventName(s.to_string()))
    }
}

/// Media kind of a track, producer or consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => f.write_str("audio"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

/// One message on the room socket.
///
/// `event` is kept as a raw string so that a frame carrying a name outside the
/// vocabulary still decodes; only that event is rejected later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
    #[serde(default)]
    pub data: Value,
}

/// Classification of a decoded [`Frame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Named frame expecting an acknowledgement
    Request,
    /// Named frame without acknowledgement
    Event,
    /// Acknowledgement of an earlier request
    Ack,
    /// Neither a name nor an acknowledgement id
    Invalid,
}

impl Frame {
    /// Named frame expecting an acknowledgement with the given id
    pub fn request(event: EventName, ack: u64, data: Value) -> Self {
        Self {
            event: Some(event.as_str().to_string()),
            ack: Some(ack),
            data,
        }
    }

    /// Named frame without acknowledgement (client emit or server broadcast)
    pub fn event(event: EventName, data: Value) -> Self {
        Self {
            event: Some(event.as_str().to_string()),
            ack: None,
            data,
        }
    }

    /// Acknowledgement of the request carrying `ack`
    pub fn ack(ack: u64, data: Value) -> Self {
        Self {
            event: None,
            ack: Some(ack),
            data,
        }
    }

    pub fn kind(&self) -> FrameKind {
        match (&self.event, self.ack) {
            (Some(_), Some(_)) => FrameKind::Request,
            (Some(_), None) => FrameKind::Event,
            (None, Some(_)) => FrameKind::Ack,
            (None, None) => FrameKind::Invalid,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
