//! Domain layer of the session engine.
//!
//! ドメイン層は外部 I/O に依存しません。ソケットとメディアエンジンへの
//! インターフェース（trait）だけをここで定義し、実装は Infrastructure 層が提供します。

pub mod channel;
pub mod entity;
pub mod media;
pub mod registry;
pub mod state;
pub mod value_object;

pub use channel::{ChannelEvent, EventHub, EventSubscription, SocketChannel, with_timeout};
#[cfg(test)]
pub use channel::MockSocketChannel;
pub use entity::{
    ChatMessage, PeerOverview, PeerState, PomodoroTimer, PomodoroTimerProperty,
    PomodoroTimerState, ProducerInfo, RoomJoiner, TimerPhase, TimerPropertyError,
    WaitingRoomData,
};
pub use media::{
    ConsumerHandle, ConsumerParams, LocalTrack, MediaEngine, MediaEngineError, ProducerHandle,
    TransportDirection, TransportHandle, TransportOptions, TransportSignaler,
};
#[cfg(test)]
pub use media::MockMediaEngine;
pub use registry::{Attach, PeerMediaRegistry, PeerUiState};
pub use state::{
    DisconnectReason, RoomState, SideEffect, StudyRoom, StudyRoomState, WaitingRoom,
    WaitingRoomState,
};
pub use value_object::{
    ConsumerId, MediaKind, ProducerId, RoomId, TransportId, UserId, ValueObjectError,
};
