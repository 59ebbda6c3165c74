//! ドメイン層
//!
//! - `value_object`: ID などの値オブジェクト
//! - `room`: Room エンティティとその不変条件
//! - `repository`: Room の永続化インターフェース
//! - `message_pusher`: クライアントへの通知インターフェース

pub mod error;
pub mod message_pusher;
pub mod repository;
pub mod room;
pub mod value_object;

pub use error::{MessagePushError, RepositoryError, RoomError};
pub use message_pusher::{MessagePusher, PusherChannel};
pub use repository::{RoomRepository, RoomUpdate};
pub use room::{
    BlockedUser, Member, Producer, Room, Timer, TimerProperty, TimerState, Visitor,
};
pub use value_object::{RoomId, UserId, ValueObjectError};

#[cfg(test)]
pub use message_pusher::MockMessagePusher;
