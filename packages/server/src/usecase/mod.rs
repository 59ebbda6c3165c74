//! UseCase 層
//!
//! 1 つの操作につき 1 つの構造体を持ち、Repository と MessagePusher を介して
//! Room の状態を更新し、関係するユーザーへイベントを通知します。

pub mod change_headset;
pub mod connect_user;
pub mod control_timer;
pub mod disconnect_user;
pub mod error;
pub mod get_rooms;
pub mod join_study_room;
pub mod join_waiting_room;
pub mod moderate_user;
mod notify;
pub mod send_chat;
pub mod signal_media;

#[cfg(test)]
mod test_support;

pub use change_headset::ChangeHeadsetUseCase;
pub use connect_user::ConnectUserUseCase;
pub use control_timer::ControlTimerUseCase;
pub use disconnect_user::DisconnectUserUseCase;
pub use error::{ConnectError, UseCaseError};
pub use get_rooms::GetRoomsUseCase;
pub use join_study_room::{JoinStudyRoomInput, JoinStudyRoomUseCase};
pub use join_waiting_room::JoinWaitingRoomUseCase;
pub use moderate_user::{Moderation, ModerateUserUseCase};
pub use send_chat::SendChatUseCase;
pub use signal_media::SignalMediaUseCase;
