//! Server state shared by every handler.

use std::sync::Arc;

use studyroom_shared::time::Clock;

use crate::{
    domain::{MessagePusher, RoomRepository},
    usecase::{
        ChangeHeadsetUseCase, ConnectUserUseCase, ControlTimerUseCase, DisconnectUserUseCase,
        GetRoomsUseCase, JoinStudyRoomUseCase, JoinWaitingRoomUseCase, ModerateUserUseCase,
        SendChatUseCase, SignalMediaUseCase,
    },
};

/// Shared application state
pub struct AppState {
    pub connect_user_usecase: ConnectUserUseCase,
    pub disconnect_user_usecase: DisconnectUserUseCase,
    pub join_waiting_room_usecase: JoinWaitingRoomUseCase,
    pub join_study_room_usecase: JoinStudyRoomUseCase,
    pub send_chat_usecase: SendChatUseCase,
    pub control_timer_usecase: ControlTimerUseCase,
    pub change_headset_usecase: ChangeHeadsetUseCase,
    pub moderate_user_usecase: ModerateUserUseCase,
    pub signal_media_usecase: SignalMediaUseCase,
    pub get_rooms_usecase: GetRoomsUseCase,
}

impl AppState {
    /// Wire every use case onto the same repository, pusher and clock
    pub fn new(
        repository: Arc<dyn RoomRepository>,
        message_pusher: Arc<dyn MessagePusher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            connect_user_usecase: ConnectUserUseCase::new(message_pusher.clone()),
            disconnect_user_usecase: DisconnectUserUseCase::new(
                repository.clone(),
                message_pusher.clone(),
            ),
            join_waiting_room_usecase: JoinWaitingRoomUseCase::new(repository.clone()),
            join_study_room_usecase: JoinStudyRoomUseCase::new(
                repository.clone(),
                message_pusher.clone(),
            ),
            send_chat_usecase: SendChatUseCase::new(
                repository.clone(),
                message_pusher.clone(),
                clock.clone(),
            ),
            control_timer_usecase: ControlTimerUseCase::new(
                repository.clone(),
                message_pusher.clone(),
                clock,
            ),
            change_headset_usecase: ChangeHeadsetUseCase::new(
                repository.clone(),
                message_pusher.clone(),
            ),
            moderate_user_usecase: ModerateUserUseCase::new(
                repository.clone(),
                message_pusher.clone(),
            ),
            signal_media_usecase: SignalMediaUseCase::new(repository.clone(), message_pusher),
            get_rooms_usecase: GetRoomsUseCase::new(repository),
        }
    }
}
