//! UseCase: 待合室への入室
//!
//! 待合室のユーザーは学習室のメンバー一覧を見ることができ、学習室への
//! 入室・退室の通知を受け取ります。最初に入ったユーザーがマスターになります。

use std::sync::Arc;

use studyroom_shared::protocol::dto::WaitingRoomDataDto;

use crate::{
    domain::{Room, RoomId, RoomRepository, UserId},
    infrastructure::dto::conversion,
};

use super::error::UseCaseError;

/// 待合室入室のユースケース
pub struct JoinWaitingRoomUseCase {
    repository: Arc<dyn RoomRepository>,
}

impl JoinWaitingRoomUseCase {
    pub fn new(repository: Arc<dyn RoomRepository>) -> Self {
        Self { repository }
    }

    /// # Returns
    ///
    /// `join-waiting-room` の ACK（学習室の外から見たルームの状態）
    pub async fn execute(
        &self,
        room_id: &RoomId,
        user_id: UserId,
        name: String,
    ) -> Result<WaitingRoomDataDto, UseCaseError> {
        let room = self
            .repository
            .update_room(
                room_id,
                Box::new(move |room: &mut Room| room.enter_waiting_room(user_id, name)),
            )
            .await?;
        tracing::debug!(
            "Waiting room '{}' now has {} visitor(s)",
            room_id,
            room.waiting.len()
        );
        Ok(conversion::waiting_room_data(&room))
    }
}
