//! UseCase: ヘッドセットのミュート切り替え

use std::sync::Arc;

use studyroom_shared::protocol::{EventName, dto::PeerStateDto};

use crate::domain::{Member, MessagePusher, Room, RoomId, RoomRepository, UserId};

use super::{
    error::UseCaseError,
    notify::{except, notify},
};

pub struct ChangeHeadsetUseCase {
    repository: Arc<dyn RoomRepository>,
    message_pusher: Arc<dyn MessagePusher>,
}

impl ChangeHeadsetUseCase {
    pub fn new(
        repository: Arc<dyn RoomRepository>,
        message_pusher: Arc<dyn MessagePusher>,
    ) -> Self {
        Self {
            repository,
            message_pusher,
        }
    }

    /// 状態を更新し、学習室の他のメンバーに `peer-state-changed` を送る
    pub async fn execute(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        enabled: bool,
    ) -> Result<Member, UseCaseError> {
        let mut changed: Option<Member> = None;
        let slot = &mut changed;
        let target = user_id.clone();
        let room = self
            .repository
            .update_room(
                room_id,
                Box::new(move |room: &mut Room| {
                    *slot = Some(room.set_headset(&target, enabled)?);
                    Ok(())
                }),
            )
            .await?;
        let member = changed.ok_or(UseCaseError::NoRoom)?;

        notify(
            &self.message_pusher,
            except(room.member_ids(), user_id),
            EventName::PeerStateChanged,
            &PeerStateDto::from(&member),
        )
        .await?;
        Ok(member)
    }
}
