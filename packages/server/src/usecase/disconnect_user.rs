//! UseCase: ユーザー切断処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - DisconnectUserUseCase::execute() メソッド
//!
//! ### なぜこのテストが必要か
//! - 切断したユーザーが Room から取り除かれることを保証
//! - 残ったユーザーに `other-peer-disconnected` と `producer-closed` が届くことを確認
//!
//! ### どのような状況を想定しているか
//! - 正常系：学習室のメンバーの切断
//! - 正常系：ルームに入る前の切断（通知なし）
//! - エッジケース：既に存在しない Room

use std::sync::Arc;

use studyroom_shared::protocol::EventName;

use crate::domain::{MessagePusher, Producer, Room, RoomId, RoomRepository, UserId};

use super::{
    error::UseCaseError,
    notify::{except, notify, notify_producers_closed, user_payload},
};

/// ユーザー切断のユースケース
pub struct DisconnectUserUseCase {
    repository: Arc<dyn RoomRepository>,
    message_pusher: Arc<dyn MessagePusher>,
}

impl DisconnectUserUseCase {
    pub fn new(
        repository: Arc<dyn RoomRepository>,
        message_pusher: Arc<dyn MessagePusher>,
    ) -> Self {
        Self {
            repository,
            message_pusher,
        }
    }

    /// 切断を実行
    ///
    /// # Arguments
    ///
    /// * `user_id` - 切断したユーザー
    /// * `room_id` - ユーザーが入っていた Room（入室前なら `None`）
    pub async fn execute(
        &self,
        user_id: UserId,
        room_id: Option<RoomId>,
    ) -> Result<(), UseCaseError> {
        self.message_pusher.unregister_client(&user_id).await;

        let Some(room_id) = room_id else {
            return Ok(());
        };

        let mut closed: Vec<Producer> = Vec::new();
        let leaving = user_id.clone();
        let closed_ref = &mut closed;
        let room = self
            .repository
            .update_room(
                &room_id,
                Box::new(move |room: &mut Room| {
                    *closed_ref = room.leave(&leaving);
                    Ok(())
                }),
            )
            .await?;

        tracing::info!("User '{}' left room '{}'", user_id, room_id);

        notify(
            &self.message_pusher,
            except(room.connected_ids(), &user_id),
            EventName::OtherPeerDisconnected,
            &user_payload(&user_id),
        )
        .await?;
        notify_producers_closed(&self.message_pusher, &room.member_ids(), &closed).await
    }
}
