//! UseCase: 学習室への入室
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - JoinStudyRoomUseCase::execute() メソッド
//!
//! ### なぜこのテストが必要か
//! - 入室の判定順（ブロック → パスワード → 定員）を保証
//! - 入室が他のユーザーへ通知されることを確認
//!
//! ### どのような状況を想定しているか
//! - 正常系：パスワードなし / ありの Room への入室
//! - 異常系：パスワード違い、満室

use std::sync::Arc;

use studyroom_shared::protocol::{
    EventName,
    dto::{JoinRoomSuccessResponse, PeerStateDto, RoomJoinerDto},
};

use crate::{
    domain::{Member, MessagePusher, Room, RoomError, RoomId, RoomRepository, UserId},
    infrastructure::dto::conversion,
};

use super::{
    error::UseCaseError,
    notify::{except, notify},
};

/// 学習室への入室申請
#[derive(Debug, Clone)]
pub struct JoinStudyRoomInput {
    pub user_id: UserId,
    pub name: String,
    pub muted_headset: bool,
    pub password_input: String,
}

/// 学習室入室のユースケース
pub struct JoinStudyRoomUseCase {
    repository: Arc<dyn RoomRepository>,
    message_pusher: Arc<dyn MessagePusher>,
}

impl JoinStudyRoomUseCase {
    pub fn new(
        repository: Arc<dyn RoomRepository>,
        message_pusher: Arc<dyn MessagePusher>,
    ) -> Self {
        Self {
            repository,
            message_pusher,
        }
    }

    /// 入室を実行
    ///
    /// 入室できた場合、待合室を含む他の全員に `other-peer-joined` を、
    /// 学習室の他のメンバーに `peer-state-changed` を送信します。
    pub async fn execute(
        &self,
        room_id: &RoomId,
        input: JoinStudyRoomInput,
    ) -> Result<JoinRoomSuccessResponse, UseCaseError> {
        let user_id = input.user_id.clone();
        let room = self
            .repository
            .update_room(
                room_id,
                Box::new(move |room: &mut Room| {
                    room.join(
                        &input.user_id,
                        &input.name,
                        input.muted_headset,
                        &input.password_input,
                    )
                    .map(|_| ())
                }),
            )
            .await?;

        let member: &Member = room
            .member(&user_id)
            .ok_or_else(|| RoomError::NotInRoom(user_id.to_string()))?;
        tracing::info!(
            "User '{}' joined study room '{}' ({}/{})",
            user_id,
            room_id,
            room.members.len(),
            room.capacity
        );

        notify(
            &self.message_pusher,
            except(room.connected_ids(), &user_id),
            EventName::OtherPeerJoined,
            &RoomJoinerDto::from(member),
        )
        .await?;
        notify(
            &self.message_pusher,
            except(room.member_ids(), &user_id),
            EventName::PeerStateChanged,
            &PeerStateDto::from(member),
        )
        .await?;

        Ok(conversion::join_room_success(&room))
    }
}
