//! UseCase: チャットメッセージ送信
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - SendChatUseCase::execute() メソッド
//!
//! ### なぜこのテストが必要か
//! - 送信者を含む学習室の全メンバーにメッセージが届くことを保証
//! - 送信時刻がサーバーの時計で付与されることを確認
//!
//! ### どのような状況を想定しているか
//! - 正常系：メンバーによる送信
//! - 異常系：空のメッセージ、学習室にいないユーザーからの送信

use std::sync::Arc;

use studyroom_shared::{
    protocol::{EventName, dto::ChatMessageDto},
    time::{Clock, to_iso8601},
};
use uuid::Uuid;

use crate::domain::{MessagePusher, RoomError, RoomId, RoomRepository, UserId};

use super::{error::UseCaseError, notify::notify};

/// チャットメッセージ送信のユースケース
pub struct SendChatUseCase {
    repository: Arc<dyn RoomRepository>,
    message_pusher: Arc<dyn MessagePusher>,
    clock: Arc<dyn Clock>,
}

impl SendChatUseCase {
    pub fn new(
        repository: Arc<dyn RoomRepository>,
        message_pusher: Arc<dyn MessagePusher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            message_pusher,
            clock,
        }
    }

    /// メッセージを学習室の全メンバーに配信する
    ///
    /// # Returns
    ///
    /// 配信したメッセージ
    pub async fn execute(
        &self,
        room_id: &RoomId,
        author_id: &UserId,
        content: &str,
    ) -> Result<ChatMessageDto, UseCaseError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(UseCaseError::InvalidPayload(
                "chat message is empty".to_string(),
            ));
        }

        let room = self.repository.find_room(room_id).await?;
        let author = room
            .member(author_id)
            .ok_or_else(|| RoomError::NotInRoom(author_id.to_string()))?;

        let message = ChatMessageDto {
            id: Uuid::new_v4().to_string(),
            author_id: author_id.as_str().to_string(),
            author_name: author.name.clone(),
            content: content.to_string(),
            sent_at: to_iso8601(&self.clock.now()),
        };
        tracing::info!("Chat from '{}' in '{}': {}", author_id, room_id, message.content);

        notify(
            &self.message_pusher,
            room.member_ids(),
            EventName::SendChat,
            &message,
        )
        .await?;
        Ok(message)
    }
}
