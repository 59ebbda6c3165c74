//! UseCase: マスターによるユーザーの退出・ブロック・ブロック解除
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - ModerateUserUseCase の kick / block / unblock
//!
//! ### なぜこのテストが必要か
//! - 対象ユーザー自身にも通知が届かないとクライアントが退出できない
//! - 対象ユーザーのプロデューサーが閉じられることを保証
//!
//! ### どのような状況を想定しているか
//! - 正常系：学習室のメンバーの kick、待合室のユーザーの block
//! - 異常系：マスター以外による操作、ブロックされていないユーザーの unblock

use std::sync::Arc;

use studyroom_shared::protocol::EventName;

use crate::domain::{MessagePusher, Producer, Room, RoomId, RoomRepository, UserId};

use super::{
    error::UseCaseError,
    notify::{notify, notify_producers_closed, user_payload},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Moderation {
    Kick,
    Block,
    Unblock,
}

impl Moderation {
    fn event(&self) -> EventName {
        match self {
            Moderation::Kick => EventName::KickUser,
            Moderation::Block => EventName::BlockUser,
            Moderation::Unblock => EventName::UnblockUser,
        }
    }
}

pub struct ModerateUserUseCase {
    repository: Arc<dyn RoomRepository>,
    message_pusher: Arc<dyn MessagePusher>,
}

impl ModerateUserUseCase {
    pub fn new(
        repository: Arc<dyn RoomRepository>,
        message_pusher: Arc<dyn MessagePusher>,
    ) -> Self {
        Self {
            repository,
            message_pusher,
        }
    }

    /// 操作を実行
    ///
    /// kick / block は対象を含む接続中の全員に通知されます。
    /// unblock はブラックリストを更新するだけで通知しません。
    pub async fn execute(
        &self,
        room_id: &RoomId,
        by: &UserId,
        action: Moderation,
        target: &UserId,
    ) -> Result<(), UseCaseError> {
        let mut notified: Vec<UserId> = Vec::new();
        let mut closed: Vec<Producer> = Vec::new();
        let (notified_ref, closed_ref) = (&mut notified, &mut closed);
        let (master, user) = (by.clone(), target.clone());
        let room = self
            .repository
            .update_room(
                room_id,
                Box::new(move |room: &mut Room| {
                    *notified_ref = room.connected_ids();
                    *closed_ref = match action {
                        Moderation::Kick => room.kick(&master, &user)?,
                        Moderation::Block => room.block(&master, &user)?,
                        Moderation::Unblock => {
                            room.unblock(&master, &user)?;
                            Vec::new()
                        }
                    };
                    Ok(())
                }),
            )
            .await?;

        tracing::info!("{} '{}' in '{}' by '{}'", action.event(), target, room_id, by);
        if action == Moderation::Unblock {
            return Ok(());
        }

        notify(
            &self.message_pusher,
            notified,
            action.event(),
            &user_payload(target),
        )
        .await?;
        notify_producers_closed(&self.message_pusher, &room.member_ids(), &closed).await
    }
}
