//! UseCase: ユーザー接続処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - ConnectUserUseCase::execute() メソッド
//!
//! ### なぜこのテストが必要か
//! - 同じユーザー ID の二重接続を防ぐ（UI 層で 409 Conflict になる）
//!
//! ### どのような状況を想定しているか
//! - 正常系：新規ユーザーの接続
//! - 異常系：接続中のユーザー ID での接続試行

use std::sync::Arc;

use crate::domain::{MessagePushError, MessagePusher, PusherChannel, UserId};

use super::error::ConnectError;

/// ユーザー接続のユースケース
pub struct ConnectUserUseCase {
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
}

impl ConnectUserUseCase {
    pub fn new(message_pusher: Arc<dyn MessagePusher>) -> Self {
        Self { message_pusher }
    }

    /// ユーザーの送信チャンネルを登録する
    ///
    /// ルームへの入室は接続後の `join-waiting-room` で行われます。
    pub async fn execute(&self, user_id: UserId, sender: PusherChannel) -> Result<(), ConnectError> {
        self.message_pusher
            .register_client(user_id, sender)
            .await
            .map_err(|e| match e {
                MessagePushError::AlreadyRegistered(id) => ConnectError::DuplicateUserId(id),
                other => ConnectError::Push(other),
            })
    }
}
