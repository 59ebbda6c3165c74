//! Repository trait 定義
//!
//! ドメイン層が必要とするデータアクセスのインターフェースを定義します。
//! 具体的な実装は Infrastructure 層が提供します（依存性の逆転）。

use async_trait::async_trait;

use super::{RepositoryError, Room, RoomError, RoomId};

/// Room に対する 1 回の更新。ロックを保持したまま実行される
pub type RoomUpdate<'a> = Box<dyn FnOnce(&mut Room) -> Result<(), RoomError> + Send + 'a>;

/// Room Repository trait
///
/// UseCase 層はこの trait に依存し、Infrastructure 層の具体的な実装には依存しない。
#[async_trait]
pub trait RoomRepository: Send + Sync {
    /// Room を追加
    async fn add_room(&self, room: Room) -> Result<(), RepositoryError>;

    /// Room を取得
    async fn find_room(&self, id: &RoomId) -> Result<Room, RepositoryError>;

    /// 全ての Room を ID 順に取得
    async fn list_rooms(&self) -> Vec<Room>;

    /// Room をアトミックに更新し、更新後の Room を返す
    ///
    /// `update` が失敗した場合、Room は変更されない
    async fn update_room<'a>(
        &'a self,
        id: &'a RoomId,
        update: RoomUpdate<'a>,
    ) -> Result<Room, RepositoryError>;
}
