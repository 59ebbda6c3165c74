//! UseCase: ルーム一覧と詳細の取得（HTTP API 用）

use std::sync::Arc;

use crate::domain::{Room, RoomId, RoomRepository};

use super::error::UseCaseError;

pub struct GetRoomsUseCase {
    repository: Arc<dyn RoomRepository>,
}

impl GetRoomsUseCase {
    pub fn new(repository: Arc<dyn RoomRepository>) -> Self {
        Self { repository }
    }

    /// ID 順のルーム一覧
    pub async fn list(&self) -> Vec<Room> {
        self.repository.list_rooms().await
    }

    pub async fn detail(&self, room_id: &str) -> Result<Room, UseCaseError> {
        let room_id =
            RoomId::new(room_id).map_err(|_| UseCaseError::RoomNotFound(room_id.to_string()))?;
        Ok(self.repository.find_room(&room_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecase::test_support::{Fixture, ROOM};

    #[tokio::test]
    async fn test_list_and_detail() {
        // テスト項目: 登録済みのルームを一覧・詳細で取得できる
        // given (前提条件):
        let fixture = Fixture::new();
        fixture.join("alice").await;
        let usecase = GetRoomsUseCase::new(fixture.repository());

        // when (操作):
        let rooms = usecase.list().await;
        let detail = usecase.detail(ROOM).await.unwrap();

        // then (期待する結果):
        assert_eq!(rooms.len(), 1);
        assert_eq!(detail.members.len(), 1);
    }

    #[tokio::test]
    async fn test_detail_of_invalid_id() {
        // テスト項目: 不正な ID や存在しない ID は RoomNotFound になる
        // given (前提条件):
        let usecase = GetRoomsUseCase::new(Fixture::new().repository());

        // when (操作):
        let blank = usecase.detail("  ").await;
        let missing = usecase.detail("room-404").await;

        // then (期待する結果):
        assert!(matches!(blank, Err(UseCaseError::RoomNotFound(_))));
        assert_eq!(
            missing.map(|room| room.id),
            Err(UseCaseError::RoomNotFound("room-404".to_string()))
        );
    }
}
