//! InMemory Room Repository 実装
//!
//! ドメイン層が定義する RoomRepository trait の具体的な実装。
//! HashMap をインメモリ DB として使用します。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{RepositoryError, Room, RoomId, RoomRepository, RoomUpdate};

/// インメモリ Room Repository 実装
#[derive(Default)]
pub struct InMemoryRoomRepository {
    rooms: Mutex<HashMap<RoomId, Room>>,
}

impl InMemoryRoomRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 初期 Room を持つ Repository を作成
    pub fn with_rooms(rooms: impl IntoIterator<Item = Room>) -> Self {
        let rooms = rooms.into_iter().map(|room| (room.id.clone(), room)).collect();
        Self {
            rooms: Mutex::new(rooms),
        }
    }
}

#[async_trait]
impl RoomRepository for InMemoryRoomRepository {
    async fn add_room(&self, room: Room) -> Result<(), RepositoryError> {
        let mut rooms = self.rooms.lock().await;
        if rooms.contains_key(&room.id) {
            return Err(RepositoryError::RoomAlreadyExists(room.id.to_string()));
        }
        rooms.insert(room.id.clone(), room);
        Ok(())
    }

    async fn find_room(&self, id: &RoomId) -> Result<Room, RepositoryError> {
        let rooms = self.rooms.lock().await;
        rooms
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::RoomNotFound(id.to_string()))
    }

    async fn list_rooms(&self) -> Vec<Room> {
        let rooms = self.rooms.lock().await;
        let mut list: Vec<Room> = rooms.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    async fn update_room<'a>(
        &'a self,
        id: &'a RoomId,
        update: RoomUpdate<'a>,
    ) -> Result<Room, RepositoryError> {
        let mut rooms = self.rooms.lock().await;
        let room = rooms
            .get_mut(id)
            .ok_or_else(|| RepositoryError::RoomNotFound(id.to_string()))?;

        // 失敗時に部分的な変更が残らないよう、複製に適用してから差し替える
        let mut updated = room.clone();
        update(&mut updated)?;
        *room = updated.clone();
        Ok(updated)
    }
}
