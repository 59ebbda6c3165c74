//! UseCase テスト用のフィクスチャ

use std::sync::Arc;

use serde_json::Value;
use studyroom_shared::time::{FixedClock, parse_to_server_tz};
use tokio::sync::mpsc;

use crate::{
    domain::{MessagePusher, Room, RoomId, RoomRepository, UserId},
    infrastructure::{message_pusher::WebSocketMessagePusher, repository::InMemoryRoomRepository},
};

pub const ROOM: &str = "room-1";

pub fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

pub fn room_id() -> RoomId {
    RoomId::new(ROOM).unwrap()
}

pub fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        parse_to_server_tz("2024-05-01T01:00:00Z").unwrap(),
    ))
}

/// 1 つの Room と、実際の WebSocketMessagePusher を持つテスト環境
pub struct Fixture {
    pub repository: Arc<InMemoryRoomRepository>,
    pub pusher: Arc<WebSocketMessagePusher>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_room(4, None)
    }

    pub fn with_room(capacity: u32, password: Option<&str>) -> Self {
        let room = Room::new(
            room_id(),
            capacity,
            password.map(str::to_string),
            parse_to_server_tz("2024-05-01T00:00:00Z").unwrap(),
        );
        Self {
            repository: Arc::new(InMemoryRoomRepository::with_rooms([room])),
            pusher: Arc::new(WebSocketMessagePusher::new()),
        }
    }

    pub fn repository(&self) -> Arc<dyn RoomRepository> {
        self.repository.clone()
    }

    pub fn pusher(&self) -> Arc<dyn MessagePusher> {
        self.pusher.clone()
    }

    /// 接続して受信チャンネルを返す
    pub async fn connect(&self, id: &str) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.pusher.register_client(user(id), tx).await.unwrap();
        rx
    }

    /// 待合室に入る（最初の 1 人がマスターになる）
    pub async fn enter(&self, id: &str) {
        let name = display_name(id);
        self.repository
            .update_room(
                &room_id(),
                Box::new(move |room: &mut Room| room.enter_waiting_room(user(id), name)),
            )
            .await
            .unwrap();
    }

    /// 待合室を経由して学習室に入る
    pub async fn join(&self, id: &str) {
        self.enter(id).await;
        let name = display_name(id);
        self.repository
            .update_room(
                &room_id(),
                Box::new(move |room: &mut Room| room.join(&user(id), &name, false, "").map(|_| ())),
            )
            .await
            .unwrap();
    }

    pub async fn room(&self) -> Room {
        self.repository.find_room(&room_id()).await.unwrap()
    }
}

/// "alice" → "Alice"
pub fn display_name(id: &str) -> String {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// 受信済みのフレームを全て取り出す
pub fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(text) = rx.try_recv() {
        frames.push(serde_json::from_str(&text).unwrap());
    }
    frames
}

/// 受信済みのイベント名を全て取り出す
pub fn event_names(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
    drain(rx)
        .into_iter()
        .filter_map(|frame| frame["event"].as_str().map(str::to_string))
        .collect()
}
