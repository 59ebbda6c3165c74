//! Integration tests running room sessions against the in-process signaling server.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use studyroom_client::{
    RoomSessionHandle, SessionConfig, SessionError,
    domain::{DisconnectReason, PomodoroTimerState, RoomId, RoomState, TimerPhase, UserId},
    infrastructure::websocket::WebSocketChannel,
};
use studyroom_server::{
    config::RoomSpec,
    infrastructure::{message_pusher::WebSocketMessagePusher, repository::InMemoryRoomRepository},
    ui::{AppState, Server},
};
use studyroom_shared::time::{Clock, SystemClock};
use tokio::{net::TcpListener, time::timeout};

const WAIT: Duration = Duration::from_secs(5);

/// Helper struct to manage the in-process server
struct TestServer {
    addr: SocketAddr,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Start a server on an ephemeral port with the given rooms
    async fn start(rooms: &[&str]) -> Self {
        let created_at = SystemClock.now();
        let rooms = rooms
            .iter()
            .map(|raw| raw.parse::<RoomSpec>().unwrap().into_room(created_at));
        let state = AppState::new(
            Arc::new(InMemoryRoomRepository::with_rooms(rooms)),
            Arc::new(WebSocketMessagePusher::new()),
            Arc::new(SystemClock),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(Server::new(state).serve(listener, async move {
            let _ = rx.await;
        }));

        TestServer {
            addr,
            shutdown: Some(tx),
        }
    }

    fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn session(server: &TestServer, id: &str) -> RoomSessionHandle {
    let user_id = UserId::new(id).unwrap();
    let name = id.to_uppercase();
    let channel = WebSocketChannel::for_room(&server.url(), &user_id, &name).unwrap();
    let config = SessionConfig::new(user_id, name).with_timeout(WAIT);
    RoomSessionHandle::spawn(config, Arc::new(channel), None)
}

async fn wait_until<F>(handle: &RoomSessionHandle, predicate: F) -> RoomState
where
    F: FnMut(&RoomState) -> bool,
{
    timeout(WAIT, handle.wait_for(predicate))
        .await
        .expect("Timed out waiting for state")
        .unwrap()
}

fn room_id() -> RoomId {
    RoomId::new("room-1").unwrap()
}

#[tokio::test]
async fn test_http_api() {
    // テスト項目: ヘルスチェックとルーム一覧が HTTP で取得できる
    // given (前提条件):
    let server = TestServer::start(&["room-1", "focus:2:secret"]).await;

    // when (操作):
    let health: serde_json::Value = reqwest::get(format!("{}/api/health", server.url()))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let rooms: serde_json::Value = reqwest::get(format!("{}/api/rooms", server.url()))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let missing = reqwest::get(format!("{}/api/rooms/nowhere", server.url()))
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(health["status"], "ok");
    assert_eq!(rooms[0]["id"], "focus");
    assert_eq!(rooms[0]["hasPassword"], true);
    assert_eq!(rooms[1]["id"], "room-1");
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_two_users_chat_timer_and_kick() {
    // テスト項目: 2 人が学習室に入り、チャット・タイマー・キックが両者に反映される
    // given (前提条件):
    let server = TestServer::start(&["room-1"]).await;
    let alice = session(&server, "alice");
    let bob = session(&server, "bob");

    alice.connect(room_id()).await.unwrap();
    alice.join_study_room("").await.unwrap();
    bob.connect(room_id()).await.unwrap();
    let waiting = bob.current_state();
    let waiting = waiting.waiting_room().unwrap();
    assert_eq!(waiting.data.master_id.as_str(), "alice");
    assert_eq!(waiting.data.joiner_list.len(), 1);
    bob.join_study_room("").await.unwrap();
    wait_until(&alice, |s| s.study_room().is_some_and(|r| r.peers.len() == 2)).await;

    // when (操作):
    alice.send_chat("hello").await.unwrap();
    alice.start_timer(TimerPhase::Focus).await.unwrap();

    // then (期待する結果):
    let state = wait_until(&bob, |s| {
        s.study_room()
            .is_some_and(|r| r.chat.len() == 1 && r.timer.state == PomodoroTimerState::Started)
    })
    .await;
    let room = state.study_room().unwrap();
    assert_eq!(room.chat[0].content, "hello");
    assert_eq!(room.chat[0].author_name, "ALICE");
    assert!(!room.is_master());
    wait_until(&alice, |s| s.study_room().is_some_and(|r| r.chat.len() == 1)).await;

    // when (操作):
    alice.kick_user(UserId::new("bob").unwrap()).await.unwrap();

    // then (期待する結果):
    let state = wait_until(&bob, |s| matches!(s, RoomState::Disconnected { .. })).await;
    assert_eq!(
        state,
        RoomState::Disconnected {
            reason: Some(DisconnectReason::Kicked)
        }
    );
    wait_until(&alice, |s| s.study_room().is_some_and(|r| r.peers.len() == 1)).await;
}

#[tokio::test]
async fn test_wrong_password_keeps_waiting_room() {
    // テスト項目: パスワード違いは拒否され、待合室に留まる
    // given (前提条件):
    let server = TestServer::start(&["room-1:4:secret"]).await;
    let alice = session(&server, "alice");
    alice.connect(room_id()).await.unwrap();

    // when (操作):
    let rejected = alice.join_study_room("wrong").await;
    let accepted = alice.join_study_room("secret").await;

    // then (期待する結果):
    match rejected {
        Err(SessionError::Rejected(failure)) => assert_eq!(failure.kind, "bad-password"),
        other => panic!("expected a rejection, got {:?}", other),
    }
    assert!(accepted.is_ok());
    assert!(alice.current_state().study_room().is_some());
}

#[tokio::test]
async fn test_duplicate_user_id_fails_to_connect() {
    // テスト項目: 接続中と同じユーザー ID では接続できない
    // given (前提条件):
    let server = TestServer::start(&["room-1"]).await;
    let first = session(&server, "alice");
    first.connect(room_id()).await.unwrap();
    let second = session(&server, "alice");

    // when (操作):
    let result = second.connect(room_id()).await;

    // then (期待する結果):
    assert!(matches!(result, Err(SessionError::Channel(_))));
    assert_eq!(second.current_state().label(), "failed to connect");
}

#[tokio::test]
async fn test_disconnect_removes_peer() {
    // テスト項目: 相手の切断が学習室のピア一覧から消える
    // given (前提条件):
    let server = TestServer::start(&["room-1"]).await;
    let alice = session(&server, "alice");
    let bob = session(&server, "bob");
    alice.connect(room_id()).await.unwrap();
    alice.join_study_room("").await.unwrap();
    bob.connect(room_id()).await.unwrap();
    bob.join_study_room("").await.unwrap();
    wait_until(&alice, |s| s.study_room().is_some_and(|r| r.peers.len() == 2)).await;

    // when (操作):
    bob.disconnect().await;

    // then (期待する結果):
    let state = wait_until(&alice, |s| s.study_room().is_some_and(|r| r.peers.len() == 1)).await;
    assert!(state.study_room().unwrap().peers.contains(&UserId::new("alice").unwrap()));
}
