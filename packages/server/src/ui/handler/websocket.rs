//! WebSocket connection handler for the room namespace.

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{
    domain::UserId,
    ui::state::AppState,
    usecase::ConnectError,
};

use super::dispatch::{Connection, handle_text};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectQuery {
    pub user_id: String,
    /// Display name, defaults to the user id
    #[serde(default)]
    pub name: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = match UserId::try_from(query.user_id.clone()) {
        Ok(id) => id,
        Err(_) => {
            tracing::warn!("Invalid userId format: '{}'", query.user_id);
            return Err(StatusCode::BAD_REQUEST);
        }
    };
    let name = query
        .name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| user_id.to_string());

    // Acks and broadcasts share one channel so they reach the socket in order
    let (tx, rx) = mpsc::unbounded_channel();

    match state
        .connect_user_usecase
        .execute(user_id.clone(), tx.clone())
        .await
    {
        Ok(()) => {
            tracing::info!("User '{}' connected and registered", user_id);
            let failed_state = state.clone();
            let failed_id = user_id.clone();
            Ok(ws
                .on_failed_upgrade(move |e| {
                    tracing::warn!("WebSocket upgrade for '{}' failed: {}", failed_id, e);
                    tokio::spawn(async move {
                        let _ = failed_state
                            .disconnect_user_usecase
                            .execute(failed_id, None)
                            .await;
                    });
                })
                .on_upgrade(move |socket| {
                    handle_socket(socket, state, Connection::new(user_id, name), tx, rx)
                }))
        }
        Err(ConnectError::DuplicateUserId(id)) => {
            tracing::warn!(
                "User with ID '{}' is already connected. Rejecting connection.",
                id
            );
            Err(StatusCode::CONFLICT)
        }
        Err(ConnectError::Push(e)) => {
            tracing::error!("Failed to register '{}': {}", user_id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Spawns a task that receives messages from the rx channel and pushes them to the WebSocket sender.
///
/// # Arguments
///
/// * `rx` - Channel receiver for acks and room events addressed to this user
/// * `sender` - WebSocket sink to send messages to this client
///
/// # Returns
///
/// A `JoinHandle` for the spawned task
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    })
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    mut conn: Connection,
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
) {
    let (sender, mut receiver) = socket.split();
    let mut send_task = pusher_loop(rx, sender);

    loop {
        tokio::select! {
            msg = receiver.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                };
                match msg {
                    Message::Text(text) => {
                        if let Some(reply) = handle_text(&state, &mut conn, &text).await
                            && tx.send(reply).is_err()
                        {
                            break;
                        }
                    }
                    Message::Ping(_) => {
                        // Ping/pong is handled automatically by the WebSocket protocol
                        tracing::debug!("Received ping");
                    }
                    Message::Close(_) => {
                        tracing::info!("User '{}' requested close", conn.user_id);
                        break;
                    }
                    _ => {}
                }
            }
            _ = &mut send_task => break,
        }
    }
    send_task.abort();

    match state
        .disconnect_user_usecase
        .execute(conn.user_id.clone(), conn.room_id)
        .await
    {
        Ok(()) => tracing::info!("User '{}' disconnected", conn.user_id),
        Err(e) => tracing::warn!("Failed to clean up after '{}': {}", conn.user_id, e),
    }
}
