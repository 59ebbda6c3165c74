//! WebSocket implementation of [`SocketChannel`].
//!
//! One reader task and one writer task per connection. Requests are paired
//! with their acknowledgement through the `ack` id of the frame.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use studyroom_shared::protocol::{EventName, Frame, FrameKind, ROOM_NAMESPACE};
use tokio::{
    sync::{Mutex as AsyncMutex, mpsc, oneshot},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

use crate::domain::{ChannelEvent, EventHub, EventSubscription, SocketChannel, UserId};
use crate::error::ChannelError;

/// How long `disconnect` waits for the close frame to be flushed
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

pub struct WebSocketChannel {
    url: Url,
    connection: AsyncMutex<Option<Connection>>,
    shared: Arc<Shared>,
}

struct Connection {
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

struct Shared {
    outgoing: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Value>>>,
    events: EventHub,
    next_ack: AtomicU64,
    connected: AtomicBool,
}

impl Shared {
    /// Transition to closed. Only the first caller fails the pending requests
    /// and publishes `Disconnected`.
    fn mark_closed(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        self.outgoing.lock().take();
        // dropping the senders resolves every waiter with `Disconnected`
        self.pending.lock().clear();
        self.events.publish(ChannelEvent::Disconnected);
    }

    fn send(&self, frame: &Frame) -> Result<(), ChannelError> {
        let text = frame
            .to_json()
            .map_err(|e| ChannelError::Send(e.to_string()))?;
        let outgoing = self.outgoing.lock();
        let Some(sender) = outgoing.as_ref() else {
            return Err(ChannelError::NotConnected);
        };
        tracing::debug!("-> {}", text);
        sender
            .send(Message::Text(text.into()))
            .map_err(|_| ChannelError::Disconnected)
    }
}

/// Removes the pending entry when the request future completes or is dropped
struct PendingGuard<'a> {
    shared: &'a Shared,
    ack: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.pending.lock().remove(&self.ack);
    }
}

impl WebSocketChannel {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            connection: AsyncMutex::new(None),
            shared: Arc::new(Shared {
                outgoing: Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                events: EventHub::new(),
                next_ack: AtomicU64::new(0),
                connected: AtomicBool::new(false),
            }),
        }
    }

    /// Channel to the room namespace of `base_url`, identifying as `user_id`
    pub fn for_room(base_url: &str, user_id: &UserId, name: &str) -> Result<Self, ChannelError> {
        Ok(Self::new(room_url(base_url, user_id, name)?))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.shared.pending.lock().len()
    }
}

/// Build `ws(s)://host/room?userId=..&name=..` from an http(s) or ws(s) base
pub fn room_url(base_url: &str, user_id: &UserId, name: &str) -> Result<Url, ChannelError> {
    let mut url =
        Url::parse(base_url).map_err(|e| ChannelError::Connect(format!("invalid url: {e}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ChannelError::Connect(format!("unsupported scheme '{other}'"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| ChannelError::Connect(format!("cannot use scheme '{scheme}'")))?;
    url.set_path(ROOM_NAMESPACE);
    url.query_pairs_mut()
        .clear()
        .append_pair("userId", user_id.as_str())
        .append_pair("name", name);
    Ok(url)
}

#[async_trait]
impl SocketChannel for WebSocketChannel {
    async fn connect(&self) -> Result<(), ChannelError> {
        let mut connection = self.connection.lock().await;
        if self.is_connected() {
            return Ok(());
        }
        if let Some(stale) = connection.take() {
            stale.reader.abort();
            stale.writer.abort();
        }

        let (ws_stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        tracing::info!("Connected to {}", self.url);

        let (mut write, mut read) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        *self.shared.outgoing.lock() = Some(tx);
        self.shared.connected.store(true, Ordering::SeqCst);

        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = write.send(message).await {
                    tracing::warn!("WebSocket write error: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        let shared = Arc::clone(&self.shared);
        let reader = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => dispatch(&shared, &text),
                    Ok(Message::Close(_)) => {
                        tracing::info!("Server closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("WebSocket read error: {}", e);
                        break;
                    }
                }
            }
            shared.mark_closed();
        });

        *connection = Some(Connection { reader, writer });
        Ok(())
    }

    async fn emit(&self, event: EventName, payload: Value) -> Result<(), ChannelError> {
        self.shared.send(&Frame::event(event, payload))
    }

    async fn request(&self, event: EventName, payload: Value) -> Result<Value, ChannelError> {
        if !self.is_connected() {
            return Err(ChannelError::NotConnected);
        }
        let ack = self.shared.next_ack.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(ack, tx);
        let _guard = PendingGuard {
            shared: &self.shared,
            ack,
        };

        self.shared.send(&Frame::request(event, ack, payload))?;
        rx.await.map_err(|_| ChannelError::Disconnected)
    }

    fn subscribe(&self) -> EventSubscription {
        self.shared.events.subscribe()
    }

    async fn disconnect(&self) {
        let mut connection = self.connection.lock().await;
        let Some(mut conn) = connection.take() else {
            return;
        };

        let closer = self.shared.outgoing.lock().take();
        if let Some(sender) = closer {
            let _ = sender.send(Message::Close(None));
        }
        let _ = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut conn.writer).await;
        conn.writer.abort();
        conn.reader.abort();

        // no-op if the reader already observed the close
        self.shared.mark_closed();
        tracing::info!("Disconnected from {}", self.url);
    }
}

fn dispatch(shared: &Shared, text: &str) {
    tracing::debug!("<- {}", text);
    let frame = match Frame::from_json(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!("Dropping undecodable frame: {}", e);
            return;
        }
    };

    match (frame.kind(), frame.ack, frame.event) {
        (FrameKind::Ack, Some(ack), _) => {
            let waiter = shared.pending.lock().remove(&ack);
            match waiter {
                Some(waiter) => {
                    let _ = waiter.send(frame.data);
                }
                None => tracing::debug!("Acknowledgement {} has no waiter", ack),
            }
        }
        (FrameKind::Event, _, Some(name)) => {
            shared.events.publish(ChannelEvent::Event {
                name,
                data: frame.data,
            });
        }
        (kind, _, _) => tracing::warn!("Dropping unexpected {:?} frame", kind),
    }
}
