//! Transport channel boundary.
//!
//! The session sees the socket through [`SocketChannel`]: fire-and-forget
//! emits, acknowledged requests and one ordered stream of inbound events.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use studyroom_shared::protocol::EventName;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::ChannelError;

/// Inbound item of the channel
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Named server event; the name is kept raw so the codec can reject it
    Event { name: String, data: Value },
    /// The socket is gone; no further events follow on this connection
    Disconnected,
}

/// Fan-out of inbound events to every live subscription.
///
/// Each subscriber owns an unbounded queue, so a slow subscriber never loses
/// events and never blocks the socket reader.
#[derive(Default)]
pub struct EventHub {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ChannelEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> EventSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.lock().push(sender);
        EventSubscription::new(receiver)
    }

    /// Deliver `event` to every subscriber, forgetting the dropped ones
    pub fn publish(&self, event: ChannelEvent) {
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// Stream of inbound channel events in wire arrival order
pub struct EventSubscription {
    receiver: mpsc::UnboundedReceiver<ChannelEvent>,
    filter: Option<Vec<&'static str>>,
}

impl EventSubscription {
    pub fn new(receiver: mpsc::UnboundedReceiver<ChannelEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Narrow the stream to the given event names. `Disconnected` always passes.
    pub fn only(mut self, names: &[EventName]) -> Self {
        self.filter = Some(names.iter().map(EventName::as_str).collect());
        self
    }

    /// Next event, or `None` once the channel itself has been dropped
    pub async fn next(&mut self) -> Option<ChannelEvent> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Some(event);
            }
            if let ChannelEvent::Event { name, .. } = &event {
                debug!("Ignoring unsubscribed event {}", name);
            }
        }
    }

    fn accepts(&self, event: &ChannelEvent) -> bool {
        match (&self.filter, event) {
            (None, _) | (_, ChannelEvent::Disconnected) => true,
            (Some(names), ChannelEvent::Event { name, .. }) => {
                names.iter().any(|n| *n == name.as_str())
            }
        }
    }
}

/// Persistent, bidirectional, event-named message channel
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SocketChannel: Send + Sync {
    /// Open the socket. A second call while connected is a no-op.
    async fn connect(&self) -> Result<(), ChannelError>;

    /// Send a named frame without waiting for an acknowledgement
    async fn emit(&self, event: EventName, payload: Value) -> Result<(), ChannelError>;

    /// Send a named frame and wait for its acknowledgement payload
    async fn request(&self, event: EventName, payload: Value) -> Result<Value, ChannelError>;

    fn subscribe(&self) -> EventSubscription;

    /// Release the socket. Idempotent.
    async fn disconnect(&self);
}

/// Bound a channel call. Elapsed time surfaces as [`ChannelError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, future: F) -> Result<T, ChannelError>
where
    F: Future<Output = Result<T, ChannelError>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(ChannelError::Timeout),
    }
}
