//! Session configuration.

use std::time::Duration;

use crate::domain::UserId;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub user_id: UserId,
    /// Display name announced to the room
    pub user_name: String,
    /// Enter the study room with the headset muted
    pub muted_headset: bool,
    /// Bound of the socket handshake
    pub connect_timeout: Duration,
    /// Bound of the `join-room` request including media preparation
    pub join_timeout: Duration,
    /// Bound of every other request
    pub request_timeout: Duration,
    /// Extra attempts of a `send-chat` whose acknowledgement timed out
    pub chat_retry_limit: u32,
}

impl SessionConfig {
    pub fn new(user_id: UserId, user_name: impl Into<String>) -> Self {
        Self {
            user_id,
            user_name: user_name.into(),
            muted_headset: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            chat_retry_limit: 1,
        }
    }

    pub fn with_muted_headset(mut self, muted: bool) -> Self {
        self.muted_headset = muted;
        self
    }

    /// Use the same bound for connect, join and requests
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self.join_timeout = timeout;
        self.request_timeout = timeout;
        self
    }
}
