//! Client execution logic with reconnection support.

use std::{sync::Arc, time::Duration};

use crate::{
    domain::{RoomId, UserId},
    infrastructure::websocket::WebSocketChannel,
    session::{RoomSessionHandle, SessionConfig},
};

use super::{
    domain::{SessionOutcome, should_attempt_reconnect},
    error::ClientError,
    session::InteractiveSession,
    ui::spawn_line_reader,
};

const MAX_RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_INTERVAL_SECS: u64 = 5;

/// Command line options of the client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Signaling server base URL (http, https, ws or wss)
    pub url: String,
    pub user_id: String,
    /// Display name; defaults to the user id
    pub name: Option<String>,
    pub room_id: String,
    /// Password used by `/join` when none is typed
    pub password: Option<String>,
    pub muted_headset: bool,
}

/// Run the study room client with reconnection logic
pub async fn run_client(options: ClientOptions) -> Result<(), ClientError> {
    let user_id =
        UserId::new(&options.user_id).map_err(|e| ClientError::InvalidArgument(e.to_string()))?;
    let room_id =
        RoomId::new(&options.room_id).map_err(|e| ClientError::InvalidArgument(e.to_string()))?;
    let name = options
        .name
        .clone()
        .unwrap_or_else(|| options.user_id.clone());
    let config = SessionConfig::new(user_id.clone(), &name).with_muted_headset(options.muted_headset);

    let mut input = spawn_line_reader(user_id.as_str());
    let mut reconnect_count = 0;
    let mut rejoin_password = None;

    loop {
        tracing::info!(
            "Attempting to connect to {} as '{}' (attempt {}/{})",
            options.url,
            user_id,
            reconnect_count + 1,
            MAX_RECONNECT_ATTEMPTS
        );

        let channel = Arc::new(WebSocketChannel::for_room(&options.url, &user_id, &name)?);
        let handle = RoomSessionHandle::spawn(config.clone(), channel, None);
        let mut session =
            InteractiveSession::new(handle.clone(), user_id.as_str(), options.password.clone());
        let report = session
            .run(room_id.clone(), &mut input, rejoin_password.take())
            .await;
        handle.disconnect().await;
        let report = report?;

        match report.outcome {
            SessionOutcome::Quit => {
                tracing::info!("Client session ended normally");
                return Ok(());
            }
            SessionOutcome::Ended(reason) => {
                tracing::error!("Session ended by the room: {}", reason);
                return Err(ClientError::Ended(reason));
            }
            outcome @ SessionOutcome::ConnectionLost => {
                if report.entered_room {
                    reconnect_count = 0;
                }
                tracing::warn!("Connection lost");
                reconnect_count += 1;

                if !should_attempt_reconnect(&outcome, reconnect_count, MAX_RECONNECT_ATTEMPTS) {
                    tracing::error!(
                        "Failed to reconnect after {} attempts. Exiting.",
                        MAX_RECONNECT_ATTEMPTS
                    );
                    return Err(ClientError::ReconnectExhausted(MAX_RECONNECT_ATTEMPTS));
                }

                tracing::info!(
                    "Reconnecting in {} seconds... (attempt {}/{})",
                    RECONNECT_INTERVAL_SECS,
                    reconnect_count + 1,
                    MAX_RECONNECT_ATTEMPTS
                );
                rejoin_password = report.rejoin_password;

                tokio::time::sleep(Duration::from_secs(RECONNECT_INTERVAL_SECS)).await;
            }
        }
    }
}
