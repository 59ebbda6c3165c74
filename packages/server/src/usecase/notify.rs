//! ルームへのイベント通知の組み立て

use std::sync::Arc;

use serde::Serialize;
use studyroom_shared::protocol::{EventName, Frame, dto};

use crate::domain::{MessagePusher, Producer, UserId};

use super::error::UseCaseError;

/// Serialize a server event frame
pub fn event_message<T: Serialize>(event: EventName, payload: &T) -> Result<String, UseCaseError> {
    let data = serde_json::to_value(payload)?;
    Ok(Frame::event(event, data).to_json()?)
}

/// Send one event to every target, logging instead of failing on push errors
pub async fn notify<T: Serialize>(
    pusher: &Arc<dyn MessagePusher>,
    targets: Vec<UserId>,
    event: EventName,
    payload: &T,
) -> Result<(), UseCaseError> {
    if targets.is_empty() {
        return Ok(());
    }
    let message = event_message(event, payload)?;
    if let Err(e) = pusher.broadcast(targets, &message).await {
        tracing::warn!("Failed to broadcast {}: {}", event, e);
    }
    Ok(())
}

pub fn user_payload(user_id: &UserId) -> dto::UserIdPayload {
    dto::UserIdPayload {
        user_id: user_id.as_str().to_string(),
    }
}

/// `producer-closed` for each producer
pub async fn notify_producers_closed(
    pusher: &Arc<dyn MessagePusher>,
    targets: &[UserId],
    producers: &[Producer],
) -> Result<(), UseCaseError> {
    for producer in producers {
        notify(
            pusher,
            targets.to_vec(),
            EventName::ProducerClosed,
            &dto::ProducerInfoDto::from(producer),
        )
        .await?;
    }
    Ok(())
}

/// Everyone in the list but `user_id`
pub fn except(ids: Vec<UserId>, user_id: &UserId) -> Vec<UserId> {
    ids.into_iter().filter(|id| id != user_id).collect()
}
