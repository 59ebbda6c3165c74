//! Routing of inbound room frames to the use cases.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use studyroom_shared::protocol::{EventName, Frame, dto};

use crate::{
    domain::{RoomId, TimerState, UserId},
    ui::state::AppState,
    usecase::{JoinStudyRoomInput, Moderation, UseCaseError},
};

/// Per-socket session data
#[derive(Debug, Clone)]
pub struct Connection {
    pub user_id: UserId,
    pub name: String,
    /// Set by `join-waiting-room`
    pub room_id: Option<RoomId>,
}

impl Connection {
    pub fn new(user_id: UserId, name: String) -> Self {
        Self {
            user_id,
            name,
            room_id: None,
        }
    }

    fn room(&self) -> Result<RoomId, UseCaseError> {
        self.room_id.clone().ok_or(UseCaseError::NoRoom)
    }
}

/// Handle one text message of the socket
///
/// # Returns
///
/// The acknowledgement frame to send back, if the message was a request
pub async fn handle_text(state: &AppState, conn: &mut Connection, text: &str) -> Option<String> {
    let frame = match Frame::from_json(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!("Dropping malformed frame from '{}': {}", conn.user_id, e);
            return None;
        }
    };
    let Some(name) = frame.event.as_deref() else {
        tracing::warn!("Dropping frame without event from '{}'", conn.user_id);
        return None;
    };
    tracing::debug!("'{}' -> {} {}", conn.user_id, name, frame.data);

    let result = match name.parse::<EventName>() {
        Ok(event) => dispatch(state, conn, event, frame.data)
            .await
            .map_err(|e| (Some(event), e)),
        Err(e) => Err((None, UseCaseError::UnexpectedEvent(e.0))),
    };

    match frame.ack {
        Some(ack) => {
            let data = result.unwrap_or_else(|(event, e)| {
                tracing::warn!("{} from '{}' rejected: {}", name, conn.user_id, e);
                rejection(event, &e)
            });
            match Frame::ack(ack, data).to_json() {
                Ok(json) => Some(json),
                Err(e) => {
                    tracing::error!("Failed to encode ack for '{}': {}", conn.user_id, e);
                    None
                }
            }
        }
        None => {
            if let Err((_, e)) = result {
                tracing::warn!("{} from '{}' failed: {}", name, conn.user_id, e);
            }
            None
        }
    }
}

fn rejection(event: Option<EventName>, error: &UseCaseError) -> Value {
    let body = match (event, error.to_join_rejection()) {
        (Some(EventName::JoinRoom), Some(rejection)) => serde_json::to_value(rejection),
        _ => serde_json::to_value(error.to_ack_body()),
    };
    body.unwrap_or_else(|_| json!({"error": {"type": error.kind()}}))
}

fn payload<T: DeserializeOwned>(data: Value) -> Result<T, UseCaseError> {
    serde_json::from_value(data).map_err(|e| UseCaseError::InvalidPayload(e.to_string()))
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, UseCaseError> {
    Ok(serde_json::to_value(value)?)
}

/// Run the use case behind one event
pub async fn dispatch(
    state: &AppState,
    conn: &mut Connection,
    event: EventName,
    data: Value,
) -> Result<Value, UseCaseError> {
    match event {
        EventName::JoinWaitingRoom => {
            let request: dto::JoinWaitingRoomRequest = payload(data)?;
            let room_id = RoomId::new(request.room_id)
                .map_err(|e| UseCaseError::InvalidPayload(e.to_string()))?;
            if request.user_id != conn.user_id.as_str() {
                return Err(UseCaseError::InvalidPayload(
                    "userId does not match the connection".to_string(),
                ));
            }
            if let Some(current) = &conn.room_id
                && current != &room_id
            {
                return Err(UseCaseError::AlreadyInRoom(current.to_string()));
            }
            let waiting_room = state
                .join_waiting_room_usecase
                .execute(&room_id, conn.user_id.clone(), conn.name.clone())
                .await?;
            conn.room_id = Some(room_id);
            to_value(&waiting_room)
        }
        EventName::JoinRoom => {
            let request: dto::JoinRoomRequest = payload(data)?;
            let input = JoinStudyRoomInput {
                user_id: conn.user_id.clone(),
                name: conn.name.clone(),
                muted_headset: request.muted_headset,
                password_input: request.room_password_input,
            };
            let joined = state
                .join_study_room_usecase
                .execute(&conn.room()?, input)
                .await?;
            to_value(&joined)
        }
        EventName::CreateTransport => {
            let request: dto::CreateTransportRequest = payload(data)?;
            let options = state
                .signal_media_usecase
                .create_transport(&conn.room()?, &conn.user_id, request.consuming)
                .await?;
            to_value(&options)
        }
        EventName::TransportProducerConnected | EventName::TransportReceiverConnected => {
            let request: dto::TransportConnectRequest = payload(data)?;
            state
                .signal_media_usecase
                .connect_transport(&conn.room()?, &conn.user_id, &request.transport_id)
                .await?;
            Ok(json!({}))
        }
        EventName::TransportProduce => {
            let request: dto::TransportProduceRequest = payload(data)?;
            let produced = state
                .signal_media_usecase
                .produce(&conn.room()?, &conn.user_id, request.kind)
                .await?;
            to_value(&produced)
        }
        EventName::Consume => {
            let request: dto::ConsumeRequest = payload(data)?;
            let consumer = state
                .signal_media_usecase
                .consume(&conn.room()?, &conn.user_id, &request.producer_id)
                .await?;
            to_value(&consumer)
        }
        EventName::ConsumerResume => {
            let request: dto::ConsumerResumeRequest = payload(data)?;
            state
                .signal_media_usecase
                .resume_consumer(&conn.user_id, &request.consumer_id);
            Ok(json!({}))
        }
        EventName::GetProducers => {
            let producers = state
                .signal_media_usecase
                .list_producers(&conn.room()?, &conn.user_id)
                .await?;
            to_value(&producers)
        }
        EventName::CloseAudioProducer | EventName::CloseVideoProducer => {
            let request: dto::CloseProducerRequest = payload(data)?;
            state
                .signal_media_usecase
                .close_producer(&conn.room()?, &conn.user_id, request.producer_id)
                .await?;
            Ok(json!({}))
        }
        EventName::MuteHeadset | EventName::UnmuteHeadset => {
            let enabled = event == EventName::UnmuteHeadset;
            state
                .change_headset_usecase
                .execute(&conn.room()?, &conn.user_id, enabled)
                .await?;
            Ok(json!({}))
        }
        EventName::SendChat => {
            let request: dto::SendChatRequest = payload(data)?;
            state
                .send_chat_usecase
                .execute(&conn.room()?, &conn.user_id, &request.content)
                .await?;
            Ok(json!({}))
        }
        EventName::StartTimer | EventName::StartShortBreak | EventName::StartLongBreak => {
            let timer_state = match event {
                EventName::StartShortBreak => TimerState::ShortBreak,
                EventName::StartLongBreak => TimerState::LongBreak,
                _ => TimerState::Started,
            };
            state
                .control_timer_usecase
                .start(&conn.room()?, &conn.user_id, timer_state)
                .await?;
            Ok(json!({}))
        }
        EventName::EditAndStopTimer => {
            let property: dto::TimerPropertyDto = payload(data)?;
            state
                .control_timer_usecase
                .edit(&conn.room()?, &conn.user_id, property.into())
                .await?;
            Ok(json!({}))
        }
        EventName::KickUser | EventName::BlockUser | EventName::UnblockUser => {
            let request: dto::UserIdPayload = payload(data)?;
            let target = UserId::new(request.user_id)
                .map_err(|e| UseCaseError::InvalidPayload(e.to_string()))?;
            let action = match event {
                EventName::KickUser => Moderation::Kick,
                EventName::BlockUser => Moderation::Block,
                _ => Moderation::Unblock,
            };
            state
                .moderate_user_usecase
                .execute(&conn.room()?, &conn.user_id, action, &target)
                .await?;
            Ok(json!({}))
        }
        EventName::NewProducer
        | EventName::ProducerClosed
        | EventName::PeerStateChanged
        | EventName::OtherPeerJoined
        | EventName::OtherPeerExited
        | EventName::OtherPeerDisconnected => Err(UseCaseError::UnexpectedEvent(event.to_string())),
    }
}
