//! Protocol codec.
//!
//! Pure encoding and decoding between wire payloads and domain values.
//! Nothing here touches the socket.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use studyroom_shared::protocol::EventName;

use crate::domain::{
    ChatMessage, ConsumerParams, PeerState, PomodoroTimer, PomodoroTimerProperty,
    PomodoroTimerState, ProducerId, ProducerInfo, RoomJoiner, TransportOptions, UserId,
    WaitingRoomData,
};
use crate::error::{FailureResponse, ProtocolError, SessionError};
use crate::infrastructure::dto::{self, conversion::parse_timestamp};

/// Decoded server → client event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    OtherPeerJoined(RoomJoiner),
    OtherPeerExited(UserId),
    OtherPeerDisconnected(UserId),
    PeerStateChanged(PeerState),
    NewProducer(ProducerInfo),
    ProducerClosed(ProducerInfo),
    ChatReceived(ChatMessage),
    TimerStateChanged {
        state: PomodoroTimerState,
        started_at: chrono::DateTime<chrono::FixedOffset>,
    },
    /// The master edited the timer; the server stops it
    TimerPropertyChanged(PomodoroTimerProperty),
    Kicked(UserId),
    Blocked(UserId),
}

/// Events the server pushes to a room member
pub const SERVER_EVENTS: [EventName; 13] = [
    EventName::OtherPeerJoined,
    EventName::OtherPeerExited,
    EventName::OtherPeerDisconnected,
    EventName::PeerStateChanged,
    EventName::NewProducer,
    EventName::ProducerClosed,
    EventName::SendChat,
    EventName::StartTimer,
    EventName::StartShortBreak,
    EventName::StartLongBreak,
    EventName::EditAndStopTimer,
    EventName::KickUser,
    EventName::BlockUser,
];

/// Decode one inbound named event
pub fn decode_event(name: &str, data: Value) -> Result<RoomEvent, ProtocolError> {
    let event: EventName = name
        .parse()
        .map_err(|_| ProtocolError::UnknownEvent(name.to_string()))?;

    let decoded = match event {
        EventName::OtherPeerJoined => {
            RoomEvent::OtherPeerJoined(parse::<dto::RoomJoinerDto>(event, data)?.try_into()?)
        }
        EventName::OtherPeerExited => RoomEvent::OtherPeerExited(user_id_of(event, data)?),
        EventName::OtherPeerDisconnected => {
            RoomEvent::OtherPeerDisconnected(user_id_of(event, data)?)
        }
        EventName::PeerStateChanged => {
            RoomEvent::PeerStateChanged(parse::<dto::PeerStateDto>(event, data)?.try_into()?)
        }
        EventName::NewProducer => {
            RoomEvent::NewProducer(parse::<dto::ProducerInfoDto>(event, data)?.try_into()?)
        }
        EventName::ProducerClosed => {
            RoomEvent::ProducerClosed(parse::<dto::ProducerInfoDto>(event, data)?.try_into()?)
        }
        EventName::SendChat => {
            RoomEvent::ChatReceived(parse::<dto::ChatMessageDto>(event, data)?.try_into()?)
        }
        EventName::StartTimer | EventName::StartShortBreak | EventName::StartLongBreak => {
            let started: dto::TimerStartedDto = parse(event, data)?;
            let state = match event {
                EventName::StartTimer => PomodoroTimerState::Started,
                EventName::StartShortBreak => PomodoroTimerState::ShortBreak,
                _ => PomodoroTimerState::LongBreak,
            };
            RoomEvent::TimerStateChanged {
                state,
                started_at: parse_timestamp(&started.started_date)?,
            }
        }
        EventName::EditAndStopTimer => {
            RoomEvent::TimerPropertyChanged(parse::<dto::TimerPropertyDto>(event, data)?.into())
        }
        EventName::KickUser => RoomEvent::Kicked(user_id_of(event, data)?),
        EventName::BlockUser => RoomEvent::Blocked(user_id_of(event, data)?),
        other => return Err(ProtocolError::UnexpectedEvent(other)),
    };
    Ok(decoded)
}

/// Encode an outgoing payload
pub fn encode<T: Serialize>(event: EventName, payload: &T) -> Result<Value, ProtocolError> {
    serde_json::to_value(payload).map_err(|e| malformed(event, e))
}

/// Why an acknowledgement could not be turned into the expected response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckError {
    Rejected(FailureResponse),
    Protocol(ProtocolError),
}

impl From<ProtocolError> for AckError {
    fn from(error: ProtocolError) -> Self {
        AckError::Protocol(error)
    }
}

impl From<AckError> for SessionError {
    fn from(error: AckError) -> Self {
        match error {
            AckError::Rejected(failure) => SessionError::Rejected(failure),
            AckError::Protocol(protocol) => SessionError::Protocol(protocol),
        }
    }
}

impl std::fmt::Display for AckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AckError::Rejected(failure) => write!(f, "{failure}"),
            AckError::Protocol(protocol) => write!(f, "{protocol}"),
        }
    }
}

/// Extract the `{ "error": {...} }` body of a rejected acknowledgement
pub fn failure_of(data: &Value) -> Option<FailureResponse> {
    if !data.get("error").is_some_and(Value::is_object) {
        return None;
    }
    let body: dto::AckErrorBody = serde_json::from_value(data.clone()).ok()?;
    Some(FailureResponse {
        kind: body.error.r#type,
        message: body.error.message,
    })
}

/// Decode an acknowledgement into the expected response type
pub fn decode_ack<T: DeserializeOwned>(event: EventName, data: Value) -> Result<T, AckError> {
    if let Some(failure) = failure_of(&data) {
        return Err(AckError::Rejected(failure));
    }
    Ok(parse(event, data)?)
}

/// Accept any acknowledgement that is not a rejection
pub fn decode_empty_ack(data: &Value) -> Result<(), FailureResponse> {
    match failure_of(data) {
        Some(failure) => Err(failure),
        None => Ok(()),
    }
}

pub fn decode_waiting_room(data: Value) -> Result<WaitingRoomData, AckError> {
    let dto: dto::WaitingRoomDataDto = decode_ack(EventName::JoinWaitingRoom, data)?;
    Ok(dto.try_into()?)
}

/// Everything a successful `join-room` carries
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRoom {
    pub rtp_capabilities: Value,
    pub peer_states: Vec<PeerState>,
    pub timer: PomodoroTimer,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinRoomOutcome {
    Joined(JoinedRoom),
    Rejected(FailureResponse),
}

/// Decode the type-discriminated `join-room` acknowledgement
pub fn decode_join_room(data: Value) -> Result<JoinRoomOutcome, ProtocolError> {
    let event = EventName::JoinRoom;
    if let Some(failure) = failure_of(&data) {
        return Ok(JoinRoomOutcome::Rejected(failure));
    }

    let Some(kind) = data.get("type").and_then(Value::as_str) else {
        return Err(malformed(event, "missing 'type'"));
    };
    if kind != dto::JOIN_ROOM_SUCCESS {
        let failure: dto::JoinRoomFailureResponse = parse(event, data)?;
        return Ok(JoinRoomOutcome::Rejected(FailureResponse {
            kind: failure.r#type,
            message: failure.message,
        }));
    }

    let success: dto::JoinRoomSuccessResponse = parse(event, data)?;
    let started_at = success
        .timer_started_date
        .as_deref()
        .map(parse_timestamp)
        .transpose()?;
    let peer_states = success
        .peer_states
        .into_iter()
        .map(PeerState::try_from)
        .collect::<Result<_, _>>()?;

    Ok(JoinRoomOutcome::Joined(JoinedRoom {
        rtp_capabilities: success.rtp_capabilities,
        peer_states,
        timer: PomodoroTimer {
            state: success.timer_state.into(),
            property: success.timer_property.into(),
            started_at,
            pending: false,
        },
    }))
}

pub fn decode_transport_options(data: Value) -> Result<TransportOptions, AckError> {
    let dto: dto::TransportOptionsDto = decode_ack(EventName::CreateTransport, data)?;
    Ok(dto.try_into()?)
}

pub fn decode_produce(data: Value) -> Result<ProducerId, AckError> {
    let dto: dto::ProduceResponse = decode_ack(EventName::TransportProduce, data)?;
    Ok(ProducerId::new(dto.id).map_err(ProtocolError::from)?)
}

pub fn decode_consume(data: Value) -> Result<ConsumerParams, AckError> {
    let dto: dto::ConsumeResponse = decode_ack(EventName::Consume, data)?;
    Ok(dto.try_into()?)
}

pub fn decode_producer_list(data: Value) -> Result<Vec<ProducerInfo>, AckError> {
    let list: Vec<dto::ProducerInfoDto> = decode_ack(EventName::GetProducers, data)?;
    Ok(list
        .into_iter()
        .map(ProducerInfo::try_from)
        .collect::<Result<_, _>>()?)
}

fn parse<T: DeserializeOwned>(event: EventName, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|e| malformed(event, e))
}

fn user_id_of(event: EventName, data: Value) -> Result<UserId, ProtocolError> {
    let payload: dto::UserIdPayload = parse(event, data)?;
    Ok(UserId::new(payload.user_id)?)
}

fn malformed(event: EventName, reason: impl std::fmt::Display) -> ProtocolError {
    ProtocolError::Malformed {
        context: event.as_str().to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use studyroom_shared::protocol::MediaKind;

    #[test]
    fn test_decode_new_producer() {
        // テスト項目: new-producer イベントがデコードされる
        // given (前提条件):
        let data = json!({"producerId": "p1", "peerId": "bob", "kind": "video"});

        // when (操作):
        let event = decode_event("new-producer", data).unwrap();

        // then (期待する結果):
        assert_eq!(
            event,
            RoomEvent::NewProducer(ProducerInfo {
                producer_id: ProducerId::new("p1").unwrap(),
                peer_id: UserId::new("bob").unwrap(),
                kind: MediaKind::Video,
            })
        );
    }

    #[test]
    fn test_decode_unknown_event_fails() {
        // テスト項目: 語彙にないイベントは UnknownEvent になる
        // given (前提条件):
        let data = json!({});

        // when (操作):
        let result = decode_event("dance-party", data);

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ProtocolError::UnknownEvent("dance-party".to_string()))
        );
    }

    #[test]
    fn test_decode_client_only_event_is_unexpected() {
        // テスト項目: クライアント送信専用のイベントを受信すると UnexpectedEvent になる
        // given (前提条件):
        let data = json!({"consuming": true});

        // when (操作):
        let result = decode_event("create-transport", data);

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ProtocolError::UnexpectedEvent(EventName::CreateTransport))
        );
    }

    #[test]
    fn test_server_events_cover_every_decodable_event() {
        // テスト項目: SERVER_EVENTS 以外のイベント名はすべて UnexpectedEvent になる
        // given (前提条件):
        let others = EventName::ALL
            .iter()
            .filter(|event| !SERVER_EVENTS.contains(event));

        // when (操作):
        let results: Vec<_> = others
            .map(|event| (*event, decode_event(event.as_str(), json!({}))))
            .collect();

        // then (期待する結果):
        assert!(!results.is_empty());
        for (event, result) in results {
            assert_eq!(result, Err(ProtocolError::UnexpectedEvent(event)));
        }
    }

    #[test]
    fn test_decode_malformed_payload_fails() {
        // テスト項目: ペイロードの型が異なるイベントは Malformed になる
        // given (前提条件):
        let data = json!({"userId": 42});

        // when (操作):
        let result = decode_event("kick-user", data);

        // then (期待する結果):
        assert!(matches!(result, Err(ProtocolError::Malformed { context, .. }) if context == "kick-user"));
    }

    #[test]
    fn test_decode_start_short_break_converts_timezone() {
        // テスト項目: タイマー開始イベントの時刻がサーバータイムゾーンに変換される
        // given (前提条件):
        let data = json!({"startedDate": "2023-01-01T00:00:00Z"});

        // when (操作):
        let event = decode_event("start-short-break", data).unwrap();

        // then (期待する結果):
        match event {
            RoomEvent::TimerStateChanged { state, started_at } => {
                assert_eq!(state, PomodoroTimerState::ShortBreak);
                assert_eq!(
                    studyroom_shared::time::to_iso8601(&started_at),
                    "2023-01-01T09:00:00.000+09:00"
                );
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_edit_and_stop_timer() {
        // テスト項目: edit-and-stop-timer がタイマー設定の変更としてデコードされる
        // given (前提条件):
        let data = json!({
            "timerLengthMinutes": 30,
            "shortBreakMinutes": 5,
            "longBreakMinutes": 15,
            "longBreakInterval": 4
        });

        // when (操作):
        let event = decode_event("edit-and-stop-timer", data).unwrap();

        // then (期待する結果):
        assert_eq!(
            event,
            RoomEvent::TimerPropertyChanged(PomodoroTimerProperty {
                timer_length_minutes: 30,
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_decode_ack_error_body_is_rejection() {
        // テスト項目: error を含む ACK は FailureResponse になる
        // given (前提条件):
        let data = json!({"error": {"type": "not-master", "message": "only the master"}});

        // when (操作):
        let result = decode_ack::<dto::ProduceResponse>(EventName::TransportProduce, data);

        // then (期待する結果):
        assert_eq!(
            result,
            Err(AckError::Rejected(FailureResponse {
                kind: "not-master".to_string(),
                message: Some("only the master".to_string()),
            }))
        );
    }

    #[test]
    fn test_decode_join_room_success() {
        // テスト項目: join-room の成功レスポンスがデコードされる
        // given (前提条件):
        let data = json!({
            "type": "success",
            "rtpCapabilities": {"codecs": []},
            "peerStates": [
                {"uid": "alice", "name": "Alice", "enabledMicrophone": false, "enabledHeadset": true}
            ],
            "timerState": "STOPPED",
            "timerProperty": {
                "timerLengthMinutes": 25,
                "shortBreakMinutes": 5,
                "longBreakMinutes": 15,
                "longBreakInterval": 4
            }
        });

        // when (操作):
        let outcome = decode_join_room(data).unwrap();

        // then (期待する結果):
        let JoinRoomOutcome::Joined(joined) = outcome else {
            panic!("expected success");
        };
        assert_eq!(joined.peer_states.len(), 1);
        assert_eq!(joined.timer.state, PomodoroTimerState::Stopped);
        assert_eq!(joined.timer.started_at, None);
    }

    #[test]
    fn test_decode_join_room_bad_password() {
        // テスト項目: bad-password は JoinRoomFailureResponse としてデコードされる
        // given (前提条件):
        let data = json!({"type": "bad-password", "message": "wrong password"});

        // when (操作):
        let outcome = decode_join_room(data).unwrap();

        // then (期待する結果):
        assert_eq!(
            outcome,
            JoinRoomOutcome::Rejected(FailureResponse {
                kind: "bad-password".to_string(),
                message: Some("wrong password".to_string()),
            })
        );
    }

    #[test]
    fn test_decode_join_room_without_type_is_malformed() {
        // テスト項目: type を持たない join-room レスポンスは Malformed になる
        // given (前提条件):
        let data = json!({"peerStates": []});

        // when (操作):
        let result = decode_join_room(data);

        // then (期待する結果):
        assert!(matches!(result, Err(ProtocolError::Malformed { .. })));
    }

    #[test]
    fn test_decode_producer_list() {
        // テスト項目: get-producers の ACK がプロデューサー一覧にデコードされる
        // given (前提条件):
        let data = json!([
            {"producerId": "p1", "peerId": "bob", "kind": "audio"},
            {"producerId": "p2", "peerId": "bob", "kind": "video"}
        ]);

        // when (操作):
        let list = decode_producer_list(data).unwrap();

        // then (期待する結果):
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].kind, MediaKind::Video);
    }
}
