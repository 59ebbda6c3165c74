//! Payload DTOs of the room namespace.
//!
//! Keys are camelCase on the wire. SFU parameters (ICE, DTLS, RTP) are opaque
//! JSON handed between the server and the media engine untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::MediaKind;

/// `type` of a successful `join-room` acknowledgement
pub const JOIN_ROOM_SUCCESS: &str = "success";
/// `type` of a `join-room` rejection caused by a wrong password
pub const JOIN_ROOM_BAD_PASSWORD: &str = "bad-password";
/// `type` of a `join-room` rejection caused by a full room
pub const JOIN_ROOM_FULL: &str = "room-full";
/// `type` of a `join-room` rejection caused by the blacklist
pub const JOIN_ROOM_BLOCKED: &str = "blocked";

// ========================================
// Waiting room
// ========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinWaitingRoomRequest {
    pub room_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingRoomDataDto {
    pub joiner_list: Vec<RoomJoinerDto>,
    pub capacity: u32,
    pub master_id: String,
    #[serde(default)]
    pub blacklist: Vec<PeerOverviewDto>,
    pub has_password: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomJoinerDto {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerOverviewDto {
    pub id: String,
    pub name: String,
}

/// Payload addressing one user (`other-peer-exited`, `kick-user`, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdPayload {
    pub user_id: String,
}

// ========================================
// Study room
// ========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    pub user_id: String,
    pub muted_headset: bool,
    pub room_password_input: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomSuccessResponse {
    pub r#type: String,
    pub rtp_capabilities: Value,
    pub peer_states: Vec<PeerStateDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_started_date: Option<String>,
    pub timer_state: TimerStateDto,
    pub timer_property: TimerPropertyDto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomFailureResponse {
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerStateDto {
    pub uid: String,
    pub name: String,
    pub enabled_microphone: bool,
    pub enabled_headset: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimerStateDto {
    Stopped,
    Started,
    ShortBreak,
    LongBreak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerPropertyDto {
    pub timer_length_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    pub long_break_interval: u32,
}

/// Payload of `start-timer`, `start-short-break` and `start-long-break` broadcasts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerStartedDto {
    pub started_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendChatRequest {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageDto {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    pub content: String,
    pub sent_at: String,
}

// ========================================
// Media signaling
// ========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransportRequest {
    pub consuming: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportOptionsDto {
    pub id: String,
    pub ice_parameters: Value,
    pub ice_candidates: Value,
    pub dtls_parameters: Value,
}

/// Payload of `transport-producer-connected` and `transport-receiver-connected`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportConnectRequest {
    pub transport_id: String,
    pub dtls_parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportProduceRequest {
    pub transport_id: String,
    pub kind: MediaKind,
    pub rtp_parameters: Value,
}

/// Acknowledgement of `transport-produce`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProduceResponse {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeRequest {
    pub transport_id: String,
    pub producer_id: String,
    pub rtp_capabilities: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeResponse {
    pub id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    pub rtp_parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerResumeRequest {
    pub consumer_id: String,
}

/// Payload of `new-producer`, `producer-closed` and entries of `get-producers`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerInfoDto {
    pub producer_id: String,
    pub peer_id: String,
    pub kind: MediaKind,
}

/// Payload of `close-video-producer` and `close-audio-producer`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseProducerRequest {
    pub producer_id: String,
}

// ========================================
// Failures
// ========================================

/// Acknowledgement body of a rejected request: `{ "error": { "type", "message" } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckErrorBody {
    pub error: AckErrorDto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckErrorDto {
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_room_request_uses_camel_case() {
        // テスト項目: JoinRoomRequest が camelCase のキーでシリアライズされる
        // given (前提条件):
        let request = JoinRoomRequest {
            user_id: "alice".to_string(),
            muted_headset: true,
            room_password_input: "".to_string(),
        };

        // when (操作):
        let value = serde_json::to_value(&request).unwrap();

        // then (期待する結果):
        assert_eq!(
            value,
            json!({"userId": "alice", "mutedHeadset": true, "roomPasswordInput": ""})
        );
    }

    #[test]
    fn test_timer_state_uses_screaming_snake_case() {
        // テスト項目: タイマー状態が SCREAMING_SNAKE_CASE で表現される
        // given (前提条件):
        let state = TimerStateDto::ShortBreak;

        // when (操作):
        let value = serde_json::to_value(state).unwrap();

        // then (期待する結果):
        assert_eq!(value, json!("SHORT_BREAK"));
    }

    #[test]
    fn test_waiting_room_data_defaults_blacklist() {
        // テスト項目: blacklist が省略された場合は空リストになる
        // given (前提条件):
        let value = json!({
            "joinerList": [{"id": "bob", "name": "Bob"}],
            "capacity": 4,
            "masterId": "bob",
            "hasPassword": false
        });

        // when (操作):
        let data: WaitingRoomDataDto = serde_json::from_value(value).unwrap();

        // then (期待する結果):
        assert!(data.blacklist.is_empty());
        assert_eq!(data.joiner_list[0].profile_image, None);
    }

    #[test]
    fn test_media_kind_is_lowercase() {
        // テスト項目: メディア種別が小文字で表現される
        // given (前提条件):
        let info = ProducerInfoDto {
            producer_id: "p1".to_string(),
            peer_id: "bob".to_string(),
            kind: MediaKind::Video,
        };

        // when (操作):
        let value = serde_json::to_value(&info).unwrap();

        // then (期待する結果):
        assert_eq!(value["kind"], json!("video"));
    }
}
