//! Conversion logic between DTOs and domain entities.

use serde_json::json;
use studyroom_shared::{
    protocol::dto::{
        self, JoinRoomSuccessResponse, PeerOverviewDto, PeerStateDto, ProducerInfoDto,
        RoomJoinerDto, TimerPropertyDto, TimerStateDto, WaitingRoomDataDto,
    },
    time::to_iso8601,
};

use crate::domain::{BlockedUser, Member, Producer, Room, TimerProperty, TimerState};

use super::http::RoomSummaryDto;

// ========================================
// Domain Entity → DTO
// ========================================

impl From<&Member> for PeerStateDto {
    fn from(member: &Member) -> Self {
        Self {
            uid: member.id.as_str().to_string(),
            name: member.name.clone(),
            enabled_microphone: member.enabled_microphone,
            enabled_headset: member.enabled_headset,
        }
    }
}

impl From<&Member> for RoomJoinerDto {
    fn from(member: &Member) -> Self {
        Self {
            id: member.id.as_str().to_string(),
            name: member.name.clone(),
            profile_image: None,
        }
    }
}

impl From<&BlockedUser> for PeerOverviewDto {
    fn from(user: &BlockedUser) -> Self {
        Self {
            id: user.id.as_str().to_string(),
            name: user.name.clone(),
        }
    }
}

impl From<&Producer> for ProducerInfoDto {
    fn from(producer: &Producer) -> Self {
        Self {
            producer_id: producer.id.clone(),
            peer_id: producer.peer_id.as_str().to_string(),
            kind: producer.kind,
        }
    }
}

impl From<TimerState> for TimerStateDto {
    fn from(state: TimerState) -> Self {
        match state {
            TimerState::Stopped => TimerStateDto::Stopped,
            TimerState::Started => TimerStateDto::Started,
            TimerState::ShortBreak => TimerStateDto::ShortBreak,
            TimerState::LongBreak => TimerStateDto::LongBreak,
        }
    }
}

impl From<TimerProperty> for TimerPropertyDto {
    fn from(property: TimerProperty) -> Self {
        Self {
            timer_length_minutes: property.timer_length_minutes,
            short_break_minutes: property.short_break_minutes,
            long_break_minutes: property.long_break_minutes,
            long_break_interval: property.long_break_interval,
        }
    }
}

/// Acknowledgement of `join-waiting-room`: the study room as seen from outside
pub fn waiting_room_data(room: &Room) -> WaitingRoomDataDto {
    WaitingRoomDataDto {
        joiner_list: room.members.iter().map(RoomJoinerDto::from).collect(),
        capacity: room.capacity,
        master_id: room
            .master_id
            .as_ref()
            .map(|id| id.as_str().to_string())
            .unwrap_or_default(),
        blacklist: room.blacklist.iter().map(PeerOverviewDto::from).collect(),
        has_password: room.has_password(),
    }
}

/// Acknowledgement of a successful `join-room`
pub fn join_room_success(room: &Room) -> JoinRoomSuccessResponse {
    JoinRoomSuccessResponse {
        r#type: dto::JOIN_ROOM_SUCCESS.to_string(),
        rtp_capabilities: router_rtp_capabilities(),
        peer_states: room.members.iter().map(PeerStateDto::from).collect(),
        timer_started_date: room.timer.started_at.as_ref().map(to_iso8601),
        timer_state: room.timer.state.into(),
        timer_property: room.timer.property.into(),
    }
}

pub fn room_summary(room: &Room) -> RoomSummaryDto {
    RoomSummaryDto {
        id: room.id.as_str().to_string(),
        capacity: room.capacity,
        has_password: room.has_password(),
        master_id: room.master_id.as_ref().map(|id| id.as_str().to_string()),
        members: room.members.iter().map(|m| m.id.as_str().to_string()).collect(),
        waiting: room.waiting.iter().map(|v| v.id.as_str().to_string()).collect(),
        created_at: to_iso8601(&room.created_at),
    }
}

/// Capabilities of the fake router. Opaque to the client.
pub fn router_rtp_capabilities() -> serde_json::Value {
    json!({
        "codecs": [
            {"kind": "audio", "mimeType": "audio/opus", "clockRate": 48000, "channels": 2},
            {"kind": "video", "mimeType": "video/VP8", "clockRate": 90000}
        ],
        "headerExtensions": []
    })
}

// ========================================
// DTO → Domain Entity
// ========================================

impl From<TimerPropertyDto> for TimerProperty {
    fn from(dto: TimerPropertyDto) -> Self {
        Self {
            timer_length_minutes: dto.timer_length_minutes,
            short_break_minutes: dto.short_break_minutes,
            long_break_minutes: dto.long_break_minutes,
            long_break_interval: dto.long_break_interval,
        }
    }
}
