//! Conversion logic between DTOs and domain entities.
//!
//! Inbound conversions are fallible: ids must be non-empty and timestamps
//! must parse. Failures surface as [`ProtocolError`].

use studyroom_shared::time::parse_to_server_tz;

use crate::domain::{
    ChatMessage, ConsumerId, ConsumerParams, PeerOverview, PeerState, PomodoroTimerProperty,
    PomodoroTimerState, ProducerId, ProducerInfo, RoomJoiner, TransportId, TransportOptions,
    UserId, WaitingRoomData,
};
use crate::error::ProtocolError;
use crate::infrastructure::dto;

pub(crate) fn parse_timestamp(
    value: &str,
) -> Result<chrono::DateTime<chrono::FixedOffset>, ProtocolError> {
    parse_to_server_tz(value).map_err(|_| ProtocolError::InvalidTimestamp(value.to_string()))
}

// ========================================
// DTO → Domain Entity
// ========================================

impl TryFrom<dto::RoomJoinerDto> for RoomJoiner {
    type Error = ProtocolError;

    fn try_from(dto: dto::RoomJoinerDto) -> Result<Self, Self::Error> {
        Ok(Self {
            id: UserId::new(dto.id)?,
            name: dto.name,
            profile_image: dto.profile_image,
        })
    }
}

impl TryFrom<dto::PeerOverviewDto> for PeerOverview {
    type Error = ProtocolError;

    fn try_from(dto: dto::PeerOverviewDto) -> Result<Self, Self::Error> {
        Ok(Self {
            id: UserId::new(dto.id)?,
            name: dto.name,
        })
    }
}

impl TryFrom<dto::WaitingRoomDataDto> for WaitingRoomData {
    type Error = ProtocolError;

    fn try_from(dto: dto::WaitingRoomDataDto) -> Result<Self, Self::Error> {
        Ok(Self {
            joiner_list: dto
                .joiner_list
                .into_iter()
                .map(RoomJoiner::try_from)
                .collect::<Result<_, _>>()?,
            capacity: dto.capacity,
            master_id: UserId::new(dto.master_id)?,
            blacklist: dto
                .blacklist
                .into_iter()
                .map(PeerOverview::try_from)
                .collect::<Result<_, _>>()?,
            has_password: dto.has_password,
        })
    }
}

impl TryFrom<dto::PeerStateDto> for PeerState {
    type Error = ProtocolError;

    fn try_from(dto: dto::PeerStateDto) -> Result<Self, Self::Error> {
        Ok(Self {
            uid: UserId::new(dto.uid)?,
            name: dto.name,
            enabled_microphone: dto.enabled_microphone,
            enabled_headset: dto.enabled_headset,
        })
    }
}

impl From<dto::TimerStateDto> for PomodoroTimerState {
    fn from(dto: dto::TimerStateDto) -> Self {
        match dto {
            dto::TimerStateDto::Stopped => PomodoroTimerState::Stopped,
            dto::TimerStateDto::Started => PomodoroTimerState::Started,
            dto::TimerStateDto::ShortBreak => PomodoroTimerState::ShortBreak,
            dto::TimerStateDto::LongBreak => PomodoroTimerState::LongBreak,
        }
    }
}

impl From<dto::TimerPropertyDto> for PomodoroTimerProperty {
    fn from(dto: dto::TimerPropertyDto) -> Self {
        Self {
            timer_length_minutes: dto.timer_length_minutes,
            short_break_minutes: dto.short_break_minutes,
            long_break_minutes: dto.long_break_minutes,
            long_break_interval: dto.long_break_interval,
        }
    }
}

impl TryFrom<dto::ChatMessageDto> for ChatMessage {
    type Error = ProtocolError;

    fn try_from(dto: dto::ChatMessageDto) -> Result<Self, Self::Error> {
        Ok(Self {
            sent_at: parse_timestamp(&dto.sent_at)?,
            id: dto.id,
            author_id: UserId::new(dto.author_id)?,
            author_name: dto.author_name,
            content: dto.content,
        })
    }
}

impl TryFrom<dto::ProducerInfoDto> for ProducerInfo {
    type Error = ProtocolError;

    fn try_from(dto: dto::ProducerInfoDto) -> Result<Self, Self::Error> {
        Ok(Self {
            producer_id: ProducerId::new(dto.producer_id)?,
            peer_id: UserId::new(dto.peer_id)?,
            kind: dto.kind,
        })
    }
}

impl TryFrom<dto::TransportOptionsDto> for TransportOptions {
    type Error = ProtocolError;

    fn try_from(dto: dto::TransportOptionsDto) -> Result<Self, Self::Error> {
        Ok(Self {
            id: TransportId::new(dto.id)?,
            ice_parameters: dto.ice_parameters,
            ice_candidates: dto.ice_candidates,
            dtls_parameters: dto.dtls_parameters,
        })
    }
}

impl TryFrom<dto::ConsumeResponse> for ConsumerParams {
    type Error = ProtocolError;

    fn try_from(dto: dto::ConsumeResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ConsumerId::new(dto.id)?,
            producer_id: ProducerId::new(dto.producer_id)?,
            kind: dto.kind,
            rtp_parameters: dto.rtp_parameters,
        })
    }
}

// ========================================
// Domain Entity → DTO
// ========================================

impl From<PomodoroTimerProperty> for dto::TimerPropertyDto {
    fn from(model: PomodoroTimerProperty) -> Self {
        Self {
            timer_length_minutes: model.timer_length_minutes,
            short_break_minutes: model.short_break_minutes,
            long_break_minutes: model.long_break_minutes,
            long_break_interval: model.long_break_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_dto_chat_message_to_domain() {
        // テスト項目: DTO の ChatMessage がサーバータイムゾーンの時刻を持つエンティティに変換される
        // given (前提条件):
        let dto_msg = dto::ChatMessageDto {
            id: "m1".to_string(),
            author_id: "bob".to_string(),
            author_name: "Bob".to_string(),
            content: "Hello!".to_string(),
            sent_at: "2023-01-01T00:00:00Z".to_string(),
        };

        // when (操作):
        let message = ChatMessage::try_from(dto_msg).unwrap();

        // then (期待する結果):
        assert_eq!(message.author_id, UserId::new("bob").unwrap());
        assert_eq!(message.sent_at.hour(), 9);
        assert_eq!(message.sent_at.offset().local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn test_dto_chat_message_with_bad_timestamp_fails() {
        // テスト項目: 不正なタイムスタンプは InvalidTimestamp になる
        // given (前提条件):
        let dto_msg = dto::ChatMessageDto {
            id: "m1".to_string(),
            author_id: "bob".to_string(),
            author_name: "Bob".to_string(),
            content: "Hello!".to_string(),
            sent_at: "earlier".to_string(),
        };

        // when (操作):
        let result = ChatMessage::try_from(dto_msg);

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ProtocolError::InvalidTimestamp("earlier".to_string()))
        );
    }

    #[test]
    fn test_dto_peer_state_with_empty_uid_fails() {
        // テスト項目: 空の uid を持つ PeerState は変換できない
        // given (前提条件):
        let dto_state = dto::PeerStateDto {
            uid: String::new(),
            name: "Ghost".to_string(),
            enabled_microphone: false,
            enabled_headset: false,
        };

        // when (操作):
        let result = PeerState::try_from(dto_state);

        // then (期待する結果):
        assert!(matches!(result, Err(ProtocolError::InvalidValue(_))));
    }

    #[test]
    fn test_timer_property_converts_both_ways() {
        // テスト項目: タイマー設定が DTO とエンティティの間で相互変換される
        // given (前提条件):
        let property = PomodoroTimerProperty {
            timer_length_minutes: 30,
            short_break_minutes: 4,
            long_break_minutes: 20,
            long_break_interval: 3,
        };

        // when (操作):
        let dto_property: dto::TimerPropertyDto = property.into();
        let back: PomodoroTimerProperty = dto_property.into();

        // then (期待する結果):
        assert_eq!(dto_property.timer_length_minutes, 30);
        assert_eq!(back, property);
    }
}
