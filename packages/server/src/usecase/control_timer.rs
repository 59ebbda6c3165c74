//! UseCase: ポモドーロタイマーの操作
//!
//! タイマーはサーバーが正とし、操作できるのはマスターだけです。

use std::sync::Arc;

use studyroom_shared::{
    protocol::{
        EventName,
        dto::{TimerPropertyDto, TimerStartedDto},
    },
    time::{Clock, to_iso8601},
};

use crate::domain::{MessagePusher, Room, RoomId, RoomRepository, TimerProperty, TimerState, UserId};

use super::{error::UseCaseError, notify::notify};

/// タイマー操作のユースケース
pub struct ControlTimerUseCase {
    repository: Arc<dyn RoomRepository>,
    message_pusher: Arc<dyn MessagePusher>,
    clock: Arc<dyn Clock>,
}

impl ControlTimerUseCase {
    pub fn new(
        repository: Arc<dyn RoomRepository>,
        message_pusher: Arc<dyn MessagePusher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            message_pusher,
            clock,
        }
    }

    /// 集中 / 短い休憩 / 長い休憩を開始し、学習室の全員に開始時刻を送る
    pub async fn start(
        &self,
        room_id: &RoomId,
        by: &UserId,
        state: TimerState,
    ) -> Result<(), UseCaseError> {
        let event = match state {
            TimerState::Started => EventName::StartTimer,
            TimerState::ShortBreak => EventName::StartShortBreak,
            TimerState::LongBreak => EventName::StartLongBreak,
            TimerState::Stopped => {
                return Err(UseCaseError::InvalidPayload(
                    "a stopped timer cannot be started".to_string(),
                ));
            }
        };
        let now = self.clock.now();
        let master = by.clone();
        let room = self
            .repository
            .update_room(
                room_id,
                Box::new(move |room: &mut Room| room.start_timer(&master, state, now)),
            )
            .await?;

        tracing::info!("Timer of '{}' is now {:?}", room_id, state);
        notify(
            &self.message_pusher,
            room.member_ids(),
            event,
            &TimerStartedDto {
                started_date: to_iso8601(&now),
            },
        )
        .await
    }

    /// タイマーの設定を変更して停止し、学習室の全員に新しい設定を送る
    pub async fn edit(
        &self,
        room_id: &RoomId,
        by: &UserId,
        property: TimerProperty,
    ) -> Result<(), UseCaseError> {
        let master = by.clone();
        let room = self
            .repository
            .update_room(
                room_id,
                Box::new(move |room: &mut Room| room.edit_timer(&master, property)),
            )
            .await?;

        tracing::info!("Timer of '{}' was edited and stopped", room_id);
        notify(
            &self.message_pusher,
            room.member_ids(),
            EventName::EditAndStopTimer,
            &TimerPropertyDto::from(room.timer.property),
        )
        .await
    }
}
