//! Entities of a room session.

use chrono::{DateTime, FixedOffset};
use thiserror::Error;

use super::value_object::{MediaKind, ProducerId, UserId};

/// Server-authoritative toggle state of one peer in the study room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerState {
    pub uid: UserId,
    pub name: String,
    pub enabled_microphone: bool,
    pub enabled_headset: bool,
}

/// A user currently present in the waiting room roster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomJoiner {
    pub id: UserId,
    pub name: String,
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerOverview {
    pub id: UserId,
    pub name: String,
}

/// Snapshot of the waiting room, fetched once and then updated incrementally.
///
/// Invariant: `joiner_list.len() <= capacity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingRoomData {
    pub joiner_list: Vec<RoomJoiner>,
    pub capacity: u32,
    pub master_id: UserId,
    pub blacklist: Vec<PeerOverview>,
    pub has_password: bool,
}

impl WaitingRoomData {
    /// Insert a joiner, or replace the entry with the same id.
    ///
    /// Returns `false` when the joiner is new and the room is already full;
    /// the roster is left untouched in that case.
    pub fn upsert_joiner(&mut self, joiner: RoomJoiner) -> bool {
        if let Some(existing) = self.joiner_list.iter_mut().find(|j| j.id == joiner.id) {
            *existing = joiner;
            return true;
        }
        if self.joiner_list.len() >= self.capacity as usize {
            return false;
        }
        self.joiner_list.push(joiner);
        true
    }

    /// Remove a joiner. Returns `false` if the id was not present.
    pub fn remove_joiner(&mut self, id: &UserId) -> bool {
        let before = self.joiner_list.len();
        self.joiner_list.retain(|j| &j.id != id);
        self.joiner_list.len() != before
    }

    pub fn is_blocked(&self, id: &UserId) -> bool {
        self.blacklist.iter().any(|p| &p.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PomodoroTimerState {
    #[default]
    Stopped,
    Started,
    ShortBreak,
    LongBreak,
}

impl PomodoroTimerState {
    pub fn label(&self) -> &'static str {
        match self {
            PomodoroTimerState::Stopped => "stopped",
            PomodoroTimerState::Started => "focus",
            PomodoroTimerState::ShortBreak => "short break",
            PomodoroTimerState::LongBreak => "long break",
        }
    }
}

/// Phase a room master can start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    Focus,
    ShortBreak,
    LongBreak,
}

impl TimerPhase {
    pub fn state(&self) -> PomodoroTimerState {
        match self {
            TimerPhase::Focus => PomodoroTimerState::Started,
            TimerPhase::ShortBreak => PomodoroTimerState::ShortBreak,
            TimerPhase::LongBreak => PomodoroTimerState::LongBreak,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerPropertyError {
    #[error("{field} must be within {min}..={max} (got {value})")]
    OutOfRange {
        field: &'static str,
        min: u32,
        max: u32,
        value: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PomodoroTimerProperty {
    pub timer_length_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    pub long_break_interval: u32,
}

impl PomodoroTimerProperty {
    pub const TIMER_LENGTH_RANGE: (u32, u32) = (20, 50);
    pub const SHORT_BREAK_RANGE: (u32, u32) = (3, 10);
    pub const LONG_BREAK_RANGE: (u32, u32) = (10, 30);
    pub const LONG_BREAK_INTERVAL_RANGE: (u32, u32) = (2, 6);

    /// Check every field against its allowed range
    pub fn validate(&self) -> Result<(), TimerPropertyError> {
        check("timerLengthMinutes", self.timer_length_minutes, Self::TIMER_LENGTH_RANGE)?;
        check("shortBreakMinutes", self.short_break_minutes, Self::SHORT_BREAK_RANGE)?;
        check("longBreakMinutes", self.long_break_minutes, Self::LONG_BREAK_RANGE)?;
        check(
            "longBreakInterval",
            self.long_break_interval,
            Self::LONG_BREAK_INTERVAL_RANGE,
        )
    }
}

fn check(field: &'static str, value: u32, (min, max): (u32, u32)) -> Result<(), TimerPropertyError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(TimerPropertyError::OutOfRange {
            field,
            min,
            max,
            value,
        })
    }
}

impl Default for PomodoroTimerProperty {
    fn default() -> Self {
        Self {
            timer_length_minutes: 25,
            short_break_minutes: 5,
            long_break_minutes: 15,
            long_break_interval: 4,
        }
    }
}

/// The room's shared pomodoro timer as last known by this client
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PomodoroTimer {
    pub state: PomodoroTimerState,
    pub property: PomodoroTimerProperty,
    pub started_at: Option<DateTime<FixedOffset>>,
    /// Set while a local start has not been confirmed by the broadcast yet
    pub pending: bool,
}

impl PomodoroTimer {
    /// Authoritative start broadcast
    pub fn apply_started(&mut self, state: PomodoroTimerState, started_at: DateTime<FixedOffset>) {
        self.state = state;
        self.started_at = Some(started_at);
        self.pending = false;
    }

    /// Authoritative property edit; the server stops the timer
    pub fn apply_property(&mut self, property: PomodoroTimerProperty) {
        self.property = property;
        self.state = PomodoroTimerState::Stopped;
        self.started_at = None;
        self.pending = false;
    }

    pub fn start_optimistic(&mut self, phase: TimerPhase) {
        self.state = phase.state();
        self.pending = true;
    }
}

/// A chat message, immutable once received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub author_id: UserId,
    pub author_name: String,
    pub content: String,
    pub sent_at: DateTime<FixedOffset>,
}

/// A remote producer announced by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerInfo {
    pub producer_id: ProducerId,
    pub peer_id: UserId,
    pub kind: MediaKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joiner(id: &str, name: &str) -> RoomJoiner {
        RoomJoiner {
            id: UserId::new(id).unwrap(),
            name: name.to_string(),
            profile_image: None,
        }
    }

    fn waiting_room(capacity: u32) -> WaitingRoomData {
        WaitingRoomData {
            joiner_list: vec![joiner("bob", "Bob")],
            capacity,
            master_id: UserId::new("bob").unwrap(),
            blacklist: vec![],
            has_password: false,
        }
    }

    #[test]
    fn test_upsert_joiner_twice_keeps_single_entry() {
        // テスト項目: 同じ id の参加者を 2 回 upsert しても重複しない
        // given (前提条件):
        let mut data = waiting_room(4);

        // when (操作):
        data.upsert_joiner(joiner("carol", "Carol"));
        data.upsert_joiner(joiner("carol", "Carol B."));

        // then (期待する結果):
        assert_eq!(data.joiner_list.len(), 2);
        assert_eq!(data.joiner_list[1].name, "Carol B.");
    }

    #[test]
    fn test_upsert_joiner_beyond_capacity_is_ignored() {
        // テスト項目: 定員を超える参加は無視される
        // given (前提条件):
        let mut data = waiting_room(1);

        // when (操作):
        let accepted = data.upsert_joiner(joiner("carol", "Carol"));

        // then (期待する結果):
        assert!(!accepted);
        assert_eq!(data.joiner_list.len(), 1);
    }

    #[test]
    fn test_remove_absent_joiner_is_noop() {
        // テスト項目: 存在しない参加者の削除は何もしない
        // given (前提条件):
        let mut data = waiting_room(4);

        // when (操作):
        let removed = data.remove_joiner(&UserId::new("nobody").unwrap());

        // then (期待する結果):
        assert!(!removed);
        assert_eq!(data.joiner_list.len(), 1);
    }

    #[test]
    fn test_timer_property_default_is_valid() {
        // テスト項目: デフォルトのタイマー設定は範囲内である
        // given (前提条件):
        let property = PomodoroTimerProperty::default();

        // when (操作):
        let result = property.validate();

        // then (期待する結果):
        assert!(result.is_ok());
    }

    #[test]
    fn test_timer_property_out_of_range_is_rejected() {
        // テスト項目: 範囲外の短い休憩時間はエラーになる
        // given (前提条件):
        let property = PomodoroTimerProperty {
            short_break_minutes: 11,
            ..Default::default()
        };

        // when (操作):
        let result = property.validate();

        // then (期待する結果):
        assert_eq!(
            result,
            Err(TimerPropertyError::OutOfRange {
                field: "shortBreakMinutes",
                min: 3,
                max: 10,
                value: 11,
            })
        );
    }

    #[test]
    fn test_timer_property_bounds_are_inclusive() {
        // テスト項目: 範囲の上限と下限はどちらも許可される
        // given (前提条件):
        let lower = PomodoroTimerProperty {
            timer_length_minutes: 20,
            short_break_minutes: 3,
            long_break_minutes: 10,
            long_break_interval: 2,
        };
        let upper = PomodoroTimerProperty {
            timer_length_minutes: 50,
            short_break_minutes: 10,
            long_break_minutes: 30,
            long_break_interval: 6,
        };

        // when (操作):
        let results = (lower.validate(), upper.validate());

        // then (期待する結果):
        assert!(results.0.is_ok());
        assert!(results.1.is_ok());
    }

    #[test]
    fn test_apply_property_stops_timer() {
        // テスト項目: タイマー設定の変更でタイマーが停止する
        // given (前提条件):
        let mut timer = PomodoroTimer::default();
        timer.start_optimistic(TimerPhase::Focus);

        // when (操作):
        timer.apply_property(PomodoroTimerProperty {
            timer_length_minutes: 30,
            ..Default::default()
        });

        // then (期待する結果):
        assert_eq!(timer.state, PomodoroTimerState::Stopped);
        assert_eq!(timer.property.timer_length_minutes, 30);
        assert!(!timer.pending);
    }
}
