//! Room エンティティ
//!
//! 待合室にいるユーザー (`waiting`) と学習室のメンバー (`members`) を区別して保持します。
//! 最初に待合室へ入ったユーザーがルームマスターになります。

use chrono::{DateTime, FixedOffset};
use studyroom_shared::protocol::MediaKind;

use super::{RoomError, RoomId, UserId};

/// 待合室にいるユーザー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visitor {
    pub id: UserId,
    pub name: String,
}

/// 学習室のメンバー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: UserId,
    pub name: String,
    pub enabled_microphone: bool,
    pub enabled_headset: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedUser {
    pub id: UserId,
    pub name: String,
}

/// SFU に登録されたメディア送信
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Producer {
    pub id: String,
    pub peer_id: UserId,
    pub kind: MediaKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerState {
    #[default]
    Stopped,
    Started,
    ShortBreak,
    LongBreak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerProperty {
    pub timer_length_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    pub long_break_interval: u32,
}

impl Default for TimerProperty {
    fn default() -> Self {
        Self {
            timer_length_minutes: 25,
            short_break_minutes: 5,
            long_break_minutes: 15,
            long_break_interval: 4,
        }
    }
}

impl TimerProperty {
    pub fn validate(&self) -> Result<(), RoomError> {
        let checks = [
            ("timerLengthMinutes", self.timer_length_minutes, 20, 50),
            ("shortBreakMinutes", self.short_break_minutes, 3, 10),
            ("longBreakMinutes", self.long_break_minutes, 10, 30),
            ("longBreakInterval", self.long_break_interval, 2, 6),
        ];
        for (field, value, min, max) in checks {
            if !(min..=max).contains(&value) {
                return Err(RoomError::InvalidTimerProperty(format!(
                    "{field} must be between {min} and {max}, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// ルーム共有のポモドーロタイマー
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Timer {
    pub state: TimerState,
    pub property: TimerProperty,
    pub started_at: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub id: RoomId,
    pub capacity: u32,
    password: Option<String>,
    pub master_id: Option<UserId>,
    pub waiting: Vec<Visitor>,
    pub members: Vec<Member>,
    pub blacklist: Vec<BlockedUser>,
    pub timer: Timer,
    pub producers: Vec<Producer>,
    pub created_at: DateTime<FixedOffset>,
}

impl Room {
    pub fn new(
        id: RoomId,
        capacity: u32,
        password: Option<String>,
        created_at: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            id,
            capacity,
            password: password.filter(|p| !p.is_empty()),
            master_id: None,
            waiting: Vec::new(),
            members: Vec::new(),
            blacklist: Vec::new(),
            timer: Timer::default(),
            producers: Vec::new(),
            created_at,
        }
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    pub fn is_blocked(&self, id: &UserId) -> bool {
        self.blacklist.iter().any(|b| &b.id == id)
    }

    pub fn is_member(&self, id: &UserId) -> bool {
        self.members.iter().any(|m| &m.id == id)
    }

    pub fn member(&self, id: &UserId) -> Option<&Member> {
        self.members.iter().find(|m| &m.id == id)
    }

    /// Everyone connected to this room, waiting or studying
    pub fn connected_ids(&self) -> Vec<UserId> {
        self.waiting
            .iter()
            .map(|v| v.id.clone())
            .chain(self.members.iter().map(|m| m.id.clone()))
            .collect()
    }

    pub fn member_ids(&self) -> Vec<UserId> {
        self.members.iter().map(|m| m.id.clone()).collect()
    }

    /// Enter the waiting room. The first visitor of a room becomes its master.
    pub fn enter_waiting_room(&mut self, id: UserId, name: String) -> Result<(), RoomError> {
        if self.is_blocked(&id) {
            return Err(RoomError::Blocked);
        }
        if self.master_id.is_none() {
            self.master_id = Some(id.clone());
        }
        if !self.is_member(&id) && !self.waiting.iter().any(|v| v.id == id) {
            self.waiting.push(Visitor { id, name });
        }
        Ok(())
    }

    /// Move a visitor into the study room.
    ///
    /// Checked in order: blacklist, password, capacity. A room without a
    /// password accepts any input.
    pub fn join(
        &mut self,
        id: &UserId,
        name: &str,
        muted_headset: bool,
        password_input: &str,
    ) -> Result<&Member, RoomError> {
        if self.is_blocked(id) {
            return Err(RoomError::Blocked);
        }
        if let Some(password) = &self.password
            && password != password_input
        {
            return Err(RoomError::BadPassword);
        }
        if !self.is_member(id) {
            if self.members.len() as u32 >= self.capacity {
                return Err(RoomError::Full);
            }
            self.waiting.retain(|v| &v.id != id);
            self.members.push(Member {
                id: id.clone(),
                name: name.to_string(),
                enabled_microphone: false,
                enabled_headset: !muted_headset,
            });
        }
        self.member(id)
            .ok_or_else(|| RoomError::NotInRoom(id.to_string()))
    }

    /// Remove a user from the room entirely
    ///
    /// # Returns
    ///
    /// The producers the user owned
    pub fn leave(&mut self, id: &UserId) -> Vec<Producer> {
        self.waiting.retain(|v| &v.id != id);
        self.members.retain(|m| &m.id != id);
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.producers)
            .into_iter()
            .partition(|p| &p.peer_id == id);
        self.producers = kept;
        removed
    }

    pub fn require_master(&self, id: &UserId) -> Result<(), RoomError> {
        match &self.master_id {
            Some(master) if master == id => Ok(()),
            _ => Err(RoomError::NotMaster),
        }
    }

    fn member_mut(&mut self, id: &UserId) -> Result<&mut Member, RoomError> {
        self.members
            .iter_mut()
            .find(|m| &m.id == id)
            .ok_or_else(|| RoomError::NotInRoom(id.to_string()))
    }

    pub fn set_headset(&mut self, id: &UserId, enabled: bool) -> Result<Member, RoomError> {
        let member = self.member_mut(id)?;
        member.enabled_headset = enabled;
        Ok(member.clone())
    }

    pub fn start_timer(
        &mut self,
        by: &UserId,
        state: TimerState,
        now: DateTime<FixedOffset>,
    ) -> Result<(), RoomError> {
        self.require_master(by)?;
        self.timer.state = state;
        self.timer.started_at = Some(now);
        Ok(())
    }

    /// Replace the timer property; the timer stops
    pub fn edit_timer(&mut self, by: &UserId, property: TimerProperty) -> Result<(), RoomError> {
        self.require_master(by)?;
        property.validate()?;
        self.timer = Timer {
            state: TimerState::Stopped,
            property,
            started_at: None,
        };
        Ok(())
    }

    /// Record a producer. A peer has at most one producer per kind.
    ///
    /// # Returns
    ///
    /// The producer it replaced, if any
    pub fn add_producer(&mut self, producer: Producer) -> Result<Option<Producer>, RoomError> {
        let is_audio = producer.kind == MediaKind::Audio;
        let member = self.member_mut(&producer.peer_id)?;
        if is_audio {
            member.enabled_microphone = true;
        }
        let replaced = self
            .producers
            .iter()
            .position(|p| p.peer_id == producer.peer_id && p.kind == producer.kind)
            .map(|index| self.producers.remove(index));
        self.producers.push(producer);
        Ok(replaced)
    }

    pub fn remove_producer(
        &mut self,
        peer_id: &UserId,
        producer_id: &str,
    ) -> Result<Producer, RoomError> {
        let index = self
            .producers
            .iter()
            .position(|p| p.id == producer_id && &p.peer_id == peer_id)
            .ok_or_else(|| RoomError::UnknownProducer(producer_id.to_string()))?;
        let producer = self.producers.remove(index);
        if producer.kind == MediaKind::Audio
            && let Ok(member) = self.member_mut(peer_id)
        {
            member.enabled_microphone = false;
        }
        Ok(producer)
    }

    pub fn producer(&self, producer_id: &str) -> Option<&Producer> {
        self.producers.iter().find(|p| p.id == producer_id)
    }

    /// Producers a peer can consume
    pub fn producers_except(&self, peer_id: &UserId) -> Vec<Producer> {
        self.producers
            .iter()
            .filter(|p| &p.peer_id != peer_id)
            .cloned()
            .collect()
    }

    fn display_name(&self, id: &UserId) -> Option<String> {
        self.member(id)
            .map(|m| m.name.clone())
            .or_else(|| {
                self.waiting
                    .iter()
                    .find(|v| &v.id == id)
                    .map(|v| v.name.clone())
            })
    }

    /// Remove a user at the master's request
    pub fn kick(&mut self, by: &UserId, target: &UserId) -> Result<Vec<Producer>, RoomError> {
        self.require_master(by)?;
        if self.display_name(target).is_none() {
            return Err(RoomError::UnknownUser(target.to_string()));
        }
        Ok(self.leave(target))
    }

    /// Remove a user and keep them out
    pub fn block(&mut self, by: &UserId, target: &UserId) -> Result<Vec<Producer>, RoomError> {
        self.require_master(by)?;
        let name = self
            .display_name(target)
            .ok_or_else(|| RoomError::UnknownUser(target.to_string()))?;
        if !self.is_blocked(target) {
            self.blacklist.push(BlockedUser {
                id: target.clone(),
                name,
            });
        }
        Ok(self.leave(target))
    }

    pub fn unblock(&mut self, by: &UserId, target: &UserId) -> Result<(), RoomError> {
        self.require_master(by)?;
        let before = self.blacklist.len();
        self.blacklist.retain(|b| &b.id != target);
        if self.blacklist.len() == before {
            return Err(RoomError::UnknownUser(target.to_string()));
        }
        Ok(())
    }
}
