//! Messages flowing into the session actor.

use tokio::sync::oneshot;

use crate::domain::{
    ConsumerHandle, MediaKind, PomodoroTimerProperty, ProducerHandle, ProducerInfo, RoomId,
    TimerPhase, UserId, WaitingRoomData,
};
use crate::error::{MediaError, SessionError};
use crate::infrastructure::codec::JoinRoomOutcome;

pub type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// UI intents
#[derive(Debug)]
pub enum SessionCommand {
    Connect { room_id: RoomId, reply: Reply<()> },
    JoinStudyRoom { password: String, reply: Reply<()> },
    CancelJoin { reply: Reply<()> },
    ToggleMicrophone { reply: Reply<bool> },
    ToggleVideo { reply: Reply<bool> },
    ToggleHeadset { reply: Reply<bool> },
    SendChat { content: String, reply: Reply<()> },
    StartTimer { phase: TimerPhase, reply: Reply<()> },
    EditTimer { property: PomodoroTimerProperty, reply: Reply<()> },
    Moderate { action: Moderation, user_id: UserId, reply: Reply<()> },
    Disconnect { reply: oneshot::Sender<()> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Moderation {
    Kick,
    Block,
    Unblock,
}

impl Moderation {
    pub fn operation(&self) -> &'static str {
        match self {
            Moderation::Kick => "kick a user",
            Moderation::Block => "block a user",
            Moderation::Unblock => "unblock a user",
        }
    }
}

/// Result of a join task: the decoded acknowledgement, with media prepared
pub type JoinResult = Result<JoinRoomOutcome, SessionError>;

/// Results of spawned I/O re-entering the actor
#[derive(Debug)]
pub enum Completion {
    Connected(Result<WaitingRoomData, SessionError>),
    Joined { token: u64, result: JoinResult },
    ProducersListed(Result<Vec<ProducerInfo>, SessionError>),
    Consumed {
        info: ProducerInfo,
        result: Result<ConsumerHandle, MediaError>,
    },
    Produced {
        kind: MediaKind,
        result: Result<ProducerHandle, MediaError>,
        reply: Reply<bool>,
    },
    ChatSent {
        result: Result<(), SessionError>,
        reply: Reply<()>,
    },
    Moderated {
        action: Moderation,
        user_id: UserId,
        result: Result<(), SessionError>,
        reply: Reply<()>,
    },
}

impl Completion {
    /// Consumer left behind by a completion that arrived after teardown
    pub fn into_orphaned_consumer(self) -> Option<ConsumerHandle> {
        match self {
            Completion::Consumed { result: Ok(consumer), .. } => Some(consumer),
            _ => None,
        }
    }
}
