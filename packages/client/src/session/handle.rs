//! Public handle of a room session.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};

use super::{
    command::{Moderation, Reply, SessionCommand},
    config::SessionConfig,
    machine::RoomSession,
};
use crate::domain::{
    MediaEngine, PomodoroTimerProperty, RoomId, RoomState, SideEffect, SocketChannel, TimerPhase,
    UserId,
};
use crate::error::SessionError;

const COMMAND_BUFFER: usize = 32;

/// Cloneable handle driving one session actor.
///
/// Dropping every clone disposes the session: media is released and the
/// channel disconnected.
#[derive(Clone)]
pub struct RoomSessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<RoomState>,
    side_effects: Arc<Mutex<Option<mpsc::UnboundedReceiver<SideEffect>>>>,
}

impl RoomSessionHandle {
    /// Spawn the session actor on the current runtime.
    ///
    /// Without a media engine the session still handles rooms, chat and the
    /// timer; media toggles fail with [`SessionError::MediaUnavailable`].
    pub fn spawn(
        config: SessionConfig,
        channel: Arc<dyn SocketChannel>,
        engine: Option<Arc<dyn MediaEngine>>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (state_tx, state_rx) = watch::channel(RoomState::initial());
        let (effect_tx, effect_rx) = mpsc::unbounded_channel();

        let session = RoomSession::new(config, channel, engine, command_rx, state_tx, effect_tx);
        tokio::spawn(session.run());

        Self {
            commands: command_tx,
            state: state_rx,
            side_effects: Arc::new(Mutex::new(Some(effect_rx))),
        }
    }

    /// Snapshot stream of the session state
    pub fn state(&self) -> watch::Receiver<RoomState> {
        self.state.clone()
    }

    pub fn current_state(&self) -> RoomState {
        self.state.borrow().clone()
    }

    /// One-shot notifications (messages, disconnect reasons).
    ///
    /// There is a single consumer; later calls return `None`.
    pub fn take_side_effects(&self) -> Option<mpsc::UnboundedReceiver<SideEffect>> {
        self.side_effects.lock().take()
    }

    /// Open the socket and enter the waiting room of `room_id`
    pub async fn connect(&self, room_id: RoomId) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::Connect { room_id, reply })
            .await
    }

    /// Request to enter the study room. An empty password is sent as is.
    pub async fn join_study_room(&self, password: impl Into<String>) -> Result<(), SessionError> {
        let password = password.into();
        self.call(|reply| SessionCommand::JoinStudyRoom { password, reply })
            .await
    }

    /// Abandon a pending join; a no-op when nothing is pending
    pub async fn cancel_join(&self) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::CancelJoin { reply }).await
    }

    /// Returns whether the microphone is on afterwards
    pub async fn toggle_microphone(&self) -> Result<bool, SessionError> {
        self.call(|reply| SessionCommand::ToggleMicrophone { reply })
            .await
    }

    /// Returns whether the camera is on afterwards
    pub async fn toggle_video(&self) -> Result<bool, SessionError> {
        self.call(|reply| SessionCommand::ToggleVideo { reply }).await
    }

    /// Returns whether the headset is enabled afterwards
    pub async fn toggle_headset(&self) -> Result<bool, SessionError> {
        self.call(|reply| SessionCommand::ToggleHeadset { reply })
            .await
    }

    pub async fn send_chat(&self, content: impl Into<String>) -> Result<(), SessionError> {
        let content = content.into();
        self.call(|reply| SessionCommand::SendChat { content, reply })
            .await
    }

    pub async fn start_timer(&self, phase: TimerPhase) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::StartTimer { phase, reply })
            .await
    }

    pub async fn edit_timer(&self, property: PomodoroTimerProperty) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::EditTimer { property, reply })
            .await
    }

    pub async fn kick_user(&self, user_id: UserId) -> Result<(), SessionError> {
        self.moderate(Moderation::Kick, user_id).await
    }

    pub async fn block_user(&self, user_id: UserId) -> Result<(), SessionError> {
        self.moderate(Moderation::Block, user_id).await
    }

    pub async fn unblock_user(&self, user_id: UserId) -> Result<(), SessionError> {
        self.moderate(Moderation::Unblock, user_id).await
    }

    /// Leave the room. Calling it twice is harmless.
    pub async fn disconnect(&self) {
        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(SessionCommand::Disconnect { reply })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    /// Wait until the published state satisfies `predicate`
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<RoomState, SessionError>
    where
        F: FnMut(&RoomState) -> bool,
    {
        let mut state = self.state.clone();
        let matched = state
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| SessionError::SessionClosed)?;
        Ok(matched.clone())
    }

    async fn moderate(&self, action: Moderation, user_id: UserId) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::Moderate {
            action,
            user_id,
            reply,
        })
        .await
    }

    async fn call<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| SessionError::SessionClosed)?;
        rx.await.map_err(|_| SessionError::SessionClosed)?
    }
}
