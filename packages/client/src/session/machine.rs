//! Room session state machine.
//!
//! A single actor task owns every piece of session state. UI commands,
//! inbound channel events and completions of spawned I/O are processed one
//! at a time in the loop of [`RoomSession::run`]. Spawned tasks are tagged
//! with the generation they were started in; a teardown bumps the
//! generation so late completions are recognised and cleaned up.

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::Arc,
    time::Duration,
};

use serde_json::json;
use studyroom_shared::protocol::EventName;
use tokio::{
    sync::{mpsc, watch},
    task::{AbortHandle, JoinError, JoinSet},
};
use tracing::{debug, error, info, warn};

use super::{
    command::{Completion, JoinResult, Moderation, Reply, SessionCommand},
    config::SessionConfig,
};
use crate::domain::{
    ChannelEvent, ConsumerHandle, DisconnectReason, EventSubscription, MediaEngine, MediaKind,
    PeerMediaRegistry, PeerOverview, PeerState, PomodoroTimerProperty, ProducerId, ProducerInfo,
    RoomId, RoomState, SideEffect, SocketChannel, StudyRoom, StudyRoomState, TimerPhase, UserId,
    WaitingRoom, WaitingRoomData, WaitingRoomState, with_timeout,
};
use crate::error::{ChannelError, MediaError, SessionError};
use crate::infrastructure::{
    MediaSignalingAdapter,
    codec::{self, JoinRoomOutcome, JoinedRoom, RoomEvent},
    dto,
};

/// One item the actor loop reacts to
enum Input {
    Command(SessionCommand),
    Event(ChannelEvent),
    Task(Result<(u64, Completion), JoinError>),
}

struct PendingJoin {
    token: u64,
    reply: Reply<()>,
    task: AbortHandle,
}

pub(crate) struct RoomSession {
    config: SessionConfig,
    channel: Arc<dyn SocketChannel>,
    engine: Option<Arc<dyn MediaEngine>>,
    commands: mpsc::Receiver<SessionCommand>,
    state_tx: watch::Sender<RoomState>,
    side_effects: mpsc::UnboundedSender<SideEffect>,

    state: RoomState,
    subscription: Option<EventSubscription>,
    /// Events received while connecting or joining, replayed afterwards
    buffered: Vec<(String, serde_json::Value)>,
    tasks: JoinSet<(u64, Completion)>,
    generation: u64,
    /// `connect` was called on the channel and not undone yet
    channel_held: bool,
    connect_reply: Option<Reply<()>>,
    join: Option<PendingJoin>,
    next_join_token: u64,
    /// Created on join, released on leave
    adapter: Option<Arc<MediaSignalingAdapter>>,
    /// Producers with a consume in flight, and the peer they belong to
    pending_consumes: HashMap<ProducerId, UserId>,
    /// Media kinds with a produce in flight
    producing: HashSet<MediaKind>,
}

impl RoomSession {
    pub(crate) fn new(
        config: SessionConfig,
        channel: Arc<dyn SocketChannel>,
        engine: Option<Arc<dyn MediaEngine>>,
        commands: mpsc::Receiver<SessionCommand>,
        state_tx: watch::Sender<RoomState>,
        side_effects: mpsc::UnboundedSender<SideEffect>,
    ) -> Self {
        Self {
            config,
            channel,
            engine,
            commands,
            state_tx,
            side_effects,
            state: RoomState::initial(),
            subscription: None,
            buffered: Vec::new(),
            tasks: JoinSet::new(),
            generation: 0,
            channel_held: false,
            connect_reply: None,
            join: None,
            next_join_token: 0,
            adapter: None,
            pending_consumes: HashMap::new(),
            producing: HashSet::new(),
        }
    }

    /// Actor loop. Returns once every handle has been dropped.
    pub(crate) async fn run(mut self) {
        loop {
            let input = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => Input::Command(command),
                    None => break,
                },
                Some(event) = next_event(&mut self.subscription) => Input::Event(event),
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    Input::Task(joined)
                }
            };

            match input {
                Input::Command(command) => self.on_command(command).await,
                Input::Event(event) => self.on_event(event).await,
                Input::Task(Ok((generation, completion))) => {
                    if generation == self.generation {
                        self.on_completion(completion).await;
                    } else {
                        self.on_stale_completion(completion).await;
                    }
                }
                Input::Task(Err(e)) if e.is_cancelled() => {}
                Input::Task(Err(e)) => error!("Session task failed: {}", e),
            }
        }

        debug!("All session handles dropped");
        if !matches!(self.state, RoomState::Disconnected { .. }) {
            self.release_session().await;
            self.set_state(RoomState::Disconnected {
                reason: Some(DisconnectReason::Disposed),
            });
        }
    }

    // ========================================
    // Commands
    // ========================================

    async fn on_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect { room_id, reply } => self.connect(room_id, reply),
            SessionCommand::JoinStudyRoom { password, reply } => {
                self.join_study_room(password, reply)
            }
            SessionCommand::CancelJoin { reply } => {
                self.cancel_join().await;
                let _ = reply.send(Ok(()));
            }
            SessionCommand::ToggleMicrophone { reply } => {
                self.toggle_media(MediaKind::Audio, reply).await
            }
            SessionCommand::ToggleVideo { reply } => self.toggle_media(MediaKind::Video, reply).await,
            SessionCommand::ToggleHeadset { reply } => {
                let result = self.toggle_headset().await;
                let _ = reply.send(result);
            }
            SessionCommand::SendChat { content, reply } => self.send_chat(content, reply),
            SessionCommand::StartTimer { phase, reply } => {
                let result = self.start_timer(phase).await;
                let _ = reply.send(result);
            }
            SessionCommand::EditTimer { property, reply } => {
                let result = self.edit_timer(property).await;
                let _ = reply.send(result);
            }
            SessionCommand::Moderate {
                action,
                user_id,
                reply,
            } => self.moderate(action, user_id, reply),
            SessionCommand::Disconnect { reply } => {
                self.disconnect().await;
                let _ = reply.send(());
            }
        }
    }

    fn connect(&mut self, room_id: RoomId, reply: Reply<()>) {
        if matches!(self.state, RoomState::Connecting { .. }) {
            let _ = reply.send(Err(SessionError::AlreadyInProgress("connect")));
            return;
        }
        if !self.state.can_connect() {
            let _ = reply.send(Err(self.invalid_state("connect")));
            return;
        }

        info!("Connecting to room {}", room_id);
        self.set_state(RoomState::Connecting {
            room_id: room_id.clone(),
        });
        // subscribe before connecting so no early event is missed
        self.subscription = Some(self.channel.subscribe().only(&codec::SERVER_EVENTS));
        self.buffered.clear();
        self.channel_held = true;
        self.connect_reply = Some(reply);

        let channel = Arc::clone(&self.channel);
        let user_id = self.config.user_id.clone();
        let connect_timeout = self.config.connect_timeout;
        let request_timeout = self.config.request_timeout;
        self.spawn(async move {
            let result =
                join_waiting_room(channel, room_id, user_id, connect_timeout, request_timeout)
                    .await;
            Completion::Connected(result)
        });
    }

    fn join_study_room(&mut self, password: String, reply: Reply<()>) {
        let Some(room) = waiting_room_mut(&mut self.state) else {
            let _ = reply.send(Err(self.invalid_state("join the study room")));
            return;
        };
        if room.joining {
            let _ = reply.send(Err(SessionError::AlreadyInProgress("join")));
            return;
        }
        room.joining = true;
        info!("Joining study room {}", room.room_id);

        let adapter = self.engine.as_ref().map(|engine| {
            Arc::new(MediaSignalingAdapter::new(
                Arc::clone(&self.channel),
                Arc::clone(engine),
                self.config.request_timeout,
            ))
        });
        self.adapter = adapter.clone();

        self.next_join_token += 1;
        let token = self.next_join_token;
        let request = dto::JoinRoomRequest {
            user_id: self.config.user_id.as_str().to_string(),
            muted_headset: self.config.muted_headset,
            room_password_input: password,
        };
        let channel = Arc::clone(&self.channel);
        let join_timeout = self.config.join_timeout;
        let task = self.spawn(async move {
            let result = join_room(channel, request, adapter, join_timeout).await;
            Completion::Joined { token, result }
        });
        self.join = Some(PendingJoin { token, reply, task });
        self.publish();
    }

    async fn cancel_join(&mut self) {
        let Some(pending) = self.join.take() else {
            return;
        };
        pending.task.abort();
        info!("Join cancelled");
        self.abandon_join().await;
        let _ = pending.reply.send(Err(SessionError::Cancelled));
    }

    async fn toggle_media(&mut self, kind: MediaKind, reply: Reply<bool>) {
        let operation = match kind {
            MediaKind::Audio => "toggle the microphone",
            MediaKind::Video => "toggle the video",
        };
        if active_room(&mut self.state).is_none() {
            let _ = reply.send(Err(self.invalid_state(operation)));
            return;
        }
        let Some(adapter) = self.adapter.clone() else {
            let _ = reply.send(Err(SessionError::MediaUnavailable));
            return;
        };
        if self.producing.contains(&kind) {
            let _ = reply.send(Err(MediaError::AlreadyInProgress(kind).into()));
            return;
        }

        if adapter.is_producing(kind) {
            adapter.close_producer(kind).await;
            self.set_local_media(kind, false);
            let _ = reply.send(Ok(false));
            return;
        }

        self.producing.insert(kind);
        self.spawn(async move {
            let result = adapter.produce(kind).await;
            Completion::Produced {
                kind,
                result,
                reply,
            }
        });
    }

    async fn toggle_headset(&mut self) -> Result<bool, SessionError> {
        let muted = match active_room(&mut self.state) {
            Some(room) => !room.headset_muted,
            None => return Err(self.invalid_state("toggle the headset")),
        };
        let event = if muted {
            EventName::MuteHeadset
        } else {
            EventName::UnmuteHeadset
        };
        with_timeout(self.config.request_timeout, self.channel.emit(event, json!({}))).await?;

        if let Some(room) = active_room(&mut self.state) {
            room.headset_muted = muted;
            update_me(room, |me| me.enabled_headset = !muted);
        }
        self.publish();
        Ok(!muted)
    }

    fn send_chat(&mut self, content: String, reply: Reply<()>) {
        let content = content.trim().to_string();
        if content.is_empty() {
            let _ = reply.send(Err(SessionError::EmptyMessage));
            return;
        }
        if active_room(&mut self.state).is_none() {
            let _ = reply.send(Err(self.invalid_state("send a chat message")));
            return;
        }

        let channel = Arc::clone(&self.channel);
        let timeout = self.config.request_timeout;
        let retries = self.config.chat_retry_limit;
        self.spawn(async move {
            let result = send_chat_message(channel, content, timeout, retries).await;
            Completion::ChatSent { result, reply }
        });
    }

    async fn start_timer(&mut self, phase: TimerPhase) -> Result<(), SessionError> {
        let operation = "start the timer";
        let previous = match active_room(&mut self.state) {
            Some(room) if !room.is_master() => return Err(SessionError::NotMaster(operation)),
            Some(room) => {
                let previous = room.timer.clone();
                room.timer.start_optimistic(phase);
                previous
            }
            None => return Err(self.invalid_state(operation)),
        };
        self.publish();

        let event = match phase {
            TimerPhase::Focus => EventName::StartTimer,
            TimerPhase::ShortBreak => EventName::StartShortBreak,
            TimerPhase::LongBreak => EventName::StartLongBreak,
        };
        if let Err(e) = self.channel.emit(event, json!({})).await {
            if let Some(room) = active_room(&mut self.state) {
                room.timer = previous;
            }
            self.publish();
            return Err(e.into());
        }
        Ok(())
    }

    async fn edit_timer(&mut self, property: PomodoroTimerProperty) -> Result<(), SessionError> {
        let operation = "edit the timer";
        match active_room(&mut self.state) {
            Some(room) if !room.is_master() => return Err(SessionError::NotMaster(operation)),
            Some(_) => {}
            None => return Err(self.invalid_state(operation)),
        }
        property.validate()?;

        let event = EventName::EditAndStopTimer;
        let payload = codec::encode(event, &dto::TimerPropertyDto::from(property))?;
        self.channel.emit(event, payload).await?;
        Ok(())
    }

    fn moderate(&mut self, action: Moderation, user_id: UserId, reply: Reply<()>) {
        let operation = action.operation();
        match active_room(&mut self.state) {
            Some(room) if !room.is_master() => {
                let _ = reply.send(Err(SessionError::NotMaster(operation)));
                return;
            }
            Some(_) => {}
            None => {
                let _ = reply.send(Err(self.invalid_state(operation)));
                return;
            }
        }

        let event = match action {
            Moderation::Kick => EventName::KickUser,
            Moderation::Block => EventName::BlockUser,
            Moderation::Unblock => EventName::UnblockUser,
        };
        let channel = Arc::clone(&self.channel);
        let timeout = self.config.request_timeout;
        self.spawn(async move {
            let result = request_moderation(channel, event, &user_id, timeout).await;
            Completion::Moderated {
                action,
                user_id,
                result,
                reply,
            }
        });
    }

    async fn disconnect(&mut self) {
        if matches!(self.state, RoomState::Disconnected { .. }) {
            return;
        }
        info!("Leaving room ({})", self.state.label());
        self.release_session().await;
        self.set_state(RoomState::Disconnected {
            reason: Some(DisconnectReason::UserRequested),
        });
    }

    // ========================================
    // Inbound events
    // ========================================

    async fn on_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Disconnected => self.on_channel_closed().await,
            ChannelEvent::Event { name, data } => {
                if self.is_buffering() {
                    debug!("Buffering '{}' until the room snapshot is applied", name);
                    self.buffered.push((name, data));
                } else {
                    self.apply_event(&name, data).await;
                }
            }
        }
    }

    fn is_buffering(&self) -> bool {
        match &self.state {
            RoomState::Connecting { .. } => true,
            RoomState::WaitingRoom(WaitingRoomState::Connected(room)) => room.joining,
            _ => false,
        }
    }

    async fn replay_buffered(&mut self) {
        for (name, data) in std::mem::take(&mut self.buffered) {
            self.apply_event(&name, data).await;
        }
    }

    async fn apply_event(&mut self, name: &str, data: serde_json::Value) {
        let event = match codec::decode_event(name, data) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping inbound event: {}", e);
                return;
            }
        };
        match &self.state {
            RoomState::WaitingRoom(WaitingRoomState::Connected(_)) => {
                self.apply_waiting_room_event(event).await
            }
            RoomState::StudyRoom(StudyRoomState::Active(_)) => {
                self.apply_study_room_event(event).await
            }
            state => debug!("Ignoring {:?} while {}", event, state.label()),
        }
    }

    async fn apply_waiting_room_event(&mut self, event: RoomEvent) {
        let me = self.config.user_id.clone();
        let Some(room) = waiting_room_mut(&mut self.state) else {
            return;
        };
        let data = &mut room.data;
        match event {
            RoomEvent::OtherPeerJoined(joiner) => {
                let id = joiner.id.clone();
                if !data.upsert_joiner(joiner) {
                    warn!("Waiting room is full ({}), ignoring joiner {}", data.capacity, id);
                }
            }
            RoomEvent::OtherPeerExited(id) | RoomEvent::OtherPeerDisconnected(id) => {
                data.remove_joiner(&id);
            }
            RoomEvent::Kicked(id) if id == me => {
                return self.terminate(DisconnectReason::Kicked).await;
            }
            RoomEvent::Blocked(id) if id == me => {
                return self.terminate(DisconnectReason::Blocked).await;
            }
            RoomEvent::Kicked(id) => {
                data.remove_joiner(&id);
            }
            RoomEvent::Blocked(id) => {
                block_in_waiting_room(data, id);
            }
            other => debug!("Ignoring {:?} in the waiting room", other),
        }
        self.publish();
    }

    async fn apply_study_room_event(&mut self, event: RoomEvent) {
        let me = self.config.user_id.clone();
        let mut to_close = Vec::new();
        let mut to_consume = None;
        {
            let Some(room) = active_room(&mut self.state) else {
                return;
            };
            match event {
                RoomEvent::OtherPeerJoined(joiner) => {
                    debug!("{} entered the waiting room", joiner.id);
                    return;
                }
                RoomEvent::OtherPeerExited(id) | RoomEvent::OtherPeerDisconnected(id) => {
                    info!("Peer {} left the study room", id);
                    to_close = room.peers.remove(&id);
                    self.pending_consumes.retain(|_, peer| peer != &id);
                }
                RoomEvent::PeerStateChanged(state) => room.peers.upsert(state),
                RoomEvent::NewProducer(info) => to_consume = Some(info),
                RoomEvent::ProducerClosed(info) => {
                    to_close.extend(room.peers.detach_by_producer(&info.producer_id));
                    self.pending_consumes.remove(&info.producer_id);
                }
                RoomEvent::ChatReceived(message) => room.chat.push(message),
                RoomEvent::TimerStateChanged { state, started_at } => {
                    room.timer.apply_started(state, started_at)
                }
                RoomEvent::TimerPropertyChanged(property) => room.timer.apply_property(property),
                RoomEvent::Kicked(id) if id == me => {
                    return self.terminate(DisconnectReason::Kicked).await;
                }
                RoomEvent::Blocked(id) if id == me => {
                    return self.terminate(DisconnectReason::Blocked).await;
                }
                RoomEvent::Kicked(id) => {
                    info!("Peer {} was kicked", id);
                    to_close = room.peers.remove(&id);
                    self.pending_consumes.retain(|_, peer| peer != &id);
                }
                RoomEvent::Blocked(id) => {
                    info!("Peer {} was blocked", id);
                    if let Some(peer) = room.peers.get(&id) {
                        let name = peer.state.name.clone();
                        if !room.blacklist.iter().any(|p| p.id == id) {
                            room.blacklist.push(PeerOverview {
                                id: id.clone(),
                                name,
                            });
                        }
                    }
                    to_close = room.peers.remove(&id);
                    self.pending_consumes.retain(|_, peer| peer != &id);
                }
            }
        }

        for consumer in to_close {
            self.close_consumer(consumer).await;
        }
        if let Some(info) = to_consume {
            self.request_consume(info);
        }
        self.publish();
    }

    async fn on_channel_closed(&mut self) {
        let next = match &self.state {
            RoomState::WaitingRoom(WaitingRoomState::Connected(room)) => {
                RoomState::WaitingRoom(WaitingRoomState::FailedToConnect {
                    room_id: room.room_id.clone(),
                    message: ChannelError::Disconnected.to_string(),
                })
            }
            RoomState::StudyRoom(StudyRoomState::Active(room)) => {
                RoomState::StudyRoom(StudyRoomState::Disconnected {
                    room_id: room.room_id.clone(),
                })
            }
            // a pending connect fails on its own
            _ => return,
        };

        warn!("Connection lost while {}", self.state.label());
        if let Some(join) = self.join.take() {
            join.task.abort();
            let _ = join.reply.send(Err(ChannelError::Disconnected.into()));
        }
        self.release_session().await;
        self.set_state(next);
        self.emit(SideEffect::Disconnected {
            reason: DisconnectReason::SocketClosed,
        });
    }

    // ========================================
    // Completions
    // ========================================

    async fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Connected(result) => self.on_connected(result).await,
            Completion::Joined { token, result } => self.on_joined(token, result).await,
            Completion::ProducersListed(result) => self.on_producers_listed(result).await,
            Completion::Consumed { info, result } => self.on_consumed(info, result).await,
            Completion::Produced {
                kind,
                result,
                reply,
            } => {
                self.producing.remove(&kind);
                match result {
                    Ok(_) => {
                        self.set_local_media(kind, true);
                        let _ = reply.send(Ok(true));
                    }
                    Err(e) => {
                        warn!("Failed to produce {}: {}", kind, e);
                        let device = match kind {
                            MediaKind::Audio => "microphone",
                            MediaKind::Video => "camera",
                        };
                        self.emit(SideEffect::message(
                            format!("Could not start the {device}"),
                            Some(e.to_string()),
                        ));
                        let _ = reply.send(Err(e.into()));
                    }
                }
            }
            Completion::ChatSent { result, reply } => {
                if let Err(e) = &result {
                    warn!("Failed to send chat message: {}", e);
                    self.emit(SideEffect::message(
                        "Failed to send the chat message",
                        Some(e.to_string()),
                    ));
                }
                let _ = reply.send(result);
            }
            Completion::Moderated {
                action,
                user_id,
                result,
                reply,
            } => {
                match &result {
                    Ok(()) if action == Moderation::Unblock => {
                        if let Some(room) = active_room(&mut self.state) {
                            room.blacklist.retain(|p| p.id != user_id);
                        }
                        self.publish();
                    }
                    Ok(()) => debug!("{:?} of {} acknowledged", action, user_id),
                    Err(e) => warn!("Failed to {} {}: {}", action.operation(), user_id, e),
                }
                let _ = reply.send(result);
            }
        }
    }

    async fn on_stale_completion(&mut self, completion: Completion) {
        if let Some(consumer) = completion.into_orphaned_consumer() {
            debug!("Closing consumer {} of a finished session", consumer.id);
            if let Some(engine) = &self.engine {
                engine.close_consumer(&consumer).await;
            }
        }
    }

    async fn on_connected(&mut self, result: Result<WaitingRoomData, SessionError>) {
        let RoomState::Connecting { room_id } = &self.state else {
            return;
        };
        let room_id = room_id.clone();
        let reply = self.connect_reply.take();

        match result {
            Ok(data) => {
                info!(
                    "Entered waiting room {} ({}/{} joiner(s))",
                    room_id,
                    data.joiner_list.len(),
                    data.capacity
                );
                self.set_state(RoomState::WaitingRoom(WaitingRoomState::Connected(
                    WaitingRoom {
                        room_id,
                        data,
                        joining: false,
                    },
                )));
                self.replay_buffered().await;
                if let Some(reply) = reply {
                    let _ = reply.send(Ok(()));
                }
            }
            Err(e) => {
                warn!("Failed to connect to room {}: {}", room_id, e);
                self.release_session().await;
                self.set_state(RoomState::WaitingRoom(WaitingRoomState::FailedToConnect {
                    room_id,
                    message: e.to_string(),
                }));
                if let Some(reply) = reply {
                    let _ = reply.send(Err(e));
                }
            }
        }
    }

    async fn on_joined(&mut self, token: u64, result: JoinResult) {
        let Some(pending) = self.join.take_if(|join| join.token == token) else {
            debug!("Ignoring result of a cancelled join");
            return;
        };

        match result {
            Ok(JoinRoomOutcome::Joined(joined)) => self.enter_study_room(joined, pending.reply).await,
            Ok(JoinRoomOutcome::Rejected(failure)) => {
                info!("Join rejected: {}", failure.kind);
                self.abandon_join().await;
                self.emit(SideEffect::message(
                    rejection_text(&failure.kind),
                    failure.message.clone(),
                ));
                let _ = pending.reply.send(Err(SessionError::Rejected(failure)));
            }
            Err(SessionError::Protocol(e)) => {
                error!("Malformed join-room response: {}", e);
                self.release_session().await;
                self.set_state(RoomState::StudyRoom(StudyRoomState::Error {
                    message: e.to_string(),
                }));
                self.emit(SideEffect::Disconnected {
                    reason: DisconnectReason::ProtocolViolation,
                });
                let _ = pending.reply.send(Err(SessionError::Protocol(e)));
            }
            Err(e) => {
                warn!("Failed to join the study room: {}", e);
                self.abandon_join().await;
                self.emit(SideEffect::message(
                    "Could not join the study room",
                    Some(e.to_string()),
                ));
                let _ = pending.reply.send(Err(e));
            }
        }
    }

    async fn enter_study_room(&mut self, joined: JoinedRoom, reply: Reply<()>) {
        let Some(waiting) = self.state.waiting_room().cloned() else {
            let _ = reply.send(Err(self.invalid_state("enter the study room")));
            return;
        };

        let me = self.config.user_id.clone();
        let mut peers = PeerMediaRegistry::new(me.clone());
        for state in joined.peer_states {
            peers.upsert(state);
        }
        if !peers.contains(&me) {
            peers.upsert(PeerState {
                uid: me.clone(),
                name: self.config.user_name.clone(),
                enabled_microphone: false,
                enabled_headset: !self.config.muted_headset,
            });
        }

        info!(
            "Entered study room {} with {} peer(s)",
            waiting.room_id,
            peers.len()
        );
        self.set_state(RoomState::StudyRoom(StudyRoomState::Active(StudyRoom {
            room_id: waiting.room_id,
            me,
            master_id: waiting.data.master_id,
            peers,
            timer: joined.timer,
            chat: Vec::new(),
            blacklist: waiting.data.blacklist,
            microphone_enabled: false,
            video_enabled: false,
            headset_muted: self.config.muted_headset,
        })));
        self.replay_buffered().await;

        if self.adapter.is_some() {
            let channel = Arc::clone(&self.channel);
            let timeout = self.config.request_timeout;
            self.spawn(async move {
                let result = list_producers(channel, timeout).await;
                Completion::ProducersListed(result)
            });
        }
        let _ = reply.send(Ok(()));
    }

    /// Back to the plain waiting room after a failed or cancelled join
    async fn abandon_join(&mut self) {
        if let Some(adapter) = self.adapter.take() {
            adapter.release().await;
        }
        if let Some(room) = waiting_room_mut(&mut self.state) {
            room.joining = false;
        }
        self.publish();
        self.replay_buffered().await;
    }

    async fn on_producers_listed(&mut self, result: Result<Vec<ProducerInfo>, SessionError>) {
        match result {
            Ok(producers) => {
                debug!("{} producer(s) already in the room", producers.len());
                for info in producers {
                    self.request_consume(info);
                }
            }
            Err(SessionError::Protocol(e)) => {
                error!("Malformed get-producers response: {}", e);
                self.release_session().await;
                self.set_state(RoomState::StudyRoom(StudyRoomState::Error {
                    message: e.to_string(),
                }));
                self.emit(SideEffect::Disconnected {
                    reason: DisconnectReason::ProtocolViolation,
                });
            }
            Err(e) => warn!("Failed to list producers: {}", e),
        }
    }

    fn request_consume(&mut self, info: ProducerInfo) {
        let Some(adapter) = self.adapter.clone() else {
            return;
        };
        if info.peer_id == self.config.user_id || adapter.producer_ids().contains(&info.producer_id)
        {
            return;
        }
        if self.pending_consumes.contains_key(&info.producer_id) {
            return;
        }
        let consuming = self
            .state
            .study_room()
            .is_some_and(|room| room.peers.is_consuming(&info.producer_id));
        if consuming {
            return;
        }

        self.pending_consumes
            .insert(info.producer_id.clone(), info.peer_id.clone());
        self.spawn(async move {
            let result = adapter.consume(&info).await;
            Completion::Consumed { info, result }
        });
    }

    async fn on_consumed(&mut self, info: ProducerInfo, result: Result<ConsumerHandle, MediaError>) {
        let expected = self.pending_consumes.remove(&info.producer_id).is_some();
        match result {
            Ok(consumer) if !expected => {
                debug!(
                    "Producer {} went away during consume, closing consumer",
                    info.producer_id
                );
                self.close_consumer(consumer).await;
            }
            Ok(consumer) => {
                let closable = match active_room(&mut self.state) {
                    Some(room) => room.peers.attach(consumer).into_closable(),
                    None => Some(consumer),
                };
                if let Some(consumer) = closable {
                    self.close_consumer(consumer).await;
                }
                self.publish();
            }
            Err(e) => warn!(
                "Failed to consume {} of {}: {}",
                info.kind, info.peer_id, e
            ),
        }
    }

    // ========================================
    // Teardown
    // ========================================

    /// Session-fatal end with a reason shown to the user
    async fn terminate(&mut self, reason: DisconnectReason) {
        info!("Session ended: {}", reason.label());
        self.release_session().await;
        self.set_state(RoomState::Disconnected {
            reason: Some(reason),
        });
        self.emit(SideEffect::Disconnected { reason });
    }

    /// Release everything the session holds: spawned I/O, consumers, the
    /// media adapter, the subscription and the channel. Safe to call twice.
    async fn release_session(&mut self) {
        self.generation += 1;
        self.tasks.abort_all();
        self.subscription = None;
        self.buffered.clear();
        self.pending_consumes.clear();
        self.producing.clear();

        if let Some(reply) = self.connect_reply.take() {
            let _ = reply.send(Err(SessionError::Cancelled));
        }
        if let Some(join) = self.join.take() {
            join.task.abort();
            let _ = join.reply.send(Err(SessionError::Cancelled));
        }

        let consumers = match active_room(&mut self.state) {
            Some(room) => room.peers.drain_consumers(),
            None => Vec::new(),
        };
        for consumer in consumers {
            self.close_consumer(consumer).await;
        }
        if let Some(adapter) = self.adapter.take() {
            adapter.release().await;
        }
        if self.channel_held {
            self.channel_held = false;
            self.channel.disconnect().await;
        }
    }

    async fn close_consumer(&self, consumer: ConsumerHandle) {
        match (&self.adapter, &self.engine) {
            (Some(adapter), _) => adapter.close_consumer(&consumer).await,
            (None, Some(engine)) => engine.close_consumer(&consumer).await,
            (None, None) => {}
        }
    }

    // ========================================
    // Helpers
    // ========================================

    fn spawn<F>(&mut self, task: F) -> AbortHandle
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let generation = self.generation;
        self.tasks.spawn(async move { (generation, task.await) })
    }

    fn set_state(&mut self, state: RoomState) {
        debug!("State: {} -> {}", self.state.label(), state.label());
        self.state = state;
        self.publish();
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }

    fn emit(&self, effect: SideEffect) {
        if self.side_effects.send(effect).is_err() {
            debug!("Side effect dropped, nobody is listening");
        }
    }

    fn invalid_state(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState {
            operation,
            state: self.state.label(),
        }
    }

    fn set_local_media(&mut self, kind: MediaKind, enabled: bool) {
        if let Some(room) = active_room(&mut self.state) {
            match kind {
                MediaKind::Audio => {
                    room.microphone_enabled = enabled;
                    update_me(room, |me| me.enabled_microphone = enabled);
                }
                MediaKind::Video => room.video_enabled = enabled,
            }
        }
        self.publish();
    }
}

async fn next_event(subscription: &mut Option<EventSubscription>) -> Option<ChannelEvent> {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}

fn waiting_room_mut(state: &mut RoomState) -> Option<&mut WaitingRoom> {
    match state {
        RoomState::WaitingRoom(WaitingRoomState::Connected(room)) => Some(room),
        _ => None,
    }
}

fn active_room(state: &mut RoomState) -> Option<&mut StudyRoom> {
    match state {
        RoomState::StudyRoom(StudyRoomState::Active(room)) => Some(room),
        _ => None,
    }
}

/// Local echo of our own toggles until the server confirms
fn update_me(room: &mut StudyRoom, change: impl FnOnce(&mut PeerState)) {
    if let Some(me) = room.peers.me() {
        let mut state = me.state.clone();
        change(&mut state);
        room.peers.upsert(state);
    }
}

fn block_in_waiting_room(data: &mut WaitingRoomData, id: UserId) {
    let name = data
        .joiner_list
        .iter()
        .find(|j| j.id == id)
        .map(|j| j.name.clone());
    data.remove_joiner(&id);
    if let Some(name) = name
        && !data.is_blocked(&id)
    {
        data.blacklist.push(PeerOverview { id, name });
    }
}

fn rejection_text(kind: &str) -> &'static str {
    match kind {
        dto::JOIN_ROOM_BAD_PASSWORD => "The room password is incorrect",
        dto::JOIN_ROOM_FULL => "The study room is full",
        dto::JOIN_ROOM_BLOCKED => "You are blocked from this room",
        _ => "Could not join the study room",
    }
}

// ========================================
// Spawned I/O
// ========================================

async fn join_waiting_room(
    channel: Arc<dyn SocketChannel>,
    room_id: RoomId,
    user_id: UserId,
    connect_timeout: Duration,
    request_timeout: Duration,
) -> Result<WaitingRoomData, SessionError> {
    with_timeout(connect_timeout, channel.connect()).await?;

    let event = EventName::JoinWaitingRoom;
    let payload = codec::encode(
        event,
        &dto::JoinWaitingRoomRequest {
            room_id: room_id.into_string(),
            user_id: user_id.into_string(),
        },
    )?;
    let data = with_timeout(request_timeout, channel.request(event, payload)).await?;
    Ok(codec::decode_waiting_room(data)?)
}

async fn join_room(
    channel: Arc<dyn SocketChannel>,
    request: dto::JoinRoomRequest,
    adapter: Option<Arc<MediaSignalingAdapter>>,
    join_timeout: Duration,
) -> JoinResult {
    let event = EventName::JoinRoom;
    let payload = codec::encode(event, &request)?;
    let sequence = async {
        let data = channel.request(event, payload).await?;
        let outcome = codec::decode_join_room(data)?;
        if let (JoinRoomOutcome::Joined(joined), Some(adapter)) = (&outcome, &adapter) {
            adapter.load(joined.rtp_capabilities.clone()).await?;
            adapter.create_receive_transport().await?;
        }
        Ok::<_, SessionError>(outcome)
    };
    match tokio::time::timeout(join_timeout, sequence).await {
        Ok(result) => result,
        Err(_) => Err(ChannelError::Timeout.into()),
    }
}

async fn list_producers(
    channel: Arc<dyn SocketChannel>,
    timeout: Duration,
) -> Result<Vec<ProducerInfo>, SessionError> {
    let data = with_timeout(timeout, channel.request(EventName::GetProducers, json!({}))).await?;
    Ok(codec::decode_producer_list(data)?)
}

/// `send-chat`, retried on acknowledgement timeout
async fn send_chat_message(
    channel: Arc<dyn SocketChannel>,
    content: String,
    timeout: Duration,
    retry_limit: u32,
) -> Result<(), SessionError> {
    let event = EventName::SendChat;
    let payload = codec::encode(event, &dto::SendChatRequest { content })?;
    let mut attempt = 0;
    loop {
        match with_timeout(timeout, channel.request(event, payload.clone())).await {
            Ok(ack) => return codec::decode_empty_ack(&ack).map_err(SessionError::Rejected),
            Err(ChannelError::Timeout) if attempt < retry_limit => {
                attempt += 1;
                warn!("send-chat timed out, retrying ({}/{})", attempt, retry_limit);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn request_moderation(
    channel: Arc<dyn SocketChannel>,
    event: EventName,
    user_id: &UserId,
    timeout: Duration,
) -> Result<(), SessionError> {
    let payload = codec::encode(
        event,
        &dto::UserIdPayload {
            user_id: user_id.as_str().to_string(),
        },
    )?;
    let ack = with_timeout(timeout, channel.request(event, payload)).await?;
    codec::decode_empty_ack(&ack).map_err(SessionError::Rejected)
}
