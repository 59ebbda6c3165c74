//! Interactive room session: terminal lines in, room state changes out.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    domain::{RoomId, RoomState, SideEffect, UserId},
    error::{ChannelError, SessionError},
    session::RoomSessionHandle,
};

use super::{
    domain::{SessionOutcome, outcome_of},
    error::ClientError,
    formatter::MessageFormatter,
    input::{HELP, InputCommand, parse_input},
    ui::redisplay_prompt,
};

/// What the input loop does after a command
#[derive(Debug, PartialEq, Eq)]
pub(super) enum Flow {
    Continue,
    Quit,
}

#[derive(Debug)]
pub(super) struct SessionReport {
    pub outcome: SessionOutcome,
    /// The waiting room was reached
    pub entered_room: bool,
    /// Password to re-enter the study room with, when the session was lost inside it
    pub rejoin_password: Option<String>,
}

pub(super) struct InteractiveSession {
    handle: RoomSessionHandle,
    prompt: String,
    default_password: Option<String>,
    /// Password of the last `/join`
    join_password: Option<String>,
}

impl InteractiveSession {
    pub fn new(
        handle: RoomSessionHandle,
        prompt: impl Into<String>,
        default_password: Option<String>,
    ) -> Self {
        Self {
            handle,
            prompt: prompt.into(),
            default_password,
            join_password: None,
        }
    }

    /// Run until the room session ends or the user quits
    pub async fn run(
        &mut self,
        room_id: RoomId,
        input: &mut mpsc::UnboundedReceiver<String>,
        rejoin_password: Option<String>,
    ) -> Result<SessionReport, ClientError> {
        let mut state_rx = self.handle.state();
        let mut side_effects = self.handle.take_side_effects();
        let mut previous = state_rx.borrow_and_update().clone();

        if let Err(e) = self.handle.connect(room_id.clone()).await {
            warn!("Could not enter room {}: {}", room_id, e);
            println!("\nCould not connect to {}: {}\n", room_id, e);
            let outcome = match e {
                SessionError::Rejected(failure) => SessionOutcome::Ended(failure.to_string()),
                SessionError::Channel(ChannelError::Connect(message))
                    if message.contains("409") || message.contains("Conflict") =>
                {
                    SessionOutcome::Ended(format!("user id '{}' is already in use", self.prompt))
                }
                _ => SessionOutcome::ConnectionLost,
            };
            return Ok(SessionReport {
                outcome,
                entered_room: false,
                rejoin_password,
            });
        }

        println!(
            "\nYou are '{}'. Type /help for commands, /quit to leave.\n",
            self.prompt
        );
        if let Some(password) = rejoin_password {
            info!("Re-entering the study room");
            self.join(password);
        }
        redisplay_prompt(&self.prompt);

        loop {
            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        return Ok(self.report(SessionOutcome::Quit, &previous));
                    }
                    let next = state_rx.borrow_and_update().clone();
                    for block in MessageFormatter::describe_transition(&previous, &next) {
                        print!("{}", block);
                    }
                    let outcome = outcome_of(&next);
                    previous = next;
                    if let Some(outcome) = outcome {
                        return Ok(self.report(outcome, &previous));
                    }
                    redisplay_prompt(&self.prompt);
                }
                effect = next_side_effect(&mut side_effects) => {
                    print!("{}", MessageFormatter::format_side_effect(&effect));
                    redisplay_prompt(&self.prompt);
                }
                line = input.recv() => {
                    let Some(line) = line else {
                        info!("Input closed");
                        return Ok(self.report(SessionOutcome::Quit, &previous));
                    };
                    match self.execute(&line).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Quit) => return Ok(self.report(SessionOutcome::Quit, &previous)),
                        Err(e) => println!("! {}", e),
                    }
                    redisplay_prompt(&self.prompt);
                }
            }
        }
    }

    /// Execute one typed line against the room session
    pub async fn execute(&mut self, line: &str) -> Result<Flow, ClientError> {
        match parse_input(line)? {
            InputCommand::Nothing => {}
            InputCommand::Help => println!("{}", HELP),
            InputCommand::Quit => return Ok(Flow::Quit),
            InputCommand::Chat(content) => self.handle.send_chat(content).await?,
            InputCommand::Join(password) => {
                let password = password
                    .or_else(|| self.default_password.clone())
                    .unwrap_or_default();
                self.join(password);
            }
            InputCommand::Cancel => self.handle.cancel_join().await?,
            InputCommand::Timer(phase) => self.handle.start_timer(phase).await?,
            InputCommand::Edit(property) => self.handle.edit_timer(property).await?,
            InputCommand::Kick(user) => self.handle.kick_user(parse_user(&user)?).await?,
            InputCommand::Block(user) => self.handle.block_user(parse_user(&user)?).await?,
            InputCommand::Unblock(user) => self.handle.unblock_user(parse_user(&user)?).await?,
            InputCommand::Headset => {
                let enabled = self.handle.toggle_headset().await?;
                println!("Headset {}", if enabled { "on" } else { "muted" });
            }
        }
        Ok(Flow::Continue)
    }

    /// Join in the background so the prompt stays usable for `/cancel`
    fn join(&mut self, password: String) {
        self.join_password = Some(password.clone());
        let handle = self.handle.clone();
        tokio::spawn(async move {
            match handle.join_study_room(password).await {
                Ok(()) => debug!("Entered the study room"),
                Err(e @ (SessionError::InvalidState { .. } | SessionError::AlreadyInProgress(_))) => {
                    println!("\n! {}", e);
                }
                // failures after the request started arrive as side effects
                Err(e) => debug!("Join ended: {}", e),
            }
        });
    }

    fn report(&self, outcome: SessionOutcome, last: &RoomState) -> SessionReport {
        let rejoin_password = match (&outcome, last) {
            (SessionOutcome::ConnectionLost, RoomState::StudyRoom(_)) => self
                .join_password
                .clone()
                .or_else(|| self.default_password.clone())
                .or_else(|| Some(String::new())),
            _ => None,
        };
        SessionReport {
            outcome,
            entered_room: true,
            rejoin_password,
        }
    }
}

async fn next_side_effect(
    receiver: &mut Option<mpsc::UnboundedReceiver<SideEffect>>,
) -> SideEffect {
    if let Some(rx) = receiver {
        if let Some(effect) = rx.recv().await {
            return effect;
        }
        *receiver = None;
    }
    std::future::pending().await
}

fn parse_user(value: &str) -> Result<UserId, ClientError> {
    UserId::new(value).map_err(|e| ClientError::InvalidCommand(e.to_string()))
}
