//! Message formatting utilities for client display.

use studyroom_shared::time::to_iso8601;

use crate::domain::{
    ChatMessage, PomodoroTimer, PomodoroTimerState, RoomState, SideEffect, StudyRoom,
    StudyRoomState, WaitingRoom, WaitingRoomState,
};

const RULE: &str = "============================================================";
const THIN_RULE: &str = "------------------------------------------------------------";

/// Message formatter for client display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format the waiting room overview
    ///
    /// # Arguments
    ///
    /// * `room` - The waiting room as received from the server
    pub fn format_waiting_room(room: &WaitingRoom) -> String {
        let data = &room.data;
        let mut output = String::new();
        output.push_str(&format!("\n\n{RULE}\n"));
        output.push_str(&format!(
            "Waiting room {} ({}/{}){}\n",
            room.room_id,
            data.joiner_list.len(),
            data.capacity,
            if data.has_password { ", password required" } else { "" }
        ));
        output.push_str(&format!("Master: {}\n", data.master_id));
        output.push_str("Studying now:\n");

        if data.joiner_list.is_empty() {
            output.push_str("(Nobody)\n");
        } else {
            for joiner in &data.joiner_list {
                output.push_str(&format!("{} ({})\n", joiner.name, joiner.id));
            }
        }

        output.push_str("Type /join to enter the study room.\n");
        output.push_str(&format!("{RULE}\n"));
        output
    }

    /// Format the study room overview shown right after joining
    pub fn format_study_room(room: &StudyRoom) -> String {
        let mut output = String::new();
        output.push_str(&format!("\n\n{RULE}\n"));
        output.push_str(&format!("Study room {}\n", room.room_id));
        output.push_str("Peers:\n");
        for peer in room.peers.peers() {
            let me_suffix = if peer.is_me { " (me)" } else { "" };
            let master_suffix = if peer.state.uid == room.master_id {
                " [master]"
            } else {
                ""
            };
            output.push_str(&format!(
                "{}{}{} - mic {}, headset {}\n",
                peer.state.name,
                me_suffix,
                master_suffix,
                on_off(peer.state.enabled_microphone),
                on_off(peer.state.enabled_headset),
            ));
        }
        output.push_str(&Self::format_timer(&room.timer));
        output.push_str(&format!("{RULE}\n"));
        output
    }

    /// Format a chat message
    pub fn format_chat_message(message: &ChatMessage) -> String {
        format!(
            "\n\n{THIN_RULE}\n\
             @{}: {}\n\
             sent at {}\n\
             {THIN_RULE}\n",
            message.author_name,
            message.content,
            to_iso8601(&message.sent_at)
        )
    }

    /// Format the timer line
    pub fn format_timer(timer: &PomodoroTimer) -> String {
        let property = &timer.property;
        let settings = format!(
            "{}/{}/{} min, long break every {}",
            property.timer_length_minutes,
            property.short_break_minutes,
            property.long_break_minutes,
            property.long_break_interval
        );
        match (timer.state, timer.started_at) {
            (PomodoroTimerState::Stopped, _) => format!("Timer: stopped ({settings})\n"),
            (state, Some(started_at)) => format!(
                "Timer: {} since {} ({settings})\n",
                state.label(),
                to_iso8601(&started_at)
            ),
            (state, None) => format!("Timer: {} ({settings})\n", state.label()),
        }
    }

    /// Format a one-shot notification
    pub fn format_side_effect(effect: &SideEffect) -> String {
        match effect {
            SideEffect::Message {
                text,
                detail: Some(detail),
            } => format!("\n! {text} ({detail})\n"),
            SideEffect::Message { text, detail: None } => format!("\n! {text}\n"),
            SideEffect::Disconnected { reason } => format!("\n! Disconnected: {}\n", reason.label()),
        }
    }

    /// Describe what changed between two published states
    ///
    /// # Returns
    ///
    /// One formatted block per change, in display order
    pub fn describe_transition(previous: &RoomState, next: &RoomState) -> Vec<String> {
        match (previous, next) {
            (
                RoomState::WaitingRoom(WaitingRoomState::Connected(before)),
                RoomState::WaitingRoom(WaitingRoomState::Connected(after)),
            ) => describe_waiting_room(before, after),
            (_, RoomState::WaitingRoom(WaitingRoomState::Connected(room))) => {
                vec![Self::format_waiting_room(room)]
            }
            (
                RoomState::StudyRoom(StudyRoomState::Active(before)),
                RoomState::StudyRoom(StudyRoomState::Active(after)),
            ) => describe_study_room(before, after),
            (_, RoomState::StudyRoom(StudyRoomState::Active(room))) => {
                vec![Self::format_study_room(room)]
            }
            (previous, next) if previous == next => Vec::new(),
            (_, RoomState::Connecting { room_id }) => vec![format!("Connecting to {room_id}...\n")],
            (_, RoomState::WaitingRoom(WaitingRoomState::FailedToConnect { room_id, message })) => {
                vec![format!("\nCould not connect to {room_id}: {message}\n")]
            }
            (_, RoomState::StudyRoom(StudyRoomState::Disconnected { room_id })) => {
                vec![format!("\nConnection to {room_id} lost\n")]
            }
            (_, RoomState::StudyRoom(StudyRoomState::Error { message })) => {
                vec![format!("\nSession error: {message}\n")]
            }
            (_, RoomState::Disconnected { reason: Some(reason) }) => {
                vec![format!("\nLeft the room ({})\n", reason.label())]
            }
            (_, RoomState::Disconnected { reason: None }) => Vec::new(),
        }
    }
}

fn describe_waiting_room(before: &WaitingRoom, after: &WaitingRoom) -> Vec<String> {
    let mut lines = Vec::new();
    for joiner in &after.data.joiner_list {
        if !before.data.joiner_list.iter().any(|j| j.id == joiner.id) {
            lines.push(format!("\n+ {} started studying\n", joiner.name));
        }
    }
    for joiner in &before.data.joiner_list {
        if !after.data.joiner_list.iter().any(|j| j.id == joiner.id) {
            lines.push(format!("\n- {} stopped studying\n", joiner.name));
        }
    }
    if after.joining && !before.joining {
        lines.push("Joining the study room...\n".to_string());
    }
    lines
}

fn describe_study_room(before: &StudyRoom, after: &StudyRoom) -> Vec<String> {
    let mut lines = Vec::new();
    for peer in after.peers.peers() {
        if !before.peers.contains(&peer.state.uid) {
            lines.push(format!("\n+ {} entered\n", peer.state.name));
        }
    }
    for peer in before.peers.peers() {
        if !after.peers.contains(&peer.state.uid) {
            lines.push(format!("\n- {} left\n", peer.state.name));
        }
    }
    if let Some(new_messages) = after.chat.get(before.chat.len()..) {
        lines.extend(new_messages.iter().map(MessageFormatter::format_chat_message));
    }
    if after.timer.state != before.timer.state
        || after.timer.property != before.timer.property
        || after.timer.started_at != before.timer.started_at
    {
        lines.push(MessageFormatter::format_timer(&after.timer));
    }
    lines
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}
