//! Parsing of the lines typed at the prompt.

use crate::domain::{PomodoroTimerProperty, TimerPhase};

use super::error::ClientError;

pub const HELP: &str = "\
/join [password]                  enter the study room
/cancel                           abandon a pending join
/timer start|short|long           start a timer phase (master)
/edit <len> <short> <long> <n>    edit the timer and stop it (master)
/kick <userId>                    kick a user (master)
/block <userId>                   block a user (master)
/unblock <userId>                 unblock a user (master)
/headset                          toggle the headset
/help                             show this help
/quit                             leave the room
anything else                     send a chat message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    Join(Option<String>),
    Cancel,
    Timer(TimerPhase),
    Edit(PomodoroTimerProperty),
    Kick(String),
    Block(String),
    Unblock(String),
    Headset,
    Help,
    Quit,
    Chat(String),
    /// Blank line
    Nothing,
}

pub fn parse_input(line: &str) -> Result<InputCommand, ClientError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(InputCommand::Nothing);
    }
    if !line.starts_with('/') {
        return Ok(InputCommand::Chat(line.to_string()));
    }

    let mut words = line.split_whitespace();
    let command = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();

    match (command, args.as_slice()) {
        ("/join", []) => Ok(InputCommand::Join(None)),
        ("/join", [password]) => Ok(InputCommand::Join(Some(password.to_string()))),
        ("/cancel", []) => Ok(InputCommand::Cancel),
        ("/timer", [phase]) => parse_phase(phase).map(InputCommand::Timer),
        ("/edit", [length, short, long, interval]) => Ok(InputCommand::Edit(PomodoroTimerProperty {
            timer_length_minutes: parse_minutes("len", length)?,
            short_break_minutes: parse_minutes("short", short)?,
            long_break_minutes: parse_minutes("long", long)?,
            long_break_interval: parse_minutes("n", interval)?,
        })),
        ("/kick", [user]) => Ok(InputCommand::Kick(user.to_string())),
        ("/block", [user]) => Ok(InputCommand::Block(user.to_string())),
        ("/unblock", [user]) => Ok(InputCommand::Unblock(user.to_string())),
        ("/headset", []) => Ok(InputCommand::Headset),
        ("/help", []) => Ok(InputCommand::Help),
        ("/quit", []) => Ok(InputCommand::Quit),
        (
            "/join" | "/cancel" | "/timer" | "/edit" | "/kick" | "/block" | "/unblock"
            | "/headset" | "/help" | "/quit",
            _,
        ) => Err(ClientError::InvalidCommand(format!(
            "wrong arguments for {command}, see /help"
        ))),
        _ => Err(ClientError::InvalidCommand(format!(
            "unknown command {command}, see /help"
        ))),
    }
}

fn parse_phase(phase: &str) -> Result<TimerPhase, ClientError> {
    match phase {
        "start" | "focus" => Ok(TimerPhase::Focus),
        "short" => Ok(TimerPhase::ShortBreak),
        "long" => Ok(TimerPhase::LongBreak),
        other => Err(ClientError::InvalidCommand(format!(
            "unknown timer phase '{other}' (start, short or long)"
        ))),
    }
}

fn parse_minutes(name: &str, value: &str) -> Result<u32, ClientError> {
    value
        .parse()
        .map_err(|_| ClientError::InvalidCommand(format!("<{name}> must be a number, got '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_chat() {
        // テスト項目: スラッシュで始まらない入力はチャットとして扱われる
        // given (前提条件):
        let line = "  good morning  ";

        // when (操作):
        let command = parse_input(line).unwrap();

        // then (期待する結果):
        assert_eq!(command, InputCommand::Chat("good morning".to_string()));
    }

    #[test]
    fn test_blank_line_does_nothing() {
        // テスト項目: 空行は何もしない
        // given (前提条件):
        let line = "   ";

        // when (操作):
        let command = parse_input(line).unwrap();

        // then (期待する結果):
        assert_eq!(command, InputCommand::Nothing);
    }

    #[test]
    fn test_join_with_and_without_password() {
        // テスト項目: /join はパスワードの有無どちらも受け付ける
        // given (前提条件):
        let without = "/join";
        let with = "/join secret";

        // when (操作):
        let without = parse_input(without).unwrap();
        let with = parse_input(with).unwrap();

        // then (期待する結果):
        assert_eq!(without, InputCommand::Join(None));
        assert_eq!(with, InputCommand::Join(Some("secret".to_string())));
    }

    #[test]
    fn test_timer_phases() {
        // テスト項目: /timer の各フェーズが解釈される
        // given (前提条件):
        let lines = ["/timer start", "/timer short", "/timer long"];

        // when (操作):
        let phases: Vec<_> = lines.iter().map(|l| parse_input(l).unwrap()).collect();

        // then (期待する結果):
        assert_eq!(
            phases,
            vec![
                InputCommand::Timer(TimerPhase::Focus),
                InputCommand::Timer(TimerPhase::ShortBreak),
                InputCommand::Timer(TimerPhase::LongBreak),
            ]
        );
    }

    #[test]
    fn test_edit_parses_four_numbers() {
        // テスト項目: /edit は 4 つの数値をタイマー設定として解釈する
        // given (前提条件):
        let line = "/edit 30 5 20 3";

        // when (操作):
        let command = parse_input(line).unwrap();

        // then (期待する結果):
        assert_eq!(
            command,
            InputCommand::Edit(PomodoroTimerProperty {
                timer_length_minutes: 30,
                short_break_minutes: 5,
                long_break_minutes: 20,
                long_break_interval: 3,
            })
        );
    }

    #[test]
    fn test_edit_rejects_non_numbers() {
        // テスト項目: /edit に数値以外が含まれるとエラーになる
        // given (前提条件):
        let line = "/edit 30 five 20 3";

        // when (操作):
        let result = parse_input(line);

        // then (期待する結果):
        assert!(matches!(result, Err(ClientError::InvalidCommand(m)) if m.contains("<short>")));
    }

    #[test]
    fn test_moderation_commands_take_a_user() {
        // テスト項目: /kick /block /unblock は対象ユーザーを 1 つ受け取る
        // given (前提条件):
        let lines = ["/kick bob", "/block bob", "/unblock bob"];

        // when (操作):
        let commands: Vec<_> = lines.iter().map(|l| parse_input(l).unwrap()).collect();

        // then (期待する結果):
        assert_eq!(
            commands,
            vec![
                InputCommand::Kick("bob".to_string()),
                InputCommand::Block("bob".to_string()),
                InputCommand::Unblock("bob".to_string()),
            ]
        );
        assert!(parse_input("/kick").is_err());
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        // テスト項目: 未知のコマンドはエラーになる
        // given (前提条件):
        let line = "/dance";

        // when (操作):
        let result = parse_input(line);

        // then (期待する結果):
        assert!(matches!(result, Err(ClientError::InvalidCommand(m)) if m.contains("/dance")));
    }
}
