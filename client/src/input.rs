//! Front-end commands and held-key tracking

use serde::{Deserialize, Serialize};
use shared::{ClientMessage, InputKey};

/// Everything a front-end can ask the client to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UiCommand {
    RequestPlay,
    CancelPlay,
    Input { key: InputKey, pressed: bool },
    Chat(String),
    Disconnect,
}

/// Tracks which paddle keys the server believes are held.
///
/// Only transitions are sent, so holding a key does not flood the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputManager {
    up: bool,
    down: bool,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a key change and returns the message to send, if it is a change.
    pub fn update(&mut self, key: InputKey, pressed: bool) -> Option<ClientMessage> {
        let held = match key {
            InputKey::Up => &mut self.up,
            InputKey::Down => &mut self.down,
        };
        if *held == pressed {
            return None;
        }
        *held = pressed;
        Some(ClientMessage::Input { key, pressed })
    }

    pub fn held(&self) -> (bool, bool) {
        (self.up, self.down)
    }

    /// Forgets held keys; the server clears them whenever roles change.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Parses one line typed into the terminal front-end.
///
/// `/up` and `/down` release the opposite key first; anything that is not a
/// command is chat.
pub fn parse_command(line: &str) -> Vec<UiCommand> {
    let line = line.trim();
    let press = |key, pressed| UiCommand::Input { key, pressed };

    match line {
        "" => Vec::new(),
        "/play" => vec![UiCommand::RequestPlay],
        "/cancel" => vec![UiCommand::CancelPlay],
        "/up" => vec![press(InputKey::Down, false), press(InputKey::Up, true)],
        "/down" => vec![press(InputKey::Up, false), press(InputKey::Down, true)],
        "/stop" => vec![press(InputKey::Up, false), press(InputKey::Down, false)],
        "/quit" => vec![UiCommand::Disconnect],
        text => vec![UiCommand::Chat(text.to_string())],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transitions_are_sent() {
        let mut input = InputManager::new();
        assert_eq!(
            input.update(InputKey::Up, true),
            Some(ClientMessage::Input {
                key: InputKey::Up,
                pressed: true
            })
        );
        assert_eq!(input.update(InputKey::Up, true), None);
        assert_eq!(input.update(InputKey::Down, false), None);
        assert_eq!(input.held(), (true, false));

        assert!(input.update(InputKey::Up, false).is_some());
        assert_eq!(input.held(), (false, false));
    }

    #[test]
    fn test_reset_forgets_keys() {
        let mut input = InputManager::new();
        input.update(InputKey::Down, true);
        input.reset();
        assert_eq!(input.held(), (false, false));
        assert!(input.update(InputKey::Down, true).is_some());
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("/play"), vec![UiCommand::RequestPlay]);
        assert_eq!(parse_command("  /cancel "), vec![UiCommand::CancelPlay]);
        assert_eq!(parse_command("/quit"), vec![UiCommand::Disconnect]);
        assert!(parse_command("   ").is_empty());
        assert_eq!(
            parse_command("/up"),
            vec![
                UiCommand::Input {
                    key: InputKey::Down,
                    pressed: false
                },
                UiCommand::Input {
                    key: InputKey::Up,
                    pressed: true
                },
            ]
        );
        assert_eq!(parse_command("/stop").len(), 2);
    }

    #[test]
    fn test_other_text_is_chat() {
        assert_eq!(
            parse_command("good game!"),
            vec![UiCommand::Chat("good game!".into())]
        );
        assert_eq!(
            parse_command("/dance"),
            vec![UiCommand::Chat("/dance".into())]
        );
    }
}
