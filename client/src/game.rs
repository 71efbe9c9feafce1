//! Client-side session state
//!
//! Mirrors what the server has told us: our role, the match state, the lobby
//! roster, chat, and the latest snapshots. Every server line is folded into
//! this state and turned into [`ClientEvent`]s for the front-end.

use crate::input::{InputManager, UiCommand};
use crate::interpolation::{RenderState, SnapshotInterpolator};
use log::debug;
use serde::Serialize;
use shared::{ClientMessage, ErrorCode, LobbyEntry, MatchState, Role, ServerMessage};
use std::collections::VecDeque;
use std::time::Instant;

/// Chat lines kept for display.
pub const CHAT_HISTORY: usize = 200;

/// Notifications for the front-end.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    Lobby(Vec<LobbyEntry>),
    Chat(String),
    Log(String),
    Role(Role),
    Match(MatchState),
    Score { sl: u32, sr: u32 },
    Ended { winner: Role, sl: u32, sr: u32, banner: String },
    Bounce,
    Frame(RenderState),
    Rejected(ErrorCode),
    Disconnected,
}

pub struct ClientGameState {
    pub role: Role,
    pub match_state: MatchState,
    pub lobby: Vec<LobbyEntry>,
    pub chat: VecDeque<String>,
    pub end_banner: Option<String>,
    pub score: (u32, u32),
    interpolator: SnapshotInterpolator,
    input: InputManager,
}

impl Default for ClientGameState {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientGameState {
    pub fn new() -> Self {
        Self {
            role: Role::Spectator,
            match_state: MatchState::Waiting,
            lobby: Vec::new(),
            chat: VecDeque::new(),
            end_banner: None,
            score: (0, 0),
            interpolator: SnapshotInterpolator::default(),
            input: InputManager::new(),
        }
    }

    /// Folds one server line into the state. Unparseable lines become log events.
    pub fn handle_line(&mut self, line: &str, now: Instant) -> Vec<ClientEvent> {
        match line.parse::<ServerMessage>() {
            Ok(message) => self.apply(message, now),
            Err(e) => {
                debug!("Unrecognized server line {:?}: {}", line, e);
                vec![ClientEvent::Log(line.to_string())]
            }
        }
    }

    pub fn apply(&mut self, message: ServerMessage, now: Instant) -> Vec<ClientEvent> {
        match message {
            ServerMessage::Role(role) => {
                self.role = role;
                self.input.reset();
                vec![ClientEvent::Role(role), ClientEvent::Log(format!("Role: {}", role))]
            }
            ServerMessage::Match(state) => {
                self.match_state = state;
                self.end_banner = None;
                self.input.reset();
                if state == MatchState::Waiting {
                    self.interpolator.clear();
                }
                vec![ClientEvent::Match(state)]
            }
            ServerMessage::Lobby(entries) => {
                self.lobby = entries.clone();
                vec![ClientEvent::Lobby(entries)]
            }
            ServerMessage::State(snapshot) => {
                let mut events = Vec::new();
                if self.interpolator.push(now, snapshot) {
                    events.push(ClientEvent::Bounce);
                }
                if self.score != (snapshot.sl, snapshot.sr) {
                    self.score = (snapshot.sl, snapshot.sr);
                    events.push(ClientEvent::Score {
                        sl: snapshot.sl,
                        sr: snapshot.sr,
                    });
                }
                events
            }
            ServerMessage::End { winner, sl, sr } => {
                self.match_state = MatchState::Ended;
                self.score = (sl, sr);
                let banner = format!("Winner: {}   Final: {} : {}", winner, sl, sr);
                self.end_banner = Some(banner.clone());
                vec![ClientEvent::Ended {
                    winner,
                    sl,
                    sr,
                    banner,
                }]
            }
            ServerMessage::Chat(text) => {
                self.chat.push_back(text.clone());
                while self.chat.len() > CHAT_HISTORY {
                    self.chat.pop_front();
                }
                vec![ClientEvent::Chat(text)]
            }
            ServerMessage::Error(code) => vec![ClientEvent::Rejected(code)],
        }
    }

    /// Interpolated frame for `now`, if at least two snapshots have arrived.
    pub fn render(&self, now: Instant) -> Option<RenderState> {
        self.interpolator.sample(now)
    }

    /// Key events are only forwarded while we are seated in a running match.
    pub fn can_send_input(&self) -> bool {
        self.role.is_player() && self.match_state == MatchState::Playing
    }

    /// Maps a front-end command to the message to send, if any.
    pub fn outgoing(&mut self, command: UiCommand) -> Option<ClientMessage> {
        match command {
            UiCommand::RequestPlay => Some(ClientMessage::ReqPlay),
            UiCommand::CancelPlay => Some(ClientMessage::CancelPlay),
            UiCommand::Input { key, pressed } => {
                if self.can_send_input() {
                    self.input.update(key, pressed)
                } else {
                    None
                }
            }
            UiCommand::Chat(text) => {
                let text = text.trim();
                if text.is_empty() {
                    None
                } else {
                    Some(ClientMessage::Chat(text.to_string()))
                }
            }
            UiCommand::Disconnect => None,
        }
    }
}
