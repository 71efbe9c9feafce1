//! Line-based wire protocol
//!
//! Every message is one UTF-8 line. The first whitespace-separated word is the
//! command; the remainder is its payload. Messages are plain enums so both
//! ends dispatch with an exhaustive `match` instead of prefix comparisons.
//!
//! ```text
//! client -> server   HELLO <name> | REQ_PLAY | CANCEL_PLAY | INPUT <UP|DOWN> <0|1> | CHAT <text>
//! server -> client   ROLE <role> | MATCH <state> | LOBBY n|r|s;...
//!                    STATE ly=.. ry=.. bx=.. by=.. sl=.. sr=..
//!                    END winner=<LEFT|RIGHT> sl=.. sr=.. | CHAT <text> | ERROR <code>
//! ```

use crate::error::ProtocolError;
use crate::{MatchState, Role, Status, MAX_NAME_LEN};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction key carried by `INPUT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputKey {
    Up,
    Down,
}

impl InputKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputKey::Up => "UP",
            InputKey::Down => "DOWN",
        }
    }
}

impl FromStr for InputKey {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UP" => Ok(InputKey::Up),
            "DOWN" => Ok(InputKey::Down),
            _ => Err(ProtocolError::InvalidField {
                field: "key",
                value: s.to_string(),
            }),
        }
    }
}

/// Commands a client may send.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Hello(String),
    ReqPlay,
    CancelPlay,
    Input { key: InputKey, pressed: bool },
    Chat(String),
}

impl fmt::Display for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientMessage::Hello(name) => write!(f, "HELLO {}", name),
            ClientMessage::ReqPlay => f.write_str("REQ_PLAY"),
            ClientMessage::CancelPlay => f.write_str("CANCEL_PLAY"),
            ClientMessage::Input { key, pressed } => {
                write!(f, "INPUT {} {}", key.as_str(), u8::from(*pressed))
            }
            ClientMessage::Chat(text) => write!(f, "CHAT {}", text),
        }
    }
}

impl FromStr for ClientMessage {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (command, rest) = split_command(line)?;
        match command {
            "HELLO" => {
                let name = rest.trim();
                if name.is_empty() {
                    return Err(ProtocolError::MissingField("name"));
                }
                if name.chars().count() > MAX_NAME_LEN || name.contains(['|', ';']) {
                    return Err(ProtocolError::InvalidName);
                }
                Ok(ClientMessage::Hello(name.to_string()))
            }
            "REQ_PLAY" => Ok(ClientMessage::ReqPlay),
            "CANCEL_PLAY" => Ok(ClientMessage::CancelPlay),
            "INPUT" => {
                let mut parts = rest.split_whitespace();
                let key = parts
                    .next()
                    .ok_or(ProtocolError::MissingField("key"))?
                    .parse()?;
                let pressed = match parts.next() {
                    Some("1") => true,
                    Some("0") => false,
                    Some(other) => {
                        return Err(ProtocolError::InvalidField {
                            field: "pressed",
                            value: other.to_string(),
                        })
                    }
                    None => return Err(ProtocolError::MissingField("pressed")),
                };
                Ok(ClientMessage::Input { key, pressed })
            }
            "CHAT" => {
                let text = rest.trim();
                if text.is_empty() {
                    return Err(ProtocolError::MissingField("text"));
                }
                Ok(ClientMessage::Chat(text.to_string()))
            }
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

/// Physics sample broadcast once per tick while a match is visible.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub ly: f32,
    pub ry: f32,
    pub bx: f32,
    pub by: f32,
    pub sl: u32,
    pub sr: u32,
}

/// One row of the lobby roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyEntry {
    pub name: String,
    pub role: Role,
    pub status: Status,
}

impl fmt::Display for LobbyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.name, self.role, self.status)
    }
}

/// Application-level error codes sent as `ERROR <code>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    NameTaken,
    InvalidName,
    Other(String),
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::NameTaken => f.write_str("NameTaken"),
            ErrorCode::InvalidName => f.write_str("InvalidName"),
            ErrorCode::Other(code) => f.write_str(code),
        }
    }
}

impl From<&str> for ErrorCode {
    fn from(code: &str) -> Self {
        match code {
            "NameTaken" => ErrorCode::NameTaken,
            "InvalidName" => ErrorCode::InvalidName,
            other => ErrorCode::Other(other.to_string()),
        }
    }
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Role(Role),
    Match(MatchState),
    Lobby(Vec<LobbyEntry>),
    State(Snapshot),
    End { winner: Role, sl: u32, sr: u32 },
    Chat(String),
    Error(ErrorCode),
}

impl ServerMessage {
    /// Chat line attributed to the server itself.
    pub fn system(text: &str) -> Self {
        ServerMessage::Chat(format!("Server: {}", text))
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Role(role) => write!(f, "ROLE {}", role),
            ServerMessage::Match(state) => write!(f, "MATCH {}", state),
            ServerMessage::Lobby(entries) => {
                f.write_str("LOBBY ")?;
                for (i, entry) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(";")?;
                    }
                    write!(f, "{}", entry)?;
                }
                Ok(())
            }
            ServerMessage::State(s) => write!(
                f,
                "STATE ly={:.2} ry={:.2} bx={:.2} by={:.2} sl={} sr={}",
                s.ly, s.ry, s.bx, s.by, s.sl, s.sr
            ),
            ServerMessage::End { winner, sl, sr } => {
                write!(f, "END winner={} sl={} sr={}", winner, sl, sr)
            }
            ServerMessage::Chat(text) => write!(f, "CHAT {}", text),
            ServerMessage::Error(code) => write!(f, "ERROR {}", code),
        }
    }
}

impl FromStr for ServerMessage {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (command, rest) = split_command(line)?;
        match command {
            "ROLE" => Ok(ServerMessage::Role(rest.trim().parse()?)),
            "MATCH" => Ok(ServerMessage::Match(rest.trim().parse()?)),
            "LOBBY" => Ok(ServerMessage::Lobby(parse_lobby(rest))),
            "STATE" => {
                let kv = KeyValues::new(rest);
                Ok(ServerMessage::State(Snapshot {
                    ly: kv.number("ly")?,
                    ry: kv.number("ry")?,
                    bx: kv.number("bx")?,
                    by: kv.number("by")?,
                    sl: kv.number("sl")?,
                    sr: kv.number("sr")?,
                }))
            }
            "END" => {
                let kv = KeyValues::new(rest);
                let winner = kv.get("winner")?.parse()?;
                Ok(ServerMessage::End {
                    winner,
                    sl: kv.number("sl")?,
                    sr: kv.number("sr")?,
                })
            }
            "CHAT" => Ok(ServerMessage::Chat(rest.to_string())),
            "ERROR" => {
                let code = rest.trim();
                if code.is_empty() {
                    return Err(ProtocolError::MissingField("code"));
                }
                Ok(ServerMessage::Error(ErrorCode::from(code)))
            }
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

fn split_command(line: &str) -> Result<(&str, &str), ProtocolError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ProtocolError::Empty);
    }
    Ok(line.split_once(' ').unwrap_or((line, "")))
}

/// Parses a roster payload; malformed rows are skipped.
fn parse_lobby(payload: &str) -> Vec<LobbyEntry> {
    payload
        .split(';')
        .filter_map(|chunk| {
            let mut parts = chunk.split('|').map(str::trim);
            let name = parts.next().filter(|n| !n.is_empty())?;
            let role = parts.next()?.parse().ok()?;
            let status = parts.next()?.parse().ok()?;
            Some(LobbyEntry {
                name: name.to_string(),
                role,
                status,
            })
        })
        .collect()
}

/// `key=value` pairs following a command word.
struct KeyValues<'a> {
    pairs: Vec<(&'a str, &'a str)>,
}

impl<'a> KeyValues<'a> {
    fn new(payload: &'a str) -> Self {
        let pairs = payload
            .split_whitespace()
            .filter_map(|token| token.split_once('='))
            .collect();
        Self { pairs }
    }

    fn get(&self, key: &'static str) -> Result<&'a str, ProtocolError> {
        self.pairs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .ok_or(ProtocolError::MissingField(key))
    }

    fn number<T: FromStr>(&self, key: &'static str) -> Result<T, ProtocolError> {
        let raw = self.get(key)?;
        raw.parse().map_err(|_| ProtocolError::InvalidField {
            field: key,
            value: raw.to_string(),
        })
    }
}
