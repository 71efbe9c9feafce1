//! Terminal presentation of client events
//!
//! The text mode prints human-readable lines and skips per-frame output. The
//! JSON mode prints every event, frames included, one object per line, for a
//! graphical front-end to consume.

use crate::game::ClientEvent;
use log::warn;
use shared::LobbyEntry;

pub struct Renderer {
    json: bool,
}

impl Renderer {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// The line to print for `event`, if any.
    pub fn render(&self, event: &ClientEvent) -> Option<String> {
        if self.json {
            return match serde_json::to_string(event) {
                Ok(line) => Some(line),
                Err(e) => {
                    warn!("Failed to serialize event {:?}: {}", event, e);
                    None
                }
            };
        }

        match event {
            ClientEvent::Lobby(entries) => Some(format_lobby(entries)),
            ClientEvent::Chat(text) => Some(text.clone()),
            ClientEvent::Log(text) => Some(format!("* {}", text)),
            ClientEvent::Match(state) => Some(format!("* Match: {}", state)),
            ClientEvent::Score { sl, sr } => Some(format!("* Score {} : {}", sl, sr)),
            ClientEvent::Ended { banner, .. } => Some(format!("*** {} ***", banner)),
            ClientEvent::Rejected(code) => Some(format!("! Server error: {}", code)),
            ClientEvent::Disconnected => Some("* Disconnected".to_string()),
            // Role changes are already reported through the log line.
            ClientEvent::Role(_) | ClientEvent::Bounce | ClientEvent::Frame(_) => None,
        }
    }
}

fn format_lobby(entries: &[LobbyEntry]) -> String {
    if entries.is_empty() {
        return "* Lobby: (empty)".to_string();
    }
    let rows: Vec<String> = entries
        .iter()
        .map(|e| format!("{} [{}, {}]", e.name, e.role, e.status))
        .collect();
    format!("* Lobby: {}", rows.join(", "))
}
