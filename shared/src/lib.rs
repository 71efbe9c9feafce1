//! Types and constants shared by the pong server and client.
//!
//! Both sides agree on the playfield geometry, the lifecycle enums and the
//! line-based wire protocol defined in [`protocol`]. Framing of the byte
//! stream into lines lives in [`codec`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub mod codec;
pub mod error;
pub mod protocol;

pub use codec::{encode_line, LineBuffer};
pub use error::{ProtocolError, TransportError};
pub use protocol::{ClientMessage, ErrorCode, InputKey, LobbyEntry, ServerMessage, Snapshot};

pub const WIDTH: f32 = 800.0;
pub const HEIGHT: f32 = 500.0;

pub const PADDLE_H: f32 = 90.0;
pub const PADDLE_W: f32 = 12.0;
pub const PADDLE_MARGIN: f32 = 24.0;
/// Units per second.
pub const PADDLE_SPEED: f32 = 360.0;

pub const BALL_R: f32 = 8.0;
/// Units per second.
pub const BALL_SPEED: f32 = 360.0;
/// Fraction of ball speed given to `vy` on a paddle return struck at the very edge.
pub const RETURN_ANGLE_FACTOR: f32 = 0.65;
/// How far past a side edge the ball travels before the point is awarded.
pub const OUT_MARGIN: f32 = 30.0;

pub const WIN_SCORE: u32 = 7;

pub const TICK_HZ: u32 = 60;
pub const TICK_DT: f32 = 1.0 / TICK_HZ as f32;

/// How long a finished match stays on screen before both players return to the lobby.
pub const END_GRACE: Duration = Duration::from_millis(800);

/// Clients render this far behind the newest snapshot.
pub const INTERP_DELAY: Duration = Duration::from_millis(100);

pub const DEFAULT_PORT: u16 = 5555;

/// Longest display name, in characters.
pub const MAX_NAME_LEN: usize = 32;

/// What a connection is doing in the current match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Spectator,
    Left,
    Right,
}

impl Role {
    pub fn is_player(&self) -> bool {
        matches!(self, Role::Left | Role::Right)
    }
}

/// Process-wide match lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchState {
    Waiting,
    Playing,
    Ended,
}

/// Lobby status of a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Waiting,
    Queued,
    Playing,
}

/// Generates the wire spelling of a fieldless enum from one text table.
macro_rules! text_enum {
    ($ty:ident, $field:literal, { $($text:literal => $variant:ident),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ProtocolError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(ProtocolError::InvalidField {
                        field: $field,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

text_enum!(Role, "role", {
    "SPECTATOR" => Spectator,
    "LEFT" => Left,
    "RIGHT" => Right,
});

text_enum!(MatchState, "match", {
    "WAITING" => Waiting,
    "PLAYING" => Playing,
    "ENDED" => Ended,
});

text_enum!(Status, "status", {
    "WAITING" => Waiting,
    "QUEUED" => Queued,
    "PLAYING" => Playing,
});

/// Top of a paddle at the start of every serve.
pub fn paddle_start_y() -> f32 {
    HEIGHT / 2.0 - PADDLE_H / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_text_roundtrip() {
        for role in [Role::Spectator, Role::Left, Role::Right] {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
        assert!("left".parse::<Role>().is_err());
    }

    #[test]
    fn test_match_state_text() {
        assert_eq!(MatchState::Ended.to_string(), "ENDED");
        assert_eq!("PLAYING".parse::<MatchState>().unwrap(), MatchState::Playing);
        assert!(matches!(
            "DONE".parse::<MatchState>(),
            Err(ProtocolError::InvalidField { field: "match", .. })
        ));
    }

    #[test]
    fn test_status_text() {
        assert_eq!(Status::Queued.as_str(), "QUEUED");
        assert_eq!("WAITING".parse::<Status>().unwrap(), Status::Waiting);
    }

    #[test]
    fn test_role_is_player() {
        assert!(Role::Left.is_player());
        assert!(Role::Right.is_player());
        assert!(!Role::Spectator.is_player());
    }

    #[test]
    fn test_paddle_start_is_centered() {
        let y = paddle_start_y();
        assert_eq!(y + PADDLE_H / 2.0, HEIGHT / 2.0);
        assert!(y >= 0.0 && y <= HEIGHT - PADDLE_H);
    }

    #[test]
    fn test_tick_duration() {
        assert_eq!(TICK_HZ, 60);
        assert!((TICK_DT - 1.0 / 60.0).abs() < f32::EPSILON);
    }
}
