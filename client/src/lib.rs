//! # Pong Client Library
//!
//! Client side of networked pong: connects to the server over TCP, keeps a
//! mirror of the session (role, match state, lobby, chat), and turns the
//! server's per-tick snapshots into smooth frames.
//!
//! ## Architecture Overview
//!
//! The client never simulates physics. It renders a short, fixed delay behind
//! the newest snapshot and blends between the two snapshots around that
//! moment, trading a little latency for motion that does not stutter when
//! packets arrive unevenly.
//!
//! A running session is three cooperative tasks:
//! - **Poll task**: every 16 ms reads whatever the socket has, frames it into
//!   lines and folds them into the session state
//! - **Render task**: every 16 ms samples the interpolator and publishes a frame
//! - **Writer task**: sends queued commands to the server
//!
//! Disconnecting tears all of them down before [`network::Client::run`] returns.
//!
//! ## Front-End Port
//!
//! Front-ends talk to the client through two channels: they send
//! [`input::UiCommand`]s and receive [`game::ClientEvent`]s. The bundled
//! binary is a terminal front-end; `--json` turns every event into one JSON
//! line for a graphical one.
//!
//! ## Module Organization
//!
//! - `interpolation`: two-snapshot buffer, linear blending, bounce detection
//! - `game`: session state and server message handling
//! - `input`: UI commands, held-key tracking, terminal command parsing
//! - `network`: connection lifecycle and the poll/render/writer tasks
//! - `rendering`: text and JSON presentation of events
//! - `error`: why a session ended

pub mod error;
pub mod game;
pub mod input;
pub mod interpolation;
pub mod network;
pub mod rendering;

pub use error::ClientError;
pub use game::{ClientEvent, ClientGameState};
pub use input::UiCommand;
pub use interpolation::{RenderState, SnapshotInterpolator};
