//! # Pong Server Library
//!
//! Authoritative server for two-player networked pong with a spectator lobby.
//! Any number of clients connect over TCP; two of them at a time play while
//! everyone else watches. The server owns the canonical simulation and sends
//! every connection the same line-based snapshots.
//!
//! ## Architecture
//!
//! ### Single State Lock
//! The connection registry, play queue, match slots and simulation all live
//! in one [`state::ServerState`] behind a `tokio::sync::Mutex`. The accept
//! task and the game loop are the only two contenders.
//!
//! ### Non-Blocking I/O
//! Reads are polled with `try_read` on every loop iteration. Writes go through
//! a bounded per-connection outbox drained by a dedicated writer task, so a
//! slow peer can never stall the tick loop; it just gets disconnected.
//!
//! ### Fixed Timestep
//! Wall-clock time is accumulated and consumed in whole 1/60 s ticks, which
//! keeps the physics independent of scheduling jitter.
//!
//! ## Module Organization
//!
//! - `client_manager`: per-connection state and the unique name map
//! - `matchmaking`: FIFO play queue and WAITING/PLAYING/ENDED lifecycle
//! - `game`: paddle/ball physics and the fixed-timestep accumulator
//! - `state`: command handling, broadcasting and dead-connection reaping
//! - `network`: TCP accept loop, writer tasks and the game loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     // Seeded serves make a session reproducible; pass None for entropy.
//!     let server = Server::bind("0.0.0.0:5555", Some(42)).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod game;
pub mod matchmaking;
pub mod network;
pub mod state;
