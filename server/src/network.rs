//! Server network layer: TCP accept loop, per-connection writers and the game loop

use crate::client_manager::ClientId;
use crate::game::GameState;
use crate::state::ServerState;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, timeout, MissedTickBehavior};

/// Lines a connection may have queued before it is considered too slow.
pub const OUTBOX_CAPACITY: usize = 256;

/// Longest a single socket write may stay blocked before the peer is dropped.
pub const WRITE_STALL: Duration = Duration::from_secs(5);

/// Idle sleep between game loop iterations.
pub const LOOP_INTERVAL: Duration = Duration::from_millis(4);

/// Authoritative pong server
pub struct Server {
    listener: TcpListener,
    state: Arc<Mutex<ServerState>>,
}

impl Server {
    /// Binds the listener. `seed` makes serves reproducible; `None` seeds from entropy.
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        seed: Option<u64>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Server {
            listener,
            state: Arc::new(Mutex::new(ServerState::new(GameState::new(rng)))),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared handle to the state, for inspection.
    pub fn state(&self) -> Arc<Mutex<ServerState>> {
        Arc::clone(&self.state)
    }

    /// Runs the accept task and the game loop until the process is stopped.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let Server { listener, state } = self;

        let accept_state = Arc::clone(&state);
        let accept_task = tokio::spawn(async move {
            Self::accept_loop(listener, accept_state).await;
        });

        info!("Server started successfully");
        Self::game_loop(state).await;

        accept_task.abort();
        Ok(())
    }

    /// Accepts connections and registers each one under the state lock.
    async fn accept_loop(listener: TcpListener, state: Arc<Mutex<ServerState>>) {
        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
            };
            Self::register(stream, addr, &state).await;
        }
    }

    async fn register(stream: TcpStream, addr: SocketAddr, state: &Arc<Mutex<ServerState>>) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
        }
        let (reader, writer) = stream.into_split();
        let (outbox_tx, outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);

        let mut guard = state.lock().await;
        let id = guard.accept(addr, Box::new(reader), outbox_tx);
        guard.reap_dead();
        drop(guard);

        tokio::spawn(write_outbox(id, writer, outbox_rx, WRITE_STALL));
    }

    /// Fixed-timestep loop: poll sockets, step the simulation, broadcast.
    async fn game_loop(state: Arc<Mutex<ServerState>>) {
        let mut interval_timer = interval(LOOP_INTERVAL);
        interval_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut last_update = Instant::now();

        loop {
            interval_timer.tick().await;

            let now = Instant::now();
            let elapsed = now.duration_since(last_update);
            last_update = now;

            let mut guard = state.lock().await;
            guard.run_iteration(elapsed, now);
        }
    }
}

/// Drains one connection's outbox onto its socket.
///
/// Ends when the registry drops the sender, a write fails, or a single write
/// stays blocked for longer than `stall`. Either way the writer is dropped, so
/// a peer that stopped reading does not keep its socket open, and later sends
/// for this connection fail so it gets reaped.
async fn write_outbox<W>(
    id: ClientId,
    mut writer: W,
    mut outbox: mpsc::Receiver<String>,
    stall: Duration,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = outbox.recv().await {
        match timeout(stall, writer.write_all(line.as_bytes())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Write to client {} failed: {}", id, e);
                return;
            }
            Err(_) => {
                warn!("Client {} stopped reading, closing its connection", id);
                return;
            }
        }
    }
    let _ = writer.shutdown().await;
    debug!("Writer for client {} finished", id);
}
