//! Client network session: one TCP connection plus its poll, render and writer tasks

use crate::error::ClientError;
use crate::game::{ClientEvent, ClientGameState};
use crate::input::UiCommand;
use log::{debug, info, warn};
use shared::{encode_line, ClientMessage, ErrorCode, LineBuffer, TransportError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, timeout, MissedTickBehavior};

pub const POLL_INTERVAL: Duration = Duration::from_millis(16);
pub const RENDER_INTERVAL: Duration = Duration::from_millis(16);

const OUTBOX_CAPACITY: usize = 64;
const WRITER_FLUSH: Duration = Duration::from_millis(250);

pub struct Client {
    server: String,
    name: String,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl Client {
    pub fn new(server: &str, name: &str, events: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self {
            server: server.to_string(),
            name: name.to_string(),
            events,
        }
    }

    /// Connects, claims the name and runs until the user disconnects or the
    /// connection ends.
    ///
    /// `Ok(())` means the user asked to leave. Every task started here is
    /// torn down before returning, and a final [`ClientEvent::Disconnected`]
    /// is published either way.
    pub async fn run(&self, commands: &mut mpsc::Receiver<UiCommand>) -> Result<(), ClientError> {
        let stream = TcpStream::connect(&self.server)
            .await
            .map_err(ClientError::Connect)?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY: {}", e);
        }
        info!("Connected to {} as {}", self.server, self.name);

        let (reader, writer) = stream.into_split();
        let session = Arc::new(Mutex::new(ClientGameState::new()));

        let (outbox, outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);
        let mut writer_task = tokio::spawn(write_messages(writer, outbox_rx));
        let mut poll_task = tokio::spawn(poll_loop(
            reader,
            Arc::clone(&session),
            self.events.clone(),
        ));
        let render_task = tokio::spawn(render_loop(Arc::clone(&session), self.events.clone()));

        let outcome = match outbox.send(ClientMessage::Hello(self.name.clone())).await {
            Err(_) => Err(ClientError::Transport(TransportError::PeerClosed)),
            Ok(()) => loop {
                tokio::select! {
                    ended = &mut poll_task => {
                        break match ended {
                            Ok(result) => result,
                            Err(e) => {
                                warn!("Network poll task failed: {}", e);
                                Err(ClientError::Transport(TransportError::PeerClosed))
                            }
                        };
                    }
                    command = commands.recv() => {
                        let command = match command {
                            None | Some(UiCommand::Disconnect) => break Ok(()),
                            Some(command) => command,
                        };
                        let message = session.lock().await.outgoing(command);
                        if let Some(message) = message {
                            if outbox.send(message).await.is_err() {
                                break Err(ClientError::Transport(TransportError::PeerClosed));
                            }
                        }
                    }
                }
            },
        };

        poll_task.abort();
        render_task.abort();

        // Let queued commands reach the socket, but never wait on a stuck peer.
        drop(outbox);
        if timeout(WRITER_FLUSH, &mut writer_task).await.is_err() {
            writer_task.abort();
        }

        match &outcome {
            Ok(()) => info!("Disconnected"),
            Err(e) => info!("Session ended: {}", e),
        }
        let _ = self.events.send(ClientEvent::Disconnected);
        outcome
    }
}

/// Reads whatever the server sent since the last poll and applies it.
///
/// Returns when the connection closes or the server rejects our name.
async fn poll_loop(
    mut reader: OwnedReadHalf,
    session: Arc<Mutex<ClientGameState>>,
    events: mpsc::UnboundedSender<ClientEvent>,
) -> Result<(), ClientError> {
    let mut inbox = LineBuffer::new();
    let mut ticker = interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let lines = inbox.poll(|buf| reader.try_read(buf))?;
        if lines.is_empty() {
            continue;
        }

        let now = Instant::now();
        let mut state = session.lock().await;
        for line in lines {
            for event in state.handle_line(&line, now) {
                let rejected = match &event {
                    ClientEvent::Rejected(
                        code @ (ErrorCode::NameTaken | ErrorCode::InvalidName),
                    ) => Some(code.clone()),
                    _ => None,
                };
                let _ = events.send(event);
                if let Some(code) = rejected {
                    return Err(ClientError::Rejected(code));
                }
            }
        }
    }
}

/// Publishes an interpolated frame on every render tick.
async fn render_loop(
    session: Arc<Mutex<ClientGameState>>,
    events: mpsc::UnboundedSender<ClientEvent>,
) {
    let mut ticker = interval(RENDER_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let frame = session.lock().await.render(Instant::now());
        if let Some(frame) = frame {
            if events.send(ClientEvent::Frame(frame)).is_err() {
                break;
            }
        }
    }
}

async fn write_messages(mut writer: OwnedWriteHalf, mut outbox: mpsc::Receiver<ClientMessage>) {
    while let Some(message) = outbox.recv().await {
        if let Err(e) = writer.write_all(encode_line(&message).as_bytes()).await {
            warn!("Failed to send {}: {}", message, e);
            break;
        }
    }
}
