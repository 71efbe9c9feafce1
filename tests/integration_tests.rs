//! Integration tests for the pong server and client
//!
//! These tests run a real server on an ephemeral port and talk to it over TCP,
//! either with raw protocol lines or through the client library.

use server::network::Server;
use shared::{ClientMessage, MatchState, Role, ServerMessage};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

async fn start_server() -> SocketAddr {
    let server = Server::bind("127.0.0.1:0", Some(7)).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

/// A hand-driven connection speaking raw protocol lines.
struct Peer {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Peer {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    async fn send(&mut self, message: ClientMessage) {
        self.writer
            .write_all(shared::encode_line(&message).as_bytes())
            .await
            .unwrap();
    }

    /// Reads lines until one satisfies `pred`, skipping everything else.
    async fn expect<F: Fn(&str) -> bool>(&mut self, pred: F) -> String {
        timeout(WAIT, async {
            loop {
                let line = self
                    .lines
                    .next_line()
                    .await
                    .unwrap()
                    .expect("server closed the connection");
                if pred(&line) {
                    return line;
                }
            }
        })
        .await
        .expect("timed out waiting for server line")
    }

    async fn expect_message(&mut self, message: ServerMessage) {
        let wanted = message.to_string();
        self.expect(|line| line == wanted).await;
    }
}

/// Connects `name` and queues it, returning once the server lists it as queued.
async fn queued_peer(addr: SocketAddr, name: &str) -> Peer {
    let mut peer = Peer::connect(addr).await;
    peer.send(ClientMessage::Hello(name.to_string())).await;
    peer.send(ClientMessage::ReqPlay).await;
    let entry = format!("{}|SPECTATOR|QUEUED", name);
    peer.expect(|line| line.starts_with("LOBBY") && line.contains(&entry))
        .await;
    peer
}

/// PROTOCOL TESTS OVER TCP
mod protocol_tests {
    use super::*;

    #[tokio::test]
    async fn greeting_on_connect() {
        let addr = start_server().await;
        let mut peer = Peer::connect(addr).await;

        peer.expect_message(ServerMessage::Role(Role::Spectator)).await;
        peer.expect_message(ServerMessage::Match(MatchState::Waiting))
            .await;
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let addr = start_server().await;
        let mut first = Peer::connect(addr).await;
        first.send(ClientMessage::Hello("ann".into())).await;
        first
            .expect(|line| line.starts_with("CHAT Server: Welcome"))
            .await;

        let mut second = Peer::connect(addr).await;
        second.send(ClientMessage::Hello("ann".into())).await;
        second.expect(|line| line == "ERROR NameTaken").await;
    }

    #[tokio::test]
    async fn chat_reaches_everyone() {
        let addr = start_server().await;
        let mut ann = Peer::connect(addr).await;
        ann.send(ClientMessage::Hello("ann".into())).await;
        ann.expect(|line| line.starts_with("CHAT Server: Welcome"))
            .await;

        let mut bo = Peer::connect(addr).await;
        bo.send(ClientMessage::Hello("bo".into())).await;
        bo.expect(|line| line.starts_with("CHAT Server: Welcome"))
            .await;
        bo.send(ClientMessage::Chat("hello there".into())).await;

        ann.expect(|line| line == "CHAT bo: hello there").await;
        bo.expect(|line| line == "CHAT bo: hello there").await;
    }
}

/// MATCH LIFECYCLE TESTS OVER TCP
mod match_tests {
    use super::*;

    #[tokio::test]
    async fn two_players_are_paired_and_receive_state() {
        let addr = start_server().await;
        let mut ann = queued_peer(addr, "ann").await;
        let mut bo = queued_peer(addr, "bo").await;

        ann.expect_message(ServerMessage::Role(Role::Left)).await;
        ann.expect_message(ServerMessage::Match(MatchState::Playing))
            .await;
        bo.expect_message(ServerMessage::Role(Role::Right)).await;
        bo.expect_message(ServerMessage::Match(MatchState::Playing))
            .await;

        let line = ann.expect(|line| line.starts_with("STATE ")).await;
        match line.parse::<ServerMessage>().unwrap() {
            ServerMessage::State(snapshot) => {
                assert_eq!((snapshot.sl, snapshot.sr), (0, 0));
                assert!(snapshot.bx > 0.0 && snapshot.bx < shared::WIDTH);
            }
            other => panic!("expected STATE, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn spectators_receive_state_too() {
        let addr = start_server().await;
        let mut watcher = Peer::connect(addr).await;
        watcher.send(ClientMessage::Hello("cy".into())).await;

        let _ann = queued_peer(addr, "ann").await;
        let _bo = queued_peer(addr, "bo").await;

        watcher.expect(|line| line.starts_with("STATE ")).await;
    }

    #[tokio::test]
    async fn paddle_input_moves_the_paddle() {
        let addr = start_server().await;
        let mut ann = queued_peer(addr, "ann").await;
        let _bo = queued_peer(addr, "bo").await;
        ann.expect_message(ServerMessage::Match(MatchState::Playing))
            .await;

        ann.send(ClientMessage::Input {
            key: shared::InputKey::Up,
            pressed: true,
        })
        .await;

        let top = ann
            .expect(|line| match line.parse::<ServerMessage>() {
                Ok(ServerMessage::State(s)) => s.ly <= 0.0,
                _ => false,
            })
            .await;
        assert!(top.contains("ly=0.00"));
    }

    #[tokio::test]
    async fn opponent_disconnect_returns_survivor_to_lobby() {
        let addr = start_server().await;
        let ann = queued_peer(addr, "ann").await;
        let mut bo = queued_peer(addr, "bo").await;
        bo.expect_message(ServerMessage::Match(MatchState::Playing))
            .await;

        drop(ann);

        bo.expect_message(ServerMessage::Role(Role::Spectator)).await;
        bo.expect_message(ServerMessage::Match(MatchState::Waiting))
            .await;
        bo.expect_message(ServerMessage::system(server::state::OPPONENT_LEFT))
            .await;
        bo.expect(|line| line == "LOBBY bo|SPECTATOR|WAITING").await;
    }
}

/// CLIENT LIBRARY AGAINST A REAL SERVER
mod client_tests {
    use super::*;
    use client::network::Client;
    use client::{ClientError, ClientEvent, UiCommand};
    use shared::{ErrorCode, Status};
    use tokio::sync::mpsc;

    async fn next_event<F: Fn(&ClientEvent) -> bool>(
        events: &mut mpsc::UnboundedReceiver<ClientEvent>,
        pred: F,
    ) -> ClientEvent {
        timeout(WAIT, async {
            loop {
                let event = events.recv().await.expect("event stream closed");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for client event")
    }

    #[tokio::test]
    async fn client_plays_a_match_and_renders_frames() {
        let addr = start_server().await;

        let (event_tx, mut events) = mpsc::unbounded_channel();
        let (commands, mut command_rx) = mpsc::channel(8);
        let session = tokio::spawn(async move {
            let client = Client::new(&addr.to_string(), "ann", event_tx);
            client.run(&mut command_rx).await
        });

        next_event(&mut events, |e| matches!(e, ClientEvent::Lobby(_))).await;
        commands.send(UiCommand::RequestPlay).await.unwrap();
        next_event(&mut events, |e| match e {
            ClientEvent::Lobby(entries) => entries
                .iter()
                .any(|entry| entry.name == "ann" && entry.status == Status::Queued),
            _ => false,
        })
        .await;

        let _bo = queued_peer(addr, "bo").await;

        next_event(&mut events, |e| *e == ClientEvent::Role(Role::Left)).await;
        next_event(&mut events, |e| {
            *e == ClientEvent::Match(MatchState::Playing)
        })
        .await;
        let frame = next_event(&mut events, |e| matches!(e, ClientEvent::Frame(_))).await;
        if let ClientEvent::Frame(state) = frame {
            assert!(state.bx >= 0.0 && state.bx <= shared::WIDTH);
        }

        commands.send(UiCommand::Disconnect).await.unwrap();
        let result = timeout(WAIT, session).await.unwrap().unwrap();
        tokio_test::assert_ok!(result);
        next_event(&mut events, |e| *e == ClientEvent::Disconnected).await;
    }

    #[tokio::test]
    async fn client_reports_taken_name() {
        let addr = start_server().await;
        let mut holder = Peer::connect(addr).await;
        holder.send(ClientMessage::Hello("ann".into())).await;
        holder
            .expect(|line| line.starts_with("CHAT Server: Welcome"))
            .await;

        let (event_tx, _events) = mpsc::unbounded_channel();
        let (_commands, mut command_rx) = mpsc::channel(1);
        let client = Client::new(&addr.to_string(), "ann", event_tx);
        let result = timeout(WAIT, client.run(&mut command_rx)).await.unwrap();

        assert!(matches!(
            result,
            Err(ClientError::Rejected(ErrorCode::NameTaken))
        ));
    }
}

/// SNAPSHOT PIPELINE TESTS
mod pipeline_tests {
    use assert_approx_eq::assert_approx_eq;
    use client::ClientGameState;
    use server::game::{GameState, PaddleInput};
    use shared::{encode_line, LineBuffer, ServerMessage, TICK_DT};
    use std::time::{Duration, Instant};

    /// Server snapshots survive the wire and come out blended on the client.
    #[test]
    fn server_snapshots_interpolate_on_client() {
        let mut game = GameState::with_seed(3);
        let mut session = ClientGameState::new();
        let mut inbox = LineBuffer::new();
        let start = Instant::now();
        let still = PaddleInput::default();

        let mut sent = Vec::new();
        for i in 0..2u64 {
            game.step(TICK_DT, still, still);
            let snapshot = game.snapshot();
            sent.push(snapshot);

            let wire = encode_line(&ServerMessage::State(snapshot));
            for line in inbox.extend(wire.as_bytes()) {
                session.handle_line(&line, start + Duration::from_millis(16 * i));
            }
        }

        // Halfway between the two arrivals, once the render delay has passed.
        let now = start + Duration::from_millis(8) + shared::INTERP_DELAY;
        let frame = session.render(now).unwrap();
        let expected_bx = (sent[0].bx + sent[1].bx) / 2.0;
        assert_approx_eq!(frame.bx, expected_bx, 0.02);
        assert_eq!((frame.sl, frame.sr), (0, 0));
    }

    #[test]
    fn seeded_games_are_deterministic() {
        let mut a = GameState::with_seed(42);
        let mut b = GameState::with_seed(42);
        let up = PaddleInput {
            up: true,
            down: false,
        };

        for _ in 0..600 {
            a.step(TICK_DT, up, PaddleInput::default());
            b.step(TICK_DT, up, PaddleInput::default());
        }
        assert_eq!(a.snapshot(), b.snapshot());
    }
}
