//! Scripted TCP peer for manual end-to-end runs.
//!
//! Claims a name, queues for a match and, while seated, follows the ball with
//! its paddle. Re-queues after every match.

use clap::Parser;
use log::{info, warn};
use shared::{encode_line, ClientMessage, InputKey, MatchState, Role, ServerMessage, PADDLE_H};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Dead zone around the paddle center, in field units.
const TRACK_SLACK: f32 = 12.0;

#[derive(Parser, Debug)]
#[command(author, version, about = "Pong bot that tracks the ball")]
struct Args {
    /// Server address to connect to
    #[arg(short, long, default_value = "127.0.0.1:5555")]
    server: String,

    /// Display name to claim
    #[arg(short, long, default_value = "bot")]
    name: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Keys {
    up: bool,
    down: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let stream = TcpStream::connect(&args.server).await?;
    info!("Connected to {}", args.server);
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    send(&mut writer, ClientMessage::Hello(args.name.clone())).await?;
    send(&mut writer, ClientMessage::ReqPlay).await?;

    let mut role = Role::Spectator;
    let mut match_state = MatchState::Waiting;
    let mut keys = Keys::default();

    while let Some(line) = lines.next_line().await? {
        let message = match line.parse::<ServerMessage>() {
            Ok(message) => message,
            Err(e) => {
                warn!("Unparsed line {:?}: {}", line, e);
                continue;
            }
        };

        match message {
            ServerMessage::Role(new_role) => {
                info!("Role: {}", new_role);
                if role.is_player() && new_role == Role::Spectator {
                    send(&mut writer, ClientMessage::ReqPlay).await?;
                }
                role = new_role;
                keys = Keys::default();
            }
            ServerMessage::Match(state) => match_state = state,
            ServerMessage::State(snapshot)
                if role.is_player() && match_state == MatchState::Playing =>
            {
                let paddle = if role == Role::Left {
                    snapshot.ly
                } else {
                    snapshot.ry
                };
                let center = paddle + PADDLE_H / 2.0;
                let wanted = Keys {
                    up: snapshot.by < center - TRACK_SLACK,
                    down: snapshot.by > center + TRACK_SLACK,
                };
                if wanted.up != keys.up {
                    let message = ClientMessage::Input {
                        key: InputKey::Up,
                        pressed: wanted.up,
                    };
                    send(&mut writer, message).await?;
                }
                if wanted.down != keys.down {
                    let message = ClientMessage::Input {
                        key: InputKey::Down,
                        pressed: wanted.down,
                    };
                    send(&mut writer, message).await?;
                }
                keys = wanted;
            }
            ServerMessage::End { winner, sl, sr } => {
                info!("Match over, {} won {}:{}", winner, sl, sr);
            }
            ServerMessage::Error(code) => {
                warn!("Server rejected us: {}", code);
                break;
            }
            ServerMessage::Chat(text) => info!("{}", text),
            ServerMessage::State(_) | ServerMessage::Lobby(_) => {}
        }
    }

    info!("Disconnected");
    Ok(())
}

async fn send(
    writer: &mut tokio::net::tcp::OwnedWriteHalf,
    message: ClientMessage,
) -> std::io::Result<()> {
    writer.write_all(encode_line(&message).as_bytes()).await
}
