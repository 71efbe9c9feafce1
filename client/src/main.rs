use clap::Parser;
use client::input::parse_command;
use client::network::Client;
use client::rendering::Renderer;
use client::{ClientError, ClientEvent, UiCommand};
use log::info;
use shared::DEFAULT_PORT;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host to connect to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Display name; prompted for if omitted
    #[arg(short, long)]
    name: Option<String>,

    /// Print every event as a JSON line
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let server = format!("{}:{}", args.host, args.port);

    info!("Connecting to: {}", server);
    info!("Commands: /play /cancel /up /down /stop /quit, anything else is chat");

    let (command_tx, mut commands) = mpsc::channel(64);
    tokio::spawn(read_stdin(command_tx));

    let (event_tx, events) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(events, Renderer::new(args.json)));

    let mut name = args.name;
    loop {
        let current = match name.take() {
            Some(current) => current,
            None => {
                eprintln!("Enter a display name:");
                match next_name(&mut commands).await {
                    Some(current) => current,
                    None => break,
                }
            }
        };

        let client = Client::new(&server, &current, event_tx.clone());
        match client.run(&mut commands).await {
            Ok(()) => break,
            Err(e) if e.is_name_rejection() => {
                eprintln!("Name {:?} was not accepted ({}), try another", current, e);
            }
            Err(ClientError::Connect(e)) => return Err(e.into()),
            Err(e) => eprintln!("{}", e),
        }
    }

    drop(event_tx);
    let _ = printer.await;
    Ok(())
}

/// Waits for a line of chat text to use as a name while no session is running.
async fn next_name(commands: &mut mpsc::Receiver<UiCommand>) -> Option<String> {
    while let Some(command) = commands.recv().await {
        match command {
            UiCommand::Chat(text) => return Some(text),
            UiCommand::Disconnect => return None,
            _ => eprintln!("Not connected; enter a display name first"),
        }
    }
    None
}

async fn read_stdin(commands: mpsc::Sender<UiCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        for command in parse_command(&line) {
            if commands.send(command).await.is_err() {
                return;
            }
        }
    }
    let _ = commands.send(UiCommand::Disconnect).await;
}

async fn print_events(mut events: mpsc::UnboundedReceiver<ClientEvent>, renderer: Renderer) {
    while let Some(event) = events.recv().await {
        if let Some(line) = renderer.render(&event) {
            println!("{}", line);
        }
    }
}
