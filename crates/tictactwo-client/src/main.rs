// crates/tictactwo-client/src/main.rs

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tictactwo_client::{
    ClientConfig, ConnectionManager, GameClient, GameCommand, GameView, StatusBoard,
    StatusMonitor, TcpConnector,
};
use tictactwo_core::{BoardState, SessionState};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(name = "tictactwo")]
#[clap(about = "Terminal client for tic-tac-two")]
struct Cli {
    /// Broker address (overrides config and environment)
    #[clap(short, long)]
    server: Option<String>,

    /// TOML configuration file
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play interactively over stdin
    Play {
        /// Display name; generated when omitted
        #[clap(short, long)]
        name: Option<String>,
    },
    /// Watch the fleet status topic
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = ClientConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(server) = cli.server {
        config.server_addr = server;
    }
    info!("Using broker at {}", config.server_addr);

    let connector = Arc::new(TcpConnector::new(config.server_addr.clone()));
    let conn = ConnectionManager::new(connector, config.connection());

    match cli.command {
        Command::Play { name } => {
            let identity = name.unwrap_or_else(generate_name);
            play(conn, identity, &config).await
        }
        Command::Status => status(conn).await,
    }
}

fn generate_name() -> String {
    format!("player-{:x}", chrono::Utc::now().timestamp_millis())
}

async fn play(conn: ConnectionManager, identity: String, config: &ClientConfig) -> Result<()> {
    println!("you are {}", identity);
    print_help();

    let handle = GameClient::start(
        conn,
        identity,
        config.notice_ttl(),
        config.event_channel_capacity,
    );
    let mut view = handle.watch_view();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = view.borrow_and_update().clone();
                render_game(&snapshot);
            }

            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_command(&line) {
                    Ok(Some(command)) => handle.send(command)?,
                    Ok(None) => break,
                    Err(message) if message.is_empty() => {}
                    Err(message) => println!("{}", message),
                }
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

async fn status(conn: ConnectionManager) -> Result<()> {
    let monitor = StatusMonitor::start(conn);
    println!("monitoring as {}", monitor.identity());
    let mut board = monitor.watch();

    loop {
        tokio::select! {
            changed = board.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = board.borrow_and_update().clone();
                render_status(&snapshot);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    monitor.stop().await;
    Ok(())
}

/// `Ok(None)` means quit.
fn parse_command(line: &str) -> std::result::Result<Option<GameCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err(String::new());
    };
    let arg = words.next().map(str::to_string);

    let command = match verb {
        "create" | "c" => GameCommand::CreateRoom(arg),
        "join" | "j" => GameCommand::JoinRoom(arg),
        "new" | "n" => GameCommand::NewGame,
        "leave" | "l" => GameCommand::Leave,
        "quit" | "q" | "exit" => return Ok(None),
        "help" | "h" | "?" => {
            print_help();
            return Err(String::new());
        }
        "play" | "p" => GameCommand::Play(parse_cell(arg.as_deref().unwrap_or(""))?),
        other => GameCommand::Play(parse_cell(other)?),
    };
    Ok(Some(command))
}

fn parse_cell(text: &str) -> std::result::Result<usize, String> {
    match text.parse::<usize>() {
        Ok(n @ 1..=9) => Ok(n - 1),
        _ => Err(format!("not a cell: {:?} (use 1-9)", text)),
    }
}

fn print_help() {
    println!("commands: create [room] | join [room] | 1-9 | new | leave | quit");
}

fn render_board(board: &BoardState) -> String {
    let outcome = board.outcome();
    let line = outcome.line.unwrap_or([usize::MAX; 3]);
    let fading = if outcome.is_decided() {
        None
    } else {
        board.next_eviction()
    };

    let mut out = String::new();
    for row in 0..3 {
        let cells: Vec<String> = (0..3)
            .map(|col| {
                let idx = row * 3 + col;
                let mark = match board.cells()[idx] {
                    Some(symbol) => symbol.to_string(),
                    None => (idx + 1).to_string(),
                };
                if line.contains(&idx) {
                    format!("[{}]", mark)
                } else if fading == Some(idx) {
                    format!("({})", mark)
                } else {
                    format!(" {} ", mark)
                }
            })
            .collect();
        out.push_str(&cells.join("|"));
        out.push('\n');
        if row < 2 {
            out.push_str("---+---+---\n");
        }
    }
    out
}

fn render_game(view: &GameView) {
    println!();
    println!(
        "[{:?}] players online: {}  open rooms: {}",
        view.connection,
        view.active_players,
        view.lobby.len()
    );
    match &view.session {
        SessionState::Idle => println!("not in a room"),
        SessionState::Creating { room_id } => println!("creating room {}...", room_id),
        SessionState::Joined(room) => {
            let symbol = room
                .my_symbol()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "?".to_string());
            println!("room {} as {} ({:?})", room.id(), symbol, room.occupancy());
            print!("{}", render_board(room.board()));
            if let Some(message) = view.turn_message() {
                println!("{}", message);
            }
        }
    }
    if let Some(notice) = &view.notice {
        println!("> {}", notice);
    }
}

fn render_status(board: &StatusBoard) {
    println!();
    println!(
        "{} | rooms: {}  active games: {}  waiting: {}  players: {}  online: {}",
        if board.is_connected() { "connected" } else { "disconnected" },
        board.total_rooms(),
        board.active_games(),
        board.waiting_rooms(),
        board.total_players(),
        board.active_players()
    );
    if board.total_rooms() == 0 {
        println!("no active games");
    }
    for (id, room) in board.rooms() {
        let players: Vec<String> = room
            .players
            .iter()
            .map(|(name, symbol)| format!("{}={}", name, symbol))
            .collect();
        let turn = room
            .current_turn
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<20} {:<8} {}/2 turn {} [{}]",
            id,
            if room.is_game_active { "playing" } else { "waiting" },
            room.player_count,
            turn,
            players.join(", ")
        );
    }
    if let Some(at) = board.updated_at() {
        println!("updated {}", at.format("%H:%M:%S"));
    }
}
