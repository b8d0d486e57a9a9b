use std::collections::HashSet;
use std::error::Error;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use room_chat::common::{ChatCommand, ChatEvent, Room};
use room_chat::config::{self, AppConfig};
use room_chat::network::{ChatClient, ClientSettings, HistoryFetcher};
use room_chat::room::RoomView;
use room_chat::ui::ChatApp;

#[derive(Parser)]
#[command(name = "room-chat", version, about = "Chat room client with live delivery")]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// REST base url, e.g. http://localhost:8080
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,
    /// Live channel host, when it differs from the REST base
    #[arg(long, value_name = "URL")]
    ws_url: Option<String>,
    #[arg(long)]
    username: Option<String>,
    #[arg(long)]
    nickname: Option<String>,
    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Clone, PartialEq, Eq)]
enum Mode {
    /// Print the room list and exit
    Rooms,
    /// Follow one room in the terminal; lines typed on stdin are sent
    Tail {
        #[arg(long)]
        room: String,
        #[arg(long)]
        page_size: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    // Khởi tạo Logger để debug
    env_logger::init();

    let cli = Cli::parse();
    let mut app_config = config::load_config(&cli.config);
    app_config.apply_env();
    app_config.apply_overrides(cli.base_url, cli.ws_url, cli.username);
    if let Some(nickname) = cli.nickname {
        app_config.nickname = nickname;
    }

    match cli.mode {
        Some(Mode::Rooms) => list_rooms(&app_config).await,
        Some(Mode::Tail { room, page_size }) => {
            if let Some(page_size) = page_size {
                app_config.page_size = page_size;
            }
            tail_room(&app_config, room).await
        }
        None => run_full_client(app_config).await,
    }
}

fn build_fetcher(app_config: &AppConfig) -> Result<HistoryFetcher, Box<dyn Error>> {
    Ok(HistoryFetcher::new(
        app_config.api_base()?,
        app_config.request_timeout(),
        app_config.history_retry.backoff(),
    )?)
}

async fn list_rooms(app_config: &AppConfig) -> Result<(), Box<dyn Error>> {
    let fetcher = build_fetcher(app_config)?;
    for room in fetcher.fetch_rooms().await? {
        println!("{}\t{}", room.uuid, room.display_name);
    }
    Ok(())
}

async fn run_full_client(app_config: AppConfig) -> Result<(), Box<dyn Error>> {
    let settings = ClientSettings::from_config(&app_config)?;
    let fetcher = build_fetcher(&app_config)?;
    let session = settings.session.clone();

    // 1. Tạo các kênh giao tiếp (Channels)
    // UI -> Network
    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    // Network -> UI
    let (event_tx, event_rx) = mpsc::channel(100);

    // 2. Khởi chạy Network Thread (Chạy ngầm)
    tokio::spawn(async move {
        ChatClient::new(event_tx, cmd_rx, fetcher, settings).run().await;
    });

    // 3. Khởi chạy UI (Chạy trên Main Thread)
    let options = eframe::NativeOptions::default();
    let mut event_rx = Some(event_rx);

    eframe::run_native(
        "Room Chat",
        options,
        Box::new(move |cc| {
            let event_receiver = event_rx
                .take()
                .expect("ChatApp should only be initialized once");

            log::info!("UI started for {}", session.username);

            Ok(Box::new(ChatApp::new(
                cc,
                session.clone(),
                cmd_tx.clone(),
                event_receiver,
            )))
        }),
    )?;

    Ok(())
}

async fn tail_room(app_config: &AppConfig, room_uuid: String) -> Result<(), Box<dyn Error>> {
    let settings = ClientSettings::from_config(app_config)?;
    let fetcher = build_fetcher(app_config)?;
    let room = Room::new(room_uuid, "");
    let mut view = RoomView::new(room.clone(), settings.session.clone());

    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    let (event_tx, mut event_rx) = mpsc::channel(100);
    let client = tokio::spawn(ChatClient::new(event_tx, cmd_rx, fetcher, settings).run());

    cmd_tx.send(ChatCommand::EnterRoom(room)).await?;

    let mut printed = HashSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                match &event {
                    ChatEvent::ChannelStateChanged { state, .. } => {
                        eprintln!("-- live channel {state}");
                    }
                    ChatEvent::HistoryFailed { reason, .. } => {
                        eprintln!("-- history unavailable: {reason}");
                    }
                    ChatEvent::SendRejected { reason, .. } => {
                        eprintln!("-- message not sent: {reason}");
                    }
                    _ => {}
                }
                view.apply(event);
                if let Some(text) = view.take_unsent() {
                    eprintln!("-- type it again to retry: {text}");
                }
                print_new(&view, &mut printed);
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match view.compose(&line) {
                    Ok(Some(outbound)) => {
                        print_new(&view, &mut printed);
                        cmd_tx.send(ChatCommand::SendMessage(outbound)).await?;
                    }
                    Ok(None) => {}
                    Err(err) => eprintln!("-- cannot send: {err}"),
                },
                Ok(None) => stdin_open = false,
                Err(err) => {
                    log::warn!("Stopped reading stdin: {err}");
                    stdin_open = false;
                }
            },
        }
    }

    view.close();
    drop(cmd_tx);
    client.await?;
    Ok(())
}

/// Prints messages not shown yet. A confirmed echo shares its key with the
/// optimistic copy already printed, so it is not printed twice.
fn print_new(view: &RoomView, printed: &mut HashSet<String>) {
    for message in view.messages() {
        let key = message
            .client_id
            .map_or_else(|| message.id.clone(), |client_id| client_id.to_string());
        if printed.insert(key) {
            let marker = if message.is_own { ">" } else { " " };
            println!("{marker} {message}");
        }
    }
}
