//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p realm_client -- [--addr 127.0.0.1:40000] [--name Alice]
//!
//! The client connects, logs in, prints chat and presence events, and takes
//! simple commands from stdin.
//!
//! Console commands:
//!   say <text>        - Send a chat message (slash commands work too)
//!   move <x> <y>      - Report a new position
//!   mine <x> <y>      - Ask to mine a tile on the current level
//!   status            - Show client status
//!   quit              - Exit

use std::env;
use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::Context;
use realm_client::client::{ClientState, GameClient};
use realm_shared::config::RealmConfig;
use tokio::sync::mpsc;
use tracing::info;

fn parse_args() -> RealmConfig {
    let mut cfg = RealmConfig::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                cfg.player_name = args[i + 1].clone();
                i += 2;
            }
            _ => i += 1,
        }
    }
    cfg
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args();
    info!(server = %cfg.server_addr, name = %cfg.player_name, "Starting client");

    let mut client = GameClient::connect(&cfg).await.context("connect")?;
    client.login(&cfg.player_name).await?;
    if !client.wait_init(Duration::from_secs(5)).await? {
        anyhow::bail!("login timed out");
    }
    info!(session = %client.session_id, seed = ?client.world_seed, "Logged in");

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            if stdin.lock().read_line(&mut line).is_err() {
                break;
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Connected. Type 'status' for info, 'quit' to exit.");
    println!();

    let mut level = "town".to_string();
    let mut printed_chat = 0usize;

    loop {
        // Process console commands.
        while let Ok(line) = console_rx.try_recv() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens.as_slice() {
                ["say", rest @ ..] => {
                    client.send_chat(&rest.join(" ")).await?;
                }
                ["move", x, y] => match (x.parse(), y.parse()) {
                    (Ok(x), Ok(y)) => client.send_move(x, y, &level, '@').await?,
                    _ => println!("Usage: move <x> <y>"),
                },
                ["mine", x, y] => match (x.parse(), y.parse()) {
                    (Ok(x), Ok(y)) => client.send_mine(x, y, &level).await?,
                    _ => println!("Usage: mine <x> <y>"),
                },
                ["status"] => {
                    println!("State: {:?}", client.state);
                    println!("Session: {}", client.session_id);
                    println!("Players online: {}", client.online.len());
                    println!("Tile overrides: {}", client.tile_overrides.len());
                    for entry in &client.online {
                        println!("  {} on {}", entry.name, entry.level);
                    }
                }
                ["quit"] | ["exit"] => {
                    return Ok(());
                }
                _ => println!("Commands: say, move, mine, status, quit"),
            }
        }

        // Track our own level from the roster for mine/move commands.
        if let Some(me) = client.roster.get(&client.session_id) {
            level = me.level.clone();
        }

        client.poll_for(Duration::from_millis(100)).await?;

        // Print any new chat lines.
        for msg in &client.chat_log[printed_chat..] {
            println!("[{}] {}: {}", msg.channel, msg.user, msg.text);
        }
        printed_chat = client.chat_log.len();

        if client.state == ClientState::Disconnected {
            println!("Disconnected from server.");
            return Ok(());
        }
    }
}
