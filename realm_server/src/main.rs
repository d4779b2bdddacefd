//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p realm_server -- [--addr 127.0.0.1:40000] [--tick-hz 20]
//!                                [--seed 1848] [--data-dir data]
//!
//! The server listens for client connections, runs a fixed timestep
//! simulation (mob AI, tile respawns, store flushes), and broadcasts world
//! events to connected clients.
//!
//! Console commands:
//!   status             - Show server status
//!   save               - Flush the user store now
//!   broadcast <text>   - Send a System chat line to everyone
//!   quit               - Flush and shut down

use std::env;
use std::io::{BufRead, Write};

use anyhow::Context;
use realm_server::server::GameServer;
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
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().unwrap_or(20);
                i += 2;
            }
            "--seed" if i + 1 < args.len() => {
                cfg.world_seed = args[i + 1].parse().unwrap_or(cfg.world_seed);
                i += 2;
            }
            "--data-dir" if i + 1 < args.len() => {
                cfg.data_dir = args[i + 1].clone();
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
    info!(addr = %cfg.server_addr, tick_hz = cfg.tick_hz, seed = cfg.world_seed, "Starting server");

    let mut server = GameServer::new(cfg.clone()).await.context("create server")?;
    let local = server.local_addr()?;
    info!(%local, "Server listening");

    // Set up console input channel.
    let (console_tx, console_rx) = mpsc::channel::<String>(32);
    server.set_console_input(console_rx);

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

    println!("Server ready. Type 'status' for info, 'quit' to exit.");
    println!();

    // Main server loop.
    let tick_interval = std::time::Duration::from_secs_f32(1.0 / cfg.tick_hz as f32);
    let mut next_tick = tokio::time::Instant::now();

    loop {
        server.step(tick_interval.as_secs_f32()).await?;
        next_tick += tick_interval;
        tokio::time::sleep_until(next_tick).await;
    }
}
