//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p voxnet_server -- [--config server.json] [--addr 127.0.0.1:40000] [--tick-hz 20] [--seed 24301] [--save-dir saves]
//!
//! The server generates a world, listens for client connections, runs a
//! fixed timestep simulation and streams world changes to every client.
//!
//! Console commands:
//!   status         - Show server status
//!   save [name]    - Save the world (timestamped name when omitted)
//!   load <name>    - Replace the world with a save
//!   quit           - Shutdown server

use std::env;
use std::io::{BufRead, Write};

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::info;
use voxnet_server::server::GameServer;
use voxnet_shared::config::EngineConfig;

fn parse_args() -> anyhow::Result<EngineConfig> {
    let args: Vec<String> = env::args().collect();
    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => EngineConfig::load(&args[i + 1])?,
        _ => EngineConfig::default(),
    };
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().context("parse --tick-hz")?;
                i += 2;
            }
            "--seed" if i + 1 < args.len() => {
                cfg.world_seed = args[i + 1].parse().context("parse --seed")?;
                i += 2;
            }
            "--save-dir" if i + 1 < args.len() => {
                cfg.save_dir = args[i + 1].clone();
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(addr = %cfg.server_addr, tick_hz = cfg.tick_hz, seed = cfg.world_seed, "Starting server");

    let mut server = GameServer::bind(cfg).await.context("create server")?;
    info!(local = %server.local_label(), "Server listening");

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

    println!("Server ready. Type 'status' for info, 'save'/'load' for worlds, 'quit' to exit.");
    println!();

    server.run().await
}
