//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p voxnet_client -- [--config client.json] [--addr 127.0.0.1:40000] [--name Player] [--tick-hz 20]
//!
//! The client joins the server, loads the world snapshot and then predicts
//! one tick per server tick, reconciling against every authoritative delta.
//!
//! Console commands:
//!   status              - Show client status
//!   walk <fwd> <right>  - Set movement axes held every tick
//!   look <yaw> <pitch>  - Set look angles in radians
//!   jump                - Jump once
//!   act                 - Break or build once
//!   mode                - Toggle break/build mode
//!   select <block>      - Choose the block to build with
//!   save [name]         - Ask the server to save its world
//!   load <name>         - Ask the server to load a saved world
//!   quit                - Exit client

use std::env;
use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{info, warn};
use voxnet_client::{client::GameClient, input::InputState};
use voxnet_shared::{block::BlockKind, config::EngineConfig};

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
            "--name" if i + 1 < args.len() => {
                cfg.player_name = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().context("parse --tick-hz")?;
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

/// Applies one console line to the held input. Returns lines to print, or
/// `None` to quit.
fn exec_console(
    client: &GameClient,
    held: &mut InputState,
    line: &str,
) -> Option<Vec<String>> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(&command) = tokens.first() else {
        return Some(Vec::new());
    };
    let arg = |i: usize| tokens.get(i).and_then(|t| t.parse::<f32>().ok()).unwrap_or(0.0);

    let out = match command {
        "status" => client.status(),
        "walk" => {
            held.forward = arg(1);
            held.right = arg(2);
            Vec::new()
        }
        "look" => {
            held.yaw = arg(1);
            held.pitch = arg(2);
            Vec::new()
        }
        "jump" => {
            held.jump = true;
            Vec::new()
        }
        "act" => {
            held.action = true;
            Vec::new()
        }
        "mode" => {
            held.toggle_mode = true;
            Vec::new()
        }
        "select" => match tokens.get(1).and_then(|name| BlockKind::from_name(name)) {
            Some(kind) => {
                held.select = Some(kind);
                Vec::new()
            }
            None => vec!["Usage: select <planks|stone|dirt|grass|glass|sapling>".to_string()],
        },
        "save" => match client.save_world(tokens.get(1).copied().unwrap_or("")) {
            Ok(()) => vec!["Save requested".to_string()],
            Err(e) => vec![format!("Error: {e}")],
        },
        "load" => match tokens.get(1) {
            Some(stem) => match client.load_world(stem) {
                Ok(()) => vec![format!("Load of '{stem}' requested")],
                Err(e) => vec![format!("Error: {e}")],
            },
            None => vec!["Usage: load <name>".to_string()],
        },
        "quit" | "exit" => return None,
        other => vec![format!("Unknown command: {other}")],
    };
    Some(out)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(server = %cfg.server_addr, name = %cfg.player_name, "Starting client");

    let mut client = GameClient::connect(&cfg).await.context("connect")?;
    client
        .wait_for_snapshot(Duration::from_secs(10))
        .await
        .context("join")?;

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

    println!("Client connected. Type 'status' for info, 'quit' to exit.");
    println!();

    let mut held = InputState::default();
    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / cfg.tick_hz as f64));

    loop {
        interval.tick().await;

        while let Ok(line) = console_rx.try_recv() {
            match exec_console(&client, &mut held, &line) {
                Some(output) => {
                    for line in output {
                        println!("{}", line);
                    }
                }
                None => return Ok(()),
            }
        }

        client.frame(held);
        // One-shot presses last a single tick.
        held.jump = false;
        held.action = false;
        held.toggle_mode = false;
        held.select = None;

        if let Err(e) = client.tick() {
            warn!(error = %e, "Connection lost");
            println!("Disconnected from server.");
            break;
        }
    }

    Ok(())
}
