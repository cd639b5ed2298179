//! Waystone console host.
//!
//! Loads `waystone.toml`, starts an in-process server with the Waystone
//! plugin linked in, marks the world ready and then reads commands from
//! stdin until `quit`, end of input or a shutdown signal. Plugin data is
//! saved on the way out.

use anyhow::{anyhow, Context};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use waystone_events::{Clock, JsonFileStore, LocalServer};

mod cli;
mod config;
mod console;
mod logging;
mod signals;

use cli::CliArgs;
use config::AppConfig;
use console::{parse_line, Console, ConsoleCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let mut config = AppConfig::load_from_file(&args.config_path).await?;
    config.apply_overrides(&args);
    config
        .validate()
        .map_err(|e| anyhow!("Configuration validation failed: {}", e))?;

    logging::setup_logging(&config.logging)?;
    info!(
        "🧭 Waystone console v{} | world: {} | data: {}",
        env!("CARGO_PKG_VERSION"),
        config.server.world_name,
        config.server.data_dir
    );

    let store = Arc::new(JsonFileStore::new(&config.server.data_dir));
    let server = LocalServer::with_store(&config.server.world_name, store, Clock::system());
    server
        .load_plugin(plugin_waystone::plugin_instance())
        .await
        .context("loading the waystone plugin")?;
    server.world_ready().await?;

    let console = Console::new(server.clone(), config.server.operators.clone());
    info!("✅ Ready, type `help` for commands");

    tokio::select! {
        result = read_commands(&console) => {
            if let Err(e) = result {
                error!("❌ Console input failed: {}", e);
            }
        }
        result = signals::shutdown_signal() => {
            if let Err(e) = result {
                error!("❌ Signal handling failed: {}", e);
            }
        }
    }

    info!("🛑 Shutting down...");
    server.shutdown().await?;
    info!("👋 Bye");
    Ok(())
}

/// Reads stdin until `quit` or end of input.
async fn read_commands(console: &Console) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        if command == ConsoleCommand::Quit {
            return Ok(());
        }

        match console.execute(command).await {
            Ok(output) => {
                for line in output {
                    println!("{}", line);
                }
            }
            Err(e) => {
                warn!("⚠️ {}", e);
                println!("{}", e);
            }
        }
    }

    Ok(())
}
