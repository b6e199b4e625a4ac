//! Memory Network server
//!
//! Entry point: loads configuration, then serves the HTTP API or runs a
//! one-off migration into SurrealDB.

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use memory_network::config::{AppConfig, Cli, Command};
use memory_network::{server, telemetry};
use mimalloc::MiMalloc;
use std::sync::Arc;
use tracing::info;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenv();

    telemetry::init();

    let cli = Cli::parse();
    let config = AppConfig::from_cli(&cli).context("Failed to load configuration")?;

    info!(
        name: "config.loaded",
        backend = ?config.storage.backend,
        embedding = ?config.embedding.provider,
        port = config.server.port,
        "Configuration loaded"
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => server::start_server(Arc::new(config)).await,
        Command::Migrate {
            to,
            namespace,
            database,
        } => {
            let count = server::migrate(&config, &to, &namespace, &database).await?;
            println!("Migrated {count} memories to {to}");
            Ok(())
        }
    }
}
