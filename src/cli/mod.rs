//! CLI module for PS3
//!
//! Provides commands:
//! - `serve`: Start the HTTP server (default)
//! - `config`: Print the effective configuration

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::server::{self, AppConfig};

/// PS3 task backend CLI
#[derive(Parser, Debug)]
#[command(name = "ps3")]
#[command(about = "PDF task backend with real-time task event streaming")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the server (default)
    Serve {
        /// Override server.host
        #[arg(long)]
        host: Option<String>,
        /// Override server.port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the effective configuration as JSON (API key redacted)
    Config,
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = server::load_config()?;

    match cli.command {
        Some(Commands::Serve { host, port }) => {
            apply_overrides(&mut config, host, port);
            server::run(config).await
        }
        Some(Commands::Config) => {
            if config.server.api_key().is_some() {
                config.server.api_key = Some("********".to_string());
            }
            let rendered =
                serde_json::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{}", rendered);
            Ok(())
        }
        None => server::run(config).await,
    }
}

fn apply_overrides(config: &mut AppConfig, host: Option<String>, port: Option<u16>) {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
}
