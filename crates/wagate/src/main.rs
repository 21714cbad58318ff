// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wagate - a multi-tenant WhatsApp-protocol gateway.
//!
//! This is the binary entry point for the gateway daemon.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use wagate::serve::{install_signal_handler, run};
use wagate::upstream::UnconfiguredConnector;
use wagate_config::{load_config, load_config_from_path, ConfigError, WagateConfig};

/// Wagate - a multi-tenant WhatsApp-protocol gateway.
#[derive(Parser, Debug)]
#[command(name = "wagate", version, about, long_about = None)]
struct Cli {
    /// Path to a config file (defaults to the XDG hierarchy).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway daemon.
    Serve,
    /// Print the resolved configuration.
    Config,
}

fn load(cli_config: Option<&PathBuf>) -> Result<WagateConfig, ConfigError> {
    match cli_config {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load(cli.config.as_ref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.agent.log_level.clone())),
        )
        .init();

    match cli.command {
        Commands::Serve => {
            let shutdown = install_signal_handler();
            let connector = Arc::new(UnconfiguredConnector);
            if let Err(err) = run(config, connector, shutdown).await {
                tracing::error!(error = %err, "gateway failed");
                std::process::exit(1);
            }
        }
        Commands::Config => match serde_json::to_string_pretty(&config) {
            Ok(rendered) => println!("{rendered}"),
            Err(err) => {
                eprintln!("cannot render configuration: {err}");
                std::process::exit(1);
            }
        },
    }
}
