// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relaydesk - multi-tenant WhatsApp helpdesk ingestion.
//!
//! This is the binary entry point for the relaydesk service.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod shutdown;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use relaydesk_config::RelaydeskConfig;

/// Relaydesk - multi-tenant WhatsApp helpdesk ingestion.
#[derive(Parser, Debug)]
#[command(name = "relaydesk", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the webhook gateway, media workers and operator API.
    Serve,
    /// Show whether a running instance is healthy.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
    /// Validate configuration and exit.
    CheckConfig,
}

fn load_config(path: Option<&PathBuf>) -> RelaydeskConfig {
    let result = match path {
        Some(path) => relaydesk_config::load_and_validate_path(path),
        None => relaydesk_config::load_and_validate(),
    };
    match result {
        Ok(config) => config,
        Err(errors) => {
            relaydesk_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Status { json, plain }) => {
            if let Err(e) = status::run_status(&config, json, plain).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::CheckConfig) => {
            println!(
                "relaydesk: config ok (active provider: {}, {} instance(s))",
                config.providers.active,
                config.instances.len()
            );
        }
        None => {
            println!("relaydesk: use --help for available commands");
        }
    }
}
