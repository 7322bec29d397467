// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Indica - event-triggered message delivery engine.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod app;
mod commands;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use indica_config::IndicaConfig;

/// Indica - event-triggered message delivery engine.
#[derive(Parser, Debug)]
#[command(name = "indica", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the processor loops and the admin API until signalled.
    Serve,
    /// Run one dispatch sweep and exit.
    Process {
        /// Maximum entries to dispatch (defaults to dispatch.batch_size).
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Delete completed and failed entries older than the retention window.
    Purge {
        /// Age threshold in days (defaults to retention.retention_days).
        #[arg(long)]
        days: Option<u32>,
    },
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Validate the configuration and print a summary.
    Check,
}

fn load_config(path: Option<&std::path::Path>) -> IndicaConfig {
    let loaded = match path {
        Some(path) => indica_config::load_and_validate_path(path),
        None => indica_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            indica_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Process { limit }) => commands::run_process(config, limit).await,
        Some(Commands::Purge { days }) => commands::run_purge(config, days).await,
        Some(Commands::Config {
            action: ConfigAction::Check,
        }) => {
            commands::print_config_summary(&config);
            Ok(())
        }
        None => {
            println!("indica: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
