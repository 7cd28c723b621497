//! AuralMind CLI - Offline Mastering
//!
//! Command-line interface for the AuralMind mastering engine.

use anyhow::Result;
use clap::Parser;
use log::info;
use tracing_subscriber::EnvFilter;

use auralmind::cli::{commands, Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose; `log` records are bridged into the subscriber
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    info!("AuralMind v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Master(args) => commands::master(&args).map(|_| ()),
        Commands::Batch(args) => commands::batch(&args),
        Commands::Presets => commands::list_presets(),
    }
}
