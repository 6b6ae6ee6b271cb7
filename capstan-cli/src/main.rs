//! Capstan CLI
//!
//! Command-line interface for validating, planning, and running pipeline
//! definitions with the Capstan engine.

mod commands;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::{Commands, handle_command};

#[derive(Parser)]
#[command(name = "capstan")]
#[command(about = "Capstan CI pipeline engine", long_about = None)]
struct Cli {
    /// Base directory for run workspaces
    #[arg(long, env = "CAPSTAN_WORKSPACE")]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "capstan=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    handle_command(cli.command, cli.workspace).await
}
