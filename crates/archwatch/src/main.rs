//! archwatch - watches directories and archives new files after a delay.
//!
//! Main entry point for the archwatch CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{check, init, run};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// archwatch - delayed, content-checked archival of new files
#[derive(Parser)]
#[command(name = "archwatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file (default: $ARCHWATCH_CONFIG, then ./Config.json)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for rotating JSON log files
    #[arg(long, global = true, env = "ARCHWATCH_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch every configured directory until interrupted
    Run(run::RunArgs),

    /// Write a template config file
    Init(init::InitArgs),

    /// Validate the config file and show what would be monitored
    Check(check::CheckArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing: console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "archwatch=debug,archwatch_monitor=debug,archwatch_config=debug,info"
    } else {
        "archwatch=info,archwatch_monitor=info,archwatch_config=info,warn"
    };

    let log_dir = cli
        .log_dir
        .clone()
        .or_else(|| dirs::data_local_dir().map(|d| d.join("archwatch").join("logs")))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "archwatch.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "archwatch=trace,archwatch_monitor=trace,archwatch_config=trace,info",
                )),
        )
        .init();

    // Create context for commands
    let ctx = commands::Context {
        config_path: archwatch_config::resolve_config_path(cli.config.as_deref()),
        json_output: cli.json,
        verbose: cli.verbose,
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Run(args) => run::run(args, &ctx).await,
        Commands::Init(args) => init::run(args, &ctx).await,
        Commands::Check(args) => check::run(args, &ctx).await,
    }
}
