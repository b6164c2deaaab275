//! fwatch - file watch controller CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use filewatch_cli::{cmd, logging};
use std::path::PathBuf;

/// fwatch - keep declared file watches running and report what changed
#[derive(Parser)]
#[command(name = "fwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller in the foreground until Ctrl-C
    Run {
        /// Manifest declaring the watches
        #[arg(short, long)]
        manifest: PathBuf,

        /// Delete watches not declared in the manifest (on reload)
        #[arg(long)]
        prune: bool,

        /// Config file (default: $FWATCH_CONFIG, then the user config dir)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Validate a manifest and print what it declares
    Check {
        /// Manifest to check
        #[arg(short, long)]
        manifest: PathBuf,
    },
    /// Show resource status from a snapshot written by `run`
    Status {
        /// Snapshot file (controller.snapshot_path)
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the effective configuration
    Config {
        /// Print an example config file instead
        #[arg(long)]
        example: bool,

        /// Print as plain TOML
        #[arg(long, conflicts_with = "example")]
        toml: bool,

        /// Config file to read
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // `run` sets up logging from its config file
    if !matches!(cli.command, Commands::Run { .. }) {
        logging::init_quiet();
    }

    match cli.command {
        Commands::Run {
            manifest,
            prune,
            config,
        } => cmd::run::run(&manifest, prune, config.as_deref()).await,
        Commands::Check { manifest } => cmd::check::run(&manifest).await,
        Commands::Status { snapshot, json } => cmd::status::run(&snapshot, json).await,
        Commands::Config { example: true, .. } => cmd::config::run_example().await,
        Commands::Config { toml, config, .. } => cmd::config::run(config.as_deref(), toml).await,
    }
}
