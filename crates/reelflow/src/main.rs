// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reelflow - script-to-video generation pipeline.
//!
//! Binary entry point: loads configuration, initializes tracing, and
//! dispatches to the subcommands. The CLI doubles as the polling client of
//! the task ledger: generation commands submit work and wait for the
//! ledger to reach a terminal state.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reelflow_config::ReelflowConfig;
use reelflow_core::ReelflowError;
use reelflow_pipeline::Pipeline;
use reelflow_storage::Database;
use tracing_subscriber::EnvFilter;

mod doctor;
mod generate;
mod merge;
mod providers;
mod tasks;

/// Reelflow - turn a short script into a finished short-form video.
#[derive(Parser, Debug)]
#[command(name = "reelflow", version, about, long_about = None)]
struct Cli {
    /// Config file path (defaults to the XDG hierarchy).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Check configuration, storage, providers, and tool availability.
    Doctor,
    /// Manage provider configurations.
    Providers {
        #[command(subcommand)]
        command: providers::ProvidersCommand,
    },
    /// Generate text through the configured text provider.
    Text(generate::TextArgs),
    /// Generate one image and wait for the task to settle.
    Image(generate::ImageArgs),
    /// Generate one video clip and wait for the task to settle.
    Video(generate::VideoArgs),
    /// Merge clips into one episode file.
    Merge(merge::MergeArgs),
    /// Inspect ledger tasks.
    Task(tasks::TaskArgs),
}

fn load_config(cli: &Cli) -> Result<ReelflowConfig, ReelflowError> {
    let loaded = match &cli.config {
        Some(path) => reelflow_config::load_config_from_path(path),
        None => reelflow_config::load_config(),
    };
    loaded.map_err(|e| ReelflowError::Config(e.to_string()))
}

async fn open_pipeline(config: &ReelflowConfig) -> Result<Pipeline, ReelflowError> {
    let db = Database::open(&config.storage.database_path).await?;
    Pipeline::new(db, config)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("reelflow: {e}");
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.app.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Doctor => doctor::run(&config).await,
        Commands::Providers { ref command } => providers::run(&config, command).await,
        Commands::Text(ref args) => generate::run_text(&config, args).await,
        Commands::Image(ref args) => generate::run_image(&config, args).await,
        Commands::Video(ref args) => generate::run_video(&config, args).await,
        Commands::Merge(ref args) => merge::run(&config, args).await,
        Commands::Task(ref args) => tasks::run(&config, args).await,
    };

    if let Err(e) = result {
        eprintln!("reelflow: {e}");
        std::process::exit(1);
    }
}
