mod backend;
mod cli;
mod config;
mod error;
mod format;
mod model;

use anyhow::Context;
use clap::Parser;
use cli::commands::{self, BatchAction};
use cli::{Cli, Commands};
use config::Config;
use std::io;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::debug!("Using config {:?}", config);

    let mut out = io::stdout().lock();
    let mut input = io::stdin().lock();

    match cli.command {
        Commands::List {
            backend,
            pattern,
            local_dir,
        } => {
            let adapter = backend.adapter(&config);
            commands::list(
                adapter.as_ref(),
                pattern.as_deref(),
                local_dir.as_deref(),
                &mut out,
            )
            .context("Failed to list models")?;
        }

        Commands::Download {
            backend,
            model_id,
            local_dir,
        } => {
            let adapter = backend.adapter(&config);
            commands::download(adapter.as_ref(), &model_id, local_dir.as_deref(), &mut out)
                .with_context(|| format!("Failed to download {}", model_id))?;
        }

        Commands::Update {
            backend,
            pattern,
            local_dir,
        } => {
            let adapter = backend.adapter(&config);
            commands::run_batch(
                adapter.as_ref(),
                BatchAction::Update,
                pattern.as_deref(),
                local_dir.as_deref(),
                &mut input,
                &mut out,
            )
            .context("Failed to update models")?;
        }

        Commands::Remove {
            backend,
            pattern,
            local_dir,
        } => {
            let adapter = backend.adapter(&config);
            commands::run_batch(
                adapter.as_ref(),
                BatchAction::Remove,
                pattern.as_deref(),
                local_dir.as_deref(),
                &mut input,
                &mut out,
            )
            .context("Failed to remove models")?;
        }
    }

    Ok(())
}
