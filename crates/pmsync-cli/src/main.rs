//! pmsync CLI - Offline-first project and company records from the terminal
//!
//! Local writes land in the on-disk store with a change log entry; `sync`
//! delivers them to the configured peer and applies remote changes.

mod cli;
mod commands;
mod config_profiles;
mod error;

#[cfg(test)]
mod tests;

use std::env;
use std::path::PathBuf;

use clap::Parser;
use pmsync_core::EntityKind;

use crate::cli::{Cli, Commands};
use crate::commands::changes::run_changes;
use crate::commands::config::run_config;
use crate::commands::entity::run_entity;
use crate::commands::snapshot::{run_export, run_import};
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "pmsync=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let profile = cli.profile.as_deref();

    match cli.command {
        Commands::Project { command } => {
            run_entity(EntityKind::Project, command, profile, &db_path).await?;
        }
        Commands::Company { command } => {
            run_entity(EntityKind::Company, command, profile, &db_path).await?;
        }
        Commands::Changes {
            limit,
            pending,
            json,
        } => run_changes(limit, pending, json, &db_path).await?,
        Commands::Export { output } => run_export(output.as_deref(), &db_path).await?,
        Commands::Import { path } => run_import(&path, profile, &db_path).await?,
        Commands::Status { json } => run_status(json, &db_path).await?,
        Commands::Sync { token, wait } => run_sync(token, wait, profile, &db_path).await?,
        Commands::Config { command } => run_config(command, profile)?,
    }

    Ok(())
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("PMSYNC_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pmsync")
        .join("pmsync.db")
}
