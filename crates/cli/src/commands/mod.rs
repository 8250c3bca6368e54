//! Subcommand implementations.

pub mod identify;
pub mod init;
pub mod search;
pub mod stats;
pub mod upgrade;

use crate::cli::Command;
use crate::config::CliConfig;

/// Run a parsed subcommand.
pub async fn run(command: Command, config: &CliConfig) -> anyhow::Result<()> {
    match command {
        Command::Init { db } => init::run(&db).await,
        Command::Upgrade { db, root } => upgrade::run(&db, &root).await,
        Command::Identify { root, db, dry_run } => identify::run(&root, &db, dry_run, config).await,
        Command::Search { db, query, limit } => search::run(&db, &query, limit).await,
        Command::Stats { db, min_duplicates } => stats::run(&db, min_duplicates).await,
    }
}
