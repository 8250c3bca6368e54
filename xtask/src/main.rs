mod version_check;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "acacore development tasks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the workspace version matches the library VERSION constant
    VersionCheck {
        /// Workspace manifest
        #[arg(long, default_value = "Cargo.toml")]
        manifest: PathBuf,
        /// Source file declaring `pub const VERSION`
        #[arg(long, default_value = "crates/core/src/version.rs")]
        source: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::VersionCheck { manifest, source } => version_check::run(&manifest, &source),
    }
}
