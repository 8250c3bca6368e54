use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "acacore")]
#[command(about = "Identify archive files and manage their files database", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options overriding the environment configuration.
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// Siegfried binary
    #[arg(long, global = true)]
    pub siegfried_binary: Option<PathBuf>,
    /// Siegfried signature file
    #[arg(long, global = true)]
    pub siegfried_signature: Option<String>,
    /// Siegfried home folder
    #[arg(long, global = true)]
    pub siegfried_home: Option<PathBuf>,
    /// Base URL of the reference files
    #[arg(long, global = true)]
    pub reference_url: Option<String>,
    /// Folder for the log file
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,
    /// Files identified per siegfried call
    #[arg(long, global = true, value_parser = parse_batch_size)]
    pub batch_size: Option<usize>,
}

fn parse_batch_size(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(size) if size > 0 => Ok(size),
        _ => Err("must be a positive integer".to_string()),
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Create a files database, or complete the schema of an existing one
    Init {
        /// Path to the database
        db: PathBuf,
    },
    /// Upgrade a files database to the current version
    Upgrade {
        /// Path to the database
        db: PathBuf,
        /// Folder the relative paths in the database start from
        #[arg(long)]
        root: PathBuf,
    },
    /// Identify the files in a folder and register them as original files
    Identify {
        /// Folder to identify
        root: PathBuf,
        /// Path to the database
        #[arg(long)]
        db: PathBuf,
        /// Show changes without saving them
        #[arg(long)]
        dry_run: bool,
    },
    /// Search original files with the query language
    Search {
        /// Path to the database
        db: PathBuf,
        /// Query, e.g. `@puid fmt/18 @not @action ignore`
        query: String,
        /// Maximum number of results
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },
    /// Show signature, action and checksum counts
    Stats {
        /// Path to the database
        db: PathBuf,
        /// Only list checksums shared by at least this many files
        #[arg(long, default_value_t = 2)]
        min_duplicates: i64,
    },
}

impl Command {
    /// Name used for events and log messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Upgrade { .. } => "upgrade",
            Self::Identify { .. } => "identify",
            Self::Search { .. } => "search",
            Self::Stats { .. } => "stats",
        }
    }
}
