//! `acacore` -- identify archive files and manage their files database.
//!
//! # Environment variables
//!
//! | Variable                | Default       | Description                        |
//! |-------------------------|---------------|------------------------------------|
//! | `SIEGFRIED_BINARY`      | `sf`          | Siegfried binary                   |
//! | `SIEGFRIED_SIGNATURE`   | `default.sig` | Siegfried signature file           |
//! | `SIEGFRIED_HOME`        | --            | Siegfried home folder              |
//! | `ACACORE_REFERENCE_URL` | release URL   | Base URL of the reference files    |
//! | `ACACORE_LOG_DIR`       | --            | Folder for `acacore.log`           |
//! | `ACACORE_BATCH_SIZE`    | `100`         | Files per siegfried call           |
//! | `RUST_LOG`              | `acacore=info`| Log filter                         |

use acacore_cli::cli::Cli;
use acacore_cli::config::CliConfig;
use acacore_cli::{commands, logging};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = CliConfig::from_env().with_overrides(&cli.global);
    logging::init(config.log_dir.as_deref())?;

    let command = cli.command.name();
    if let Err(err) = commands::run(cli.command, &config).await {
        tracing::error!(command, "{err:#}");
        return Err(err);
    }
    Ok(())
}
