use std::path::Path;

use acacore_core::event::{Event, MessageOptions};
use acacore_db::repositories::LogRepo;
use acacore_db::{FilesDb, OpenOptions};
use anyhow::Context;
use serde_json::json;
use tracing::Level;

pub const COMMAND: &str = "upgrade";

/// Upgrade the database at `db_path` and record the step in its log.
///
/// Returns whether anything changed.
pub async fn upgrade(db_path: &Path, root: &Path) -> anyhow::Result<bool> {
    if !db_path.is_file() {
        anyhow::bail!("Database {} does not exist", db_path.display());
    }
    let options = OpenOptions {
        check_initialisation: true,
        check_version: false,
        ..OpenOptions::default()
    };
    let db = FilesDb::open(db_path, options)
        .await
        .with_context(|| format!("Cannot open database {}", db_path.display()))?;

    let from = db.version().await?;
    if db.is_latest().await? {
        tracing::info!(version = %from, "Database is already at the latest version");
        db.close().await;
        return Ok(false);
    }

    db.upgrade(root).await?;
    let to = db.version().await?;

    let event = Event::from_command(COMMAND, "upgrade")
        .with_data(json!({ "from": from.to_string(), "to": to.to_string() }))
        .with_params(json!({ "db": db_path.display().to_string(), "root": root.display().to_string() }))?;
    event.log(Level::INFO, &MessageOptions::default());
    let mut conn = db.acquire().await?;
    LogRepo::insert(&mut conn, &event).await?;
    drop(conn);

    db.close().await;
    Ok(true)
}

pub async fn run(db_path: &Path, root: &Path) -> anyhow::Result<()> {
    upgrade(db_path, root).await.map(|_| ())
}
