use std::path::Path;

use serde_json::json;

use crate::program::{open_or_init, Program};

pub const COMMAND: &str = "init";

/// Create the database, or add missing tables and views to an initialised one.
pub async fn run(db_path: &Path) -> anyhow::Result<()> {
    let db = open_or_init(db_path).await?;
    let params = json!({ "db": db_path.display().to_string() });
    let program = Program::start(&db, COMMAND, params, false).await?;
    let result = db.tables().await.map_err(anyhow::Error::from);
    let tables = program.end(&db, result).await?;
    tracing::info!(path = %db_path.display(), tables = tables.len(), "Database ready");
    db.close().await;
    Ok(())
}
