use std::path::Path;

use acacore_db::models::stats::{ActionCount, ChecksumCount, SignatureCount};
use acacore_db::repositories::StatsRepo;
use acacore_db::FilesDb;
use serde::Serialize;

use crate::program::open_existing;

/// Counts over the original files.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub signatures: Vec<SignatureCount>,
    pub actions: Vec<ActionCount>,
    /// Checksums shared by several files.
    pub duplicates: Vec<ChecksumCount>,
}

pub async fn stats(db: &FilesDb, min_duplicates: i64) -> anyhow::Result<Stats> {
    let mut conn = db.acquire().await?;
    Ok(Stats {
        signatures: StatsRepo::signatures_count(&mut conn).await?,
        actions: StatsRepo::actions_count(&mut conn).await?,
        duplicates: StatsRepo::checksums_count(&mut conn, min_duplicates).await?,
    })
}

pub async fn run(db_path: &Path, min_duplicates: i64) -> anyhow::Result<()> {
    let db = open_existing(db_path, true).await?;
    let stats = stats(&db, min_duplicates).await?;
    db.close().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
