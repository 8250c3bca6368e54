use std::io::Write;
use std::path::Path;

use acacore_core::files::OriginalFile;
use acacore_core::query::{tokenize, tokens_to_where};
use acacore_core::reference_files::ActionType;
use acacore_db::repositories::{FileRepo, Filter, Order, SqlParam};
use acacore_db::FilesDb;

use crate::program::open_existing;

/// Field matched by values without a preceding `@field`.
pub const DEFAULT_FIELD: &str = "relative_path";

/// Columns of the original files table a query may use.
pub const ALLOWED_FIELDS: &[&str] = &[
    "uuid",
    "checksum",
    "relative_path",
    "is_binary",
    "size",
    "puid",
    "signature",
    "warning",
    "action",
    "parent",
    "processed",
    "lock",
    "original_path",
];

/// Original files matching `query`, ordered by path.
pub async fn search(db: &FilesDb, query: &str, limit: i64) -> anyhow::Result<Vec<OriginalFile>> {
    let tokens = tokenize(query, DEFAULT_FIELD, ALLOWED_FIELDS)?;
    if tokens.is_empty() {
        anyhow::bail!("No values in query {query:?}");
    }

    let (clause, params) = tokens_to_where(&tokens);
    let filter = Filter::new()
        .where_(clause, params.into_iter().map(SqlParam::from).collect())
        .order_by("relative_path", Order::Asc)
        .limit(limit);

    let mut conn = db.acquire().await?;
    Ok(FileRepo::select::<OriginalFile>(&mut conn, &filter).await?)
}

pub async fn run(db_path: &Path, query: &str, limit: i64) -> anyhow::Result<()> {
    let db = open_existing(db_path, true).await?;
    let files = search(&db, query, limit).await?;
    db.close().await;

    let mut out = std::io::stdout().lock();
    for file in &files {
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            file.base.uuid,
            file.base.puid.as_deref().unwrap_or("-"),
            file.action.map_or("-", ActionType::as_str),
            file.base.relative_path.display()
        )?;
    }
    tracing::info!(results = files.len(), "Search finished");
    Ok(())
}
