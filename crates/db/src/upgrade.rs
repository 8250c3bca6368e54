//! Database version checks and the upgrade chain.
//!
//! Each step moves the database from one layout version to the next and
//! stamps the new version into `metadata`. Databases between versions that
//! changed nothing are stamped with the library version directly.

use std::path::{Path, PathBuf};

use acacore_core::error::CoreError;
use acacore_core::utils::file_encoding;
use acacore_core::version::VERSION;
use semver::Version;
use sqlx::{Connection, SqliteConnection};

use crate::error::DbError;
use crate::schema;

/// Files whose encoding is detected per transaction during the 5.2.0 step.
const ENCODING_BATCH_SIZE: usize = 1000;

/// Parse a version string, accepting `major` and `major.minor` forms.
pub fn parse_version(text: &str) -> Result<Version, DbError> {
    let text = text.trim();
    if let Ok(version) = Version::parse(text) {
        return Ok(version);
    }

    let parts: Vec<&str> = text.split('.').collect();
    if parts.len() < 3 && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit())) {
        let mut padded = parts.join(".");
        for _ in parts.len()..3 {
            padded.push_str(".0");
        }
        return Version::parse(&padded).map_err(|_| DbError::InvalidVersion(text.to_string()));
    }

    Err(DbError::InvalidVersion(text.to_string()))
}

/// The library version as a [`Version`].
pub fn latest_version() -> Result<Version, DbError> {
    parse_version(VERSION)
}

/// The version stamped in the database, or `None` when it is missing or
/// unreadable.
pub async fn db_version(conn: &mut SqliteConnection) -> Option<Version> {
    let query = format!("SELECT value FROM {} WHERE key LIKE 'version'", schema::METADATA);
    let value: Option<Option<String>> = sqlx::query_scalar(&query).fetch_optional(&mut *conn).await.ok()?;
    let text: String = serde_json::from_str(&value.flatten()?).ok()?;
    parse_version(&text).ok()
}

async fn set_db_version(conn: &mut SqliteConnection, version: Version) -> Result<Version, DbError> {
    let query = format!("INSERT OR REPLACE INTO {} (key, value) VALUES (?, ?)", schema::METADATA);
    sqlx::query(&query)
        .bind("version")
        .bind(serde_json::to_string(&version.to_string())?)
        .execute(&mut *conn)
        .await?;
    Ok(version)
}

/// Whether the database is at the library version.
///
/// Fails when the version is missing or newer than the library, and, with
/// `raise_on_difference`, when it is older.
pub async fn is_latest(conn: &mut SqliteConnection, raise_on_difference: bool) -> Result<bool, DbError> {
    let current = db_version(conn).await.ok_or(DbError::MissingVersion)?;
    let latest = latest_version()?;

    if current > latest {
        return Err(DbError::NewerVersion { current, latest });
    }
    if current < latest && raise_on_difference {
        return Err(DbError::OutdatedVersion { current, latest });
    }

    Ok(current == latest)
}

/// Upgrade the database to the library version, then create any missing
/// tables, indices and views.
pub async fn upgrade(conn: &mut SqliteConnection, files_root: &Path) -> Result<(), DbError> {
    if is_latest(conn, false).await? {
        return Ok(());
    }

    let latest = latest_version()?;
    let mut current = db_version(conn).await.ok_or(DbError::MissingVersion)?;

    while current < latest {
        let next = upgrade_step(conn, &current, &latest, files_root).await?;
        tracing::info!(from = %current, to = %next, "Upgraded database");
        current = next;
    }

    schema::apply(conn).await
}

async fn upgrade_step(
    conn: &mut SqliteConnection,
    current: &Version,
    latest: &Version,
    files_root: &Path,
) -> Result<Version, DbError> {
    if *current < Version::new(4, 1, 0) {
        upgrade_4_to_4_1(conn).await
    } else if *current < Version::new(4, 1, 1) {
        upgrade_4_1_to_4_1_1(conn).await
    } else if *current < Version::new(5, 1, 0) {
        upgrade_5_to_5_1(conn).await
    } else if *current < Version::new(5, 2, 0) {
        upgrade_5_1_to_5_2(conn, files_root).await
    } else {
        set_db_version(conn, latest.clone()).await
    }
}

async fn execute_all(conn: &mut SqliteConnection, statements: &[&str]) -> Result<(), DbError> {
    let mut tx = conn.begin().await?;
    for statement in statements {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Rebuild `files_master` with `processed` as bit flags: 1 when an access
/// file exists, 2 when a statutory file exists.
async fn upgrade_4_to_4_1(conn: &mut SqliteConnection) -> Result<Version, DbError> {
    execute_all(
        conn,
        &[
            "create table files_master_tmp (
                uuid              text    not null,
                checksum          text    not null,
                relative_path     text    not null,
                is_binary         boolean not null,
                size              integer not null,
                puid              text,
                signature         text,
                warning           text,
                original_uuid     text,
                convert_access    text,
                convert_statutory text,
                processed         integer not null,
                primary key (relative_path)
            )",
            "insert or ignore into files_master_tmp select * from files_master",
            "update files_master_tmp set processed = 4 where processed != 0",
            "update files_master_tmp set processed = processed | 1
                where processed != 0 and uuid in (select original_uuid from files_access)",
            "update files_master_tmp set processed = processed | 2
                where processed != 0 and uuid in (select original_uuid from files_statutory)",
            "update files_master_tmp set processed = processed - 4 where processed != 0",
            "drop view if exists files_all",
            "drop view if exists log_paths",
            "drop table files_master",
            "alter table files_master_tmp rename to files_master",
        ],
    )
    .await?;

    sqlx::query("vacuum").execute(&mut *conn).await?;

    set_db_version(conn, Version::new(4, 1, 0)).await
}

async fn upgrade_4_1_to_4_1_1(conn: &mut SqliteConnection) -> Result<Version, DbError> {
    execute_all(
        conn,
        &[
            "drop table metadata",
            "create table metadata (key text not null, value text, primary key (key))",
        ],
    )
    .await?;
    set_db_version(conn, Version::new(4, 1, 1)).await
}

async fn upgrade_5_to_5_1(conn: &mut SqliteConnection) -> Result<Version, DbError> {
    execute_all(
        conn,
        &[
            "alter table files_statutory add column doc_collection integer",
            "alter table files_statutory add column doc_id integer",
        ],
    )
    .await?;
    set_db_version(conn, Version::new(5, 1, 0)).await
}

async fn table_columns(conn: &mut SqliteConnection, table: &str) -> Result<Vec<String>, DbError> {
    let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?)")
        .bind(table)
        .fetch_all(&mut *conn)
        .await?;
    Ok(columns.into_iter().map(|c| c.to_lowercase()).collect())
}

/// Detect encodings of a batch of `(uuid, relative_path)` rows. Files that no
/// longer exist are skipped.
fn detect_encodings(root: &Path, batch: Vec<(String, String)>) -> Result<Vec<(String, String)>, DbError> {
    let mut encodings = Vec::with_capacity(batch.len());

    for (uuid, relative_path) in batch {
        let path = root.join(&relative_path);
        match file_encoding(&path) {
            Ok(Some(encoding)) => encodings.push((uuid, serde_json::to_string(&encoding)?)),
            Ok(None) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "File not found, encoding not detected");
            }
            Err(e) => return Err(CoreError::from(e).into()),
        }
    }

    Ok(encodings)
}

/// Add the `encoding` column and fill it for every non-binary file.
async fn upgrade_5_1_to_5_2(conn: &mut SqliteConnection, files_root: &Path) -> Result<Version, DbError> {
    sqlx::query("drop view if exists files_all").execute(&mut *conn).await?;

    for table in schema::FILE_TABLES {
        if !table_columns(conn, table).await?.iter().any(|c| c == "encoding") {
            sqlx::query(&format!("alter table {table} add column encoding text"))
                .execute(&mut *conn)
                .await?;
        }
    }

    for table in schema::FILE_TABLES {
        let rows: Vec<(String, String)> =
            sqlx::query_as(&format!("select uuid, relative_path from {table} where is_binary is false"))
                .fetch_all(&mut *conn)
                .await?;

        for batch in rows.chunks(ENCODING_BATCH_SIZE) {
            let root: PathBuf = files_root.to_path_buf();
            let batch = batch.to_vec();
            let encodings = tokio::task::spawn_blocking(move || detect_encodings(&root, batch)).await??;

            let update = format!("update {table} set encoding = ? where uuid = ?");
            let mut tx = conn.begin().await?;
            for (uuid, encoding) in encodings {
                sqlx::query(&update).bind(encoding).bind(uuid).execute(&mut *tx).await?;
            }
            tx.commit().await?;
        }
    }

    set_db_version(conn, Version::new(5, 2, 0)).await
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn short_versions_are_padded() {
        assert_eq!(parse_version("4").unwrap(), Version::new(4, 0, 0));
        assert_eq!(parse_version("4.1").unwrap(), Version::new(4, 1, 0));
        assert_eq!(parse_version(" 5.2.1 ").unwrap(), Version::new(5, 2, 1));
        assert_matches!(parse_version("v5"), Err(DbError::InvalidVersion(_)));
        assert_matches!(parse_version("5..1"), Err(DbError::InvalidVersion(_)));
    }

    #[test]
    fn library_version_parses() {
        assert!(latest_version().is_ok());
    }

    #[test]
    fn missing_files_are_skipped_during_detection() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "plain text").unwrap();
        let batch = vec![
            ("1".to_string(), "a.txt".to_string()),
            ("2".to_string(), "missing.txt".to_string()),
        ];
        let encodings = detect_encodings(dir.path(), batch).unwrap();
        assert_eq!(encodings.len(), 1);
        assert_eq!(encodings[0].0, "1");
        assert!(encodings[0].1.contains("\"encoding\":\"ascii\""));
    }
}
