//! Read-only access to the counting and warning views.

use acacore_core::files::OriginalFile;
use sqlx::SqliteConnection;

use super::file_repo::decode_row;
use super::Filter;
use crate::error::DbError;
use crate::models::stats::{ActionCount, ChecksumCount, SignatureCount};
use crate::schema;

pub struct StatsRepo;

impl StatsRepo {
    /// PUID and signature pairs by number of original files, most common first.
    pub async fn signatures_count(conn: &mut SqliteConnection) -> Result<Vec<SignatureCount>, DbError> {
        let query = format!("SELECT puid, signature, count FROM {}", schema::VIEW_SIGNATURES_COUNT);
        Ok(sqlx::query_as(&query).fetch_all(&mut *conn).await?)
    }

    pub async fn actions_count(conn: &mut SqliteConnection) -> Result<Vec<ActionCount>, DbError> {
        let query = format!("SELECT action, count FROM {}", schema::VIEW_ACTIONS_COUNT);
        Ok(sqlx::query_as(&query).fetch_all(&mut *conn).await?)
    }

    /// Checksums shared by at least `min_count` original files.
    pub async fn checksums_count(
        conn: &mut SqliteConnection,
        min_count: i64,
    ) -> Result<Vec<ChecksumCount>, DbError> {
        let query = format!(
            "SELECT checksum, count FROM {} WHERE count >= ?",
            schema::VIEW_CHECKSUMS_COUNT
        );
        Ok(sqlx::query_as(&query).bind(min_count).fetch_all(&mut *conn).await?)
    }

    /// Non-empty original files without a PUID or with identification warnings.
    pub async fn identification_warnings(
        conn: &mut SqliteConnection,
        filter: &Filter,
    ) -> Result<Vec<OriginalFile>, DbError> {
        let query = format!("SELECT * FROM {}{}", schema::VIEW_IDENTIFICATION_WARNINGS, filter.to_sql());
        let rows = filter.bind(sqlx::query(&query)).fetch_all(&mut *conn).await?;
        rows.iter().map(decode_row::<OriginalFile>).collect()
    }

}
