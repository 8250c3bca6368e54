//! Repository for the four `files_*` tables.

use std::path::{Path, PathBuf};

use acacore_core::files::{ArchiveFile, BaseFile, ConvertedFile, MasterFile, OriginalFile, StatutoryFile};
use acacore_core::reference_files::ActionType;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{Filter, OnExists, SqlParam, SqliteQuery};
use crate::error::DbError;
use crate::schema;

/// Columns shared by every files table, in bind order.
const BASE_COLUMNS: &[&str] = &[
    "uuid",
    "checksum",
    "encoding",
    "relative_path",
    "is_binary",
    "size",
    "puid",
    "signature",
    "warning",
];

/// A file model stored in one of the files tables.
pub trait FileRecord: ArchiveFile + Sized + Send + Sync + Unpin {
    const TABLE: &'static str;
    /// Columns after [`BASE_COLUMNS`], in bind order.
    const EXTRA_COLUMNS: &'static [&'static str];

    fn bind_extra<'q>(&self, query: SqliteQuery<'q>) -> Result<SqliteQuery<'q>, DbError>;

    fn decode(base: BaseFile, row: &SqliteRow) -> Result<Self, DbError>;
}

// ---------------------------------------------------------------------------
// Column conversions
// ---------------------------------------------------------------------------

pub(crate) fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn to_json<T: Serialize>(value: Option<&T>) -> Result<Option<String>, DbError> {
    Ok(value.map(serde_json::to_string).transpose()?)
}

fn json_column<T: DeserializeOwned>(row: &SqliteRow, column: &'static str) -> Result<Option<T>, DbError> {
    let text: Option<String> = row.try_get(column)?;
    text.as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| DbError::decode(column, e))
}

fn uuid_column(row: &SqliteRow, column: &'static str) -> Result<Option<Uuid>, DbError> {
    let text: Option<String> = row.try_get(column)?;
    text.as_deref()
        .map(Uuid::parse_str)
        .transpose()
        .map_err(|e| DbError::decode(column, e))
}

fn u32_column(row: &SqliteRow, column: &'static str) -> Result<Option<u32>, DbError> {
    let value: Option<i64> = row.try_get(column)?;
    value
        .map(u32::try_from)
        .transpose()
        .map_err(|e| DbError::decode(column, e))
}

fn bind_base<'q>(file: &BaseFile, query: SqliteQuery<'q>) -> Result<SqliteQuery<'q>, DbError> {
    let size = i64::try_from(file.size).map_err(|e| DbError::decode("size", e))?;
    Ok(query
        .bind(file.uuid.to_string())
        .bind(file.checksum.clone())
        .bind(to_json(file.encoding.as_ref())?)
        .bind(path_text(&file.relative_path))
        .bind(file.is_binary)
        .bind(size)
        .bind(file.puid.clone())
        .bind(file.signature.clone())
        .bind(to_json(file.warning.as_ref())?))
}

fn decode_base(row: &SqliteRow) -> Result<BaseFile, DbError> {
    let uuid = uuid_column(row, "uuid")?.ok_or_else(|| DbError::decode("uuid", "null"))?;
    let relative_path: String = row.try_get("relative_path")?;
    let size: i64 = row.try_get("size")?;

    Ok(BaseFile {
        uuid,
        checksum: row.try_get("checksum")?,
        encoding: json_column(row, "encoding")?,
        relative_path: PathBuf::from(relative_path),
        is_binary: row.try_get("is_binary")?,
        size: u64::try_from(size).map_err(|e| DbError::decode("size", e))?,
        puid: row.try_get("puid")?,
        signature: row.try_get("signature")?,
        warning: json_column(row, "warning")?,
        root: None,
    })
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

impl FileRecord for OriginalFile {
    const TABLE: &'static str = schema::FILES_ORIGINAL;
    const EXTRA_COLUMNS: &'static [&'static str] =
        &["action", "action_data", "parent", "processed", "lock", "original_path"];

    fn bind_extra<'q>(&self, query: SqliteQuery<'q>) -> Result<SqliteQuery<'q>, DbError> {
        Ok(query
            .bind(self.action.map(ActionType::as_str))
            .bind(serde_json::to_string(&self.action_data)?)
            .bind(self.parent.map(|u| u.to_string()))
            .bind(self.processed)
            .bind(self.lock)
            .bind(path_text(&self.original_path)))
    }

    fn decode(base: BaseFile, row: &SqliteRow) -> Result<Self, DbError> {
        let action = row
            .try_get::<Option<String>, _>("action")?
            .map(|a| ActionType::parse(&a).ok_or_else(|| DbError::decode("action", format!("unknown action {a:?}"))))
            .transpose()?;
        let original_path: String = row.try_get("original_path")?;

        Ok(OriginalFile {
            base,
            action,
            action_data: json_column(row, "action_data")?.unwrap_or_default(),
            parent: uuid_column(row, "parent")?,
            processed: row.try_get("processed")?,
            lock: row.try_get("lock")?,
            original_path: PathBuf::from(original_path),
        })
    }
}

impl FileRecord for MasterFile {
    const TABLE: &'static str = schema::FILES_MASTER;
    const EXTRA_COLUMNS: &'static [&'static str] = &["original_uuid", "convert_access", "convert_statutory", "processed"];

    fn bind_extra<'q>(&self, query: SqliteQuery<'q>) -> Result<SqliteQuery<'q>, DbError> {
        Ok(query
            .bind(self.original_uuid.map(|u| u.to_string()))
            .bind(to_json(self.convert_access.as_ref())?)
            .bind(to_json(self.convert_statutory.as_ref())?)
            .bind(i64::from(self.processed)))
    }

    fn decode(base: BaseFile, row: &SqliteRow) -> Result<Self, DbError> {
        let processed: i64 = row.try_get("processed")?;
        let processed = u8::try_from(processed).map_err(|e| DbError::decode("processed", e))?;

        let mut file = MasterFile::new(base, uuid_column(row, "original_uuid")?, processed)?;
        file.convert_access = json_column(row, "convert_access")?;
        file.convert_statutory = json_column(row, "convert_statutory")?;
        Ok(file)
    }
}

impl FileRecord for ConvertedFile {
    const TABLE: &'static str = schema::FILES_ACCESS;
    const EXTRA_COLUMNS: &'static [&'static str] = &["original_uuid"];

    fn bind_extra<'q>(&self, query: SqliteQuery<'q>) -> Result<SqliteQuery<'q>, DbError> {
        Ok(query.bind(self.original_uuid.map(|u| u.to_string())))
    }

    fn decode(base: BaseFile, row: &SqliteRow) -> Result<Self, DbError> {
        Ok(ConvertedFile {
            base,
            original_uuid: uuid_column(row, "original_uuid")?,
        })
    }
}

impl FileRecord for StatutoryFile {
    const TABLE: &'static str = schema::FILES_STATUTORY;
    const EXTRA_COLUMNS: &'static [&'static str] = &["original_uuid", "doc_collection", "doc_id"];

    fn bind_extra<'q>(&self, query: SqliteQuery<'q>) -> Result<SqliteQuery<'q>, DbError> {
        Ok(query
            .bind(self.original_uuid.map(|u| u.to_string()))
            .bind(self.doc_collection.map(i64::from))
            .bind(self.doc_id.map(i64::from)))
    }

    fn decode(base: BaseFile, row: &SqliteRow) -> Result<Self, DbError> {
        Ok(StatutoryFile::new(
            base,
            uuid_column(row, "original_uuid")?,
            u32_column(row, "doc_collection")?,
            u32_column(row, "doc_id")?,
        )?)
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

fn columns<T: FileRecord>() -> Vec<&'static str> {
    BASE_COLUMNS.iter().chain(T::EXTRA_COLUMNS).copied().collect()
}

pub(crate) fn decode_row<T: FileRecord>(row: &SqliteRow) -> Result<T, DbError> {
    T::decode(decode_base(row)?, row)
}

fn bind_record<'q, T: FileRecord>(file: &T, query: SqliteQuery<'q>) -> Result<SqliteQuery<'q>, DbError> {
    file.bind_extra(bind_base(file.base(), query)?)
}

/// Provides read/write operations for the files tables.
pub struct FileRepo;

impl FileRepo {
    /// Find a file by its relative path, the primary key.
    pub async fn find_by_path<T: FileRecord>(
        conn: &mut SqliteConnection,
        relative_path: &Path,
    ) -> Result<Option<T>, DbError> {
        let filter = Filter::new().where_("relative_path = ?", vec![path_text(relative_path).into()]).limit(1);
        Ok(Self::select(conn, &filter).await?.into_iter().next())
    }

    pub async fn find_by_uuid<T: FileRecord>(conn: &mut SqliteConnection, uuid: Uuid) -> Result<Option<T>, DbError> {
        let filter = Filter::new().where_("uuid = ?", vec![uuid.to_string().into()]).limit(1);
        Ok(Self::select(conn, &filter).await?.into_iter().next())
    }

    pub async fn select<T: FileRecord>(conn: &mut SqliteConnection, filter: &Filter) -> Result<Vec<T>, DbError> {
        let query = format!("SELECT {} FROM {}{}", columns::<T>().join(", "), T::TABLE, filter.to_sql());
        let rows = filter.bind(sqlx::query(&query)).fetch_all(&mut *conn).await?;
        rows.iter().map(decode_row::<T>).collect()
    }

    pub async fn count<T: FileRecord>(conn: &mut SqliteConnection, filter: &Filter) -> Result<i64, DbError> {
        let query = format!("SELECT COUNT(*) FROM {}{}", T::TABLE, filter.where_sql());
        let row = filter.bind(sqlx::query(&query)).fetch_one(&mut *conn).await?;
        Ok(row.try_get(0)?)
    }

    /// Insert rows, returning how many were written.
    pub async fn insert<T: FileRecord>(
        conn: &mut SqliteConnection,
        rows: &[T],
        on_exists: OnExists,
    ) -> Result<u64, DbError> {
        let columns = columns::<T>();
        let query = format!(
            "{} INTO {} ({}) VALUES ({})",
            on_exists.insert_sql(),
            T::TABLE,
            columns.join(", "),
            vec!["?"; columns.len()].join(", ")
        );

        let mut written = 0;
        for row in rows {
            let result = bind_record(row, sqlx::query(&query))?.execute(&mut *conn).await?;
            written += result.rows_affected();
        }
        Ok(written)
    }

    /// Insert rows, replacing any with the same relative path.
    pub async fn upsert<T: FileRecord>(conn: &mut SqliteConnection, rows: &[T]) -> Result<u64, DbError> {
        Self::insert(conn, rows, OnExists::Replace).await
    }

    /// Update the row with the same relative path.
    pub async fn update<T: FileRecord>(conn: &mut SqliteConnection, row: &T) -> Result<u64, DbError> {
        let params = vec![path_text(&row.base().relative_path).into()];
        Self::update_where(conn, row, "relative_path = ?", params).await
    }

    /// Overwrite every row matching `where_clause` with `row`.
    pub async fn update_where<T: FileRecord>(
        conn: &mut SqliteConnection,
        row: &T,
        where_clause: &str,
        params: Vec<SqlParam>,
    ) -> Result<u64, DbError> {
        let filter = Filter::new().where_(where_clause, params);
        let where_sql = filter.where_sql();
        if where_sql.is_empty() {
            return Err(DbError::MissingWhere("Update"));
        }

        let set: Vec<String> = columns::<T>().iter().map(|c| format!("{c} = ?")).collect();
        let query = format!("UPDATE {} SET {}{}", T::TABLE, set.join(", "), where_sql);
        let result = filter
            .bind(bind_record(row, sqlx::query(&query))?)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete the row with the same relative path.
    pub async fn delete<T: FileRecord>(conn: &mut SqliteConnection, row: &T) -> Result<u64, DbError> {
        let params = vec![path_text(&row.base().relative_path).into()];
        Self::delete_where::<T>(conn, "relative_path = ?", params).await
    }

    pub async fn delete_where<T: FileRecord>(
        conn: &mut SqliteConnection,
        where_clause: &str,
        params: Vec<SqlParam>,
    ) -> Result<u64, DbError> {
        let filter = Filter::new().where_(where_clause, params);
        let where_sql = filter.where_sql();
        if where_sql.is_empty() {
            return Err(DbError::MissingWhere("Delete"));
        }

        let query = format!("DELETE FROM {}{}", T::TABLE, where_sql);
        let result = filter.bind(sqlx::query(&query)).execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }

    /// Relative paths of every file in the table, sorted.
    pub async fn relative_paths<T: FileRecord>(conn: &mut SqliteConnection) -> Result<Vec<PathBuf>, DbError> {
        let query = format!("SELECT relative_path FROM {} ORDER BY relative_path", T::TABLE);
        let paths: Vec<String> = sqlx::query_scalar(&query).fetch_all(&mut *conn).await?;
        Ok(paths.into_iter().map(PathBuf::from).collect())
    }
}
