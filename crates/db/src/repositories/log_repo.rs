//! Repository for the `log` table and the `log_paths` view.

use acacore_core::event::Event;
use acacore_core::files::FileType;
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::{Filter, Order};
use crate::error::DbError;
use crate::models::log::{format_time, EventPath, EventPathRow, EventRow};

/// Column list for `log` queries.
const LOG_COLUMNS: &str = "file_uuid, file_type, time, operation, data, reason";

/// Provides read/write operations for the event log.
pub struct LogRepo;

impl LogRepo {
    /// Append an event. Fails if only one of file uuid and file type is set.
    pub async fn insert(conn: &mut SqliteConnection, event: &Event) -> Result<(), DbError> {
        event.validate()?;
        let data = event.data.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(&format!("INSERT INTO log ({LOG_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?)"))
            .bind(event.file_uuid.map(|u| u.to_string()))
            .bind(event.file_type.map(FileType::as_str))
            .bind(format_time(&event.time))
            .bind(event.operation.clone())
            .bind(data)
            .bind(event.reason.clone())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn insert_many(conn: &mut SqliteConnection, events: &[Event]) -> Result<(), DbError> {
        for event in events {
            Self::insert(conn, event).await?;
        }
        Ok(())
    }

    pub async fn list(conn: &mut SqliteConnection, filter: &Filter) -> Result<Vec<Event>, DbError> {
        let query = format!("SELECT {LOG_COLUMNS} FROM log{}", filter.to_sql());
        let rows: Vec<EventRow> = filter.bind_as(sqlx::query_as(&query)).fetch_all(&mut *conn).await?;
        rows.into_iter().map(Event::try_from).collect()
    }

    /// All events of one file, oldest first.
    pub async fn for_file(
        conn: &mut SqliteConnection,
        file_uuid: Uuid,
        file_type: FileType,
    ) -> Result<Vec<Event>, DbError> {
        let filter = Filter::new()
            .where_(
                "file_uuid = ? and file_type = ?",
                vec![file_uuid.to_string().into(), file_type.as_str().into()],
            )
            .order_by("time", Order::Asc);
        Self::list(conn, &filter).await
    }

    /// Events joined with the relative path of the file they reference.
    pub async fn with_paths(conn: &mut SqliteConnection, filter: &Filter) -> Result<Vec<EventPath>, DbError> {
        let query = format!("SELECT file_relative_path, {LOG_COLUMNS} FROM log_paths{}", filter.to_sql());
        let rows: Vec<EventPathRow> = filter.bind_as(sqlx::query_as(&query)).fetch_all(&mut *conn).await?;
        rows.into_iter().map(EventPath::try_from).collect()
    }
}
