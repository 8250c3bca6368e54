//! Event log rows.

use std::path::PathBuf;

use acacore_core::event::Event;
use acacore_core::files::FileType;
use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::DbError;

/// Timestamp layout of the `time` column.
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// A row from the `log` table.
#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub file_uuid: Option<String>,
    pub file_type: Option<String>,
    pub time: String,
    pub operation: String,
    pub data: Option<String>,
    pub reason: Option<String>,
}

/// A row from the `log_paths` view: an event with the path of its file.
#[derive(Debug, Clone, FromRow)]
pub struct EventPathRow {
    pub file_relative_path: Option<String>,
    #[sqlx(flatten)]
    pub event: EventRow,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventPath {
    pub file_relative_path: Option<PathBuf>,
    #[serde(flatten)]
    pub event: Event,
}

pub(crate) fn format_time(time: &NaiveDateTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

pub(crate) fn parse_time(value: &str) -> Result<NaiveDateTime, DbError> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|e| DbError::decode("time", e))
}

impl TryFrom<EventRow> for Event {
    type Error = DbError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let file_uuid = row
            .file_uuid
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|e| DbError::decode("file_uuid", e))?;
        let file_type = row
            .file_type
            .as_deref()
            .map(str::parse::<FileType>)
            .transpose()
            .map_err(|e| DbError::decode("file_type", e))?;
        let data = row.data.as_deref().map(serde_json::from_str).transpose()?;

        Ok(Event {
            file_uuid,
            file_type,
            time: parse_time(&row.time)?,
            operation: row.operation,
            data,
            reason: row.reason,
        })
    }
}

impl TryFrom<EventPathRow> for EventPath {
    type Error = DbError;

    fn try_from(row: EventPathRow) -> Result<Self, Self::Error> {
        Ok(EventPath {
            file_relative_path: row.file_relative_path.map(PathBuf::from),
            event: row.event.try_into()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Timelike};

    use super::*;

    #[test]
    fn time_round_trips_through_column_format() {
        let time = NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_micro_opt(13, 4, 5, 120)
            .unwrap();
        let text = format_time(&time);
        assert_eq!(text, "2024-05-17T13:04:05.000120");
        assert_eq!(parse_time(&text).unwrap(), time);
        assert_eq!(parse_time("2024-05-17 13:04:05").unwrap(), time.with_nanosecond(0).unwrap());
    }

    #[test]
    fn row_with_bad_file_type_fails() {
        let row = EventRow {
            file_uuid: Some(Uuid::nil().to_string()),
            file_type: Some("unknown".into()),
            time: "2024-05-17T13:04:05".into(),
            operation: "a:b".into(),
            data: None,
            reason: None,
        };
        assert!(Event::try_from(row).is_err());
    }
}
