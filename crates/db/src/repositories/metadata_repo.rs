//! Repository for key/value tables such as `metadata`.
//!
//! A model is stored one row per field, with JSON-encoded values. Keys that
//! the model does not declare are rejected.

use serde_json::{Map, Value};
use sqlx::SqliteConnection;

use crate::error::DbError;
use crate::models::metadata::{KeyValueRow, KeysModel};
use crate::schema;

pub struct MetadataRepo;

fn check_keys<M: KeysModel>(keys: &[&str]) -> Result<(), DbError> {
    let unknown: Vec<String> = keys
        .iter()
        .filter(|k| !M::FIELDS.contains(*k))
        .map(|k| k.to_string())
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(DbError::UnknownKeys(unknown))
    }
}

impl MetadataRepo {
    async fn rows(conn: &mut SqliteConnection) -> Result<Vec<KeyValueRow>, DbError> {
        let query = format!("SELECT key, value FROM {}", schema::METADATA);
        Ok(sqlx::query_as(&query).fetch_all(&mut *conn).await?)
    }

    /// The stored model, or `None` when the table is empty.
    pub async fn get<M: KeysModel>(conn: &mut SqliteConnection) -> Result<Option<M>, DbError> {
        let rows = Self::rows(conn).await?;
        if rows.is_empty() {
            return Ok(None);
        }

        let mut object = Map::new();
        for row in rows {
            let value = match row.value.as_deref() {
                Some(text) => serde_json::from_str(text)?,
                None => Value::Null,
            };
            object.insert(row.key, value);
        }
        Ok(Some(serde_json::from_value(Value::Object(object))?))
    }

    /// The value of a single field, or `None` when unset.
    pub async fn get_key<M: KeysModel>(conn: &mut SqliteConnection, key: &str) -> Result<Option<Value>, DbError> {
        check_keys::<M>(&[key])?;

        let query = format!("SELECT value FROM {} WHERE key = ?", schema::METADATA);
        let value: Option<Option<String>> = sqlx::query_scalar(&query).bind(key).fetch_optional(&mut *conn).await?;
        match value.flatten() {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    /// Store every field of `model`, replacing existing values.
    pub async fn set<M: KeysModel>(conn: &mut SqliteConnection, model: &M) -> Result<(), DbError> {
        let Value::Object(fields) = serde_json::to_value(model)? else {
            return Err(DbError::decode("value", "key/value models must serialize to an object"));
        };
        for (key, value) in fields {
            Self::write(conn, &key, &value).await?;
        }
        Ok(())
    }

    /// Replace the given fields, returning how many were written.
    pub async fn update<M: KeysModel>(conn: &mut SqliteConnection, fields: &[(&str, Value)]) -> Result<u64, DbError> {
        let keys: Vec<&str> = fields.iter().map(|(k, _)| *k).collect();
        check_keys::<M>(&keys)?;

        let mut written = 0;
        for (key, value) in fields {
            written += Self::write(conn, key, value).await?;
        }
        Ok(written)
    }

    async fn write(conn: &mut SqliteConnection, key: &str, value: &Value) -> Result<u64, DbError> {
        let query = format!("INSERT OR REPLACE INTO {} (key, value) VALUES (?, ?)", schema::METADATA);
        let result = sqlx::query(&query)
            .bind(key.to_string())
            .bind(serde_json::to_string(value)?)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }
}
