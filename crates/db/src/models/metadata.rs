//! Database metadata, stored one field per row in the `metadata` table.

use acacore_core::version::VERSION;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A model stored as key/value rows, one row per field.
pub trait KeysModel: Serialize + DeserializeOwned {
    /// The keys the model accepts.
    const FIELDS: &'static [&'static str];
}

/// A row of a key/value table. Values are JSON encoded.
#[derive(Debug, Clone, FromRow)]
pub struct KeyValueRow {
    pub key: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Version of the library that last wrote the database layout.
    pub version: String,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            version: VERSION.to_string(),
        }
    }
}

impl KeysModel for Metadata {
    const FIELDS: &'static [&'static str] = &["version"];
}
