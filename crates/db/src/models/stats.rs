//! Rows of the counting views.

use serde::Serialize;
use sqlx::FromRow;

/// A row from `view_signatures_count`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct SignatureCount {
    pub puid: Option<String>,
    pub signature: Option<String>,
    pub count: i64,
}

/// A row from `view_actions_count`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct ActionCount {
    pub action: Option<String>,
    pub count: i64,
}

/// A row from `view_checksums_count`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct ChecksumCount {
    pub checksum: String,
    pub count: i64,
}
