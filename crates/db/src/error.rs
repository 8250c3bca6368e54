use acacore_core::error::CoreError;
use semver::Version;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Database is not initialised")]
    NotInitialised,

    #[error("Database does not contain version information")]
    MissingVersion,

    #[error("Database version is greater than latest version: {current} > {latest}")]
    NewerVersion { current: Version, latest: Version },

    #[error("Database version is lower than latest version: {current} < {latest}")]
    OutdatedVersion { current: Version, latest: Version },

    #[error("Invalid version {0:?}")]
    InvalidVersion(String),

    #[error("{0} without where clause")]
    MissingWhere(&'static str),

    #[error("Unknown metadata keys: {}", .0.join(", "))]
    UnknownKeys(Vec<String>),

    #[error("Cannot decode column {column}: {reason}")]
    Decode { column: &'static str, reason: String },

    #[error("Invalid JSON value: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl DbError {
    pub(crate) fn decode(column: &'static str, reason: impl ToString) -> Self {
        DbError::Decode {
            column,
            reason: reason.to_string(),
        }
    }
}
