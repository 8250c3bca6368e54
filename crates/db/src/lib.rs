//! SQLite files database.
//!
//! [`FilesDb`] owns the connection pool and the database-level operations
//! (initialisation, version checks, upgrades). Row access goes through the
//! repositories in [`repositories`], which take a `&mut SqliteConnection`
//! obtained from [`FilesDb::acquire`] or [`FilesDb::begin`].

pub mod error;
pub mod models;
pub mod repositories;
pub mod schema;
pub mod upgrade;

use std::path::{Path, PathBuf};
use std::time::Duration;

use semver::Version;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};

pub use error::DbError;
use models::metadata::Metadata;
use repositories::MetadataRepo;

pub type DbPool = SqlitePool;

/// Options for [`FilesDb::open`].
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// How long to wait for a locked database before failing.
    pub timeout: Duration,
    /// Open without write access. The file must exist.
    pub read_only: bool,
    /// Fail if the database has not been initialised.
    pub check_initialisation: bool,
    /// Fail if an initialised database is not at the library version.
    pub check_version: bool,
    pub max_connections: u32,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            read_only: false,
            check_initialisation: false,
            check_version: true,
            max_connections: 4,
        }
    }
}

/// Handle to a files database.
#[derive(Debug, Clone)]
pub struct FilesDb {
    pool: DbPool,
    path: PathBuf,
}

impl FilesDb {
    /// Open (and with write access, create) the database at `path`.
    pub async fn open(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self, DbError> {
        let path = path.as_ref().to_path_buf();
        let connect = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(!options.read_only)
            .read_only(options.read_only)
            .busy_timeout(options.timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.timeout)
            .connect_with(connect)
            .await?;

        let db = Self { pool, path };

        let initialised = db.is_initialised().await?;
        if options.check_initialisation && !initialised {
            return Err(DbError::NotInitialised);
        }
        if options.check_version && initialised {
            let mut conn = db.acquire().await?;
            upgrade::is_latest(&mut conn, true).await?;
        }

        tracing::debug!(path = %db.path.display(), read_only = options.read_only, "Opened files database");
        Ok(db)
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>, DbError> {
        Ok(self.pool.acquire().await?)
    }

    /// Start a transaction. Changes are discarded unless it is committed.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, DbError> {
        Ok(self.pool.begin().await?)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Create all tables, indices and views, and stamp the library version
    /// if no metadata exists yet.
    pub async fn init(&self) -> Result<(), DbError> {
        let mut conn = self.acquire().await?;
        schema::apply(&mut conn).await?;
        if MetadataRepo::get::<Metadata>(&mut conn).await?.is_none() {
            MetadataRepo::set(&mut conn, &Metadata::default()).await?;
        }
        Ok(())
    }

    /// Whether the metadata table exists and holds a version.
    pub async fn is_initialised(&self) -> Result<bool, DbError> {
        if !self.tables().await?.iter().any(|t| t == schema::METADATA) {
            return Ok(false);
        }
        let mut conn = self.acquire().await?;
        let version = MetadataRepo::get_key::<Metadata>(&mut conn, "version").await?;
        Ok(version.is_some_and(|v| !v.is_null()))
    }

    pub async fn version(&self) -> Result<Version, DbError> {
        if !self.is_initialised().await? {
            return Err(DbError::NotInitialised);
        }
        let mut conn = self.acquire().await?;
        upgrade::db_version(&mut conn).await.ok_or(DbError::MissingVersion)
    }

    pub async fn is_latest(&self) -> Result<bool, DbError> {
        let mut conn = self.acquire().await?;
        upgrade::is_latest(&mut conn, false).await
    }

    async fn schema_names(&self, kind: &str) -> Result<Vec<String>, DbError> {
        Ok(
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = ? ORDER BY name")
                .bind(kind)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn tables(&self) -> Result<Vec<String>, DbError> {
        self.schema_names("table").await
    }

    pub async fn views(&self) -> Result<Vec<String>, DbError> {
        self.schema_names("view").await
    }

    /// Upgrade to the library version. `files_root` is the directory the
    /// relative paths of the files tables start from.
    pub async fn upgrade(&self, files_root: &Path) -> Result<(), DbError> {
        if !self.is_initialised().await? {
            return Err(DbError::NotInitialised);
        }
        let mut conn = self.acquire().await?;
        upgrade::upgrade(&mut conn, files_root).await
    }
}
