//! Start and end bookkeeping shared by the commands that change a database.

use std::path::Path;

use acacore_core::event::{Event, MessageOptions};
use acacore_db::repositories::LogRepo;
use acacore_db::{DbError, FilesDb, OpenOptions};
use anyhow::Context;
use serde_json::Value;
use tracing::Level;

/// A running command. Created by [`Program::start`] and closed with
/// [`Program::end`].
#[derive(Debug)]
pub struct Program {
    command: &'static str,
    dry_run: bool,
}

impl Program {
    /// Log the `start` event with the library version and `params`.
    ///
    /// In dry-run mode the event is only logged, not stored.
    pub async fn start(db: &FilesDb, command: &'static str, params: Value, dry_run: bool) -> anyhow::Result<Self> {
        let event = Event::from_command(command, "start").with_params(params)?;
        event.log(Level::INFO, &MessageOptions::default());

        if !dry_run {
            let mut conn = db.acquire().await?;
            LogRepo::insert(&mut conn, &event).await?;
        }

        Ok(Self { command, dry_run })
    }

    pub fn command(&self) -> &'static str {
        self.command
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Log the `end` event, carrying the error of a failed run, and hand the
    /// result back.
    pub async fn end<T>(self, db: &FilesDb, result: anyhow::Result<T>) -> anyhow::Result<T> {
        let mut event = Event::from_command(self.command, "end");
        let level = match &result {
            Ok(_) => Level::INFO,
            Err(err) => {
                event = event.with_data(err.to_string()).with_reason(format!("{err:#}"));
                Level::ERROR
            }
        };
        event.log(level, &MessageOptions::default());

        if !self.dry_run {
            let mut conn = db.acquire().await?;
            LogRepo::insert(&mut conn, &event).await?;
        }

        result
    }
}

/// Open an existing, initialised database at the current version.
pub async fn open_existing(path: &Path, read_only: bool) -> anyhow::Result<FilesDb> {
    if !path.is_file() {
        anyhow::bail!("Database {} does not exist", path.display());
    }
    let options = OpenOptions {
        read_only,
        check_initialisation: true,
        ..OpenOptions::default()
    };
    FilesDb::open(path, options).await.map_err(|err| version_hint(path, err))
}

/// Open a database, creating it if needed, and add any missing tables,
/// indices and views. An existing database must be at the current version.
pub async fn open_or_init(path: &Path) -> anyhow::Result<FilesDb> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("Cannot create {}", parent.display()))?;
    }
    let db = FilesDb::open(path, OpenOptions::default())
        .await
        .map_err(|err| version_hint(path, err))?;
    db.init().await?;
    Ok(db)
}

fn version_hint(path: &Path, err: DbError) -> anyhow::Error {
    match err {
        DbError::OutdatedVersion { .. } => anyhow::Error::new(err).context(format!(
            "Database {} must be upgraded with `acacore upgrade`",
            path.display()
        )),
        err => anyhow::Error::new(err).context(format!("Cannot open database {}", path.display())),
    }
}
