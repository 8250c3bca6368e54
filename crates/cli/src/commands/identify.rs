//! Identify the files of an archive folder and register them as original files.
//!
//! Files are sent to siegfried in batches. Each batch is read from disk on a
//! blocking thread, matched against the custom signatures and the actions
//! reference file, and saved in one transaction that covers the whole run.
//! A dry run rolls the transaction back.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use acacore_core::error::CoreError;
use acacore_core::event::{Event, MessageOptions};
use acacore_core::files::{ArchiveFile, IdentifyContext, OriginalFile};
use acacore_core::reference_files::{ActionType, Actions, CustomSignatures};
use acacore_core::siegfried::{Siegfried, SiegfriedFile};
use acacore_core::utils::{find_files, EncodingMode};
use acacore_db::repositories::{FileRepo, LogRepo, OnExists};
use acacore_db::FilesDb;
use anyhow::Context;
use serde::Serialize;
use serde_json::json;
use sqlx::SqliteConnection;
use tracing::Level;

use crate::config::CliConfig;
use crate::program::{open_or_init, Program};

pub const COMMAND: &str = "identify";

/// What happened to each file of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub locked: usize,
}

/// How a freshly read file relates to the stored one.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    New(OriginalFile),
    Updated(OriginalFile),
    Unchanged,
    Locked,
}

/// Reference data shared by all batches of a run.
#[derive(Debug, Clone)]
pub struct References {
    pub actions: Arc<Actions>,
    pub custom_signatures: Arc<CustomSignatures>,
}

impl References {
    pub async fn fetch(config: &CliConfig) -> anyhow::Result<Self> {
        let client = config.reference_files();
        let actions = client.get_actions(true).await?;
        let signatures = client.get_custom_signatures(true).await?;
        let custom_signatures = CustomSignatures::new(signatures.as_ref().clone())?;
        tracing::info!(
            actions = actions.len(),
            custom_signatures = custom_signatures.len(),
            "Loaded reference files"
        );
        Ok(Self {
            actions,
            custom_signatures: Arc::new(custom_signatures),
        })
    }
}

pub async fn run(root: &Path, db_path: &Path, dry_run: bool, config: &CliConfig) -> anyhow::Result<()> {
    let root = root
        .canonicalize()
        .with_context(|| format!("Cannot read folder {}", root.display()))?;
    let db = open_or_init(db_path).await?;

    let params = json!({
        "root": root.display().to_string(),
        "db": db_path.display().to_string(),
        "dry_run": dry_run,
    });
    let program = Program::start(&db, COMMAND, params, dry_run).await?;
    let result = identify(&db, &root, config, dry_run).await;
    let summary = program.end(&db, result).await?;

    tracing::info!(
        new = summary.new,
        updated = summary.updated,
        unchanged = summary.unchanged,
        locked = summary.locked,
        dry_run,
        "Identification finished"
    );
    db.close().await;
    Ok(())
}

async fn identify(db: &FilesDb, root: &Path, config: &CliConfig, dry_run: bool) -> anyhow::Result<Summary> {
    let references = References::fetch(config).await?;
    let siegfried = config.siegfried();
    let paths = find_files(root, &database_files(db.path())?)?;
    tracing::info!(files = paths.len(), batch_size = config.batch_size, "Identifying files");

    let mut tx = db.begin().await?;
    let mut summary = Summary::default();

    for batch in paths.chunks(config.batch_size) {
        let files = identify_batch(&siegfried, root, batch, &references).await?;
        save_batch(&mut tx, files, &mut summary).await?;
    }

    if dry_run {
        tx.rollback().await?;
    } else {
        tx.commit().await?;
    }

    Ok(summary)
}

/// The database file and its journals, which live inside the archive folder
/// in the usual layout and must not be identified.
fn database_files(db_path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let db_path = db_path.canonicalize()?;
    let mut files = vec![db_path.clone()];
    for suffix in ["-journal", "-wal", "-shm"] {
        let mut name = OsString::from(db_path.as_os_str());
        name.push(suffix);
        files.push(PathBuf::from(name));
    }
    Ok(files)
}

/// Run siegfried on a batch and build the original files from its results.
pub async fn identify_batch(
    siegfried: &Siegfried,
    root: &Path,
    batch: &[PathBuf],
    references: &References,
) -> anyhow::Result<Vec<OriginalFile>> {
    let results = siegfried.identify_many(batch).await?;
    Ok(read_files(root, results, references).await?)
}

/// Read and identify files on a blocking thread.
pub async fn read_files(
    root: &Path,
    results: Vec<(PathBuf, SiegfriedFile)>,
    references: &References,
) -> Result<Vec<OriginalFile>, CoreError> {
    let root = root.to_path_buf();
    let actions = Arc::clone(&references.actions);
    let signatures = Arc::clone(&references.custom_signatures);

    tokio::task::spawn_blocking(move || {
        results
            .iter()
            .map(|(path, sf)| {
                let ctx = IdentifyContext::new(Some(sf), Some(signatures.as_ref()), Some(actions.as_ref()));
                OriginalFile::from_file(path, &root, ctx, None, None, &EncodingMode::Auto)
            })
            .collect::<Result<Vec<_>, CoreError>>()
    })
    .await
    .map_err(|e| CoreError::Identification(format!("identification task failed: {e}")))?
}

/// Compare a freshly identified file with the stored one.
///
/// Locked files are never touched. An existing file keeps its uuid, parent,
/// original path and processed flag; it is only saved again when its
/// content or identification changed.
pub fn compare(mut file: OriginalFile, existing: Option<OriginalFile>) -> Outcome {
    let Some(existing) = existing else {
        return Outcome::New(file);
    };
    if existing.lock {
        return Outcome::Locked;
    }

    file.base.uuid = existing.base.uuid;
    file.parent = existing.parent;
    file.original_path = existing.original_path.clone();
    file.processed = existing.processed && file.base.checksum == existing.base.checksum;

    let (new, old) = (&file.base, &existing.base);
    let unchanged = new.checksum == old.checksum
        && new.size == old.size
        && new.is_binary == old.is_binary
        && new.encoding == old.encoding
        && new.puid == old.puid
        && new.signature == old.signature
        && new.warning == old.warning
        && file.action == existing.action
        && file.action_data == existing.action_data
        && file.processed == existing.processed;

    if unchanged {
        Outcome::Unchanged
    } else {
        Outcome::Updated(file)
    }
}

/// Save identified files and log one event per new or changed file.
pub async fn save_batch(
    conn: &mut SqliteConnection,
    files: Vec<OriginalFile>,
    summary: &mut Summary,
) -> anyhow::Result<()> {
    for file in files {
        let existing = FileRepo::find_by_path::<OriginalFile>(conn, &file.base.relative_path).await?;
        let relative_path = file.base.relative_path.clone();

        let (file, operation) = match compare(file, existing) {
            Outcome::New(file) => {
                FileRepo::insert(conn, std::slice::from_ref(&file), OnExists::Error).await?;
                summary.new += 1;
                (file, "new")
            }
            Outcome::Updated(file) => {
                FileRepo::update(conn, &file).await?;
                summary.updated += 1;
                (file, "update")
            }
            Outcome::Unchanged => {
                summary.unchanged += 1;
                continue;
            }
            Outcome::Locked => {
                tracing::warn!(path = %relative_path.display(), "Skipping locked file");
                summary.locked += 1;
                continue;
            }
        };

        let event = Event::from_command(COMMAND, operation)
            .with_file(file.base.uuid, OriginalFile::FILE_TYPE)
            .with_data(json!([file.base.puid, file.action.map(ActionType::as_str)]));
        event.log(
            Level::INFO,
            &MessageOptions::default().with_extra("path", relative_path.display()),
        );
        LogRepo::insert(conn, &event).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use acacore_core::files::BaseFile;
    use uuid::Uuid;

    use super::*;

    fn original(path: &str, checksum: &str) -> OriginalFile {
        OriginalFile::new(BaseFile {
            uuid: Uuid::new_v4(),
            checksum: checksum.to_string(),
            encoding: None,
            relative_path: PathBuf::from(path),
            is_binary: true,
            size: 10,
            puid: Some("fmt/18".to_string()),
            signature: Some("Acrobat PDF 1.4".to_string()),
            warning: None,
            root: None,
        })
    }

    #[test]
    fn files_not_in_database_are_new() {
        let file = original("a.pdf", "c1");
        assert_eq!(compare(file.clone(), None), Outcome::New(file));
    }

    #[test]
    fn locked_files_are_skipped() {
        let mut existing = original("a.pdf", "c0");
        existing.lock = true;
        assert_eq!(compare(original("a.pdf", "c1"), Some(existing)), Outcome::Locked);
    }

    #[test]
    fn same_identification_is_unchanged() {
        let existing = original("a.pdf", "c1");
        let mut file = original("a.pdf", "c1");
        file.base.root = Some(PathBuf::from("/archive"));
        assert_eq!(compare(file, Some(existing)), Outcome::Unchanged);
    }

    #[test]
    fn changed_files_keep_identity() {
        let mut existing = original("a.pdf", "c0");
        existing.parent = Some(Uuid::new_v4());
        existing.original_path = PathBuf::from("old/a.pdf");
        existing.processed = true;

        let mut file = original("a.pdf", "c1");
        file.action = Some(ActionType::Convert);

        let Outcome::Updated(updated) = compare(file, Some(existing.clone())) else {
            panic!("expected an update");
        };
        assert_eq!(updated.base.uuid, existing.base.uuid);
        assert_eq!(updated.parent, existing.parent);
        assert_eq!(updated.original_path, PathBuf::from("old/a.pdf"));
        assert!(!updated.processed);
        assert_eq!(updated.base.checksum, "c1");
    }

    #[test]
    fn journals_are_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("files.db");
        std::fs::write(&db, b"").unwrap();
        let files = database_files(&db).unwrap();
        assert_eq!(files.len(), 4);
        assert!(files[1].to_string_lossy().ends_with("files.db-journal"));
    }
}
