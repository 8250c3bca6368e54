//! Integration tests for the files database.
//!
//! Exercises the repository layer against a real SQLite file:
//! - Initialisation, version stamp and open-time checks
//! - Insert conflict handling, upsert, update and delete
//! - Select with filters and counting
//! - Event log and the path/statistics views
//! - Metadata key/value access

use std::path::PathBuf;

use acacore_core::event::Event;
use acacore_core::files::{BaseFile, ConvertedFile, FileType, MasterFile, OriginalFile, StatutoryFile};
use acacore_core::reference_files::{ActionType, ManualAction};
use acacore_core::utils::FileEncoding;
use acacore_core::version::VERSION;
use acacore_db::models::metadata::Metadata;
use acacore_db::repositories::{FileRepo, Filter, LogRepo, MetadataRepo, OnExists, Order, StatsRepo};
use acacore_db::{DbError, FilesDb, OpenOptions};
use assert_matches::assert_matches;
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn new_db() -> (TempDir, FilesDb) {
    let dir = tempfile::tempdir().unwrap();
    let db = FilesDb::open(dir.path().join("files.db"), OpenOptions::default())
        .await
        .unwrap();
    db.init().await.unwrap();
    (dir, db)
}

fn base(path: &str, checksum: &str, puid: Option<&str>) -> BaseFile {
    BaseFile {
        uuid: Uuid::new_v4(),
        checksum: checksum.to_string(),
        encoding: None,
        relative_path: PathBuf::from(path),
        is_binary: true,
        size: 100,
        puid: puid.map(str::to_string),
        signature: puid.map(|p| format!("Signature {p}")),
        warning: None,
        root: None,
    }
}

fn original(path: &str, checksum: &str, puid: Option<&str>) -> OriginalFile {
    OriginalFile::new(base(path, checksum, puid))
}

// ---------------------------------------------------------------------------
// Database lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn init_creates_schema_and_version() {
    let (_dir, db) = new_db().await;

    let tables = db.tables().await.unwrap();
    for table in ["files_original", "files_master", "files_access", "files_statutory", "log", "metadata"] {
        assert!(tables.iter().any(|t| t == table), "missing table {table}");
    }
    let views = db.views().await.unwrap();
    for view in [
        "log_paths",
        "view_identification_warnings",
        "view_signatures_count",
        "view_actions_count",
        "view_checksums_count",
    ] {
        assert!(views.iter().any(|v| v == view), "missing view {view}");
    }

    assert!(db.is_initialised().await.unwrap());
    assert_eq!(db.version().await.unwrap().to_string(), VERSION);
    assert!(db.is_latest().await.unwrap());

    // A second init keeps the existing metadata.
    db.init().await.unwrap();
    assert!(db.is_latest().await.unwrap());
}

#[tokio::test]
async fn open_checks_initialisation_and_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("files.db");

    let options = OpenOptions {
        check_initialisation: true,
        ..OpenOptions::default()
    };
    assert_matches!(FilesDb::open(&path, options).await, Err(DbError::NotInitialised));

    let db = FilesDb::open(&path, OpenOptions::default()).await.unwrap();
    db.init().await.unwrap();
    let mut conn = db.acquire().await.unwrap();
    MetadataRepo::update::<Metadata>(&mut conn, &[("version", json!("999.0.0"))])
        .await
        .unwrap();
    drop(conn);
    db.close().await;

    assert_matches!(
        FilesDb::open(&path, OpenOptions::default()).await,
        Err(DbError::NewerVersion { .. })
    );
    let unchecked = OpenOptions {
        check_version: false,
        ..OpenOptions::default()
    };
    assert!(FilesDb::open(&path, unchecked).await.is_ok());
}

#[tokio::test]
async fn read_only_requires_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let options = OpenOptions {
        read_only: true,
        ..OpenOptions::default()
    };
    assert!(FilesDb::open(dir.path().join("missing.db"), options).await.is_err());
}

// ---------------------------------------------------------------------------
// Files tables
// ---------------------------------------------------------------------------

#[tokio::test]
async fn original_file_round_trips() {
    let (_dir, db) = new_db().await;
    let mut conn = db.acquire().await.unwrap();

    let mut file = original("docs/report.pdf", "abc", Some("fmt/18"));
    file.base.is_binary = false;
    file.base.encoding = Some(FileEncoding::fixed("utf-8"));
    file.base.warning = Some(vec!["extension mismatch".to_string()]);
    file.action = Some(ActionType::Manual);
    file.action_data.manual = Some(ManualAction {
        reason: "Check".to_string(),
        process: "Open it".to_string(),
    });
    file.parent = Some(Uuid::new_v4());
    file.lock = true;

    assert_eq!(FileRepo::insert(&mut conn, &[file.clone()], OnExists::Error).await.unwrap(), 1);

    let by_path: OriginalFile = FileRepo::find_by_path(&mut conn, &file.base.relative_path)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_path, file);

    let by_uuid: Option<OriginalFile> = FileRepo::find_by_uuid(&mut conn, file.base.uuid).await.unwrap();
    assert_eq!(by_uuid, Some(file));
}

#[tokio::test]
async fn insert_conflicts_follow_on_exists() {
    let (_dir, db) = new_db().await;
    let mut conn = db.acquire().await.unwrap();

    let file = original("a.txt", "one", None);
    FileRepo::insert(&mut conn, &[file.clone()], OnExists::Error).await.unwrap();

    let mut changed = file.clone();
    changed.base.checksum = "two".to_string();

    assert_matches!(
        FileRepo::insert(&mut conn, &[changed.clone()], OnExists::Error).await,
        Err(DbError::Sqlx(_))
    );
    assert_eq!(FileRepo::insert(&mut conn, &[changed.clone()], OnExists::Ignore).await.unwrap(), 0);
    let stored: OriginalFile = FileRepo::find_by_path(&mut conn, &file.base.relative_path).await.unwrap().unwrap();
    assert_eq!(stored.base.checksum, "one");

    FileRepo::upsert(&mut conn, &[changed]).await.unwrap();
    let stored: OriginalFile = FileRepo::find_by_path(&mut conn, &file.base.relative_path).await.unwrap().unwrap();
    assert_eq!(stored.base.checksum, "two");
}

#[tokio::test]
async fn select_count_update_delete() {
    let (_dir, db) = new_db().await;
    let mut conn = db.acquire().await.unwrap();

    let files = vec![
        original("b.pdf", "1", Some("fmt/18")),
        original("a.pdf", "2", Some("fmt/18")),
        original("c.txt", "3", Some("x-fmt/111")),
    ];
    FileRepo::insert(&mut conn, &files, OnExists::Error).await.unwrap();

    let filter = Filter::new()
        .where_("puid = ?", vec!["fmt/18".into()])
        .order_by("relative_path", Order::Asc);
    let pdfs: Vec<OriginalFile> = FileRepo::select(&mut conn, &filter).await.unwrap();
    let paths: Vec<_> = pdfs.iter().map(|f| f.base.relative_path.clone()).collect();
    assert_eq!(paths, vec![PathBuf::from("a.pdf"), PathBuf::from("b.pdf")]);
    assert_eq!(FileRepo::count::<OriginalFile>(&mut conn, &filter).await.unwrap(), 2);
    assert_eq!(FileRepo::count::<OriginalFile>(&mut conn, &Filter::new()).await.unwrap(), 3);

    let paged: Vec<OriginalFile> = FileRepo::select(
        &mut conn,
        &Filter::new().order_by("relative_path", Order::Desc).limit(1).offset(1),
    )
    .await
    .unwrap();
    assert_eq!(paged[0].base.relative_path, PathBuf::from("b.pdf"));

    let mut updated = files[2].clone();
    updated.processed = true;
    assert_eq!(FileRepo::update(&mut conn, &updated).await.unwrap(), 1);
    let stored: OriginalFile = FileRepo::find_by_path(&mut conn, &updated.base.relative_path).await.unwrap().unwrap();
    assert!(stored.processed);

    assert_matches!(
        FileRepo::update_where(&mut conn, &updated, " ", vec![]).await,
        Err(DbError::MissingWhere(_))
    );
    assert_matches!(
        FileRepo::delete_where::<OriginalFile>(&mut conn, "", vec![]).await,
        Err(DbError::MissingWhere(_))
    );

    assert_eq!(FileRepo::delete(&mut conn, &files[0]).await.unwrap(), 1);
    assert_eq!(
        FileRepo::relative_paths::<OriginalFile>(&mut conn).await.unwrap(),
        vec![PathBuf::from("a.pdf"), PathBuf::from("c.txt")]
    );
}

#[tokio::test]
async fn converted_files_round_trip() {
    let (_dir, db) = new_db().await;
    let mut conn = db.acquire().await.unwrap();
    let original_uuid = Uuid::new_v4();

    let master = MasterFile::new(base("master/a.tif", "m", Some("fmt/353")), Some(original_uuid), 3).unwrap();
    let access = ConvertedFile {
        base: base("access/a.jpg", "a", Some("fmt/43")),
        original_uuid: Some(master.base.uuid),
    };
    let statutory = StatutoryFile::new(base("statutory/a.tif", "s", None), Some(master.base.uuid), Some(1), Some(7))
        .unwrap();

    FileRepo::insert(&mut conn, &[master.clone()], OnExists::Error).await.unwrap();
    FileRepo::insert(&mut conn, &[access.clone()], OnExists::Error).await.unwrap();
    FileRepo::insert(&mut conn, &[statutory.clone()], OnExists::Error).await.unwrap();

    let stored: Option<MasterFile> = FileRepo::find_by_uuid(&mut conn, master.base.uuid).await.unwrap();
    assert_eq!(stored, Some(master));
    let stored: Option<ConvertedFile> = FileRepo::find_by_uuid(&mut conn, access.base.uuid).await.unwrap();
    assert_eq!(stored, Some(access));
    let stored: Option<StatutoryFile> = FileRepo::find_by_uuid(&mut conn, statutory.base.uuid).await.unwrap();
    assert_eq!(stored, Some(statutory));
}

#[tokio::test]
async fn rolled_back_transaction_leaves_no_rows() {
    let (_dir, db) = new_db().await;

    let mut tx = db.begin().await.unwrap();
    FileRepo::insert(&mut tx, &[original("a.txt", "1", None)], OnExists::Error)
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    let mut conn = db.acquire().await.unwrap();
    assert_eq!(FileRepo::count::<OriginalFile>(&mut conn, &Filter::new()).await.unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Log and views
// ---------------------------------------------------------------------------

#[tokio::test]
async fn log_events_and_paths() {
    let (_dir, db) = new_db().await;
    let mut conn = db.acquire().await.unwrap();

    let file = original("docs/a.pdf", "1", Some("fmt/18"));
    FileRepo::insert(&mut conn, &[file.clone()], OnExists::Error).await.unwrap();

    let start = Event::from_command("identify", "start")
        .with_params(json!({"root": "/data"}))
        .unwrap();
    let file_event = Event::from_command("identify", "file")
        .with_file(file.base.uuid, FileType::Original)
        .with_data(json!({"puid": "fmt/18"}))
        .with_reason("identified");
    LogRepo::insert_many(&mut conn, &[start.clone(), file_event.clone()]).await.unwrap();

    let mut invalid = Event::from_command("identify", "file");
    invalid.file_uuid = Some(Uuid::new_v4());
    assert!(LogRepo::insert(&mut conn, &invalid).await.is_err());

    let events = LogRepo::for_file(&mut conn, file.base.uuid, FileType::Original).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].operation, "identify:file");
    assert_eq!(events[0].data, Some(json!({"puid": "fmt/18"})));
    assert_eq!(events[0].time, file_event.time);

    let all = LogRepo::list(&mut conn, &Filter::new()).await.unwrap();
    assert_eq!(all, vec![start, file_event]);

    let with_paths = LogRepo::with_paths(&mut conn, &Filter::new().where_("file_uuid is not null", vec![]))
        .await
        .unwrap();
    assert_eq!(with_paths.len(), 1);
    assert_eq!(with_paths[0].file_relative_path, Some(PathBuf::from("docs/a.pdf")));
}

#[tokio::test]
async fn statistics_views() {
    let (_dir, db) = new_db().await;
    let mut conn = db.acquire().await.unwrap();

    let mut manual = original("c.bin", "same", None);
    manual.action = Some(ActionType::Manual);
    let mut empty = original("empty.txt", "e", None);
    empty.base.size = 0;
    let mut warned = original("d.doc", "d", Some("fmt/40"));
    warned.base.warning = Some(vec!["extension mismatch".to_string()]);
    let files = vec![
        original("a.pdf", "same", Some("fmt/18")),
        original("b.pdf", "b", Some("fmt/18")),
        manual,
        empty,
        warned,
    ];
    FileRepo::insert(&mut conn, &files, OnExists::Error).await.unwrap();

    let signatures = StatsRepo::signatures_count(&mut conn).await.unwrap();
    assert_eq!(signatures[0].puid.as_deref(), Some("fmt/18"));
    assert_eq!(signatures[0].count, 2);

    let actions = StatsRepo::actions_count(&mut conn).await.unwrap();
    assert!(actions.iter().any(|a| a.action.as_deref() == Some("manual") && a.count == 1));

    let checksums = StatsRepo::checksums_count(&mut conn, 2).await.unwrap();
    assert_eq!(checksums.len(), 1);
    assert_eq!(checksums[0].checksum, "same");

    let warnings = StatsRepo::identification_warnings(&mut conn, &Filter::new().order_by("relative_path", Order::Asc))
        .await
        .unwrap();
    let paths: Vec<_> = warnings.iter().map(|f| f.base.relative_path.clone()).collect();
    assert_eq!(paths, vec![PathBuf::from("c.bin"), PathBuf::from("d.doc")]);
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

#[tokio::test]
async fn metadata_keys() {
    let (_dir, db) = new_db().await;
    let mut conn = db.acquire().await.unwrap();

    let metadata: Metadata = MetadataRepo::get(&mut conn).await.unwrap().unwrap();
    assert_eq!(metadata, Metadata::default());
    assert_eq!(
        MetadataRepo::get_key::<Metadata>(&mut conn, "version").await.unwrap(),
        Some(json!(VERSION))
    );

    assert_matches!(
        MetadataRepo::get_key::<Metadata>(&mut conn, "owner").await,
        Err(DbError::UnknownKeys(_))
    );
    assert_matches!(
        MetadataRepo::update::<Metadata>(&mut conn, &[("owner", json!("x"))]).await,
        Err(DbError::UnknownKeys(_))
    );

    MetadataRepo::set(&mut conn, &Metadata { version: "5.0.0".into() }).await.unwrap();
    assert_eq!(db.version().await.unwrap().to_string(), "5.0.0");
}
