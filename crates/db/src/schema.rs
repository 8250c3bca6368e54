//! Table, index and view definitions of the files database.
//!
//! Every statement uses `if not exists`, so applying the schema to an
//! existing database only adds what is missing.

use sqlx::{Connection, SqliteConnection};

use crate::error::DbError;

pub const FILES_ORIGINAL: &str = "files_original";
pub const FILES_MASTER: &str = "files_master";
pub const FILES_ACCESS: &str = "files_access";
pub const FILES_STATUTORY: &str = "files_statutory";
pub const LOG: &str = "log";
pub const METADATA: &str = "metadata";

pub const LOG_PATHS: &str = "log_paths";
pub const VIEW_IDENTIFICATION_WARNINGS: &str = "view_identification_warnings";
pub const VIEW_SIGNATURES_COUNT: &str = "view_signatures_count";
pub const VIEW_ACTIONS_COUNT: &str = "view_actions_count";
pub const VIEW_CHECKSUMS_COUNT: &str = "view_checksums_count";

/// All file tables, in creation order.
pub const FILE_TABLES: [&str; 4] = [FILES_ORIGINAL, FILES_MASTER, FILES_ACCESS, FILES_STATUTORY];

const TABLES: &[&str] = &[
    "create table if not exists files_original (
        uuid          text    not null,
        checksum      text    not null,
        encoding      text,
        relative_path text    not null,
        is_binary     boolean not null,
        size          integer not null,
        puid          text,
        signature     text,
        warning       text,
        action        text,
        action_data   text    not null,
        parent        text,
        processed     boolean not null,
        lock          boolean not null,
        original_path text    not null,
        primary key (relative_path)
    )",
    "create table if not exists files_master (
        uuid              text    not null,
        checksum          text    not null,
        encoding          text,
        relative_path     text    not null,
        is_binary         boolean not null,
        size              integer not null,
        puid              text,
        signature         text,
        warning           text,
        original_uuid     text,
        convert_access    text,
        convert_statutory text,
        processed         integer not null,
        primary key (relative_path)
    )",
    "create table if not exists files_access (
        uuid          text    not null,
        checksum      text    not null,
        encoding      text,
        relative_path text    not null,
        is_binary     boolean not null,
        size          integer not null,
        puid          text,
        signature     text,
        warning       text,
        original_uuid text,
        primary key (relative_path)
    )",
    "create table if not exists files_statutory (
        uuid           text    not null,
        checksum       text    not null,
        encoding       text,
        relative_path  text    not null,
        is_binary      boolean not null,
        size           integer not null,
        puid           text,
        signature      text,
        warning        text,
        original_uuid  text,
        doc_collection integer,
        doc_id         integer,
        primary key (relative_path)
    )",
    "create table if not exists log (
        file_uuid text,
        file_type text,
        time      text not null,
        operation text not null,
        data      text,
        reason    text
    )",
    "create table if not exists metadata (
        key   text not null,
        value text,
        primary key (key)
    )",
];

/// `(table, index name, columns)`; indices are named `idx_{table}_{name}`.
const INDICES: &[(&str, &str, &str)] = &[
    (FILES_ORIGINAL, "uuid", "uuid"),
    (FILES_ORIGINAL, "checksum", "checksum"),
    (FILES_ORIGINAL, "action", "action"),
    (FILES_MASTER, "uuid", "uuid"),
    (FILES_MASTER, "checksum", "checksum"),
    (FILES_MASTER, "original_uuid", "original_uuid"),
    (FILES_ACCESS, "uuid", "uuid"),
    (FILES_ACCESS, "checksum", "checksum"),
    (FILES_ACCESS, "original_uuid", "original_uuid"),
    (FILES_STATUTORY, "uuid", "uuid"),
    (FILES_STATUTORY, "checksum", "checksum"),
    (FILES_STATUTORY, "original_uuid", "original_uuid"),
    (FILES_STATUTORY, "doc_id", "doc_id"),
    (LOG, "uuid", "file_uuid, file_type"),
    (LOG, "time", "time"),
    (LOG, "operation", "operation"),
];

const VIEWS: &[&str] = &[
    "create view if not exists log_paths as
    select coalesce(fo.relative_path, fm.relative_path, fa.relative_path, fs.relative_path) as file_relative_path, l.*
    from log l
        left join files_original  fo on l.file_type = 'original'  and fo.uuid = l.file_uuid
        left join files_master    fm on l.file_type = 'master'    and fm.uuid = l.file_uuid
        left join files_access    fa on l.file_type = 'access'    and fa.uuid = l.file_uuid
        left join files_statutory fs on l.file_type = 'statutory' and fs.uuid = l.file_uuid",
    "create view if not exists view_identification_warnings as
    select * from files_original where (warning is not null or puid is null) and size != 0",
    "create view if not exists view_signatures_count as
    select puid, signature, count(*) as count from files_original group by puid, signature order by count desc",
    "create view if not exists view_actions_count as
    select action, count(*) as count from files_original group by action order by count desc",
    "create view if not exists view_checksums_count as
    select checksum, count(*) as count from files_original group by checksum order by count desc",
];

/// Every statement needed to create the schema, tables first.
pub fn statements() -> Vec<String> {
    let mut statements: Vec<String> = TABLES.iter().map(|s| s.to_string()).collect();
    statements.extend(
        INDICES
            .iter()
            .map(|(table, name, columns)| format!("create index if not exists idx_{table}_{name} on {table} ({columns})")),
    );
    statements.extend(VIEWS.iter().map(|s| s.to_string()));
    statements
}

/// Create all missing tables, indices and views in one transaction.
pub async fn apply(conn: &mut SqliteConnection) -> Result<(), DbError> {
    let mut tx = conn.begin().await?;
    for statement in statements() {
        sqlx::query(&statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}
