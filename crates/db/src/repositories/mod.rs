//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&mut SqliteConnection` as the first argument, so the same calls
//! work on a pooled connection and inside a transaction.

pub mod file_repo;
pub mod log_repo;
pub mod metadata_repo;
pub mod stats_repo;

pub use file_repo::{FileRecord, FileRepo};
pub use log_repo::LogRepo;
pub use metadata_repo::MetadataRepo;
pub use stats_repo::StatsRepo;

use sqlx::sqlite::SqliteArguments;
use sqlx::Sqlite;

pub type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;
pub type SqliteQueryAs<'q, O> = sqlx::query::QueryAs<'q, Sqlite, O, SqliteArguments<'q>>;

/// A positional query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
}

impl From<bool> for SqlParam {
    fn from(value: bool) -> Self {
        SqlParam::Bool(value)
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Int(value)
    }
}

impl From<f64> for SqlParam {
    fn from(value: f64) -> Self {
        SqlParam::Real(value)
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::Text(value)
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlParam::Null, Into::into)
    }
}

pub(crate) fn bind_param<'q>(query: SqliteQuery<'q>, param: &SqlParam) -> SqliteQuery<'q> {
    match param.clone() {
        SqlParam::Null => query.bind(None::<String>),
        SqlParam::Bool(v) => query.bind(v),
        SqlParam::Int(v) => query.bind(v),
        SqlParam::Real(v) => query.bind(v),
        SqlParam::Text(v) => query.bind(v),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    fn as_sql(self) -> &'static str {
        match self {
            Order::Asc => "asc",
            Order::Desc => "desc",
        }
    }
}

/// What to do when an inserted row collides with an existing primary key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnExists {
    #[default]
    Error,
    Ignore,
    Replace,
}

impl OnExists {
    fn insert_sql(self) -> &'static str {
        match self {
            OnExists::Error => "insert",
            OnExists::Ignore => "insert or ignore",
            OnExists::Replace => "insert or replace",
        }
    }
}

/// Where clause, ordering and paging for select and count queries.
///
/// The where clause and column names are inserted verbatim; values must go
/// through `params`.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub where_clause: Option<String>,
    pub params: Vec<SqlParam>,
    pub order_by: Vec<(String, Order)>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_(mut self, clause: impl Into<String>, params: Vec<SqlParam>) -> Self {
        self.where_clause = Some(clause.into());
        self.params = params;
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order_by.push((column.into(), order));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Render only the where clause, with a leading space when present.
    pub(crate) fn where_sql(&self) -> String {
        match self.where_clause.as_deref().map(str::trim) {
            Some(clause) if !clause.is_empty() => format!(" where {clause}"),
            _ => String::new(),
        }
    }

    /// Render the clauses after `from {table}`.
    pub(crate) fn to_sql(&self) -> String {
        let mut sql = self.where_sql();

        if !self.order_by.is_empty() {
            let order: Vec<String> = self
                .order_by
                .iter()
                .map(|(column, order)| format!("{column} {}", order.as_sql()))
                .collect();
            sql.push_str(&format!(" order by {}", order.join(", ")));
        }
        // SQLite only accepts offset after a limit; -1 means no limit.
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" limit {limit} offset {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" limit {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" limit -1 offset {offset}")),
            (None, None) => {}
        }

        sql
    }

    pub(crate) fn bind<'q>(&self, mut query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        for param in &self.params {
            query = bind_param(query, param);
        }
        query
    }

    pub(crate) fn bind_as<'q, O>(&self, mut query: SqliteQueryAs<'q, O>) -> SqliteQueryAs<'q, O> {
        for param in &self.params {
            query = match param.clone() {
                SqlParam::Null => query.bind(None::<String>),
                SqlParam::Bool(v) => query.bind(v),
                SqlParam::Int(v) => query.bind(v),
                SqlParam::Real(v) => query.bind(v),
                SqlParam::Text(v) => query.bind(v),
            };
        }
        query
    }
}
