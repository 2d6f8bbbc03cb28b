//! libSQL backend.
//!
//! One `libsql::Database` handle is shared; each operation opens a fresh
//! connection with foreign keys enabled.

mod case_activity;
mod cases;
mod categories;
mod courts;
mod firms;
mod hearings;
mod jurisdiction;
mod notices;
mod parties;
mod templates;
mod timesheet;
mod users;
mod workflow;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::db::Database;
use crate::db::libsql_migrations::SCHEMA;
use crate::error::DatabaseError;

/// libSQL-backed implementation of every store trait.
#[derive(Clone)]
pub struct LibSqlBackend {
    db: Arc<libsql::Database>,
}

impl std::fmt::Debug for LibSqlBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibSqlBackend").finish_non_exhaustive()
    }
}

impl LibSqlBackend {
    /// Open (or create) a local database file.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("failed to open libSQL database: {e}")))?;
        tracing::debug!(path = %path.display(), "opened local libSQL database");
        Ok(Self { db: Arc::new(db) })
    }

    /// Open an embedded replica that syncs from a remote primary.
    pub async fn new_remote_replica(
        path: &Path,
        url: &str,
        auth_token: &str,
    ) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
        let db = libsql::Builder::new_remote_replica(path, url.to_string(), auth_token.to_string())
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("failed to open libSQL replica: {e}")))?;
        tracing::info!(url, "opened libSQL remote replica");
        Ok(Self { db: Arc::new(db) })
    }

    /// Open a connection with foreign key enforcement on.
    pub async fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("failed to connect: {e}")))?;
        conn.execute("PRAGMA foreign_keys = ON", ()).await?;
        Ok(conn)
    }
}

#[async_trait::async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        conn.execute_batch(SCHEMA)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        tracing::debug!("libSQL schema applied");
        Ok(())
    }
}

// ==================== Row helpers ====================

/// RFC 3339 with millisecond precision; sorts lexicographically.
pub(crate) fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn now_ts() -> String {
    fmt_ts(&Utc::now())
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(rfc_err) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .map(|naive| naive.and_utc())
            .map_err(|_| rfc_err),
    }
}

pub(crate) fn get_text(row: &libsql::Row, idx: i32) -> String {
    row.get::<String>(idx).unwrap_or_default()
}

pub(crate) fn get_opt_text(row: &libsql::Row, idx: i32) -> Option<String> {
    match row.get_value(idx) {
        Ok(libsql::Value::Text(value)) => Some(value),
        _ => None,
    }
}

pub(crate) fn get_i64(row: &libsql::Row, idx: i32) -> i64 {
    row.get::<i64>(idx).unwrap_or_default()
}

pub(crate) fn get_bool(row: &libsql::Row, idx: i32) -> bool {
    get_i64(row, idx) != 0
}

pub(crate) fn opt_text(value: Option<&str>) -> libsql::Value {
    match value {
        Some(text) => libsql::Value::Text(text.to_string()),
        None => libsql::Value::Null,
    }
}

pub(crate) fn opt_uuid(value: Option<Uuid>) -> libsql::Value {
    match value {
        Some(id) => libsql::Value::Text(id.to_string()),
        None => libsql::Value::Null,
    }
}

pub(crate) fn opt_ts(value: Option<&DateTime<Utc>>) -> libsql::Value {
    match value {
        Some(ts) => libsql::Value::Text(fmt_ts(ts)),
        None => libsql::Value::Null,
    }
}

pub(crate) fn opt_date(value: Option<NaiveDate>) -> libsql::Value {
    match value {
        Some(date) => libsql::Value::Text(date.to_string()),
        None => libsql::Value::Null,
    }
}

pub(crate) fn opt_decimal(value: Option<Decimal>) -> libsql::Value {
    match value {
        Some(amount) => libsql::Value::Text(amount.to_string()),
        None => libsql::Value::Null,
    }
}

pub(crate) fn parse_uuid(raw: &str, field: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw)
        .map_err(|e| DatabaseError::Serialization(format!("invalid {} uuid: {}", field, e)))
}

pub(crate) fn parse_uuid_opt(raw: Option<String>, field: &str) -> Result<Option<Uuid>, DatabaseError> {
    raw.map(|value| parse_uuid(&value, field)).transpose()
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    parse_timestamp(raw).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

pub(crate) fn parse_dt_opt(raw: Option<String>) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    match raw {
        Some(value) => parse_ts(&value).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| DatabaseError::Serialization(format!("invalid date '{raw}': {e}")))
}

pub(crate) fn parse_date_opt(raw: Option<String>) -> Result<Option<NaiveDate>, DatabaseError> {
    raw.map(|value| parse_date(&value)).transpose()
}

pub(crate) fn parse_decimal(raw: &str) -> Result<Decimal, DatabaseError> {
    raw.parse::<Decimal>()
        .map_err(|e| DatabaseError::Serialization(format!("invalid decimal '{raw}': {e}")))
}

pub(crate) fn parse_json(raw: &str, fallback: serde_json::Value) -> Result<serde_json::Value, DatabaseError> {
    if raw.trim().is_empty() {
        return Ok(fallback);
    }
    serde_json::from_str(raw).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
pub(crate) fn like_pattern(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len() + 2);
    escaped.push('%');
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// Positional `WHERE` builder for optional list filters.
#[derive(Debug, Default)]
pub(crate) struct Filter {
    clauses: Vec<String>,
    values: Vec<libsql::Value>,
}

impl Filter {
    /// Add a clause; each `?` in `sql` is bound to the next value in order.
    pub(crate) fn push(&mut self, sql: &str, values: Vec<libsql::Value>) {
        let mut out = String::with_capacity(sql.len() + 4);
        let mut values = values.into_iter();
        for ch in sql.chars() {
            if ch == '?'
                && let Some(value) = values.next()
            {
                self.values.push(value);
                out.push_str(&format!("?{}", self.values.len()));
                continue;
            }
            out.push(ch);
        }
        self.clauses.push(out);
    }

    pub(crate) fn push_eq(&mut self, column: &str, value: libsql::Value) {
        self.push(&format!("{column} = ?"), vec![value]);
    }

    pub(crate) fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub(crate) fn params(&self) -> libsql::params::Params {
        libsql::params::Params::Positional(self.values.clone())
    }

    /// Params plus trailing `LIMIT`/`OFFSET` values, and the SQL suffix
    /// that binds them.
    pub(crate) fn paged_params(
        &self,
        page: crate::db::PageRequest,
    ) -> (String, libsql::params::Params) {
        let mut values = self.values.clone();
        let limit_idx = values.len() + 1;
        values.push(libsql::Value::Integer(i64::try_from(page.limit).unwrap_or(i64::MAX)));
        values.push(libsql::Value::Integer(i64::try_from(page.offset()).unwrap_or(i64::MAX)));
        (
            format!(" LIMIT ?{} OFFSET ?{}", limit_idx, limit_idx + 1),
            libsql::params::Params::Positional(values),
        )
    }
}

/// Run `SELECT COUNT(*)` with the filter applied.
pub(crate) async fn count_rows(
    conn: &libsql::Connection,
    from_sql: &str,
    filter: &Filter,
) -> Result<u64, DatabaseError> {
    let sql = format!("SELECT COUNT(*) FROM {}{}", from_sql, filter.where_sql());
    let row = conn
        .query(&sql, filter.params())
        .await?
        .next()
        .await?
        .ok_or_else(|| DatabaseError::Query("count returned no rows".to_string()))?;
    Ok(u64::try_from(get_i64(&row, 0)).unwrap_or(0))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::LibSqlBackend;
    use crate::db::Database;

    pub(crate) struct TestBackend {
        pub(crate) backend: LibSqlBackend,
        _tmpdir: tempfile::TempDir,
    }

    pub(crate) async fn setup_backend() -> TestBackend {
        // Use a temp-file database so all connections share schema/state.
        let tmpdir = tempfile::tempdir().expect("tempdir");
        let db_path = tmpdir.path().join("lexcase_test.db");
        let backend = LibSqlBackend::new_local(&db_path)
            .await
            .expect("local backend should initialize");
        backend
            .run_migrations()
            .await
            .expect("migrations should succeed");
        TestBackend {
            backend,
            _tmpdir: tmpdir,
        }
    }
}
