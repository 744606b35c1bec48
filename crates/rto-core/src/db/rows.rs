//! Conversions between SQLite TEXT columns and domain types.
//!
//! Timestamps are written with a fixed width (microseconds, `Z` suffix) so
//! that string comparison in SQL orders them chronologically.

use super::{DbError, Pagination};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use std::str::FromStr;
use uuid::Uuid;

/// Runs the count and page queries for a filtered list.
///
/// `from_where` is the `table WHERE ...` fragment shared by both queries and
/// `params` are bound to its placeholders in order.
pub(crate) async fn fetch_page<R>(
    pool: &SqlitePool,
    columns: &str,
    from_where: &str,
    order_by: &str,
    params: &[String],
    pagination: &Pagination,
) -> Result<(Vec<R>, u64), DbError>
where
    R: for<'r> sqlx::FromRow<'r, SqliteRow> + Send + Unpin,
{
    let count_sql = format!("SELECT COUNT(*) FROM {}", from_where);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for param in params {
        count_query = count_query.bind(param.as_str());
    }
    let total = count_query.fetch_one(pool).await?;

    let page_sql = format!(
        "SELECT {} FROM {} ORDER BY {} LIMIT ? OFFSET ?",
        columns, from_where, order_by
    );
    let mut page_query = sqlx::query_as::<_, R>(&page_sql);
    for param in params {
        page_query = page_query.bind(param.as_str());
    }
    let rows = page_query
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(pool)
        .await?;

    Ok((rows, total.max(0) as u64))
}

pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn fmt_opt_ts(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(fmt_ts)
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::Serialization(format!("Invalid timestamp '{}': {}", s, e)))
}

pub(crate) fn parse_opt_ts(s: Option<String>) -> Result<Option<DateTime<Utc>>, DbError> {
    s.as_deref().map(parse_ts).transpose()
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(s).map_err(|e| DbError::Serialization(format!("Invalid UUID '{}': {}", s, e)))
}

pub(crate) fn parse_opt_uuid(s: Option<String>) -> Result<Option<Uuid>, DbError> {
    s.as_deref().map(parse_uuid).transpose()
}

pub(crate) fn opt_uuid(id: Option<Uuid>) -> Option<String> {
    id.map(|id| id.to_string())
}

/// Parses a stored enum column through its `FromStr` impl.
pub(crate) fn parse_enum<T>(s: &str) -> Result<T, DbError>
where
    T: FromStr<Err = String>,
{
    s.parse().map_err(DbError::Serialization)
}

/// Resolves a partial-update field: `None` keeps the current value.
pub(crate) fn merge<T: Clone>(update: &Option<T>, current: &T) -> T {
    update.as_ref().unwrap_or(current).clone()
}
