//! SQL conditions for the date-derived statuses in [`crate::status`].
//!
//! Each helper appends ` AND (...)` to a WHERE clause and pushes its
//! parameters, mirroring the pure functions so list filters and computed
//! statuses agree.

use super::rows::fmt_ts;
use crate::status::{days_after, CredentialStatus, PdStatus, ReviewStatus, DUE_SOON_WINDOW_DAYS};
use chrono::{DateTime, Duration, Utc};

const NOT_REVOKED: &str = "(manual_status IS NULL OR manual_status <> 'revoked')";

pub(crate) fn push_review_status(
    sql: &mut String,
    params: &mut Vec<String>,
    column: &str,
    status: ReviewStatus,
    now: DateTime<Utc>,
) {
    let window_end = fmt_ts(now + Duration::days(DUE_SOON_WINDOW_DAYS));
    match status {
        ReviewStatus::NotScheduled => {
            sql.push_str(&format!(" AND {} IS NULL", column));
        }
        ReviewStatus::Overdue => {
            sql.push_str(&format!(" AND ({c} IS NOT NULL AND {c} < ?)", c = column));
            params.push(fmt_ts(now));
        }
        ReviewStatus::Due => {
            sql.push_str(&format!(" AND ({c} >= ? AND {c} <= ?)", c = column));
            params.push(fmt_ts(now));
            params.push(window_end);
        }
        ReviewStatus::Current => {
            sql.push_str(&format!(" AND {} > ?", column));
            params.push(window_end);
        }
    }
}

pub(crate) fn push_credential_status(
    sql: &mut String,
    params: &mut Vec<String>,
    status: CredentialStatus,
    now: DateTime<Utc>,
) {
    match status {
        CredentialStatus::Revoked => sql.push_str(" AND manual_status = 'revoked'"),
        CredentialStatus::Expired => {
            sql.push_str(&format!(
                " AND ({} AND expires_at IS NOT NULL AND expires_at < ?)",
                NOT_REVOKED
            ));
            params.push(fmt_ts(now));
        }
        CredentialStatus::Active => {
            sql.push_str(&format!(
                " AND ({} AND (expires_at IS NULL OR expires_at >= ?))",
                NOT_REVOKED
            ));
            params.push(fmt_ts(now));
        }
    }
}

/// Active credentials whose expiry falls within `days` of `now`.
pub(crate) fn push_expiring_within(
    sql: &mut String,
    params: &mut Vec<String>,
    days: i64,
    now: DateTime<Utc>,
) {
    sql.push_str(&format!(
        " AND ({} AND expires_at >= ? AND expires_at <= ?)",
        NOT_REVOKED
    ));
    params.push(fmt_ts(now));
    params.push(fmt_ts(days_after(now, days)));
}

pub(crate) fn push_pd_status(
    sql: &mut String,
    params: &mut Vec<String>,
    status: PdStatus,
    now: DateTime<Utc>,
) {
    let window_end = fmt_ts(now + Duration::days(DUE_SOON_WINDOW_DAYS));
    match status {
        PdStatus::Completed => sql.push_str(" AND completed_at IS NOT NULL"),
        PdStatus::Overdue => {
            sql.push_str(" AND (completed_at IS NULL AND due_at < ?)");
            params.push(fmt_ts(now));
        }
        PdStatus::Due => {
            sql.push_str(" AND (completed_at IS NULL AND due_at >= ? AND due_at <= ?)");
            params.push(fmt_ts(now));
            params.push(window_end);
        }
        PdStatus::Planned => {
            sql.push_str(" AND (completed_at IS NULL AND (due_at IS NULL OR due_at > ?))");
            params.push(window_end);
        }
    }
}
