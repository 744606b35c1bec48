//! Delivery log for outbound email.

use super::rows::{fetch_page, fmt_opt_ts, fmt_ts, parse_enum, parse_opt_ts, parse_ts, parse_uuid};
use super::{DbError, DbPool, PaginatedResult, Pagination};
use crate::models::{EmailLog, EmailLogFilter, EmailStatus};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

const EMAIL_COLUMNS: &str = "id, recipient, subject, template, status, provider, attempts, error, \
     message_id, sent_at, created_at";

#[async_trait]
pub trait EmailLogRepository: Send + Sync {
    async fn create(&self, log: &EmailLog) -> Result<EmailLog, DbError>;

    async fn get(&self, id: Uuid) -> Result<Option<EmailLog>, DbError>;

    async fn list(
        &self,
        filter: &EmailLogFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<EmailLog>, DbError>;

    /// Records a successful delivery.
    async fn mark_sent(
        &self,
        id: Uuid,
        attempts: i64,
        message_id: Option<&str>,
    ) -> Result<(), DbError>;

    /// Records a failed delivery with the last error seen.
    async fn mark_failed(&self, id: Uuid, attempts: i64, error: &str) -> Result<(), DbError>;
}

pub struct SqliteEmailLogRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteEmailLogRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EmailLogRepository for SqliteEmailLogRepository {
    async fn create(&self, log: &EmailLog) -> Result<EmailLog, DbError> {
        sqlx::query(
            r#"
            INSERT INTO email_logs (id, recipient, subject, template, status, provider, attempts, error,
                                    message_id, sent_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.id.to_string())
        .bind(&log.recipient)
        .bind(&log.subject)
        .bind(&log.template)
        .bind(log.status.as_str())
        .bind(&log.provider)
        .bind(log.attempts)
        .bind(&log.error)
        .bind(&log.message_id)
        .bind(fmt_opt_ts(log.sent_at))
        .bind(fmt_ts(log.created_at))
        .execute(&self.pool)
        .await?;

        Ok(log.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<EmailLog>, DbError> {
        let sql = format!("SELECT {} FROM email_logs WHERE id = ?", EMAIL_COLUMNS);
        let row: Option<EmailRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list(
        &self,
        filter: &EmailLogFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<EmailLog>, DbError> {
        let mut from_where = String::from("email_logs WHERE 1 = 1");
        let mut params = Vec::new();

        if let Some(status) = filter.status {
            from_where.push_str(" AND status = ?");
            params.push(status.as_str().to_string());
        }
        if let Some(recipient) = &filter.recipient {
            from_where.push_str(" AND recipient = ? COLLATE NOCASE");
            params.push(recipient.trim().to_string());
        }
        if let Some(template) = &filter.template {
            from_where.push_str(" AND template = ?");
            params.push(template.clone());
        }

        let (rows, total) = fetch_page::<EmailRow>(
            &self.pool,
            EMAIL_COLUMNS,
            &from_where,
            "created_at DESC",
            &params,
            pagination,
        )
        .await?;

        let items = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(PaginatedResult::new(items, total, pagination))
    }

    async fn mark_sent(
        &self,
        id: Uuid,
        attempts: i64,
        message_id: Option<&str>,
    ) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE email_logs SET status = ?, attempts = ?, message_id = ?, error = NULL, sent_at = ? WHERE id = ?",
        )
        .bind(EmailStatus::Sent.as_str())
        .bind(attempts)
        .bind(message_id)
        .bind(fmt_ts(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, attempts: i64, error: &str) -> Result<(), DbError> {
        sqlx::query("UPDATE email_logs SET status = ?, attempts = ?, error = ? WHERE id = ?")
            .bind(EmailStatus::Failed.as_str())
            .bind(attempts)
            .bind(error)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub fn create_email_log_repository(pool: &DbPool) -> Box<dyn EmailLogRepository> {
    Box::new(SqliteEmailLogRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct EmailRow {
    id: String,
    recipient: String,
    subject: String,
    template: String,
    status: String,
    provider: String,
    attempts: i64,
    error: Option<String>,
    message_id: Option<String>,
    sent_at: Option<String>,
    created_at: String,
}

impl TryFrom<EmailRow> for EmailLog {
    type Error = DbError;

    fn try_from(row: EmailRow) -> Result<Self, Self::Error> {
        Ok(EmailLog {
            id: parse_uuid(&row.id)?,
            recipient: row.recipient,
            subject: row.subject,
            template: row.template,
            status: parse_enum(&row.status)?,
            provider: row.provider,
            attempts: row.attempts,
            error: row.error,
            message_id: row.message_id,
            sent_at: parse_opt_ts(row.sent_at)?,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}
