//! Append-only audit trail of mutating API requests.

use super::rows::{fetch_page, fmt_ts, opt_uuid, parse_opt_uuid, parse_ts, parse_uuid};
use super::{DbError, DbPool, PaginatedResult, Pagination};
use crate::models::{AuditLog, AuditLogFilter};
use async_trait::async_trait;

const AUDIT_COLUMNS: &str = "id, user_id, action, resource_type, resource_id, method, path, status_code, \
     ip_address, user_agent, details, created_at";

#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn insert(&self, entry: &AuditLog) -> Result<(), DbError>;

    async fn list(
        &self,
        filter: &AuditLogFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<AuditLog>, DbError>;
}

pub struct SqliteAuditLogRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteAuditLogRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogRepository for SqliteAuditLogRepository {
    async fn insert(&self, entry: &AuditLog) -> Result<(), DbError> {
        let details = entry
            .details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, user_id, action, resource_type, resource_id, method, path,
                                    status_code, ip_address, user_agent, details, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(opt_uuid(entry.user_id))
        .bind(&entry.action)
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(&entry.method)
        .bind(&entry.path)
        .bind(entry.status_code)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(details)
        .bind(fmt_ts(entry.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(
        &self,
        filter: &AuditLogFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<AuditLog>, DbError> {
        let mut from_where = String::from("audit_logs WHERE 1 = 1");
        let mut params = Vec::new();

        if let Some(user_id) = filter.user_id {
            from_where.push_str(" AND user_id = ?");
            params.push(user_id.to_string());
        }
        if let Some(resource_type) = &filter.resource_type {
            from_where.push_str(" AND resource_type = ?");
            params.push(resource_type.clone());
        }
        if let Some(resource_id) = &filter.resource_id {
            from_where.push_str(" AND resource_id = ?");
            params.push(resource_id.clone());
        }
        if let Some(action) = &filter.action {
            from_where.push_str(" AND action = ?");
            params.push(action.clone());
        }
        if let Some(from) = filter.from {
            from_where.push_str(" AND created_at >= ?");
            params.push(fmt_ts(from));
        }
        if let Some(to) = filter.to {
            from_where.push_str(" AND created_at <= ?");
            params.push(fmt_ts(to));
        }

        let (rows, total) = fetch_page::<AuditRow>(
            &self.pool,
            AUDIT_COLUMNS,
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
}

pub fn create_audit_log_repository(pool: &DbPool) -> Box<dyn AuditLogRepository> {
    Box::new(SqliteAuditLogRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: String,
    user_id: Option<String>,
    action: String,
    resource_type: Option<String>,
    resource_id: Option<String>,
    method: String,
    path: String,
    status_code: i64,
    ip_address: Option<String>,
    user_agent: Option<String>,
    details: Option<String>,
    created_at: String,
}

impl TryFrom<AuditRow> for AuditLog {
    type Error = DbError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let details = row
            .details
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(AuditLog {
            id: parse_uuid(&row.id)?,
            user_id: parse_opt_uuid(row.user_id)?,
            action: row.action,
            resource_type: row.resource_type,
            resource_id: row.resource_id,
            method: row.method,
            path: row.path,
            status_code: row.status_code,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            details,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::test_pool;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_and_filter() {
        let pool = test_pool().await;
        let repo = create_audit_log_repository(&pool);

        let mut create = AuditLog::new("policies.create", "POST", "/api/v1/policies");
        create.resource_type = Some("policies".into());
        create.status_code = 201;
        create.details = Some(json!({"title": "Privacy", "password": "[REDACTED]"}));
        repo.insert(&create).await.unwrap();

        let mut delete = AuditLog::new("assets.delete", "DELETE", "/api/v1/assets/1");
        delete.resource_type = Some("assets".into());
        delete.resource_id = Some("1".into());
        delete.status_code = 204;
        repo.insert(&delete).await.unwrap();

        let filter = AuditLogFilter {
            resource_type: Some("policies".into()),
            ..Default::default()
        };
        let page = repo.list(&filter, &Pagination::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].details, create.details);

        let all = repo
            .list(&AuditLogFilter::default(), &Pagination::default())
            .await
            .unwrap();
        assert_eq!(all.total, 2);
    }
}
