//! Credential repository.

use super::filters::{push_credential_status, push_expiring_within};
use super::rows::{
    fetch_page, fmt_opt_ts, fmt_ts, merge, parse_enum, parse_opt_ts, parse_ts, parse_uuid,
};
use super::{make_like_pattern, DbError, DbPool, PaginatedResult, Pagination};
use crate::models::{Credential, CredentialFilter, CredentialUpdate};
use crate::status::CredentialStatus;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

const CREDENTIAL_COLUMNS: &str = "id, user_id, name, credential_type, issuer, credential_number, \
     issued_at, expires_at, manual_status, evidence_url, notes, created_at, updated_at, deleted_at";

#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn create(&self, credential: &Credential) -> Result<Credential, DbError>;

    async fn get(&self, id: Uuid) -> Result<Option<Credential>, DbError>;

    async fn list(
        &self,
        filter: &CredentialFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Credential>, DbError>;

    /// Every live credential matching the filter, soonest expiry first.
    async fn list_all(&self, filter: &CredentialFilter) -> Result<Vec<Credential>, DbError>;

    async fn update(&self, id: Uuid, update: &CredentialUpdate) -> Result<Credential, DbError>;

    /// Marks the credential revoked. Revocation is permanent.
    async fn revoke(&self, id: Uuid) -> Result<Credential, DbError>;

    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;
}

pub struct SqliteCredentialRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteCredentialRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    fn where_clause(filter: &CredentialFilter) -> (String, Vec<String>) {
        let now = Utc::now();
        let mut from_where = String::from("credentials WHERE deleted_at IS NULL");
        let mut params = Vec::new();

        if let Some(user_id) = filter.user_id {
            from_where.push_str(" AND user_id = ?");
            params.push(user_id.to_string());
        }
        if let Some(credential_type) = filter.credential_type {
            from_where.push_str(" AND credential_type = ?");
            params.push(credential_type.as_str().to_string());
        }
        if let Some(status) = filter.status {
            push_credential_status(&mut from_where, &mut params, status, now);
        }
        if let Some(days) = filter.expiring_within_days {
            push_expiring_within(&mut from_where, &mut params, days, now);
        }
        if let Some(search) = &filter.search {
            from_where.push_str(
                " AND (name LIKE ? ESCAPE '\\' OR issuer LIKE ? ESCAPE '\\' OR credential_number LIKE ? ESCAPE '\\')",
            );
            let pattern = make_like_pattern(search);
            params.extend([pattern.clone(), pattern.clone(), pattern]);
        }

        (from_where, params)
    }
}

// NULL expiries sort last.
const EXPIRY_ORDER: &str = "expires_at IS NULL, expires_at ASC, name ASC";

#[async_trait]
impl CredentialRepository for SqliteCredentialRepository {
    async fn create(&self, credential: &Credential) -> Result<Credential, DbError> {
        sqlx::query(
            r#"
            INSERT INTO credentials (id, user_id, name, credential_type, issuer, credential_number,
                                     issued_at, expires_at, manual_status, evidence_url, notes,
                                     created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(credential.id.to_string())
        .bind(credential.user_id.to_string())
        .bind(&credential.name)
        .bind(credential.credential_type.as_str())
        .bind(&credential.issuer)
        .bind(&credential.credential_number)
        .bind(fmt_opt_ts(credential.issued_at))
        .bind(fmt_opt_ts(credential.expires_at))
        .bind(credential.manual_status.map(|s| s.as_str()))
        .bind(&credential.evidence_url)
        .bind(&credential.notes)
        .bind(fmt_ts(credential.created_at))
        .bind(fmt_ts(credential.updated_at))
        .execute(&self.pool)
        .await?;

        self.get(credential.id)
            .await?
            .ok_or_else(|| DbError::not_found("Credential", credential.id))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Credential>, DbError> {
        let sql = format!(
            "SELECT {} FROM credentials WHERE id = ? AND deleted_at IS NULL",
            CREDENTIAL_COLUMNS
        );
        let row: Option<CredentialRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(
        &self,
        filter: &CredentialFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Credential>, DbError> {
        let (from_where, params) = Self::where_clause(filter);
        let (rows, total) = fetch_page::<CredentialRow>(
            &self.pool,
            CREDENTIAL_COLUMNS,
            &from_where,
            EXPIRY_ORDER,
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

    async fn list_all(&self, filter: &CredentialFilter) -> Result<Vec<Credential>, DbError> {
        let (from_where, params) = Self::where_clause(filter);
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            CREDENTIAL_COLUMNS, from_where, EXPIRY_ORDER
        );
        let mut query = sqlx::query_as::<_, CredentialRow>(&sql);
        for param in &params {
            query = query.bind(param.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update(&self, id: Uuid, update: &CredentialUpdate) -> Result<Credential, DbError> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Credential", id))?;

        sqlx::query(
            r#"
            UPDATE credentials SET name = ?, credential_type = ?, issuer = ?, credential_number = ?,
                                   issued_at = ?, expires_at = ?, evidence_url = ?, notes = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(merge(&update.name, &existing.name))
        .bind(update.credential_type.unwrap_or(existing.credential_type).as_str())
        .bind(merge(&update.issuer, &existing.issuer))
        .bind(merge(&update.credential_number, &existing.credential_number))
        .bind(fmt_opt_ts(merge(&update.issued_at, &existing.issued_at)))
        .bind(fmt_opt_ts(merge(&update.expires_at, &existing.expires_at)))
        .bind(merge(&update.evidence_url, &existing.evidence_url))
        .bind(merge(&update.notes, &existing.notes))
        .bind(fmt_ts(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Credential", id))
    }

    async fn revoke(&self, id: Uuid) -> Result<Credential, DbError> {
        let result = sqlx::query(
            "UPDATE credentials SET manual_status = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(CredentialStatus::Revoked.as_str())
        .bind(fmt_ts(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Credential", id));
        }
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Credential", id))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        let now = fmt_ts(Utc::now());
        let result = sqlx::query(
            "UPDATE credentials SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&now)
        .bind(&now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

pub fn create_credential_repository(pool: &DbPool) -> Box<dyn CredentialRepository> {
    Box::new(SqliteCredentialRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id: String,
    user_id: String,
    name: String,
    credential_type: String,
    issuer: Option<String>,
    credential_number: Option<String>,
    issued_at: Option<String>,
    expires_at: Option<String>,
    manual_status: Option<String>,
    evidence_url: Option<String>,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

impl TryFrom<CredentialRow> for Credential {
    type Error = DbError;

    fn try_from(row: CredentialRow) -> Result<Self, Self::Error> {
        Ok(Credential {
            id: parse_uuid(&row.id)?,
            user_id: parse_uuid(&row.user_id)?,
            name: row.name,
            credential_type: parse_enum(&row.credential_type)?,
            issuer: row.issuer,
            credential_number: row.credential_number,
            issued_at: parse_opt_ts(row.issued_at)?,
            expires_at: parse_opt_ts(row.expires_at)?,
            manual_status: row
                .manual_status
                .as_deref()
                .map(parse_enum::<CredentialStatus>)
                .transpose()?,
            evidence_url: row.evidence_url,
            notes: row.notes,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
            deleted_at: parse_opt_ts(row.deleted_at)?,
        })
    }
}
