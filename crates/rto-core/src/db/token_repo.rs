//! Refresh token storage. Tokens are looked up by their SHA-256 hash.

use super::rows::{fmt_opt_ts, fmt_ts, parse_opt_ts, parse_ts, parse_uuid};
use super::{DbError, DbPool};
use crate::auth::RefreshToken;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn create(&self, token: &RefreshToken) -> Result<(), DbError>;

    async fn get_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, DbError>;

    /// Revokes one token. Returns false if it was unknown or already revoked.
    async fn revoke(&self, id: Uuid) -> Result<bool, DbError>;

    /// Revokes every live token for a user and returns how many were revoked.
    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, DbError>;

    /// Deletes tokens that expired before `before`.
    async fn delete_expired(&self, before: DateTime<Utc>) -> Result<u64, DbError>;
}

pub struct SqliteRefreshTokenRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteRefreshTokenRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenRepository for SqliteRefreshTokenRepository {
    async fn create(&self, token: &RefreshToken) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, revoked_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(token.id.to_string())
        .bind(token.user_id.to_string())
        .bind(&token.token_hash)
        .bind(fmt_ts(token.expires_at))
        .bind(fmt_opt_ts(token.revoked_at))
        .bind(fmt_ts(token.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, DbError> {
        let row: Option<TokenRow> = sqlx::query_as(
            "SELECT id, user_id, token_hash, expires_at, revoked_at, created_at FROM refresh_tokens WHERE token_hash = ?",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn revoke(&self, id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = ? WHERE id = ? AND revoked_at IS NULL",
        )
        .bind(fmt_ts(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, DbError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = ? WHERE user_id = ? AND revoked_at IS NULL",
        )
        .bind(fmt_ts(Utc::now()))
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired(&self, before: DateTime<Utc>) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < ?")
            .bind(fmt_ts(before))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

pub fn create_refresh_token_repository(pool: &DbPool) -> Box<dyn RefreshTokenRepository> {
    Box::new(SqliteRefreshTokenRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    id: String,
    user_id: String,
    token_hash: String,
    expires_at: String,
    revoked_at: Option<String>,
    created_at: String,
}

impl TryFrom<TokenRow> for RefreshToken {
    type Error = DbError;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        Ok(RefreshToken {
            id: parse_uuid(&row.id)?,
            user_id: parse_uuid(&row.user_id)?,
            token_hash: row.token_hash,
            expires_at: parse_ts(&row.expires_at)?,
            revoked_at: parse_opt_ts(row.revoked_at)?,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}
