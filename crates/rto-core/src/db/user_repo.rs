//! User repository for database operations.

use super::rows::{fetch_page, fmt_opt_ts, fmt_ts, merge, parse_opt_ts, parse_ts, parse_uuid};
use super::{make_like_pattern, DbError, DbPool, PaginatedResult, Pagination};
use crate::auth::{User, UserFilter, UserUpdate};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, first_name, last_name, password_hash, role_id, department, \
     position, phone, is_active, last_login_at, created_at, updated_at, deleted_at";

/// Repository trait for user persistence. Soft-deleted users are invisible
/// to every read.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<User, DbError>;

    async fn get(&self, id: Uuid) -> Result<Option<User>, DbError>;

    /// Looks up a user by email, case-insensitively.
    async fn get_by_email(&self, email: &str) -> Result<Option<User>, DbError>;

    async fn list(
        &self,
        filter: &UserFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<User>, DbError>;

    /// All active users, ordered by name.
    async fn list_active(&self) -> Result<Vec<User>, DbError>;

    async fn update(&self, id: Uuid, update: &UserUpdate) -> Result<User, DbError>;

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), DbError>;

    async fn update_last_login(&self, id: Uuid) -> Result<(), DbError>;

    /// Soft-deletes a user. Returns false when no live user matched.
    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;

    /// Users holding the role. Soft-deleted rows still reference it.
    async fn count_by_role(&self, role_id: Uuid) -> Result<RoleUsage, DbError>;

    /// Whether any live user exists (for initial setup).
    async fn any_exist(&self) -> Result<bool, DbError>;
}

/// Users referencing a role, split by soft-deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleUsage {
    pub active: u64,
    pub deleted: u64,
}

impl RoleUsage {
    pub fn total(&self) -> u64 {
        self.active + self.deleted
    }
}

pub struct SqliteUserRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create(&self, user: &User) -> Result<User, DbError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, first_name, last_name, password_hash, role_id, department,
                               position, phone, is_active, last_login_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(user.email.to_lowercase())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(user.role_id.to_string())
        .bind(&user.department)
        .bind(&user.position)
        .bind(&user.phone)
        .bind(user.is_active)
        .bind(fmt_opt_ts(user.last_login_at))
        .bind(fmt_ts(user.created_at))
        .bind(fmt_ts(user.updated_at))
        .execute(&self.pool)
        .await?;

        self.get(user.id)
            .await?
            .ok_or_else(|| DbError::not_found("User", user.id))
    }

    async fn get(&self, id: Uuid) -> Result<Option<User>, DbError> {
        let sql = format!(
            "SELECT {} FROM users WHERE id = ? AND deleted_at IS NULL",
            USER_COLUMNS
        );
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let sql = format!(
            "SELECT {} FROM users WHERE email = ? AND deleted_at IS NULL",
            USER_COLUMNS
        );
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(
        &self,
        filter: &UserFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<User>, DbError> {
        let mut from_where = String::from("users WHERE deleted_at IS NULL");
        let mut params: Vec<String> = Vec::new();

        if let Some(role_id) = filter.role_id {
            from_where.push_str(" AND role_id = ?");
            params.push(role_id.to_string());
        }

        if let Some(department) = &filter.department {
            from_where.push_str(" AND department = ? COLLATE NOCASE");
            params.push(department.clone());
        }

        if let Some(is_active) = filter.is_active {
            from_where.push_str(if is_active {
                " AND is_active = 1"
            } else {
                " AND is_active = 0"
            });
        }

        if let Some(search) = &filter.search {
            from_where.push_str(
                " AND (email LIKE ? ESCAPE '\\' OR first_name LIKE ? ESCAPE '\\' OR last_name LIKE ? ESCAPE '\\')",
            );
            let pattern = make_like_pattern(search);
            params.extend([pattern.clone(), pattern.clone(), pattern]);
        }

        let (rows, total) = fetch_page::<UserRow>(
            &self.pool,
            USER_COLUMNS,
            &from_where,
            "last_name ASC, first_name ASC",
            &params,
            pagination,
        )
        .await?;

        let users = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<User>, DbError>>()?;

        Ok(PaginatedResult::new(users, total, pagination))
    }

    async fn list_active(&self) -> Result<Vec<User>, DbError> {
        let sql = format!(
            "SELECT {} FROM users WHERE deleted_at IS NULL AND is_active = 1 ORDER BY last_name, first_name",
            USER_COLUMNS
        );
        let rows: Vec<UserRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update(&self, id: Uuid, update: &UserUpdate) -> Result<User, DbError> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("User", id))?;

        let email = update
            .email
            .as_ref()
            .map(|e| e.trim().to_lowercase())
            .unwrap_or(existing.email);
        let first_name = merge(&update.first_name, &existing.first_name);
        let last_name = merge(&update.last_name, &existing.last_name);
        let role_id = update.role_id.unwrap_or(existing.role_id);
        let department = merge(&update.department, &existing.department);
        let position = merge(&update.position, &existing.position);
        let phone = merge(&update.phone, &existing.phone);
        let is_active = update.is_active.unwrap_or(existing.is_active);

        sqlx::query(
            r#"
            UPDATE users SET email = ?, first_name = ?, last_name = ?, role_id = ?, department = ?,
                             position = ?, phone = ?, is_active = ?, updated_at = ?
            WHERE id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(&email)
        .bind(&first_name)
        .bind(&last_name)
        .bind(role_id.to_string())
        .bind(&department)
        .bind(&position)
        .bind(&phone)
        .bind(is_active)
        .bind(fmt_ts(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("User", id))
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), DbError> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(password_hash)
        .bind(fmt_ts(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", id));
        }
        Ok(())
    }

    async fn update_last_login(&self, id: Uuid) -> Result<(), DbError> {
        sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
            .bind(fmt_ts(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        let now = fmt_ts(Utc::now());
        let result = sqlx::query(
            "UPDATE users SET deleted_at = ?, is_active = 0, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&now)
        .bind(&now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_by_role(&self, role_id: Uuid) -> Result<RoleUsage, DbError> {
        let (active, deleted): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(CASE WHEN deleted_at IS NULL THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN deleted_at IS NOT NULL THEN 1 ELSE 0 END), 0)
            FROM users WHERE role_id = ?
            "#,
        )
        .bind(role_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(RoleUsage {
            active: active.max(0) as u64,
            deleted: deleted.max(0) as u64,
        })
    }

    async fn any_exist(&self) -> Result<bool, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE deleted_at IS NULL")
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }
}

/// Factory function to create a user repository.
pub fn create_user_repository(pool: &DbPool) -> Box<dyn UserRepository> {
    Box::new(SqliteUserRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    first_name: String,
    last_name: String,
    password_hash: String,
    role_id: String,
    department: Option<String>,
    position: Option<String>,
    phone: Option<String>,
    is_active: bool,
    last_login_at: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

impl TryFrom<UserRow> for User {
    type Error = DbError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: parse_uuid(&row.id)?,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            password_hash: row.password_hash,
            role_id: parse_uuid(&row.role_id)?,
            department: row.department,
            position: row.position,
            phone: row.phone,
            is_active: row.is_active,
            last_login_at: parse_opt_ts(row.last_login_at)?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
            deleted_at: parse_opt_ts(row.deleted_at)?,
        })
    }
}
