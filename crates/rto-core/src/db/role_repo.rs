//! Role repository. Permissions live in `role_permissions`, one row each.

use super::rows::{fmt_ts, merge, parse_ts, parse_uuid};
use super::{DbError, DbPool};
use crate::auth::{Permission, Role, RoleUpdate};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeSet;
use tracing::warn;
use uuid::Uuid;

#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn create(&self, role: &Role) -> Result<Role, DbError>;

    async fn get(&self, id: Uuid) -> Result<Option<Role>, DbError>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Role>, DbError>;

    /// All roles, system roles first.
    async fn list(&self) -> Result<Vec<Role>, DbError>;

    async fn update(&self, id: Uuid, update: &RoleUpdate) -> Result<Role, DbError>;

    /// Replaces the permission set of a role.
    async fn set_permissions(
        &self,
        id: Uuid,
        permissions: &BTreeSet<Permission>,
    ) -> Result<(), DbError>;

    /// Removes a role. Callers are responsible for refusing system roles and
    /// roles still held by users.
    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;
}

pub struct SqliteRoleRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteRoleRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_permissions(&self, role_id: &str) -> Result<BTreeSet<Permission>, DbError> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT permission FROM role_permissions WHERE role_id = ?")
                .bind(role_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(names
            .into_iter()
            .filter_map(|name| match name.parse::<Permission>() {
                Ok(p) => Some(p),
                Err(_) => {
                    warn!(role_id, permission = %name, "Ignoring unknown stored permission");
                    None
                }
            })
            .collect())
    }

    async fn hydrate(&self, row: RoleRow) -> Result<Role, DbError> {
        let permissions = self.load_permissions(&row.id).await?;
        Ok(Role {
            id: parse_uuid(&row.id)?,
            name: row.name,
            description: row.description,
            is_system: row.is_system,
            permissions,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

async fn write_permissions(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    role_id: &str,
    permissions: &BTreeSet<Permission>,
) -> Result<(), DbError> {
    sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
        .bind(role_id)
        .execute(&mut **tx)
        .await?;

    for permission in permissions {
        sqlx::query("INSERT INTO role_permissions (role_id, permission) VALUES (?, ?)")
            .bind(role_id)
            .bind(permission.as_str())
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl RoleRepository for SqliteRoleRepository {
    async fn create(&self, role: &Role) -> Result<Role, DbError> {
        let id = role.id.to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO roles (id, name, description, is_system, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.is_system)
        .bind(fmt_ts(role.created_at))
        .bind(fmt_ts(role.updated_at))
        .execute(&mut *tx)
        .await?;

        write_permissions(&mut tx, &id, &role.permissions).await?;
        tx.commit().await?;

        self.get(role.id)
            .await?
            .ok_or_else(|| DbError::not_found("Role", role.id))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Role>, DbError> {
        let row: Option<RoleRow> = sqlx::query_as(
            "SELECT id, name, description, is_system, created_at, updated_at FROM roles WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Role>, DbError> {
        let row: Option<RoleRow> = sqlx::query_as(
            "SELECT id, name, description, is_system, created_at, updated_at FROM roles WHERE name = ? COLLATE NOCASE",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Role>, DbError> {
        let rows: Vec<RoleRow> = sqlx::query_as(
            "SELECT id, name, description, is_system, created_at, updated_at FROM roles ORDER BY is_system DESC, name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut roles = Vec::with_capacity(rows.len());
        for row in rows {
            roles.push(self.hydrate(row).await?);
        }
        Ok(roles)
    }

    async fn update(&self, id: Uuid, update: &RoleUpdate) -> Result<Role, DbError> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Role", id))?;

        let name = merge(&update.name, &existing.name);
        let description = merge(&update.description, &existing.description);
        let id_str = id.to_string();

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE roles SET name = ?, description = ?, updated_at = ? WHERE id = ?")
            .bind(&name)
            .bind(&description)
            .bind(fmt_ts(Utc::now()))
            .bind(&id_str)
            .execute(&mut *tx)
            .await?;

        if let Some(permissions) = &update.permissions {
            write_permissions(&mut tx, &id_str, permissions).await?;
        }
        tx.commit().await?;

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Role", id))
    }

    async fn set_permissions(
        &self,
        id: Uuid,
        permissions: &BTreeSet<Permission>,
    ) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        write_permissions(&mut tx, &id.to_string(), permissions).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM roles WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

pub fn create_role_repository(pool: &DbPool) -> Box<dyn RoleRepository> {
    Box::new(SqliteRoleRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct RoleRow {
    id: String,
    name: String,
    description: Option<String>,
    is_system: bool,
    created_at: String,
    updated_at: String,
}
