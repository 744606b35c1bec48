//! Database seeding.
//!
//! Runs on every startup: system roles are created if missing and their
//! permission sets are brought up to date, and the first admin account is
//! created on an empty database.

use super::{create_role_repository, create_user_repository, DbError, DbPool};
use crate::auth::password::{generate_password, hash_password, PasswordError};
use crate::auth::{system_role_permissions, system_roles, Role, User};
use thiserror::Error;
use tracing::{info, warn};

/// Email of the bootstrap admin account.
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@localhost";

const GENERATED_PASSWORD_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum SeedError {
    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("System role '{0}' is missing")]
    MissingRole(&'static str),
}

/// Creates missing system roles and resets the permissions of existing ones.
///
/// Returns the number of roles created.
pub async fn ensure_default_roles(pool: &DbPool) -> Result<usize, SeedError> {
    let roles = create_role_repository(pool);
    let mut created = 0;

    for name in system_roles::ALL {
        let Some(permissions) = system_role_permissions(name) else {
            continue;
        };

        match roles.get_by_name(name).await? {
            Some(existing) => {
                if existing.permissions != permissions {
                    roles.set_permissions(existing.id, &permissions).await?;
                    info!(role = name, "Synced system role permissions");
                }
            }
            None => {
                let mut role = Role::new(name, Some(describe(name).to_string()), permissions);
                role.is_system = true;
                roles.create(&role).await?;
                created += 1;
                info!(role = name, "Created system role");
            }
        }
    }

    Ok(created)
}

/// Creates the `admin@localhost` account when the database has no users.
///
/// The password comes from `RTO_ADMIN_PASSWORD`; otherwise one is generated
/// and returned so the caller can show it once. Returns `Ok(None)` when users
/// already exist.
pub async fn ensure_admin_user(pool: &DbPool) -> Result<Option<String>, SeedError> {
    let users = create_user_repository(pool);

    if users.any_exist().await? {
        info!("Users already exist, skipping admin seed");
        return Ok(None);
    }

    let admin_role = create_role_repository(pool)
        .get_by_name(system_roles::ADMIN)
        .await?
        .ok_or(SeedError::MissingRole(system_roles::ADMIN))?;

    let password = match std::env::var("RTO_ADMIN_PASSWORD") {
        Ok(p) if !p.is_empty() => p,
        _ => {
            warn!("No RTO_ADMIN_PASSWORD set, generated random password");
            generate_password(GENERATED_PASSWORD_LEN)
        }
    };

    let admin = User::new(
        DEFAULT_ADMIN_EMAIL,
        "System",
        "Administrator",
        hash_password(&password)?,
        admin_role.id,
    );
    users.create(&admin).await?;

    info!(email = DEFAULT_ADMIN_EMAIL, "Created default admin user");
    Ok(Some(password))
}

fn describe(name: &str) -> &'static str {
    match name {
        system_roles::ADMIN => "Full access to every resource",
        system_roles::COMPLIANCE_MANAGER => "Manages the compliance register",
        system_roles::TRAINER => "Delivers training and maintains PD",
        _ => "Read access to policies and training",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;
    use crate::auth::Permission;
    use crate::db::testing::test_pool;

    #[tokio::test]
    async fn test_default_roles_are_idempotent() {
        let pool = test_pool().await;
        assert_eq!(ensure_default_roles(&pool).await.unwrap(), 0);

        let roles = create_role_repository(&pool);
        let staff = roles.get_by_name("staff").await.unwrap().unwrap();
        roles
            .set_permissions(staff.id, &[Permission::AuditRead].into_iter().collect())
            .await
            .unwrap();

        ensure_default_roles(&pool).await.unwrap();
        let synced = roles.get_by_name("staff").await.unwrap().unwrap();
        assert_eq!(Some(synced.permissions), system_role_permissions("staff"));
    }

    #[tokio::test]
    async fn test_admin_created_once() {
        let pool = test_pool().await;

        let password = ensure_admin_user(&pool).await.unwrap().unwrap();
        let admin = create_user_repository(&pool)
            .get_by_email(DEFAULT_ADMIN_EMAIL)
            .await
            .unwrap()
            .unwrap();
        assert!(verify_password(&password, &admin.password_hash).unwrap());

        assert!(ensure_admin_user(&pool).await.unwrap().is_none());
    }
}
