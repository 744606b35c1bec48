//! Migrate and seed commands.

use anyhow::{Context, Result};
use colored::Colorize;
use rto_core::db::{
    create_pool, ensure_admin_user, ensure_default_roles, run_migrations, DbPool,
    DEFAULT_ADMIN_EMAIL,
};

const ADMIN_PASSWORD_ENV: &str = "RTO_ADMIN_PASSWORD";

/// Opens the pool and brings the schema up to date.
pub async fn prepare_database(database_url: &str) -> Result<DbPool> {
    println!("  {} Database: {}", "→".green(), database_url);
    let db_pool = create_pool(database_url)
        .await
        .context("Failed to create database connection pool")?;

    println!("  {} Running migrations...", "→".green());
    run_migrations(&db_pool)
        .await
        .context("Failed to run database migrations")?;
    println!("  {} Migrations complete", "✓".green());

    seed(&db_pool).await?;
    Ok(db_pool)
}

pub async fn cmd_migrate(database_url: &str) -> Result<()> {
    let db_pool = create_pool(database_url)
        .await
        .context("Failed to create database connection pool")?;
    run_migrations(&db_pool)
        .await
        .context("Failed to run database migrations")?;
    db_pool.close().await;

    println!("{} Database is up to date", "✓".green());
    Ok(())
}

pub async fn cmd_seed(database_url: &str) -> Result<()> {
    let db_pool = prepare_database(database_url).await?;
    db_pool.close().await;
    Ok(())
}

/// Creates missing system roles and, on an empty database, the admin user.
async fn seed(db_pool: &DbPool) -> Result<()> {
    let created = ensure_default_roles(db_pool)
        .await
        .context("Failed to create default roles")?;
    if created > 0 {
        println!("  {} Created {} system roles", "✓".green(), created);
    }

    let Some(password) = ensure_admin_user(db_pool)
        .await
        .context("Failed to create admin user")?
    else {
        return Ok(());
    };

    println!(
        "  {} Created admin user {}",
        "✓".green(),
        DEFAULT_ADMIN_EMAIL.bold()
    );
    let from_env = std::env::var(ADMIN_PASSWORD_ENV).is_ok_and(|p| !p.is_empty());
    if !from_env {
        println!();
        println!("  {} {}", "Generated password:".yellow().bold(), password);
        println!(
            "  {}",
            "It is shown only once. Change it after the first login.".yellow()
        );
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rto_core::db::create_role_repository;

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("seed.db").display()
        );

        let pool = prepare_database(&url).await.unwrap();
        let roles = create_role_repository(&pool).list().await.unwrap();
        assert_eq!(roles.len(), rto_core::auth::system_roles::ALL.len());

        // A second run creates nothing new.
        seed(&pool).await.unwrap();
        assert_eq!(
            create_role_repository(&pool).list().await.unwrap().len(),
            roles.len()
        );
        pool.close().await;
    }

    #[tokio::test]
    async fn test_migrate_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migrate.db");
        let url = format!("sqlite://{}?mode=rwc", path.display());

        cmd_migrate(&url).await.unwrap();
        assert!(path.exists());
    }
}
