//! Embedded schema migrations.

use super::{DbError, DbPool};
use tracing::info;

/// Applies any pending migrations from `src/db/migrations/sqlite`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    info!("Running SQLite migrations");
    sqlx::migrate!("src/db/migrations/sqlite")
        .run(pool.inner())
        .await?;
    info!("Migrations completed successfully");
    Ok(())
}
