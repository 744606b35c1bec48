//! Standards repository.

use super::rows::{fetch_page, fmt_ts, merge, parse_opt_ts, parse_ts, parse_uuid};
use super::{make_like_pattern, DbError, DbPool, PaginatedResult, Pagination};
use crate::models::{Standard, StandardFilter, StandardUpdate};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

pub(crate) const STANDARD_COLUMNS: &str =
    "id, code, title, description, category, created_at, updated_at, deleted_at";

#[async_trait]
pub trait StandardRepository: Send + Sync {
    async fn create(&self, standard: &Standard) -> Result<Standard, DbError>;

    async fn get(&self, id: Uuid) -> Result<Option<Standard>, DbError>;

    async fn list(
        &self,
        filter: &StandardFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Standard>, DbError>;

    /// Every live standard ordered by code.
    async fn list_all(&self) -> Result<Vec<Standard>, DbError>;

    async fn update(&self, id: Uuid, update: &StandardUpdate) -> Result<Standard, DbError>;

    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;
}

pub struct SqliteStandardRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteStandardRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StandardRepository for SqliteStandardRepository {
    async fn create(&self, standard: &Standard) -> Result<Standard, DbError> {
        sqlx::query(
            r#"
            INSERT INTO standards (id, code, title, description, category, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(standard.id.to_string())
        .bind(&standard.code)
        .bind(&standard.title)
        .bind(&standard.description)
        .bind(&standard.category)
        .bind(fmt_ts(standard.created_at))
        .bind(fmt_ts(standard.updated_at))
        .execute(&self.pool)
        .await?;

        self.get(standard.id)
            .await?
            .ok_or_else(|| DbError::not_found("Standard", standard.id))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Standard>, DbError> {
        let sql = format!(
            "SELECT {} FROM standards WHERE id = ? AND deleted_at IS NULL",
            STANDARD_COLUMNS
        );
        let row: Option<StandardRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(
        &self,
        filter: &StandardFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Standard>, DbError> {
        let mut from_where = String::from("standards WHERE deleted_at IS NULL");
        let mut params = Vec::new();

        if let Some(category) = &filter.category {
            from_where.push_str(" AND category = ? COLLATE NOCASE");
            params.push(category.clone());
        }
        if let Some(search) = &filter.search {
            from_where.push_str(" AND (code LIKE ? ESCAPE '\\' OR title LIKE ? ESCAPE '\\')");
            let pattern = make_like_pattern(search);
            params.extend([pattern.clone(), pattern]);
        }

        let (rows, total) = fetch_page::<StandardRow>(
            &self.pool,
            STANDARD_COLUMNS,
            &from_where,
            "code ASC",
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

    async fn list_all(&self) -> Result<Vec<Standard>, DbError> {
        let sql = format!(
            "SELECT {} FROM standards WHERE deleted_at IS NULL ORDER BY code ASC",
            STANDARD_COLUMNS
        );
        let rows: Vec<StandardRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update(&self, id: Uuid, update: &StandardUpdate) -> Result<Standard, DbError> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Standard", id))?;

        sqlx::query(
            "UPDATE standards SET code = ?, title = ?, description = ?, category = ?, updated_at = ? WHERE id = ?",
        )
        .bind(merge(&update.code, &existing.code))
        .bind(merge(&update.title, &existing.title))
        .bind(merge(&update.description, &existing.description))
        .bind(merge(&update.category, &existing.category))
        .bind(fmt_ts(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Standard", id))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        let now = fmt_ts(Utc::now());
        let result = sqlx::query(
            "UPDATE standards SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&now)
        .bind(&now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

pub fn create_standard_repository(pool: &DbPool) -> Box<dyn StandardRepository> {
    Box::new(SqliteStandardRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
pub(crate) struct StandardRow {
    id: String,
    code: String,
    title: String,
    description: Option<String>,
    category: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

impl TryFrom<StandardRow> for Standard {
    type Error = DbError;

    fn try_from(row: StandardRow) -> Result<Self, Self::Error> {
        Ok(Standard {
            id: parse_uuid(&row.id)?,
            code: row.code,
            title: row.title,
            description: row.description,
            category: row.category,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
            deleted_at: parse_opt_ts(row.deleted_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::test_pool;

    #[tokio::test]
    async fn test_code_unique_until_deleted() {
        let pool = test_pool().await;
        let repo = create_standard_repository(&pool);

        let standard = repo
            .create(&Standard::new("1.8", "Assessment is conducted in accordance with the principles"))
            .await
            .unwrap();
        let err = repo.create(&Standard::new("1.8", "Again")).await.unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)));

        assert!(repo.delete(standard.id).await.unwrap());
        repo.create(&Standard::new("1.8", "Replacement")).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_by_category() {
        let pool = test_pool().await;
        let repo = create_standard_repository(&pool);

        let mut training = Standard::new("1.1", "Training and assessment strategies");
        training.category = Some("Training".into());
        repo.create(&training).await.unwrap();
        repo.create(&Standard::new("5.1", "Information to learners")).await.unwrap();

        let filter = StandardFilter {
            category: Some("training".into()),
            ..Default::default()
        };
        let page = repo.list(&filter, &Pagination::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].code, "1.1");
        assert_eq!(repo.list_all().await.unwrap().len(), 2);
    }
}
