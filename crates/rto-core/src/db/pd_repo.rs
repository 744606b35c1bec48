//! Professional development items.

use super::filters::push_pd_status;
use super::rows::{
    fetch_page, fmt_opt_ts, fmt_ts, merge, parse_enum, parse_opt_ts, parse_ts, parse_uuid,
};
use super::{make_like_pattern, DbError, DbPool, PaginatedResult, Pagination};
use crate::models::{PdItem, PdItemFilter, PdItemUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

const PD_COLUMNS: &str = "id, user_id, title, activity_type, provider, hours, due_at, completed_at, \
     evidence_url, notes, created_at, updated_at, deleted_at";

#[async_trait]
pub trait PdItemRepository: Send + Sync {
    async fn create(&self, item: &PdItem) -> Result<PdItem, DbError>;

    async fn get(&self, id: Uuid) -> Result<Option<PdItem>, DbError>;

    async fn list(
        &self,
        filter: &PdItemFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<PdItem>, DbError>;

    /// Every live item matching `filter`, for reports and reminders.
    async fn list_all(&self, filter: &PdItemFilter) -> Result<Vec<PdItem>, DbError>;

    async fn update(&self, id: Uuid, update: &PdItemUpdate) -> Result<PdItem, DbError>;

    /// Marks an item completed at `completed_at`.
    async fn complete(&self, id: Uuid, completed_at: DateTime<Utc>) -> Result<PdItem, DbError>;

    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;
}

pub struct SqlitePdItemRepository {
    pool: sqlx::SqlitePool,
}

impl SqlitePdItemRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    fn where_clause(filter: &PdItemFilter) -> (String, Vec<String>) {
        let mut from_where = String::from("pd_items WHERE deleted_at IS NULL");
        let mut params = Vec::new();

        if let Some(user_id) = filter.user_id {
            from_where.push_str(" AND user_id = ?");
            params.push(user_id.to_string());
        }
        if let Some(activity_type) = filter.activity_type {
            from_where.push_str(" AND activity_type = ?");
            params.push(activity_type.as_str().to_string());
        }
        if let Some(status) = filter.status {
            push_pd_status(&mut from_where, &mut params, status, Utc::now());
        }
        if let Some(search) = &filter.search {
            from_where.push_str(" AND (title LIKE ? ESCAPE '\\' OR provider LIKE ? ESCAPE '\\')");
            let pattern = make_like_pattern(search);
            params.extend([pattern.clone(), pattern]);
        }

        (from_where, params)
    }
}

#[async_trait]
impl PdItemRepository for SqlitePdItemRepository {
    async fn create(&self, item: &PdItem) -> Result<PdItem, DbError> {
        sqlx::query(
            r#"
            INSERT INTO pd_items (id, user_id, title, activity_type, provider, hours, due_at, completed_at,
                                  evidence_url, notes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item.id.to_string())
        .bind(item.user_id.to_string())
        .bind(&item.title)
        .bind(item.activity_type.as_str())
        .bind(&item.provider)
        .bind(item.hours)
        .bind(fmt_opt_ts(item.due_at))
        .bind(fmt_opt_ts(item.completed_at))
        .bind(&item.evidence_url)
        .bind(&item.notes)
        .bind(fmt_ts(item.created_at))
        .bind(fmt_ts(item.updated_at))
        .execute(&self.pool)
        .await?;

        self.get(item.id)
            .await?
            .ok_or_else(|| DbError::not_found("PdItem", item.id))
    }

    async fn get(&self, id: Uuid) -> Result<Option<PdItem>, DbError> {
        let sql = format!(
            "SELECT {} FROM pd_items WHERE id = ? AND deleted_at IS NULL",
            PD_COLUMNS
        );
        let row: Option<PdRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list(
        &self,
        filter: &PdItemFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<PdItem>, DbError> {
        let (from_where, params) = Self::where_clause(filter);
        let (rows, total) = fetch_page::<PdRow>(
            &self.pool,
            PD_COLUMNS,
            &from_where,
            "due_at IS NULL, due_at ASC, created_at DESC",
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

    async fn list_all(&self, filter: &PdItemFilter) -> Result<Vec<PdItem>, DbError> {
        let (from_where, params) = Self::where_clause(filter);
        let sql = format!(
            "SELECT {} FROM {} ORDER BY user_id ASC, due_at IS NULL, due_at ASC",
            PD_COLUMNS, from_where
        );
        let mut query = sqlx::query_as::<_, PdRow>(&sql);
        for param in &params {
            query = query.bind(param.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update(&self, id: Uuid, update: &PdItemUpdate) -> Result<PdItem, DbError> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("PdItem", id))?;

        sqlx::query(
            r#"
            UPDATE pd_items SET title = ?, activity_type = ?, provider = ?, hours = ?, due_at = ?,
                                completed_at = ?, evidence_url = ?, notes = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(merge(&update.title, &existing.title))
        .bind(update.activity_type.unwrap_or(existing.activity_type).as_str())
        .bind(merge(&update.provider, &existing.provider))
        .bind(update.hours.unwrap_or(existing.hours))
        .bind(fmt_opt_ts(merge(&update.due_at, &existing.due_at)))
        .bind(fmt_opt_ts(merge(&update.completed_at, &existing.completed_at)))
        .bind(merge(&update.evidence_url, &existing.evidence_url))
        .bind(merge(&update.notes, &existing.notes))
        .bind(fmt_ts(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("PdItem", id))
    }

    async fn complete(&self, id: Uuid, completed_at: DateTime<Utc>) -> Result<PdItem, DbError> {
        let result = sqlx::query(
            "UPDATE pd_items SET completed_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(fmt_ts(completed_at))
        .bind(fmt_ts(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PdItem", id));
        }
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("PdItem", id))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        let now = fmt_ts(Utc::now());
        let result = sqlx::query(
            "UPDATE pd_items SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&now)
        .bind(&now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

pub fn create_pd_item_repository(pool: &DbPool) -> Box<dyn PdItemRepository> {
    Box::new(SqlitePdItemRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct PdRow {
    id: String,
    user_id: String,
    title: String,
    activity_type: String,
    provider: Option<String>,
    hours: f64,
    due_at: Option<String>,
    completed_at: Option<String>,
    evidence_url: Option<String>,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

impl TryFrom<PdRow> for PdItem {
    type Error = DbError;

    fn try_from(row: PdRow) -> Result<Self, Self::Error> {
        Ok(PdItem {
            id: parse_uuid(&row.id)?,
            user_id: parse_uuid(&row.user_id)?,
            title: row.title,
            activity_type: parse_enum(&row.activity_type)?,
            provider: row.provider,
            hours: row.hours,
            due_at: parse_opt_ts(row.due_at)?,
            completed_at: parse_opt_ts(row.completed_at)?,
            evidence_url: row.evidence_url,
            notes: row.notes,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
            deleted_at: parse_opt_ts(row.deleted_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{insert_user, test_pool};
    use crate::models::ActivityType;
    use crate::status::PdStatus;
    use chrono::Duration;

    #[tokio::test]
    async fn test_status_filter_matches_derived_status() {
        let pool = test_pool().await;
        let repo = create_pd_item_repository(&pool);
        let user = insert_user(&pool, "pd@example.com").await;
        let now = Utc::now();

        let mut overdue = PdItem::new(user.id, "Assessment validation", ActivityType::Workshop);
        overdue.due_at = Some(now - Duration::days(3));
        let mut due = PdItem::new(user.id, "LLN refresher", ActivityType::Course);
        due.due_at = Some(now + Duration::days(10));
        let planned = PdItem::new(user.id, "Industry visit", ActivityType::IndustryPlacement);
        let mut done = PdItem::new(user.id, "Conference", ActivityType::Conference);
        done.completed_at = Some(now - Duration::days(1));

        for item in [&overdue, &due, &planned, &done] {
            repo.create(item).await.unwrap();
        }

        for (status, expected) in [
            (PdStatus::Overdue, "Assessment validation"),
            (PdStatus::Due, "LLN refresher"),
            (PdStatus::Planned, "Industry visit"),
            (PdStatus::Completed, "Conference"),
        ] {
            let filter = PdItemFilter {
                status: Some(status),
                ..Default::default()
            };
            let items = repo.list_all(&filter).await.unwrap();
            assert_eq!(items.len(), 1, "{:?}", status);
            assert_eq!(items[0].title, expected);
            assert_eq!(items[0].status(Utc::now()), status);
        }
    }

    #[tokio::test]
    async fn test_complete_and_clear() {
        let pool = test_pool().await;
        let repo = create_pd_item_repository(&pool);
        let user = insert_user(&pool, "pd2@example.com").await;

        let item = repo
            .create(&PdItem::new(user.id, "Reading", ActivityType::Reading))
            .await
            .unwrap();
        let completed = repo.complete(item.id, Utc::now()).await.unwrap();
        assert!(completed.completed_at.is_some());

        let cleared = repo
            .update(
                item.id,
                &PdItemUpdate {
                    completed_at: Some(None),
                    hours: Some(2.5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(cleared.completed_at.is_none());
        assert_eq!(cleared.hours, 2.5);

        assert!(repo.delete(item.id).await.unwrap());
        assert!(matches!(
            repo.complete(item.id, Utc::now()).await,
            Err(DbError::NotFound { .. })
        ));
    }
}
