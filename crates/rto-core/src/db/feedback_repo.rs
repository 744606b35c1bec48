//! Feedback repository and the summary aggregates.

use super::rows::{
    fetch_page, fmt_ts, merge, opt_uuid, parse_enum, parse_opt_ts, parse_opt_uuid, parse_ts,
    parse_uuid,
};
use super::{make_like_pattern, DbError, DbPool, PaginatedResult, Pagination};
use crate::models::{Feedback, FeedbackFilter, FeedbackSummary, FeedbackUpdate};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

const FEEDBACK_COLUMNS: &str = "id, feedback_type, training_product_id, submitted_by, email, rating, \
     comments, is_anonymous, status, response, created_at, updated_at, deleted_at";

#[async_trait]
pub trait FeedbackRepository: Send + Sync {
    /// Stores feedback. Anonymous feedback is stripped of identifying fields
    /// before it reaches the database.
    async fn create(&self, feedback: &Feedback) -> Result<Feedback, DbError>;

    async fn get(&self, id: Uuid) -> Result<Option<Feedback>, DbError>;

    async fn list(
        &self,
        filter: &FeedbackFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Feedback>, DbError>;

    async fn update(&self, id: Uuid, update: &FeedbackUpdate) -> Result<Feedback, DbError>;

    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;

    /// Totals over the feedback matching `filter`.
    async fn summary(&self, filter: &FeedbackFilter) -> Result<FeedbackSummary, DbError>;
}

pub struct SqliteFeedbackRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteFeedbackRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    fn where_clause(filter: &FeedbackFilter) -> (String, Vec<String>) {
        let mut from_where = String::from("feedback WHERE deleted_at IS NULL");
        let mut params = Vec::new();

        if let Some(feedback_type) = filter.feedback_type {
            from_where.push_str(" AND feedback_type = ?");
            params.push(feedback_type.as_str().to_string());
        }
        if let Some(status) = filter.status {
            from_where.push_str(" AND status = ?");
            params.push(status.as_str().to_string());
        }
        if let Some(product_id) = filter.training_product_id {
            from_where.push_str(" AND training_product_id = ?");
            params.push(product_id.to_string());
        }
        if let Some(from) = filter.from {
            from_where.push_str(" AND created_at >= ?");
            params.push(fmt_ts(from));
        }
        if let Some(to) = filter.to {
            from_where.push_str(" AND created_at <= ?");
            params.push(fmt_ts(to));
        }
        if let Some(search) = &filter.search {
            from_where.push_str(" AND comments LIKE ? ESCAPE '\\'");
            params.push(make_like_pattern(search));
        }

        (from_where, params)
    }

    async fn grouped_counts(
        &self,
        column: &str,
        from_where: &str,
        params: &[String],
    ) -> Result<Vec<(String, i64)>, DbError> {
        let sql = format!(
            "SELECT {c}, COUNT(*) FROM {w} GROUP BY {c}",
            c = column,
            w = from_where
        );
        let mut query = sqlx::query_as::<_, (String, i64)>(&sql);
        for param in params {
            query = query.bind(param.as_str());
        }
        Ok(query.fetch_all(&self.pool).await?)
    }
}

#[async_trait]
impl FeedbackRepository for SqliteFeedbackRepository {
    async fn create(&self, feedback: &Feedback) -> Result<Feedback, DbError> {
        let mut feedback = feedback.clone();
        if feedback.is_anonymous {
            feedback.anonymise();
        }

        sqlx::query(
            r#"
            INSERT INTO feedback (id, feedback_type, training_product_id, submitted_by, email, rating,
                                  comments, is_anonymous, status, response, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(feedback.id.to_string())
        .bind(feedback.feedback_type.as_str())
        .bind(opt_uuid(feedback.training_product_id))
        .bind(&feedback.submitted_by)
        .bind(&feedback.email)
        .bind(feedback.rating)
        .bind(&feedback.comments)
        .bind(feedback.is_anonymous)
        .bind(feedback.status.as_str())
        .bind(&feedback.response)
        .bind(fmt_ts(feedback.created_at))
        .bind(fmt_ts(feedback.updated_at))
        .execute(&self.pool)
        .await?;

        self.get(feedback.id)
            .await?
            .ok_or_else(|| DbError::not_found("Feedback", feedback.id))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Feedback>, DbError> {
        let sql = format!(
            "SELECT {} FROM feedback WHERE id = ? AND deleted_at IS NULL",
            FEEDBACK_COLUMNS
        );
        let row: Option<FeedbackRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list(
        &self,
        filter: &FeedbackFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Feedback>, DbError> {
        let (from_where, params) = Self::where_clause(filter);
        let (rows, total) = fetch_page::<FeedbackRow>(
            &self.pool,
            FEEDBACK_COLUMNS,
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

    async fn update(&self, id: Uuid, update: &FeedbackUpdate) -> Result<Feedback, DbError> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Feedback", id))?;

        sqlx::query("UPDATE feedback SET status = ?, response = ?, updated_at = ? WHERE id = ?")
            .bind(update.status.unwrap_or(existing.status).as_str())
            .bind(merge(&update.response, &existing.response))
            .bind(fmt_ts(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Feedback", id))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        let now = fmt_ts(Utc::now());
        let result = sqlx::query(
            "UPDATE feedback SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&now)
        .bind(&now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn summary(&self, filter: &FeedbackFilter) -> Result<FeedbackSummary, DbError> {
        let (from_where, params) = Self::where_clause(filter);

        let sql = format!("SELECT COUNT(*), AVG(rating) FROM {}", from_where);
        let mut query = sqlx::query_as::<_, (i64, Option<f64>)>(&sql);
        for param in &params {
            query = query.bind(param.as_str());
        }
        let (total, average) = query.fetch_one(&self.pool).await?;

        let mut summary = FeedbackSummary {
            total: total.max(0) as u64,
            average_rating: average.map(|avg| (avg * 100.0).round() / 100.0),
            ..Default::default()
        };

        for (key, count) in self.grouped_counts("feedback_type", &from_where, &params).await? {
            summary.by_type.insert(key, count.max(0) as u64);
        }
        for (key, count) in self.grouped_counts("status", &from_where, &params).await? {
            summary.by_status.insert(key, count.max(0) as u64);
        }

        Ok(summary)
    }
}

pub fn create_feedback_repository(pool: &DbPool) -> Box<dyn FeedbackRepository> {
    Box::new(SqliteFeedbackRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct FeedbackRow {
    id: String,
    feedback_type: String,
    training_product_id: Option<String>,
    submitted_by: Option<String>,
    email: Option<String>,
    rating: Option<i64>,
    comments: String,
    is_anonymous: bool,
    status: String,
    response: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

impl TryFrom<FeedbackRow> for Feedback {
    type Error = DbError;

    fn try_from(row: FeedbackRow) -> Result<Self, Self::Error> {
        Ok(Feedback {
            id: parse_uuid(&row.id)?,
            feedback_type: parse_enum(&row.feedback_type)?,
            training_product_id: parse_opt_uuid(row.training_product_id)?,
            submitted_by: row.submitted_by,
            email: row.email,
            rating: row.rating,
            comments: row.comments,
            is_anonymous: row.is_anonymous,
            status: parse_enum(&row.status)?,
            response: row.response,
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
    use crate::models::{FeedbackStatus, FeedbackType};

    fn rated(feedback_type: FeedbackType, rating: i64) -> Feedback {
        let mut f = Feedback::new(feedback_type, "Trainer was great");
        f.rating = Some(rating);
        f
    }

    #[tokio::test]
    async fn test_anonymous_feedback_is_stripped() {
        let pool = test_pool().await;
        let repo = create_feedback_repository(&pool);

        let mut feedback = Feedback::new(FeedbackType::Learner, "Room was cold");
        feedback.submitted_by = Some("Jo".into());
        feedback.email = Some("jo@example.com".into());
        feedback.is_anonymous = true;

        let stored = repo.create(&feedback).await.unwrap();
        assert_eq!(stored.submitted_by, None);
        assert_eq!(stored.email, None);
    }

    #[tokio::test]
    async fn test_rating_out_of_range_is_rejected() {
        let pool = test_pool().await;
        let repo = create_feedback_repository(&pool);
        assert!(repo.create(&rated(FeedbackType::Learner, 6)).await.is_err());
    }

    #[tokio::test]
    async fn test_summary() {
        let pool = test_pool().await;
        let repo = create_feedback_repository(&pool);

        repo.create(&rated(FeedbackType::Learner, 5)).await.unwrap();
        repo.create(&rated(FeedbackType::Learner, 4)).await.unwrap();
        let employer = repo.create(&rated(FeedbackType::Employer, 2)).await.unwrap();
        repo.create(&Feedback::new(FeedbackType::Staff, "No rating")).await.unwrap();

        repo.update(
            employer.id,
            &FeedbackUpdate {
                status: Some(FeedbackStatus::Actioned),
                response: Some(Some("Called the employer".into())),
            },
        )
        .await
        .unwrap();

        let summary = repo.summary(&FeedbackFilter::default()).await.unwrap();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.average_rating, Some(3.67));
        assert_eq!(summary.by_type.get("learner"), Some(&2));
        assert_eq!(summary.by_status.get("new"), Some(&3));
        assert_eq!(summary.by_status.get("actioned"), Some(&1));

        let empty = repo
            .summary(&FeedbackFilter {
                feedback_type: Some(FeedbackType::Industry),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(empty.total, 0);
        assert_eq!(empty.average_rating, None);
    }
}
