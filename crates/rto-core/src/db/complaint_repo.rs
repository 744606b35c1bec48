//! Complaints register.

use super::rows::{
    fetch_page, fmt_opt_ts, fmt_ts, merge, opt_uuid, parse_enum, parse_opt_ts, parse_opt_uuid,
    parse_ts, parse_uuid,
};
use super::{make_like_pattern, DbError, DbPool, PaginatedResult, Pagination};
use crate::models::{
    complaint_reference, Complaint, ComplaintFilter, ComplaintNote, ComplaintStatus,
    ComplaintUpdate,
};
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use tracing::debug;
use uuid::Uuid;

const COMPLAINT_COLUMNS: &str = "id, reference, complainant_name, complainant_email, complainant_type, \
     category, description, priority, status, assigned_to, received_at, resolved_at, resolution, \
     created_at, updated_at, deleted_at";

/// Attempts at allocating a reference before giving up on a race.
const REFERENCE_ATTEMPTS: u32 = 3;

#[async_trait]
pub trait ComplaintRepository: Send + Sync {
    /// Inserts a complaint and assigns its `CMP-{year}-{seq}` reference.
    async fn create(&self, complaint: &Complaint) -> Result<Complaint, DbError>;

    async fn get(&self, id: Uuid) -> Result<Option<Complaint>, DbError>;

    async fn list(
        &self,
        filter: &ComplaintFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Complaint>, DbError>;

    async fn list_all(&self, filter: &ComplaintFilter) -> Result<Vec<Complaint>, DbError>;

    async fn update(&self, id: Uuid, update: &ComplaintUpdate) -> Result<Complaint, DbError>;

    /// Writes a status change. Transition rules are enforced by the caller;
    /// this only maintains `resolved_at` and `resolution`.
    async fn set_status(
        &self,
        id: Uuid,
        status: ComplaintStatus,
        resolution: Option<String>,
    ) -> Result<Complaint, DbError>;

    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;

    async fn add_note(&self, note: &ComplaintNote) -> Result<ComplaintNote, DbError>;

    /// Notes on a complaint, oldest first.
    async fn list_notes(&self, complaint_id: Uuid) -> Result<Vec<ComplaintNote>, DbError>;

    /// Open and under-investigation complaints.
    async fn count_open(&self) -> Result<u64, DbError>;
}

pub struct SqliteComplaintRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteComplaintRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    fn where_clause(filter: &ComplaintFilter) -> (String, Vec<String>) {
        let mut from_where = String::from("complaints WHERE deleted_at IS NULL");
        let mut params = Vec::new();

        if let Some(status) = filter.status {
            from_where.push_str(" AND status = ?");
            params.push(status.as_str().to_string());
        }
        if let Some(priority) = filter.priority {
            from_where.push_str(" AND priority = ?");
            params.push(priority.as_str().to_string());
        }
        if let Some(assigned_to) = filter.assigned_to {
            from_where.push_str(" AND assigned_to = ?");
            params.push(assigned_to.to_string());
        }
        if let Some(from) = filter.from {
            from_where.push_str(" AND received_at >= ?");
            params.push(fmt_ts(from));
        }
        if let Some(to) = filter.to {
            from_where.push_str(" AND received_at <= ?");
            params.push(fmt_ts(to));
        }
        if let Some(search) = &filter.search {
            from_where.push_str(
                " AND (reference LIKE ? ESCAPE '\\' OR complainant_name LIKE ? ESCAPE '\\' OR description LIKE ? ESCAPE '\\')",
            );
            let pattern = make_like_pattern(search);
            params.extend([pattern.clone(), pattern.clone(), pattern]);
        }

        (from_where, params)
    }

    async fn try_insert(&self, complaint: &Complaint) -> Result<String, DbError> {
        let mut tx = self.pool.begin().await?;

        // Soft-deleted complaints keep their numbers.
        let year_prefix = format!("{:04}-", complaint.received_at.year());
        let existing: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM complaints WHERE substr(received_at, 1, 5) = ?",
        )
        .bind(&year_prefix)
        .fetch_one(&mut *tx)
        .await?;
        let reference = complaint_reference(complaint.received_at, existing.max(0) as u32 + 1);

        sqlx::query(
            r#"
            INSERT INTO complaints (id, reference, complainant_name, complainant_email, complainant_type,
                                    category, description, priority, status, assigned_to, received_at,
                                    resolved_at, resolution, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(complaint.id.to_string())
        .bind(&reference)
        .bind(&complaint.complainant_name)
        .bind(&complaint.complainant_email)
        .bind(complaint.complainant_type.as_str())
        .bind(&complaint.category)
        .bind(&complaint.description)
        .bind(complaint.priority.as_str())
        .bind(complaint.status.as_str())
        .bind(opt_uuid(complaint.assigned_to))
        .bind(fmt_ts(complaint.received_at))
        .bind(fmt_opt_ts(complaint.resolved_at))
        .bind(&complaint.resolution)
        .bind(fmt_ts(complaint.created_at))
        .bind(fmt_ts(complaint.updated_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(reference)
    }
}

#[async_trait]
impl ComplaintRepository for SqliteComplaintRepository {
    async fn create(&self, complaint: &Complaint) -> Result<Complaint, DbError> {
        let mut attempt = 1;
        loop {
            match self.try_insert(complaint).await {
                Ok(reference) => {
                    debug!(%reference, "Complaint recorded");
                    break;
                }
                Err(DbError::Constraint(msg))
                    if msg.contains("reference") && attempt < REFERENCE_ATTEMPTS =>
                {
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }

        self.get(complaint.id)
            .await?
            .ok_or_else(|| DbError::not_found("Complaint", complaint.id))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Complaint>, DbError> {
        let sql = format!(
            "SELECT {} FROM complaints WHERE id = ? AND deleted_at IS NULL",
            COMPLAINT_COLUMNS
        );
        let row: Option<ComplaintRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list(
        &self,
        filter: &ComplaintFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Complaint>, DbError> {
        let (from_where, params) = Self::where_clause(filter);
        let (rows, total) = fetch_page::<ComplaintRow>(
            &self.pool,
            COMPLAINT_COLUMNS,
            &from_where,
            "received_at DESC",
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

    async fn list_all(&self, filter: &ComplaintFilter) -> Result<Vec<Complaint>, DbError> {
        let (from_where, params) = Self::where_clause(filter);
        let sql = format!(
            "SELECT {} FROM {} ORDER BY received_at DESC",
            COMPLAINT_COLUMNS, from_where
        );
        let mut query = sqlx::query_as::<_, ComplaintRow>(&sql);
        for param in &params {
            query = query.bind(param.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update(&self, id: Uuid, update: &ComplaintUpdate) -> Result<Complaint, DbError> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Complaint", id))?;

        sqlx::query(
            r#"
            UPDATE complaints SET complainant_name = ?, complainant_email = ?, complainant_type = ?,
                                  category = ?, description = ?, priority = ?, assigned_to = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(merge(&update.complainant_name, &existing.complainant_name))
        .bind(merge(&update.complainant_email, &existing.complainant_email))
        .bind(update.complainant_type.unwrap_or(existing.complainant_type).as_str())
        .bind(merge(&update.category, &existing.category))
        .bind(merge(&update.description, &existing.description))
        .bind(update.priority.unwrap_or(existing.priority).as_str())
        .bind(opt_uuid(merge(&update.assigned_to, &existing.assigned_to)))
        .bind(fmt_ts(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Complaint", id))
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: ComplaintStatus,
        resolution: Option<String>,
    ) -> Result<Complaint, DbError> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Complaint", id))?;
        let now = Utc::now();

        let (resolved_at, resolution) = match status {
            ComplaintStatus::Resolved => (Some(now), resolution.or(existing.resolution)),
            ComplaintStatus::Closed => (existing.resolved_at, resolution.or(existing.resolution)),
            ComplaintStatus::Open | ComplaintStatus::UnderInvestigation => {
                (None, existing.resolution)
            }
        };

        sqlx::query(
            "UPDATE complaints SET status = ?, resolved_at = ?, resolution = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(fmt_opt_ts(resolved_at))
        .bind(&resolution)
        .bind(fmt_ts(now))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Complaint", id))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        let now = fmt_ts(Utc::now());
        let result = sqlx::query(
            "UPDATE complaints SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&now)
        .bind(&now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_note(&self, note: &ComplaintNote) -> Result<ComplaintNote, DbError> {
        if self.get(note.complaint_id).await?.is_none() {
            return Err(DbError::not_found("Complaint", note.complaint_id));
        }

        sqlx::query(
            "INSERT INTO complaint_notes (id, complaint_id, author_id, note, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(note.id.to_string())
        .bind(note.complaint_id.to_string())
        .bind(opt_uuid(note.author_id))
        .bind(&note.note)
        .bind(fmt_ts(note.created_at))
        .execute(&self.pool)
        .await?;

        Ok(note.clone())
    }

    async fn list_notes(&self, complaint_id: Uuid) -> Result<Vec<ComplaintNote>, DbError> {
        let rows: Vec<NoteRow> = sqlx::query_as(
            "SELECT id, complaint_id, author_id, note, created_at FROM complaint_notes WHERE complaint_id = ? ORDER BY created_at ASC",
        )
        .bind(complaint_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn count_open(&self) -> Result<u64, DbError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM complaints WHERE deleted_at IS NULL AND status IN ('open', 'under_investigation')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }
}

pub fn create_complaint_repository(pool: &DbPool) -> Box<dyn ComplaintRepository> {
    Box::new(SqliteComplaintRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct ComplaintRow {
    id: String,
    reference: String,
    complainant_name: String,
    complainant_email: Option<String>,
    complainant_type: String,
    category: Option<String>,
    description: String,
    priority: String,
    status: String,
    assigned_to: Option<String>,
    received_at: String,
    resolved_at: Option<String>,
    resolution: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

impl TryFrom<ComplaintRow> for Complaint {
    type Error = DbError;

    fn try_from(row: ComplaintRow) -> Result<Self, Self::Error> {
        Ok(Complaint {
            id: parse_uuid(&row.id)?,
            reference: row.reference,
            complainant_name: row.complainant_name,
            complainant_email: row.complainant_email,
            complainant_type: parse_enum(&row.complainant_type)?,
            category: row.category,
            description: row.description,
            priority: parse_enum(&row.priority)?,
            status: parse_enum(&row.status)?,
            assigned_to: parse_opt_uuid(row.assigned_to)?,
            received_at: parse_ts(&row.received_at)?,
            resolved_at: parse_opt_ts(row.resolved_at)?,
            resolution: row.resolution,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
            deleted_at: parse_opt_ts(row.deleted_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NoteRow {
    id: String,
    complaint_id: String,
    author_id: Option<String>,
    note: String,
    created_at: String,
}

impl TryFrom<NoteRow> for ComplaintNote {
    type Error = DbError;

    fn try_from(row: NoteRow) -> Result<Self, Self::Error> {
        Ok(ComplaintNote {
            id: parse_uuid(&row.id)?,
            complaint_id: parse_uuid(&row.complaint_id)?,
            author_id: parse_opt_uuid(row.author_id)?,
            note: row.note,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::test_pool;
    use crate::models::ComplainantType;
    use chrono::TimeZone;

    fn complaint_on(year: i32) -> Complaint {
        let mut c = Complaint::new("Pat", ComplainantType::Learner, "Certificate not issued");
        c.received_at = Utc.with_ymd_and_hms(year, 3, 15, 10, 0, 0).unwrap();
        c
    }

    #[tokio::test]
    async fn test_references_count_per_year_including_deleted() {
        let pool = test_pool().await;
        let repo = create_complaint_repository(&pool);

        let first = repo.create(&complaint_on(2024)).await.unwrap();
        assert_eq!(first.reference, "CMP-2024-0001");

        assert!(repo.delete(first.id).await.unwrap());
        let second = repo.create(&complaint_on(2024)).await.unwrap();
        assert_eq!(second.reference, "CMP-2024-0002");

        let next_year = repo.create(&complaint_on(2025)).await.unwrap();
        assert_eq!(next_year.reference, "CMP-2025-0001");
    }

    #[tokio::test]
    async fn test_resolve_then_reopen() {
        let pool = test_pool().await;
        let repo = create_complaint_repository(&pool);
        let complaint = repo.create(&complaint_on(2025)).await.unwrap();

        let resolved = repo
            .set_status(complaint.id, ComplaintStatus::Resolved, Some("Reissued".into()))
            .await
            .unwrap();
        assert!(resolved.resolved_at.is_some());
        assert_eq!(resolved.resolution.as_deref(), Some("Reissued"));

        let closed = repo
            .set_status(complaint.id, ComplaintStatus::Closed, None)
            .await
            .unwrap();
        assert_eq!(closed.resolved_at, resolved.resolved_at);

        let reopened = repo
            .set_status(complaint.id, ComplaintStatus::Open, None)
            .await
            .unwrap();
        assert!(reopened.resolved_at.is_none());
        assert_eq!(repo.count_open().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_notes() {
        let pool = test_pool().await;
        let repo = create_complaint_repository(&pool);
        let complaint = repo.create(&complaint_on(2025)).await.unwrap();

        repo.add_note(&ComplaintNote::new(complaint.id, None, "Called learner"))
            .await
            .unwrap();
        repo.add_note(&ComplaintNote::new(complaint.id, None, "Escalated"))
            .await
            .unwrap();

        let notes = repo.list_notes(complaint.id).await.unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].note, "Called learner");

        let err = repo
            .add_note(&ComplaintNote::new(Uuid::new_v4(), None, "orphan"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_search_by_reference() {
        let pool = test_pool().await;
        let repo = create_complaint_repository(&pool);
        repo.create(&complaint_on(2025)).await.unwrap();
        repo.create(&complaint_on(2025)).await.unwrap();

        let filter = ComplaintFilter {
            search: Some("CMP-2025-0002".into()),
            ..Default::default()
        };
        let page = repo.list(&filter, &Pagination::default()).await.unwrap();
        assert_eq!(page.total, 1);
    }
}
