//! Policy repository: policies, their immutable versions, and the standards
//! each policy is mapped to.

use super::filters::push_review_status;
use super::rows::{
    fetch_page, fmt_opt_ts, fmt_ts, merge, opt_uuid, parse_enum, parse_opt_ts, parse_opt_uuid,
    parse_ts, parse_uuid,
};
use super::standard_repo::{StandardRow, STANDARD_COLUMNS};
use super::{make_like_pattern, DbError, DbPool, PaginatedResult, Pagination};
use crate::models::{Policy, PolicyFilter, PolicyStatus, PolicyUpdate, PolicyVersion, Standard};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

const POLICY_COLUMNS: &str = "id, policy_number, title, category, description, owner_id, status, \
     review_date, current_version_id, published_at, created_at, updated_at, deleted_at";

const VERSION_COLUMNS: &str =
    "id, policy_id, version_number, content, change_summary, created_by, created_at";

/// Content for a new policy version.
#[derive(Debug, Clone)]
pub struct NewPolicyVersion {
    pub content: String,
    pub change_summary: Option<String>,
    pub created_by: Option<Uuid>,
}

#[async_trait]
pub trait PolicyRepository: Send + Sync {
    /// Inserts a policy. When `initial` is given, version 1 is created in
    /// the same transaction and becomes the current version.
    async fn create(
        &self,
        policy: &Policy,
        initial: Option<&NewPolicyVersion>,
    ) -> Result<Policy, DbError>;

    async fn get(&self, id: Uuid) -> Result<Option<Policy>, DbError>;

    async fn list(
        &self,
        filter: &PolicyFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Policy>, DbError>;

    /// Every live policy matching the filter, for reports.
    async fn list_all(&self, filter: &PolicyFilter) -> Result<Vec<Policy>, DbError>;

    async fn update(&self, id: Uuid, update: &PolicyUpdate) -> Result<Policy, DbError>;

    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;

    /// Appends the next version and points the policy at it.
    async fn add_version(
        &self,
        policy_id: Uuid,
        version: &NewPolicyVersion,
    ) -> Result<PolicyVersion, DbError>;

    /// Versions of a policy, newest first.
    async fn list_versions(&self, policy_id: Uuid) -> Result<Vec<PolicyVersion>, DbError>;

    async fn get_version(&self, version_id: Uuid) -> Result<Option<PolicyVersion>, DbError>;

    /// Sets the lifecycle status. `published_at` is only written when given.
    async fn set_status(
        &self,
        id: Uuid,
        status: PolicyStatus,
        published_at: Option<DateTime<Utc>>,
    ) -> Result<Policy, DbError>;

    /// Replaces the standards mapped to a policy.
    async fn set_standards(&self, policy_id: Uuid, standard_ids: &[Uuid]) -> Result<(), DbError>;

    /// Live standards mapped to a policy, ordered by code.
    async fn standards_for_policy(&self, policy_id: Uuid) -> Result<Vec<Standard>, DbError>;

    /// Live policies mapped to a standard, optionally only published ones.
    async fn policies_for_standard(
        &self,
        standard_id: Uuid,
        published_only: bool,
    ) -> Result<Vec<Policy>, DbError>;
}

pub struct SqlitePolicyRepository {
    pool: sqlx::SqlitePool,
}

impl SqlitePolicyRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    fn where_clause(filter: &PolicyFilter) -> (String, Vec<String>) {
        let mut from_where = String::from("policies WHERE deleted_at IS NULL");
        let mut params = Vec::new();

        if let Some(status) = filter.status {
            from_where.push_str(" AND status = ?");
            params.push(status.as_str().to_string());
        }
        if let Some(category) = &filter.category {
            from_where.push_str(" AND category = ? COLLATE NOCASE");
            params.push(category.clone());
        }
        if let Some(owner_id) = filter.owner_id {
            from_where.push_str(" AND owner_id = ?");
            params.push(owner_id.to_string());
        }
        if let Some(review) = filter.review_status {
            push_review_status(&mut from_where, &mut params, "review_date", review, Utc::now());
        }
        if let Some(search) = &filter.search {
            from_where
                .push_str(" AND (title LIKE ? ESCAPE '\\' OR policy_number LIKE ? ESCAPE '\\')");
            let pattern = make_like_pattern(search);
            params.extend([pattern.clone(), pattern]);
        }

        (from_where, params)
    }
}

async fn insert_version(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    policy_id: Uuid,
    version: &NewPolicyVersion,
) -> Result<PolicyVersion, DbError> {
    let next: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(version_number), 0) + 1 FROM policy_versions WHERE policy_id = ?",
    )
    .bind(policy_id.to_string())
    .fetch_one(&mut **tx)
    .await?;

    let now = Utc::now();
    let created = PolicyVersion {
        id: Uuid::new_v4(),
        policy_id,
        version_number: next,
        content: version.content.clone(),
        change_summary: version.change_summary.clone(),
        created_by: version.created_by,
        created_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO policy_versions (id, policy_id, version_number, content, change_summary, created_by, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(created.id.to_string())
    .bind(policy_id.to_string())
    .bind(created.version_number)
    .bind(&created.content)
    .bind(&created.change_summary)
    .bind(opt_uuid(created.created_by))
    .bind(fmt_ts(now))
    .execute(&mut **tx)
    .await?;

    sqlx::query("UPDATE policies SET current_version_id = ?, updated_at = ? WHERE id = ?")
        .bind(created.id.to_string())
        .bind(fmt_ts(now))
        .bind(policy_id.to_string())
        .execute(&mut **tx)
        .await?;

    Ok(created)
}

#[async_trait]
impl PolicyRepository for SqlitePolicyRepository {
    async fn create(
        &self,
        policy: &Policy,
        initial: Option<&NewPolicyVersion>,
    ) -> Result<Policy, DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO policies (id, policy_number, title, category, description, owner_id, status,
                                  review_date, current_version_id, published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, ?)
            "#,
        )
        .bind(policy.id.to_string())
        .bind(&policy.policy_number)
        .bind(&policy.title)
        .bind(&policy.category)
        .bind(&policy.description)
        .bind(opt_uuid(policy.owner_id))
        .bind(policy.status.as_str())
        .bind(fmt_opt_ts(policy.review_date))
        .bind(fmt_opt_ts(policy.published_at))
        .bind(fmt_ts(policy.created_at))
        .bind(fmt_ts(policy.updated_at))
        .execute(&mut *tx)
        .await?;

        if let Some(version) = initial {
            insert_version(&mut tx, policy.id, version).await?;
        }
        tx.commit().await?;

        self.get(policy.id)
            .await?
            .ok_or_else(|| DbError::not_found("Policy", policy.id))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Policy>, DbError> {
        let sql = format!(
            "SELECT {} FROM policies WHERE id = ? AND deleted_at IS NULL",
            POLICY_COLUMNS
        );
        let row: Option<PolicyRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(
        &self,
        filter: &PolicyFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Policy>, DbError> {
        let (from_where, params) = Self::where_clause(filter);
        let (rows, total) = fetch_page::<PolicyRow>(
            &self.pool,
            POLICY_COLUMNS,
            &from_where,
            "policy_number ASC",
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

    async fn list_all(&self, filter: &PolicyFilter) -> Result<Vec<Policy>, DbError> {
        let (from_where, params) = Self::where_clause(filter);
        let sql = format!(
            "SELECT {} FROM {} ORDER BY policy_number ASC",
            POLICY_COLUMNS, from_where
        );
        let mut query = sqlx::query_as::<_, PolicyRow>(&sql);
        for param in &params {
            query = query.bind(param.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update(&self, id: Uuid, update: &PolicyUpdate) -> Result<Policy, DbError> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Policy", id))?;

        sqlx::query(
            r#"
            UPDATE policies SET policy_number = ?, title = ?, category = ?, description = ?,
                                owner_id = ?, review_date = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(merge(&update.policy_number, &existing.policy_number))
        .bind(merge(&update.title, &existing.title))
        .bind(merge(&update.category, &existing.category))
        .bind(merge(&update.description, &existing.description))
        .bind(opt_uuid(merge(&update.owner_id, &existing.owner_id)))
        .bind(fmt_opt_ts(merge(&update.review_date, &existing.review_date)))
        .bind(fmt_ts(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Policy", id))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        let now = fmt_ts(Utc::now());
        let result = sqlx::query(
            "UPDATE policies SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&now)
        .bind(&now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_version(
        &self,
        policy_id: Uuid,
        version: &NewPolicyVersion,
    ) -> Result<PolicyVersion, DbError> {
        if self.get(policy_id).await?.is_none() {
            return Err(DbError::not_found("Policy", policy_id));
        }

        let mut tx = self.pool.begin().await?;
        let created = insert_version(&mut tx, policy_id, version).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn list_versions(&self, policy_id: Uuid) -> Result<Vec<PolicyVersion>, DbError> {
        let sql = format!(
            "SELECT {} FROM policy_versions WHERE policy_id = ? ORDER BY version_number DESC",
            VERSION_COLUMNS
        );
        let rows: Vec<VersionRow> = sqlx::query_as(&sql)
            .bind(policy_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get_version(&self, version_id: Uuid) -> Result<Option<PolicyVersion>, DbError> {
        let sql = format!("SELECT {} FROM policy_versions WHERE id = ?", VERSION_COLUMNS);
        let row: Option<VersionRow> = sqlx::query_as(&sql)
            .bind(version_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: PolicyStatus,
        published_at: Option<DateTime<Utc>>,
    ) -> Result<Policy, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE policies SET status = ?, published_at = COALESCE(?, published_at), updated_at = ?
            WHERE id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(status.as_str())
        .bind(fmt_opt_ts(published_at))
        .bind(fmt_ts(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Policy", id));
        }
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Policy", id))
    }

    async fn set_standards(&self, policy_id: Uuid, standard_ids: &[Uuid]) -> Result<(), DbError> {
        let policy = policy_id.to_string();
        let now = fmt_ts(Utc::now());
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM policy_standards WHERE policy_id = ?")
            .bind(&policy)
            .execute(&mut *tx)
            .await?;

        for standard_id in standard_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO policy_standards (policy_id, standard_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(&policy)
            .bind(standard_id.to_string())
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn standards_for_policy(&self, policy_id: Uuid) -> Result<Vec<Standard>, DbError> {
        let columns = STANDARD_COLUMNS
            .split(", ")
            .map(|c| format!("s.{}", c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            r#"
            SELECT {} FROM standards s
            JOIN policy_standards ps ON ps.standard_id = s.id
            WHERE ps.policy_id = ? AND s.deleted_at IS NULL
            ORDER BY s.code ASC
            "#,
            columns
        );
        let rows: Vec<StandardRow> = sqlx::query_as(&sql)
            .bind(policy_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn policies_for_standard(
        &self,
        standard_id: Uuid,
        published_only: bool,
    ) -> Result<Vec<Policy>, DbError> {
        let columns = POLICY_COLUMNS
            .split(", ")
            .map(|c| format!("p.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let status_clause = if published_only {
            " AND p.status = 'published'"
        } else {
            ""
        };
        let sql = format!(
            r#"
            SELECT {} FROM policies p
            JOIN policy_standards ps ON ps.policy_id = p.id
            WHERE ps.standard_id = ? AND p.deleted_at IS NULL{}
            ORDER BY p.policy_number ASC
            "#,
            columns, status_clause
        );
        let rows: Vec<PolicyRow> = sqlx::query_as(&sql)
            .bind(standard_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

pub fn create_policy_repository(pool: &DbPool) -> Box<dyn PolicyRepository> {
    Box::new(SqlitePolicyRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct PolicyRow {
    id: String,
    policy_number: String,
    title: String,
    category: Option<String>,
    description: Option<String>,
    owner_id: Option<String>,
    status: String,
    review_date: Option<String>,
    current_version_id: Option<String>,
    published_at: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

impl TryFrom<PolicyRow> for Policy {
    type Error = DbError;

    fn try_from(row: PolicyRow) -> Result<Self, Self::Error> {
        Ok(Policy {
            id: parse_uuid(&row.id)?,
            policy_number: row.policy_number,
            title: row.title,
            category: row.category,
            description: row.description,
            owner_id: parse_opt_uuid(row.owner_id)?,
            status: parse_enum(&row.status)?,
            review_date: parse_opt_ts(row.review_date)?,
            current_version_id: parse_opt_uuid(row.current_version_id)?,
            published_at: parse_opt_ts(row.published_at)?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
            deleted_at: parse_opt_ts(row.deleted_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VersionRow {
    id: String,
    policy_id: String,
    version_number: i64,
    content: String,
    change_summary: Option<String>,
    created_by: Option<String>,
    created_at: String,
}

impl TryFrom<VersionRow> for PolicyVersion {
    type Error = DbError;

    fn try_from(row: VersionRow) -> Result<Self, Self::Error> {
        Ok(PolicyVersion {
            id: parse_uuid(&row.id)?,
            policy_id: parse_uuid(&row.policy_id)?,
            version_number: row.version_number,
            content: row.content,
            change_summary: row.change_summary,
            created_by: parse_opt_uuid(row.created_by)?,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}
