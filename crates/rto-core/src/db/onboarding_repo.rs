//! Onboarding workflows, their task templates, and per-user assignments.
//!
//! Assigning a workflow expands its templates into tasks inside a single
//! transaction so an assignment never exists without its tasks. Task
//! transitions keep the parent assignment's status in step: it completes
//! when no pending task remains and reverts to in-progress when a task is
//! reopened.

use super::rows::{
    fetch_page, fmt_opt_ts, fmt_ts, merge, opt_uuid, parse_enum, parse_opt_ts, parse_opt_uuid,
    parse_ts, parse_uuid,
};
use super::{make_like_pattern, DbError, DbPool, PaginatedResult, Pagination};
use crate::auth::User;
use crate::models::{
    AssignmentFilter, AssignmentStatus, OnboardingAssignment, OnboardingTask,
    OnboardingTaskTemplate, OnboardingWorkflow, TaskStatus, TaskTemplateUpdate, WorkflowUpdate,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

const WORKFLOW_COLUMNS: &str = "id, name, description, is_active, created_at, updated_at, deleted_at";

const TEMPLATE_COLUMNS: &str = "id, workflow_id, title, description, sort_order, due_offset_days, \
     role_filter, department_filter, created_at";

const ASSIGNMENT_COLUMNS: &str = "id, workflow_id, user_id, assigned_by, start_date, status, completed_at, \
     created_at, updated_at";

const TASK_COLUMNS: &str = "id, assignment_id, template_id, title, description, due_date, sort_order, \
     status, completed_at, completed_by, notes";

#[async_trait]
pub trait OnboardingRepository: Send + Sync {
    async fn create_workflow(
        &self,
        workflow: &OnboardingWorkflow,
    ) -> Result<OnboardingWorkflow, DbError>;

    async fn get_workflow(&self, id: Uuid) -> Result<Option<OnboardingWorkflow>, DbError>;

    async fn list_workflows(
        &self,
        search: Option<&str>,
        active_only: bool,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<OnboardingWorkflow>, DbError>;

    async fn update_workflow(
        &self,
        id: Uuid,
        update: &WorkflowUpdate,
    ) -> Result<OnboardingWorkflow, DbError>;

    async fn delete_workflow(&self, id: Uuid) -> Result<bool, DbError>;

    /// Adds a template to a live workflow.
    async fn create_template(
        &self,
        template: &OnboardingTaskTemplate,
    ) -> Result<OnboardingTaskTemplate, DbError>;

    async fn get_template(&self, id: Uuid) -> Result<Option<OnboardingTaskTemplate>, DbError>;

    /// Templates of a workflow in `sort_order`.
    async fn list_templates(&self, workflow_id: Uuid)
        -> Result<Vec<OnboardingTaskTemplate>, DbError>;

    async fn update_template(
        &self,
        id: Uuid,
        update: &TaskTemplateUpdate,
    ) -> Result<OnboardingTaskTemplate, DbError>;

    /// Removes a template. Tasks already generated from it keep their copy.
    async fn delete_template(&self, id: Uuid) -> Result<bool, DbError>;

    /// Assigns a workflow to `user`, generating the tasks whose filters
    /// match `role_name` and the user's department.
    ///
    /// Fails with `NotFound` for a missing workflow and `Constraint` for an
    /// inactive workflow or an existing non-cancelled assignment.
    async fn assign(
        &self,
        workflow_id: Uuid,
        user: &User,
        role_name: &str,
        assigned_by: Option<Uuid>,
        start_date: DateTime<Utc>,
    ) -> Result<OnboardingAssignment, DbError>;

    async fn get_assignment(&self, id: Uuid) -> Result<Option<OnboardingAssignment>, DbError>;

    async fn list_assignments(
        &self,
        filter: &AssignmentFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<OnboardingAssignment>, DbError>;

    /// Cancels an in-progress or completed assignment. Its tasks become
    /// read-only.
    async fn cancel_assignment(&self, id: Uuid) -> Result<OnboardingAssignment, DbError>;

    /// Tasks of an assignment in `sort_order`.
    async fn list_tasks(&self, assignment_id: Uuid) -> Result<Vec<OnboardingTask>, DbError>;

    async fn get_task(&self, id: Uuid) -> Result<Option<OnboardingTask>, DbError>;

    /// Moves a task to `status` and recomputes the assignment status.
    async fn set_task_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        actor: Option<Uuid>,
        notes: Option<String>,
    ) -> Result<OnboardingTask, DbError>;

    async fn count_active_assignments(&self) -> Result<u64, DbError>;
}

pub struct SqliteOnboardingRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteOnboardingRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    async fn insert_task(
        tx: &mut Transaction<'_, Sqlite>,
        task: &OnboardingTask,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO onboarding_tasks (id, assignment_id, template_id, title, description, due_date,
                                          sort_order, status, completed_at, completed_by, notes)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(task.id.to_string())
        .bind(task.assignment_id.to_string())
        .bind(opt_uuid(task.template_id))
        .bind(&task.title)
        .bind(&task.description)
        .bind(fmt_opt_ts(task.due_date))
        .bind(task.sort_order)
        .bind(task.status.as_str())
        .bind(fmt_opt_ts(task.completed_at))
        .bind(opt_uuid(task.completed_by))
        .bind(&task.notes)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Brings the assignment status in line with its pending-task count.
    async fn sync_assignment_status(
        tx: &mut Transaction<'_, Sqlite>,
        assignment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let pending: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM onboarding_tasks WHERE assignment_id = ? AND status = 'pending'",
        )
        .bind(assignment_id.to_string())
        .fetch_one(&mut **tx)
        .await?;

        let ts = fmt_ts(now);
        if pending == 0 {
            sqlx::query(
                "UPDATE onboarding_assignments SET status = 'completed', completed_at = ?, updated_at = ? \
                 WHERE id = ? AND status = 'in_progress'",
            )
            .bind(&ts)
            .bind(&ts)
            .bind(assignment_id.to_string())
            .execute(&mut **tx)
            .await?;
        } else {
            sqlx::query(
                "UPDATE onboarding_assignments SET status = 'in_progress', completed_at = NULL, updated_at = ? \
                 WHERE id = ? AND status = 'completed'",
            )
            .bind(&ts)
            .bind(assignment_id.to_string())
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl OnboardingRepository for SqliteOnboardingRepository {
    async fn create_workflow(
        &self,
        workflow: &OnboardingWorkflow,
    ) -> Result<OnboardingWorkflow, DbError> {
        sqlx::query(
            "INSERT INTO onboarding_workflows (id, name, description, is_active, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(workflow.id.to_string())
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.is_active)
        .bind(fmt_ts(workflow.created_at))
        .bind(fmt_ts(workflow.updated_at))
        .execute(&self.pool)
        .await?;

        self.get_workflow(workflow.id)
            .await?
            .ok_or_else(|| DbError::not_found("OnboardingWorkflow", workflow.id))
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Option<OnboardingWorkflow>, DbError> {
        let sql = format!(
            "SELECT {} FROM onboarding_workflows WHERE id = ? AND deleted_at IS NULL",
            WORKFLOW_COLUMNS
        );
        let row: Option<WorkflowRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_workflows(
        &self,
        search: Option<&str>,
        active_only: bool,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<OnboardingWorkflow>, DbError> {
        let mut from_where = String::from("onboarding_workflows WHERE deleted_at IS NULL");
        let mut params = Vec::new();

        if active_only {
            from_where.push_str(" AND is_active = 1");
        }
        if let Some(search) = search {
            from_where.push_str(" AND name LIKE ? ESCAPE '\\'");
            params.push(make_like_pattern(search));
        }

        let (rows, total) = fetch_page::<WorkflowRow>(
            &self.pool,
            WORKFLOW_COLUMNS,
            &from_where,
            "name ASC",
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

    async fn update_workflow(
        &self,
        id: Uuid,
        update: &WorkflowUpdate,
    ) -> Result<OnboardingWorkflow, DbError> {
        let existing = self
            .get_workflow(id)
            .await?
            .ok_or_else(|| DbError::not_found("OnboardingWorkflow", id))?;

        sqlx::query(
            "UPDATE onboarding_workflows SET name = ?, description = ?, is_active = ?, updated_at = ? WHERE id = ?",
        )
        .bind(merge(&update.name, &existing.name))
        .bind(merge(&update.description, &existing.description))
        .bind(update.is_active.unwrap_or(existing.is_active))
        .bind(fmt_ts(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.get_workflow(id)
            .await?
            .ok_or_else(|| DbError::not_found("OnboardingWorkflow", id))
    }

    async fn delete_workflow(&self, id: Uuid) -> Result<bool, DbError> {
        let now = fmt_ts(Utc::now());
        let result = sqlx::query(
            "UPDATE onboarding_workflows SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&now)
        .bind(&now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_template(
        &self,
        template: &OnboardingTaskTemplate,
    ) -> Result<OnboardingTaskTemplate, DbError> {
        if self.get_workflow(template.workflow_id).await?.is_none() {
            return Err(DbError::not_found("OnboardingWorkflow", template.workflow_id));
        }

        sqlx::query(
            r#"
            INSERT INTO onboarding_task_templates (id, workflow_id, title, description, sort_order,
                                                   due_offset_days, role_filter, department_filter, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(template.id.to_string())
        .bind(template.workflow_id.to_string())
        .bind(&template.title)
        .bind(&template.description)
        .bind(template.sort_order)
        .bind(template.due_offset_days)
        .bind(&template.role_filter)
        .bind(&template.department_filter)
        .bind(fmt_ts(template.created_at))
        .execute(&self.pool)
        .await?;

        self.get_template(template.id)
            .await?
            .ok_or_else(|| DbError::not_found("OnboardingTaskTemplate", template.id))
    }

    async fn get_template(&self, id: Uuid) -> Result<Option<OnboardingTaskTemplate>, DbError> {
        let sql = format!(
            "SELECT {} FROM onboarding_task_templates WHERE id = ?",
            TEMPLATE_COLUMNS
        );
        let row: Option<TemplateRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_templates(
        &self,
        workflow_id: Uuid,
    ) -> Result<Vec<OnboardingTaskTemplate>, DbError> {
        let sql = format!(
            "SELECT {} FROM onboarding_task_templates WHERE workflow_id = ? ORDER BY sort_order ASC, created_at ASC",
            TEMPLATE_COLUMNS
        );
        let rows: Vec<TemplateRow> = sqlx::query_as(&sql)
            .bind(workflow_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update_template(
        &self,
        id: Uuid,
        update: &TaskTemplateUpdate,
    ) -> Result<OnboardingTaskTemplate, DbError> {
        let existing = self
            .get_template(id)
            .await?
            .ok_or_else(|| DbError::not_found("OnboardingTaskTemplate", id))?;

        sqlx::query(
            r#"
            UPDATE onboarding_task_templates SET title = ?, description = ?, sort_order = ?,
                                                 due_offset_days = ?, role_filter = ?, department_filter = ?
            WHERE id = ?
            "#,
        )
        .bind(merge(&update.title, &existing.title))
        .bind(merge(&update.description, &existing.description))
        .bind(update.sort_order.unwrap_or(existing.sort_order))
        .bind(update.due_offset_days.unwrap_or(existing.due_offset_days))
        .bind(merge(&update.role_filter, &existing.role_filter))
        .bind(merge(&update.department_filter, &existing.department_filter))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.get_template(id)
            .await?
            .ok_or_else(|| DbError::not_found("OnboardingTaskTemplate", id))
    }

    async fn delete_template(&self, id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM onboarding_task_templates WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn assign(
        &self,
        workflow_id: Uuid,
        user: &User,
        role_name: &str,
        assigned_by: Option<Uuid>,
        start_date: DateTime<Utc>,
    ) -> Result<OnboardingAssignment, DbError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT {} FROM onboarding_workflows WHERE id = ? AND deleted_at IS NULL",
            WORKFLOW_COLUMNS
        );
        let workflow: OnboardingWorkflow = sqlx::query_as::<_, WorkflowRow>(&sql)
            .bind(workflow_id.to_string())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::not_found("OnboardingWorkflow", workflow_id))?
            .try_into()?;

        if !workflow.is_active {
            return Err(DbError::Constraint(format!(
                "Workflow '{}' is inactive",
                workflow.name
            )));
        }

        let existing: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM onboarding_assignments WHERE workflow_id = ? AND user_id = ? AND status <> 'cancelled'",
        )
        .bind(workflow_id.to_string())
        .bind(user.id.to_string())
        .fetch_one(&mut *tx)
        .await?;
        if existing > 0 {
            return Err(DbError::Constraint(format!(
                "User {} already has an active assignment for workflow '{}'",
                user.id, workflow.name
            )));
        }

        let now = Utc::now();
        let mut assignment = OnboardingAssignment {
            id: Uuid::new_v4(),
            workflow_id,
            user_id: user.id,
            assigned_by,
            start_date,
            status: AssignmentStatus::InProgress,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO onboarding_assignments (id, workflow_id, user_id, assigned_by, start_date, status,
                                                completed_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, NULL, ?, ?)
            "#,
        )
        .bind(assignment.id.to_string())
        .bind(workflow_id.to_string())
        .bind(user.id.to_string())
        .bind(opt_uuid(assigned_by))
        .bind(fmt_ts(start_date))
        .bind(assignment.status.as_str())
        .bind(fmt_ts(now))
        .bind(fmt_ts(now))
        .execute(&mut *tx)
        .await?;

        let sql = format!(
            "SELECT {} FROM onboarding_task_templates WHERE workflow_id = ? ORDER BY sort_order ASC, created_at ASC",
            TEMPLATE_COLUMNS
        );
        let templates: Vec<TemplateRow> = sqlx::query_as(&sql)
            .bind(workflow_id.to_string())
            .fetch_all(&mut *tx)
            .await?;

        let mut generated = 0usize;
        for row in templates {
            let template = OnboardingTaskTemplate::try_from(row)?;
            if !template.applies_to(role_name, user.department.as_deref()) {
                continue;
            }
            let task = OnboardingTask {
                id: Uuid::new_v4(),
                assignment_id: assignment.id,
                template_id: Some(template.id),
                title: template.title.clone(),
                description: template.description.clone(),
                due_date: Some(template.due_date(start_date)),
                sort_order: template.sort_order,
                status: TaskStatus::Pending,
                completed_at: None,
                completed_by: None,
                notes: None,
            };
            Self::insert_task(&mut tx, &task).await?;
            generated += 1;
        }

        // Nothing to do means nothing pending.
        if generated == 0 {
            Self::sync_assignment_status(&mut tx, assignment.id, now).await?;
            assignment.status = AssignmentStatus::Completed;
            assignment.completed_at = Some(now);
        }

        tx.commit().await?;

        info!(
            workflow = %workflow.name,
            user_id = %user.id,
            tasks = generated,
            "Onboarding workflow assigned"
        );
        Ok(assignment)
    }

    async fn get_assignment(&self, id: Uuid) -> Result<Option<OnboardingAssignment>, DbError> {
        let sql = format!(
            "SELECT {} FROM onboarding_assignments WHERE id = ?",
            ASSIGNMENT_COLUMNS
        );
        let row: Option<AssignmentRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_assignments(
        &self,
        filter: &AssignmentFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<OnboardingAssignment>, DbError> {
        let mut from_where = String::from("onboarding_assignments WHERE 1 = 1");
        let mut params = Vec::new();

        if let Some(user_id) = filter.user_id {
            from_where.push_str(" AND user_id = ?");
            params.push(user_id.to_string());
        }
        if let Some(workflow_id) = filter.workflow_id {
            from_where.push_str(" AND workflow_id = ?");
            params.push(workflow_id.to_string());
        }
        if let Some(status) = filter.status {
            from_where.push_str(" AND status = ?");
            params.push(status.as_str().to_string());
        }

        let (rows, total) = fetch_page::<AssignmentRow>(
            &self.pool,
            ASSIGNMENT_COLUMNS,
            &from_where,
            "start_date DESC",
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

    async fn cancel_assignment(&self, id: Uuid) -> Result<OnboardingAssignment, DbError> {
        let existing = self
            .get_assignment(id)
            .await?
            .ok_or_else(|| DbError::not_found("OnboardingAssignment", id))?;
        if existing.status == AssignmentStatus::Cancelled {
            return Ok(existing);
        }

        sqlx::query("UPDATE onboarding_assignments SET status = 'cancelled', updated_at = ? WHERE id = ?")
            .bind(fmt_ts(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        debug!(assignment_id = %id, "Onboarding assignment cancelled");
        self.get_assignment(id)
            .await?
            .ok_or_else(|| DbError::not_found("OnboardingAssignment", id))
    }

    async fn list_tasks(&self, assignment_id: Uuid) -> Result<Vec<OnboardingTask>, DbError> {
        let sql = format!(
            "SELECT {} FROM onboarding_tasks WHERE assignment_id = ? ORDER BY sort_order ASC, title ASC",
            TASK_COLUMNS
        );
        let rows: Vec<TaskRow> = sqlx::query_as(&sql)
            .bind(assignment_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<OnboardingTask>, DbError> {
        let sql = format!("SELECT {} FROM onboarding_tasks WHERE id = ?", TASK_COLUMNS);
        let row: Option<TaskRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn set_task_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        actor: Option<Uuid>,
        notes: Option<String>,
    ) -> Result<OnboardingTask, DbError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT t.assignment_id, a.status FROM onboarding_tasks t \
             JOIN onboarding_assignments a ON a.id = t.assignment_id WHERE t.id = ?",
        )
        .bind(task_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;
        let (assignment_id, assignment_status) =
            row.ok_or_else(|| DbError::not_found("OnboardingTask", task_id))?;
        let assignment_id = parse_uuid(&assignment_id)?;

        if parse_enum::<AssignmentStatus>(&assignment_status)? == AssignmentStatus::Cancelled {
            return Err(DbError::Constraint(format!(
                "Assignment {} is cancelled",
                assignment_id
            )));
        }

        let now = Utc::now();
        let (completed_at, completed_by) = match status {
            TaskStatus::Pending => (None, None),
            TaskStatus::Completed | TaskStatus::Skipped => (Some(now), actor),
        };

        sqlx::query(
            "UPDATE onboarding_tasks SET status = ?, completed_at = ?, completed_by = ?, \
             notes = COALESCE(?, notes) WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(fmt_opt_ts(completed_at))
        .bind(opt_uuid(completed_by))
        .bind(&notes)
        .bind(task_id.to_string())
        .execute(&mut *tx)
        .await?;

        Self::sync_assignment_status(&mut tx, assignment_id, now).await?;
        tx.commit().await?;

        self.get_task(task_id)
            .await?
            .ok_or_else(|| DbError::not_found("OnboardingTask", task_id))
    }

    async fn count_active_assignments(&self) -> Result<u64, DbError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM onboarding_assignments WHERE status = 'in_progress'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }
}

pub fn create_onboarding_repository(pool: &DbPool) -> Box<dyn OnboardingRepository> {
    Box::new(SqliteOnboardingRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct WorkflowRow {
    id: String,
    name: String,
    description: Option<String>,
    is_active: bool,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

impl TryFrom<WorkflowRow> for OnboardingWorkflow {
    type Error = DbError;

    fn try_from(row: WorkflowRow) -> Result<Self, Self::Error> {
        Ok(OnboardingWorkflow {
            id: parse_uuid(&row.id)?,
            name: row.name,
            description: row.description,
            is_active: row.is_active,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
            deleted_at: parse_opt_ts(row.deleted_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TemplateRow {
    id: String,
    workflow_id: String,
    title: String,
    description: Option<String>,
    sort_order: i64,
    due_offset_days: i64,
    role_filter: Option<String>,
    department_filter: Option<String>,
    created_at: String,
}

impl TryFrom<TemplateRow> for OnboardingTaskTemplate {
    type Error = DbError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        Ok(OnboardingTaskTemplate {
            id: parse_uuid(&row.id)?,
            workflow_id: parse_uuid(&row.workflow_id)?,
            title: row.title,
            description: row.description,
            sort_order: row.sort_order,
            due_offset_days: row.due_offset_days,
            role_filter: row.role_filter,
            department_filter: row.department_filter,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AssignmentRow {
    id: String,
    workflow_id: String,
    user_id: String,
    assigned_by: Option<String>,
    start_date: String,
    status: String,
    completed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<AssignmentRow> for OnboardingAssignment {
    type Error = DbError;

    fn try_from(row: AssignmentRow) -> Result<Self, Self::Error> {
        Ok(OnboardingAssignment {
            id: parse_uuid(&row.id)?,
            workflow_id: parse_uuid(&row.workflow_id)?,
            user_id: parse_uuid(&row.user_id)?,
            assigned_by: parse_opt_uuid(row.assigned_by)?,
            start_date: parse_ts(&row.start_date)?,
            status: parse_enum(&row.status)?,
            completed_at: parse_opt_ts(row.completed_at)?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    assignment_id: String,
    template_id: Option<String>,
    title: String,
    description: Option<String>,
    due_date: Option<String>,
    sort_order: i64,
    status: String,
    completed_at: Option<String>,
    completed_by: Option<String>,
    notes: Option<String>,
}

impl TryFrom<TaskRow> for OnboardingTask {
    type Error = DbError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(OnboardingTask {
            id: parse_uuid(&row.id)?,
            assignment_id: parse_uuid(&row.assignment_id)?,
            template_id: parse_opt_uuid(row.template_id)?,
            title: row.title,
            description: row.description,
            due_date: parse_opt_ts(row.due_date)?,
            sort_order: row.sort_order,
            status: parse_enum(&row.status)?,
            completed_at: parse_opt_ts(row.completed_at)?,
            completed_by: parse_opt_uuid(row.completed_by)?,
            notes: row.notes,
        })
    }
}
