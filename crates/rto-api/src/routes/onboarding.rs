//! Onboarding workflows, task templates, assignments and tasks.
//!
//! Assigning a workflow snapshots its matching templates into tasks, so
//! later template edits never change work already handed out. Staff can
//! read their own assignments and move their own tasks without holding the
//! onboarding permissions.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rto_core::db::{
    create_onboarding_repository, create_role_repository, create_user_repository, Pagination,
};
use rto_core::models::{
    AssignmentFilter, AssignmentProgress, AssignmentStatus, OnboardingAssignment, OnboardingTask,
    OnboardingTaskTemplate, OnboardingWorkflow, TaskStatus, TaskTemplateUpdate, WorkflowUpdate,
};
use rto_core::{CurrentUser, Permission};
use rto_notify::{EmailTemplate, OnboardingAssignedEmail, Recipient};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{require_owner_or, require_permission, AuthenticatedUser};
use crate::dto::{clean_search, nullable, Paginated};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::routes::email::send_best_effort;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/workflows", get(list_workflows).post(create_workflow))
        .route(
            "/workflows/:id",
            get(get_workflow)
                .put(update_workflow)
                .delete(delete_workflow),
        )
        .route(
            "/workflows/:id/tasks",
            get(list_templates).post(create_template),
        )
        .route(
            "/templates/:id",
            put(update_template).delete(delete_template),
        )
        .route("/assignments", get(list_assignments).post(assign_workflow))
        .route("/assignments/:id", get(get_assignment))
        .route("/assignments/:id/cancel", post(cancel_assignment))
        .route("/tasks/:id/complete", post(complete_task))
        .route("/tasks/:id/skip", post(skip_task))
        .route("/tasks/:id/reopen", post(reopen_task))
}

#[derive(Debug, Deserialize)]
pub struct WorkflowListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateWorkflowRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateWorkflowRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTemplateRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,
    pub description: Option<String>,
    /// Defaults to after the last existing template.
    pub sort_order: Option<i64>,
    #[validate(range(min = 0, max = 3650, message = "Due offset must be 0-3650 days"))]
    pub due_offset_days: Option<i64>,
    pub role_filter: Option<String>,
    pub department_filter: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTemplateRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub sort_order: Option<i64>,
    #[validate(range(min = 0, max = 3650, message = "Due offset must be 0-3650 days"))]
    pub due_offset_days: Option<i64>,
    #[serde(default, deserialize_with = "nullable")]
    pub role_filter: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub department_filter: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub workflow_id: Uuid,
    pub user_id: Uuid,
    /// Defaults to now.
    pub start_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct AssignmentListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub user_id: Option<Uuid>,
    pub workflow_id: Option<Uuid>,
    pub status: Option<AssignmentStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskActionRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WorkflowDetail {
    #[serde(flatten)]
    pub workflow: OnboardingWorkflow,
    pub tasks: Vec<OnboardingTaskTemplate>,
}

#[derive(Debug, Serialize)]
pub struct AssignmentDetail {
    #[serde(flatten)]
    pub assignment: OnboardingAssignment,
    pub workflow_name: Option<String>,
    pub tasks: Vec<OnboardingTask>,
    pub progress: AssignmentProgress,
}

async fn load_workflow(state: &AppState, id: Uuid) -> Result<OnboardingWorkflow, ApiError> {
    create_onboarding_repository(&state.db)
        .get_workflow(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Onboarding workflow", id))
}

async fn load_assignment(state: &AppState, id: Uuid) -> Result<OnboardingAssignment, ApiError> {
    create_onboarding_repository(&state.db)
        .get_assignment(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Onboarding assignment", id))
}

async fn list_workflows(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiQuery(query): ApiQuery<WorkflowListQuery>,
) -> Result<Json<Paginated<OnboardingWorkflow>>, ApiError> {
    require_permission(&current, Permission::OnboardingRead)?;

    let search = clean_search(query.search.as_deref());
    let pagination = Pagination::from_query(query.page, query.per_page);
    let result = create_onboarding_repository(&state.db)
        .list_workflows(search.as_deref(), query.active_only, &pagination)
        .await?;
    Ok(Json(result.into()))
}

async fn get_workflow(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<WorkflowDetail>, ApiError> {
    require_permission(&current, Permission::OnboardingRead)?;

    let workflow = load_workflow(&state, id).await?;
    let tasks = create_onboarding_repository(&state.db)
        .list_templates(id)
        .await?;
    Ok(Json(WorkflowDetail { workflow, tasks }))
}

async fn create_workflow(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiJson(request): ApiJson<CreateWorkflowRequest>,
) -> Result<(StatusCode, Json<OnboardingWorkflow>), ApiError> {
    require_permission(&current, Permission::OnboardingWrite)?;
    request.validate()?;

    let mut workflow = OnboardingWorkflow::new(request.name.trim());
    workflow.description = request.description;
    if let Some(is_active) = request.is_active {
        workflow.is_active = is_active;
    }

    let workflow = create_onboarding_repository(&state.db)
        .create_workflow(&workflow)
        .await?;
    info!(workflow = %workflow.name, created_by = %current.id(), "Onboarding workflow created");
    Ok((StatusCode::CREATED, Json(workflow)))
}

async fn update_workflow(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateWorkflowRequest>,
) -> Result<Json<OnboardingWorkflow>, ApiError> {
    require_permission(&current, Permission::OnboardingWrite)?;
    request.validate()?;

    let update = WorkflowUpdate {
        name: request.name.map(|n| n.trim().to_string()),
        description: request.description,
        is_active: request.is_active,
    };
    let workflow = create_onboarding_repository(&state.db)
        .update_workflow(id, &update)
        .await?;
    Ok(Json(workflow))
}

async fn delete_workflow(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_permission(&current, Permission::OnboardingWrite)?;

    if !create_onboarding_repository(&state.db)
        .delete_workflow(id)
        .await?
    {
        return Err(ApiError::not_found("Onboarding workflow", id));
    }
    info!(workflow_id = %id, deleted_by = %current.id(), "Onboarding workflow deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_templates(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Vec<OnboardingTaskTemplate>>, ApiError> {
    require_permission(&current, Permission::OnboardingRead)?;
    load_workflow(&state, id).await?;

    Ok(Json(
        create_onboarding_repository(&state.db)
            .list_templates(id)
            .await?,
    ))
}

async fn create_template(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(workflow_id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<OnboardingTaskTemplate>), ApiError> {
    require_permission(&current, Permission::OnboardingWrite)?;
    request.validate()?;
    load_workflow(&state, workflow_id).await?;

    let repo = create_onboarding_repository(&state.db);
    let sort_order = match request.sort_order {
        Some(order) => order,
        None => repo
            .list_templates(workflow_id)
            .await?
            .iter()
            .map(|t| t.sort_order)
            .max()
            .map_or(1, |max| max + 1),
    };

    let mut template = OnboardingTaskTemplate::new(workflow_id, request.title.trim(), sort_order);
    template.description = request.description;
    template.due_offset_days = request.due_offset_days.unwrap_or(0);
    template.role_filter = clean_search(request.role_filter.as_deref());
    template.department_filter = clean_search(request.department_filter.as_deref());

    let template = repo.create_template(&template).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

async fn update_template(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateTemplateRequest>,
) -> Result<Json<OnboardingTaskTemplate>, ApiError> {
    require_permission(&current, Permission::OnboardingWrite)?;
    request.validate()?;

    let update = TaskTemplateUpdate {
        title: request.title.map(|t| t.trim().to_string()),
        description: request.description,
        sort_order: request.sort_order,
        due_offset_days: request.due_offset_days,
        role_filter: request.role_filter,
        department_filter: request.department_filter,
    };
    let template = create_onboarding_repository(&state.db)
        .update_template(id, &update)
        .await?;
    Ok(Json(template))
}

async fn delete_template(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_permission(&current, Permission::OnboardingWrite)?;

    if !create_onboarding_repository(&state.db)
        .delete_template(id)
        .await?
    {
        return Err(ApiError::not_found("Onboarding task template", id));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn assign_workflow(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiJson(request): ApiJson<AssignRequest>,
) -> Result<(StatusCode, Json<AssignmentDetail>), ApiError> {
    require_permission(&current, Permission::OnboardingWrite)?;

    let user = create_user_repository(&state.db)
        .get(request.user_id)
        .await?
        .ok_or_else(|| ApiError::validation_field("user_id", "User does not exist"))?;
    let role = create_role_repository(&state.db)
        .get(user.role_id)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("Role {} missing", user.role_id)))?;
    let workflow = load_workflow(&state, request.workflow_id).await?;

    let start_date = request.start_date.unwrap_or_else(Utc::now);
    let repo = create_onboarding_repository(&state.db);
    let assignment = repo
        .assign(
            workflow.id,
            &user,
            &role.name,
            Some(current.id()),
            start_date,
        )
        .await?;
    let tasks = repo.list_tasks(assignment.id).await?;
    info!(
        workflow = %workflow.name,
        user_id = %user.id,
        tasks = tasks.len(),
        assigned_by = %current.id(),
        "Onboarding workflow assigned"
    );

    if let Some(service) = state.email.as_ref() {
        let template = EmailTemplate::OnboardingAssigned(OnboardingAssignedEmail {
            recipient_name: user.full_name(),
            workflow_name: workflow.name.clone(),
            start_date: start_date.format("%d %B %Y").to_string(),
            task_count: tasks.len(),
            app_url: service.app_url().to_string(),
        });
        send_best_effort(service, &Recipient::from(&user), &template).await;
    }

    let progress = AssignmentProgress::from_tasks(&tasks);
    Ok((
        StatusCode::CREATED,
        Json(AssignmentDetail {
            assignment,
            workflow_name: Some(workflow.name),
            tasks,
            progress,
        }),
    ))
}

async fn list_assignments(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiQuery(query): ApiQuery<AssignmentListQuery>,
) -> Result<Json<Paginated<OnboardingAssignment>>, ApiError> {
    let user_id = if current.has_permission(Permission::OnboardingRead) {
        query.user_id
    } else {
        Some(current.id())
    };

    let filter = AssignmentFilter {
        user_id,
        workflow_id: query.workflow_id,
        status: query.status,
    };
    let pagination = Pagination::from_query(query.page, query.per_page);
    let result = create_onboarding_repository(&state.db)
        .list_assignments(&filter, &pagination)
        .await?;
    Ok(Json(result.into()))
}

async fn get_assignment(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<AssignmentDetail>, ApiError> {
    let assignment = load_assignment(&state, id).await?;
    require_owner_or(&current, assignment.user_id, Permission::OnboardingRead)?;

    let repo = create_onboarding_repository(&state.db);
    let tasks = repo.list_tasks(id).await?;
    let workflow_name = repo
        .get_workflow(assignment.workflow_id)
        .await?
        .map(|w| w.name);
    let progress = AssignmentProgress::from_tasks(&tasks);
    Ok(Json(AssignmentDetail {
        assignment,
        workflow_name,
        tasks,
        progress,
    }))
}

async fn cancel_assignment(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<OnboardingAssignment>, ApiError> {
    require_permission(&current, Permission::OnboardingWrite)?;

    let assignment = create_onboarding_repository(&state.db)
        .cancel_assignment(id)
        .await?;
    info!(assignment_id = %id, cancelled_by = %current.id(), "Onboarding assignment cancelled");
    Ok(Json(assignment))
}

async fn move_task(
    state: &AppState,
    current: &CurrentUser,
    task_id: Uuid,
    status: TaskStatus,
    notes: Option<String>,
) -> Result<OnboardingTask, ApiError> {
    let repo = create_onboarding_repository(&state.db);
    let task = repo
        .get_task(task_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Onboarding task", task_id))?;
    let assignment = load_assignment(state, task.assignment_id).await?;
    require_owner_or(current, assignment.user_id, Permission::OnboardingWrite)?;

    let task = repo
        .set_task_status(task_id, status, Some(current.id()), notes)
        .await?;
    info!(
        task_id = %task_id,
        status = %task.status,
        actor = %current.id(),
        "Onboarding task updated"
    );
    Ok(task)
}

async fn complete_task(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    request: Option<ApiJson<TaskActionRequest>>,
) -> Result<Json<OnboardingTask>, ApiError> {
    let notes = request.and_then(|ApiJson(r)| r.notes);
    Ok(Json(
        move_task(&state, &current, id, TaskStatus::Completed, notes).await?,
    ))
}

async fn skip_task(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    request: Option<ApiJson<TaskActionRequest>>,
) -> Result<Json<OnboardingTask>, ApiError> {
    let notes = request.and_then(|ApiJson(r)| r.notes);
    Ok(Json(
        move_task(&state, &current, id, TaskStatus::Skipped, notes).await?,
    ))
}

async fn reopen_task(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<OnboardingTask>, ApiError> {
    Ok(Json(
        move_task(&state, &current, id, TaskStatus::Pending, None).await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_helpers::TestUser;
    use crate::test_helpers::{
        app_as, create_test_state, create_user, empty_request, json_request, persisted_test_user,
        read_json,
    };
    use axum::Router;
    use rto_core::auth::system_roles;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct Fixture {
        state: AppState,
        manager: Router,
        workflow_id: String,
    }

    async fn fixture() -> Fixture {
        let state = create_test_state().await;
        let manager = persisted_test_user(&state, "hr@example.com", system_roles::ADMIN).await;
        let manager = app_as(routes(), state.clone(), manager);

        let response = manager
            .clone()
            .oneshot(json_request(
                "POST",
                "/workflows",
                json!({"name": "New trainer induction"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let workflow: Value = read_json(response).await;
        let workflow_id = workflow["id"].as_str().unwrap().to_string();

        for (title, role) in [
            ("Sign code of conduct", None),
            ("Complete TAE currency", Some("trainer")),
        ] {
            let response = manager
                .clone()
                .oneshot(json_request(
                    "POST",
                    &format!("/workflows/{}/tasks", workflow_id),
                    json!({"title": title, "role_filter": role, "due_offset_days": 7}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        Fixture {
            state,
            manager,
            workflow_id,
        }
    }

    async fn assign(fx: &Fixture, user_id: Uuid) -> axum::response::Response {
        fx.manager
            .clone()
            .oneshot(json_request(
                "POST",
                "/assignments",
                json!({"workflow_id": fx.workflow_id, "user_id": user_id}),
            ))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_assign_filters_by_role_and_rejects_duplicates() {
        let fx = fixture().await;
        let staff = create_user(&fx.state, "new@example.com", system_roles::STAFF).await;

        let response = assign(&fx, staff.id).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let detail: Value = read_json(response).await;
        assert_eq!(detail["tasks"].as_array().unwrap().len(), 1);
        assert_eq!(detail["tasks"][0]["title"], "Sign code of conduct");
        assert_eq!(detail["progress"]["pending"], 1);

        let response = assign(&fx, staff.id).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_owner_completes_tasks_and_assignment_finishes() {
        let fx = fixture().await;
        let trainer = persisted_test_user(&fx.state, "t@example.com", system_roles::TRAINER).await;
        let trainer_id = trainer.0.id();

        let response = assign(&fx, trainer_id).await;
        let detail: Value = read_json(response).await;
        let assignment_id = detail["id"].as_str().unwrap().to_string();
        let task_ids: Vec<String> = detail["tasks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(task_ids.len(), 2);

        let own = app_as(routes(), fx.state.clone(), trainer);
        let response = own
            .clone()
            .oneshot(empty_request("POST", &format!("/tasks/{}/complete", task_ids[0])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let response = own
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/tasks/{}/skip", task_ids[1]),
                json!({"notes": "Already current"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = own
            .clone()
            .oneshot(empty_request("GET", &format!("/assignments/{}", assignment_id)))
            .await
            .unwrap();
        let detail: Value = read_json(response).await;
        assert_eq!(detail["status"], "completed");
        assert_eq!(detail["progress"]["percent_complete"], 100.0);

        let response = own
            .oneshot(empty_request("POST", &format!("/tasks/{}/reopen", task_ids[0])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let assignment = create_onboarding_repository(&fx.state.db)
            .get_assignment(assignment_id.parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(assignment.status, AssignmentStatus::InProgress);
    }

    #[tokio::test]
    async fn test_other_staff_cannot_touch_tasks() {
        let fx = fixture().await;
        let owner = create_user(&fx.state, "owner@example.com", system_roles::STAFF).await;
        let response = assign(&fx, owner.id).await;
        let detail: Value = read_json(response).await;
        let task_id = detail["tasks"][0]["id"].as_str().unwrap().to_string();
        let assignment_id = detail["id"].as_str().unwrap().to_string();

        let other = app_as(routes(), fx.state.clone(), TestUser::staff());
        let response = other
            .clone()
            .oneshot(empty_request("POST", &format!("/tasks/{}/complete", task_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = other
            .oneshot(empty_request("GET", &format!("/assignments/{}", assignment_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_reassign_after_cancel_allowed() {
        let fx = fixture().await;
        let staff = create_user(&fx.state, "again@example.com", system_roles::STAFF).await;
        let detail: Value = read_json(assign(&fx, staff.id).await).await;

        let response = fx
            .manager
            .clone()
            .oneshot(empty_request(
                "POST",
                &format!("/assignments/{}/cancel", detail["id"].as_str().unwrap()),
            ))
            .await
            .unwrap();
        let cancelled: OnboardingAssignment = read_json(response).await;
        assert_eq!(cancelled.status, AssignmentStatus::Cancelled);

        let response = assign(&fx, staff.id).await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_inactive_workflow_cannot_be_assigned() {
        let fx = fixture().await;
        fx.manager
            .clone()
            .oneshot(json_request(
                "PUT",
                &format!("/workflows/{}", fx.workflow_id),
                json!({"is_active": false}),
            ))
            .await
            .unwrap();
        let staff = create_user(&fx.state, "late@example.com", system_roles::STAFF).await;

        let response = assign(&fx, staff.id).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
