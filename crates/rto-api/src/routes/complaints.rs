//! Complaints register.
//!
//! New complaints are emailed to everyone who can act on them. Status
//! changes follow the lifecycle in [`ComplaintStatus::can_transition_to`].

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rto_core::db::{
    create_complaint_repository, create_role_repository, create_user_repository, Pagination,
};
use rto_core::models::{
    ComplainantType, Complaint, ComplaintFilter, ComplaintNote, ComplaintPriority,
    ComplaintStatus, ComplaintUpdate,
};
use rto_core::{Permission, User};
use rto_notify::{ComplaintReceivedEmail, EmailTemplate, Recipient};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{require_permission, AuthenticatedUser};
use crate::dto::{clean_search, nullable, Paginated};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::routes::email::send_best_effort;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_complaints).post(create_complaint))
        .route(
            "/:id",
            get(get_complaint)
                .put(update_complaint)
                .delete(delete_complaint),
        )
        .route("/:id/status", post(change_status))
        .route("/:id/notes", post(add_note))
}

#[derive(Debug, Deserialize)]
pub struct ComplaintListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
    pub status: Option<ComplaintStatus>,
    pub priority: Option<ComplaintPriority>,
    pub assigned_to: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateComplaintRequest {
    #[validate(length(min = 1, max = 255, message = "Complainant name must be 1-255 characters"))]
    pub complainant_name: String,
    #[validate(email(message = "Invalid email address"))]
    pub complainant_email: Option<String>,
    pub complainant_type: ComplainantType,
    pub category: Option<String>,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    pub priority: Option<ComplaintPriority>,
    pub assigned_to: Option<Uuid>,
    /// Defaults to now. Backdating is allowed for complaints received offline.
    pub received_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateComplaintRequest {
    #[validate(length(min = 1, max = 255, message = "Complainant name must be 1-255 characters"))]
    pub complainant_name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub complainant_email: Option<Option<String>>,
    pub complainant_type: Option<ComplainantType>,
    #[serde(default, deserialize_with = "nullable")]
    pub category: Option<Option<String>>,
    #[validate(length(min = 1, message = "Description must not be empty"))]
    pub description: Option<String>,
    pub priority: Option<ComplaintPriority>,
    #[serde(default, deserialize_with = "nullable")]
    pub assigned_to: Option<Option<Uuid>>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: ComplaintStatus,
    pub resolution: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddNoteRequest {
    #[validate(length(min = 1, max = 10000, message = "Note must be 1-10000 characters"))]
    pub note: String,
}

#[derive(Debug, Serialize)]
pub struct ComplaintResponse {
    #[serde(flatten)]
    pub complaint: Complaint,
    pub days_open: i64,
}

impl ComplaintResponse {
    pub fn new(complaint: Complaint, now: DateTime<Utc>) -> Self {
        let days_open = complaint.days_open(now);
        Self {
            complaint,
            days_open,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ComplaintDetail {
    #[serde(flatten)]
    pub complaint: ComplaintResponse,
    pub notes: Vec<ComplaintNote>,
}

async fn load_complaint(state: &AppState, id: Uuid) -> Result<Complaint, ApiError> {
    create_complaint_repository(&state.db)
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Complaint", id))
}

async fn ensure_assignee(state: &AppState, user_id: Uuid) -> Result<(), ApiError> {
    create_user_repository(&state.db)
        .get(user_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| ApiError::validation_field("assigned_to", "User does not exist"))
}

/// Active users whose role can work complaints.
async fn complaint_handlers(state: &AppState) -> Result<Vec<User>, ApiError> {
    let roles: Vec<Uuid> = create_role_repository(&state.db)
        .list()
        .await?
        .into_iter()
        .filter(|r| r.has_permission(Permission::ComplaintsWrite))
        .map(|r| r.id)
        .collect();
    let users = create_user_repository(&state.db).list_active().await?;
    Ok(users
        .into_iter()
        .filter(|u| roles.contains(&u.role_id))
        .collect())
}

async fn notify_handlers(state: &AppState, complaint: &Complaint) {
    let Some(service) = state.email.as_ref() else {
        return;
    };
    let handlers = match complaint_handlers(state).await {
        Ok(users) => users,
        Err(e) => {
            warn!(error = %e, "Could not resolve complaint recipients");
            return;
        }
    };

    for user in handlers {
        let template = EmailTemplate::ComplaintReceived(ComplaintReceivedEmail {
            recipient_name: user.full_name(),
            reference: complaint.reference.clone(),
            complainant_name: complaint.complainant_name.clone(),
            priority: complaint.priority.to_string(),
            description: complaint.description.clone(),
            app_url: service.app_url().to_string(),
        });
        send_best_effort(service, &Recipient::from(&user), &template).await;
    }
}

async fn list_complaints(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiQuery(query): ApiQuery<ComplaintListQuery>,
) -> Result<Json<Paginated<ComplaintResponse>>, ApiError> {
    require_permission(&current, Permission::ComplaintsRead)?;

    let filter = ComplaintFilter {
        status: query.status,
        priority: query.priority,
        assigned_to: query.assigned_to,
        from: query.from,
        to: query.to,
        search: clean_search(query.search.as_deref()),
    };
    let pagination = Pagination::from_query(query.page, query.per_page);
    let now = Utc::now();
    let result = create_complaint_repository(&state.db)
        .list(&filter, &pagination)
        .await?
        .map(|c| ComplaintResponse::new(c, now));
    Ok(Json(result.into()))
}

async fn get_complaint(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ComplaintDetail>, ApiError> {
    require_permission(&current, Permission::ComplaintsRead)?;

    let complaint = load_complaint(&state, id).await?;
    let notes = create_complaint_repository(&state.db)
        .list_notes(id)
        .await?;
    Ok(Json(ComplaintDetail {
        complaint: ComplaintResponse::new(complaint, Utc::now()),
        notes,
    }))
}

async fn create_complaint(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiJson(request): ApiJson<CreateComplaintRequest>,
) -> Result<(StatusCode, Json<ComplaintResponse>), ApiError> {
    require_permission(&current, Permission::ComplaintsWrite)?;
    request.validate()?;

    let now = Utc::now();
    if request.received_at.is_some_and(|at| at > now) {
        return Err(ApiError::validation_field(
            "received_at",
            "Received date cannot be in the future",
        ));
    }
    if let Some(assignee) = request.assigned_to {
        ensure_assignee(&state, assignee).await?;
    }

    let mut complaint = Complaint::new(
        request.complainant_name.trim(),
        request.complainant_type,
        request.description.trim(),
    );
    complaint.complainant_email = request.complainant_email;
    complaint.category = request.category;
    if let Some(priority) = request.priority {
        complaint.priority = priority;
    }
    complaint.assigned_to = request.assigned_to;
    if let Some(received_at) = request.received_at {
        complaint.received_at = received_at;
    }

    let complaint = create_complaint_repository(&state.db)
        .create(&complaint)
        .await?;
    info!(
        reference = %complaint.reference,
        priority = %complaint.priority,
        recorded_by = %current.id(),
        "Complaint recorded"
    );

    notify_handlers(&state, &complaint).await;

    Ok((
        StatusCode::CREATED,
        Json(ComplaintResponse::new(complaint, now)),
    ))
}

async fn update_complaint(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateComplaintRequest>,
) -> Result<Json<ComplaintResponse>, ApiError> {
    require_permission(&current, Permission::ComplaintsWrite)?;
    request.validate()?;
    if let Some(Some(assignee)) = request.assigned_to {
        ensure_assignee(&state, assignee).await?;
    }

    let update = ComplaintUpdate {
        complainant_name: request.complainant_name.map(|n| n.trim().to_string()),
        complainant_email: request.complainant_email,
        complainant_type: request.complainant_type,
        category: request.category,
        description: request.description,
        priority: request.priority,
        assigned_to: request.assigned_to,
    };
    let complaint = create_complaint_repository(&state.db)
        .update(id, &update)
        .await?;
    Ok(Json(ComplaintResponse::new(complaint, Utc::now())))
}

async fn change_status(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<ChangeStatusRequest>,
) -> Result<Json<ComplaintResponse>, ApiError> {
    require_permission(&current, Permission::ComplaintsWrite)?;

    let complaint = load_complaint(&state, id).await?;
    if !complaint.status.can_transition_to(request.status) {
        return Err(ApiError::BadRequest(format!(
            "Cannot move a complaint from {} to {}",
            complaint.status, request.status
        )));
    }

    let resolution = request
        .resolution
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    if request.status == ComplaintStatus::Resolved && resolution.is_none() {
        return Err(ApiError::validation_field(
            "resolution",
            "A resolution is required to resolve a complaint",
        ));
    }

    let updated = create_complaint_repository(&state.db)
        .set_status(id, request.status, resolution)
        .await?;
    info!(
        reference = %updated.reference,
        from = %complaint.status,
        to = %updated.status,
        changed_by = %current.id(),
        "Complaint status changed"
    );
    Ok(Json(ComplaintResponse::new(updated, Utc::now())))
}

async fn add_note(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<AddNoteRequest>,
) -> Result<(StatusCode, Json<ComplaintNote>), ApiError> {
    require_permission(&current, Permission::ComplaintsWrite)?;
    request.validate()?;
    load_complaint(&state, id).await?;

    let note = ComplaintNote::new(id, Some(current.id()), request.note.trim());
    let note = create_complaint_repository(&state.db)
        .add_note(&note)
        .await?;
    Ok((StatusCode::CREATED, Json(note)))
}

async fn delete_complaint(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_permission(&current, Permission::ComplaintsWrite)?;

    if !create_complaint_repository(&state.db).delete(id).await? {
        return Err(ApiError::not_found("Complaint", id));
    }
    info!(complaint_id = %id, deleted_by = %current.id(), "Complaint deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        app_as, create_test_state, create_user, empty_request, json_request, persisted_test_user,
        read_json,
    };
    use axum::Router;
    use chrono::Datelike;
    use rto_core::auth::system_roles;
    use rto_core::db::create_email_log_repository;
    use rto_notify::{EmailService, MockEmailProvider, RateLimitConfig, RetryPolicy};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn manager_app(state: &AppState) -> Router {
        let manager =
            persisted_test_user(state, "cm@example.com", system_roles::COMPLIANCE_MANAGER).await;
        app_as(routes(), state.clone(), manager)
    }

    async fn create(app: &Router) -> Value {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/",
                json!({
                    "complainant_name": "Jo Learner",
                    "complainant_type": "learner",
                    "description": "Assessment results are late",
                    "priority": "high",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        read_json(response).await
    }

    async fn set_status(app: &Router, id: &str, body: Value) -> StatusCode {
        app.clone()
            .oneshot(json_request("POST", &format!("/{}/status", id), body))
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_reference_generated() {
        let state = create_test_state().await;
        let app = manager_app(&state).await;

        let first = create(&app).await;
        let second = create(&app).await;
        let year = Utc::now().year();
        assert_eq!(first["reference"], format!("CMP-{}-0001", year));
        assert_eq!(second["reference"], format!("CMP-{}-0002", year));
        assert_eq!(first["status"], "open");
        assert_eq!(first["days_open"], 0);
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let state = create_test_state().await;
        let app = manager_app(&state).await;
        let complaint = create(&app).await;
        let id = complaint["id"].as_str().unwrap();

        // Resolving needs a resolution.
        assert_eq!(
            set_status(&app, id, json!({"status": "resolved"})).await,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            set_status(
                &app,
                id,
                json!({"status": "resolved", "resolution": "Results released"})
            )
            .await,
            StatusCode::OK
        );
        // resolved -> open is not allowed.
        assert_eq!(
            set_status(&app, id, json!({"status": "open"})).await,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            set_status(&app, id, json!({"status": "closed"})).await,
            StatusCode::OK
        );
        assert_eq!(
            set_status(&app, id, json!({"status": "open"})).await,
            StatusCode::OK
        );

        let response = app
            .oneshot(empty_request("GET", &format!("/{}", id)))
            .await
            .unwrap();
        let detail: Value = read_json(response).await;
        assert_eq!(detail["status"], "open");
        assert!(detail["resolved_at"].is_null());
    }

    #[tokio::test]
    async fn test_notes_returned_with_complaint() {
        let state = create_test_state().await;
        let app = manager_app(&state).await;
        let complaint = create(&app).await;
        let id = complaint["id"].as_str().unwrap();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/{}/notes", id),
                json!({"note": "Called the learner"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(empty_request("GET", &format!("/{}", id)))
            .await
            .unwrap();
        let detail: Value = read_json(response).await;
        assert_eq!(detail["notes"].as_array().unwrap().len(), 1);
        assert_eq!(detail["notes"][0]["note"], "Called the learner");
    }

    #[tokio::test]
    async fn test_new_complaint_emails_handlers() {
        let provider = Arc::new(MockEmailProvider::new());
        let base = create_test_state().await;
        let logs = Arc::from(create_email_log_repository(&base.db));
        let service = EmailService::new(
            provider.clone(),
            logs,
            RateLimitConfig::default(),
            RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
            },
            "http://localhost:3000",
        );
        let state = base.with_email(Arc::new(service));
        create_user(&state, "staffer@example.com", system_roles::STAFF).await;
        let app = manager_app(&state).await;

        create(&app).await;

        let sent = provider.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "cm@example.com");
    }

    #[tokio::test]
    async fn test_future_received_date_rejected() {
        let state = create_test_state().await;
        let app = manager_app(&state).await;
        let response = app
            .oneshot(json_request(
                "POST",
                "/",
                json!({
                    "complainant_name": "A",
                    "complainant_type": "public",
                    "description": "x",
                    "received_at": Utc::now() + chrono::Duration::days(3),
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
