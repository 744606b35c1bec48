//! Professional development items.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rto_core::db::{create_pd_item_repository, create_user_repository, Pagination};
use rto_core::models::{ActivityType, PdItem, PdItemFilter, PdItemUpdate, PdSummary};
use rto_core::{CurrentUser, PdStatus, Permission};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{require_owner_or, AuthenticatedUser};
use crate::dto::{clean_search, nullable, Paginated};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_items).post(create_item))
        .route("/summary", get(summary))
        .route("/:id", get(get_item).put(update_item).delete(delete_item))
        .route("/:id/complete", post(complete_item))
}

#[derive(Debug, Deserialize)]
pub struct PdListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
    pub user_id: Option<Uuid>,
    pub status: Option<PdStatus>,
    pub activity_type: Option<ActivityType>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub user_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePdItemRequest {
    /// Defaults to the caller.
    pub user_id: Option<Uuid>,
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,
    pub activity_type: ActivityType,
    pub provider: Option<String>,
    #[validate(range(min = 0.0, max = 1000.0, message = "Hours must be between 0 and 1000"))]
    pub hours: Option<f64>,
    pub due_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[validate(url(message = "Evidence URL must be a valid URL"))]
    pub evidence_url: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePdItemRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: Option<String>,
    pub activity_type: Option<ActivityType>,
    #[serde(default, deserialize_with = "nullable")]
    pub provider: Option<Option<String>>,
    #[validate(range(min = 0.0, max = 1000.0, message = "Hours must be between 0 and 1000"))]
    pub hours: Option<f64>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub completed_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub evidence_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteRequest {
    /// Defaults to now.
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct PdItemResponse {
    #[serde(flatten)]
    pub item: PdItem,
    pub status: PdStatus,
}

impl PdItemResponse {
    pub fn new(item: PdItem, now: DateTime<Utc>) -> Self {
        let status = item.status(now);
        Self { item, status }
    }
}

/// Without `pd:read`, queries are pinned to the caller.
fn scoped_user(current: &CurrentUser, requested: Option<Uuid>) -> Option<Uuid> {
    if current.has_permission(Permission::PdRead) {
        requested
    } else {
        Some(current.id())
    }
}

fn reject_future_completion(completed_at: Option<DateTime<Utc>>) -> Result<(), ApiError> {
    if completed_at.is_some_and(|at| at > Utc::now()) {
        return Err(ApiError::validation_field(
            "completed_at",
            "Completion date cannot be in the future",
        ));
    }
    Ok(())
}

async fn load_item(state: &AppState, id: Uuid) -> Result<PdItem, ApiError> {
    create_pd_item_repository(&state.db)
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("PD item", id))
}

async fn list_items(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiQuery(query): ApiQuery<PdListQuery>,
) -> Result<Json<Paginated<PdItemResponse>>, ApiError> {
    let filter = PdItemFilter {
        user_id: scoped_user(&current, query.user_id),
        activity_type: query.activity_type,
        status: query.status,
        search: clean_search(query.search.as_deref()),
    };
    let pagination = Pagination::from_query(query.page, query.per_page);
    let now = Utc::now();
    let result = create_pd_item_repository(&state.db)
        .list(&filter, &pagination)
        .await?
        .map(|item| PdItemResponse::new(item, now));
    Ok(Json(result.into()))
}

async fn summary(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiQuery(query): ApiQuery<SummaryQuery>,
) -> Result<Json<PdSummary>, ApiError> {
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(ApiError::validation_field(
                "from",
                "Start of range must not be after its end",
            ));
        }
    }

    let user_id = scoped_user(&current, query.user_id);
    let filter = PdItemFilter {
        user_id,
        ..Default::default()
    };
    let items = create_pd_item_repository(&state.db)
        .list_all(&filter)
        .await?;
    Ok(Json(PdSummary::from_items(
        &items,
        user_id,
        query.from,
        query.to,
        Utc::now(),
    )))
}

async fn get_item(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<PdItemResponse>, ApiError> {
    let item = load_item(&state, id).await?;
    require_owner_or(&current, item.user_id, Permission::PdRead)?;
    Ok(Json(PdItemResponse::new(item, Utc::now())))
}

async fn create_item(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiJson(request): ApiJson<CreatePdItemRequest>,
) -> Result<(StatusCode, Json<PdItemResponse>), ApiError> {
    let user_id = request.user_id.unwrap_or_else(|| current.id());
    require_owner_or(&current, user_id, Permission::PdWrite)?;
    request.validate()?;
    reject_future_completion(request.completed_at)?;

    if user_id != current.id() {
        create_user_repository(&state.db)
            .get(user_id)
            .await?
            .ok_or_else(|| ApiError::validation_field("user_id", "User does not exist"))?;
    }

    let mut item = PdItem::new(user_id, request.title.trim(), request.activity_type);
    item.provider = request.provider;
    item.hours = request.hours.unwrap_or(0.0);
    item.due_at = request.due_at;
    item.completed_at = request.completed_at;
    item.evidence_url = request.evidence_url;
    item.notes = request.notes;

    let item = create_pd_item_repository(&state.db).create(&item).await?;
    info!(pd_item_id = %item.id, user_id = %item.user_id, "PD item created");
    Ok((
        StatusCode::CREATED,
        Json(PdItemResponse::new(item, Utc::now())),
    ))
}

async fn update_item(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdatePdItemRequest>,
) -> Result<Json<PdItemResponse>, ApiError> {
    let existing = load_item(&state, id).await?;
    require_owner_or(&current, existing.user_id, Permission::PdWrite)?;
    request.validate()?;
    reject_future_completion(request.completed_at.flatten())?;

    let update = PdItemUpdate {
        title: request.title.map(|t| t.trim().to_string()),
        activity_type: request.activity_type,
        provider: request.provider,
        hours: request.hours,
        due_at: request.due_at,
        completed_at: request.completed_at,
        evidence_url: request.evidence_url,
        notes: request.notes,
    };
    let item = create_pd_item_repository(&state.db)
        .update(id, &update)
        .await?;
    Ok(Json(PdItemResponse::new(item, Utc::now())))
}

async fn complete_item(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    request: Option<ApiJson<CompleteRequest>>,
) -> Result<Json<PdItemResponse>, ApiError> {
    let existing = load_item(&state, id).await?;
    require_owner_or(&current, existing.user_id, Permission::PdWrite)?;

    let completed_at = request
        .and_then(|ApiJson(r)| r.completed_at)
        .unwrap_or_else(Utc::now);
    reject_future_completion(Some(completed_at))?;

    let item = create_pd_item_repository(&state.db)
        .complete(id, completed_at)
        .await?;
    info!(pd_item_id = %id, hours = item.hours, "PD item completed");
    Ok(Json(PdItemResponse::new(item, Utc::now())))
}

async fn delete_item(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    let existing = load_item(&state, id).await?;
    require_owner_or(&current, existing.user_id, Permission::PdWrite)?;

    create_pd_item_repository(&state.db).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        app_as, create_test_state, create_user, empty_request, json_request, persisted_test_user,
        read_json,
    };
    use chrono::Duration;
    use rto_core::auth::system_roles;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_owner_creates_and_completes() {
        let state = create_test_state().await;
        let staff = persisted_test_user(&state, "me@example.com", system_roles::STAFF).await;
        let app = app_as(routes(), state, staff);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/",
                json!({
                    "title": "Assessment validation workshop",
                    "activity_type": "workshop",
                    "hours": 3.5,
                    "due_at": Utc::now() - Duration::days(1),
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let item: Value = read_json(response).await;
        assert_eq!(item["status"], "overdue");

        let response = app
            .clone()
            .oneshot(empty_request(
                "POST",
                &format!("/{}/complete", item["id"].as_str().unwrap()),
            ))
            .await
            .unwrap();
        let item: Value = read_json(response).await;
        assert_eq!(item["status"], "completed");

        let response = app
            .oneshot(empty_request("GET", "/summary"))
            .await
            .unwrap();
        let summary: PdSummary = read_json(response).await;
        assert_eq!(summary.completed_hours, 3.5);
        assert_eq!(summary.by_status.get("completed"), Some(&1));
    }

    #[tokio::test]
    async fn test_staff_cannot_create_for_others() {
        let state = create_test_state().await;
        let other = create_user(&state, "other@example.com", system_roles::STAFF).await;
        let staff = persisted_test_user(&state, "me@example.com", system_roles::STAFF).await;
        let app = app_as(routes(), state, staff);

        let response = app
            .oneshot(json_request(
                "POST",
                "/",
                json!({"user_id": other.id, "title": "x", "activity_type": "reading"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_summary_scoped_without_permission() {
        let state = create_test_state().await;
        let other = create_user(&state, "other@example.com", system_roles::STAFF).await;
        let mut item = PdItem::new(other.id, "Conference", ActivityType::Conference);
        item.hours = 8.0;
        item.completed_at = Some(Utc::now() - Duration::days(2));
        create_pd_item_repository(&state.db)
            .create(&item)
            .await
            .unwrap();
        let staff = persisted_test_user(&state, "me@example.com", system_roles::STAFF).await;
        let me = staff.0.id();
        let app = app_as(routes(), state, staff);

        let response = app
            .oneshot(empty_request("GET", &format!("/summary?user_id={}", other.id)))
            .await
            .unwrap();
        let summary: PdSummary = read_json(response).await;
        assert_eq!(summary.user_id, Some(me));
        assert_eq!(summary.completed_hours, 0.0);
    }

    #[tokio::test]
    async fn test_future_completion_rejected() {
        let state = create_test_state().await;
        let staff = persisted_test_user(&state, "me@example.com", system_roles::STAFF).await;
        let app = app_as(routes(), state, staff);

        let response = app
            .oneshot(json_request(
                "POST",
                "/",
                json!({
                    "title": "Future",
                    "activity_type": "course",
                    "completed_at": Utc::now() + Duration::days(3),
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
