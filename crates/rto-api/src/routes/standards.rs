//! Regulatory standards.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use rto_core::db::{create_policy_repository, create_standard_repository, Pagination};
use rto_core::models::{Standard, StandardFilter, StandardUpdate};
use rto_core::Permission;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{require_permission, AuthenticatedUser};
use crate::dto::{clean_search, nullable, Paginated};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::routes::policies::PolicyResponse;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_standards).post(create_standard))
        .route(
            "/:id",
            get(get_standard)
                .put(update_standard)
                .delete(delete_standard),
        )
        .route("/:id/policies", get(list_policies))
}

#[derive(Debug, Deserialize)]
pub struct StandardListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StandardPoliciesQuery {
    #[serde(default)]
    pub published_only: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateStandardRequest {
    #[validate(length(min = 1, max = 50, message = "Code must be 1-50 characters"))]
    pub code: String,
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStandardRequest {
    #[validate(length(min = 1, max = 50, message = "Code must be 1-50 characters"))]
    pub code: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub category: Option<Option<String>>,
}

async fn list_standards(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiQuery(query): ApiQuery<StandardListQuery>,
) -> Result<Json<Paginated<Standard>>, ApiError> {
    require_permission(&current, Permission::StandardsRead)?;

    let filter = StandardFilter {
        category: clean_search(query.category.as_deref()),
        search: clean_search(query.search.as_deref()),
    };
    let pagination = Pagination::from_query(query.page, query.per_page);
    let result = create_standard_repository(&state.db)
        .list(&filter, &pagination)
        .await?;
    Ok(Json(result.into()))
}

async fn get_standard(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Standard>, ApiError> {
    require_permission(&current, Permission::StandardsRead)?;

    let standard = create_standard_repository(&state.db)
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Standard", id))?;
    Ok(Json(standard))
}

async fn create_standard(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiJson(request): ApiJson<CreateStandardRequest>,
) -> Result<(StatusCode, Json<Standard>), ApiError> {
    require_permission(&current, Permission::StandardsWrite)?;
    request.validate()?;

    let mut standard = Standard::new(request.code.trim(), request.title.trim());
    standard.description = request.description;
    standard.category = request.category;

    let standard = create_standard_repository(&state.db)
        .create(&standard)
        .await?;
    info!(code = %standard.code, created_by = %current.id(), "Standard created");
    Ok((StatusCode::CREATED, Json(standard)))
}

async fn update_standard(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateStandardRequest>,
) -> Result<Json<Standard>, ApiError> {
    require_permission(&current, Permission::StandardsWrite)?;
    request.validate()?;

    let update = StandardUpdate {
        code: request.code.map(|c| c.trim().to_string()),
        title: request.title.map(|t| t.trim().to_string()),
        description: request.description,
        category: request.category,
    };
    let standard = create_standard_repository(&state.db)
        .update(id, &update)
        .await?;
    Ok(Json(standard))
}

async fn delete_standard(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_permission(&current, Permission::StandardsWrite)?;

    if !create_standard_repository(&state.db).delete(id).await? {
        return Err(ApiError::not_found("Standard", id));
    }
    info!(standard_id = %id, deleted_by = %current.id(), "Standard deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_policies(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<StandardPoliciesQuery>,
) -> Result<Json<Vec<PolicyResponse>>, ApiError> {
    require_permission(&current, Permission::StandardsRead)?;

    create_standard_repository(&state.db)
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Standard", id))?;

    let now = Utc::now();
    let policies = create_policy_repository(&state.db)
        .policies_for_standard(id, query.published_only)
        .await?
        .into_iter()
        .map(|p| PolicyResponse::new(p, now))
        .collect();
    Ok(Json(policies))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_helpers::TestUser;
    use crate::test_helpers::{app_as, create_test_state, empty_request, json_request, read_json};
    use rto_core::models::Policy;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_crud_cycle() {
        let app = app_as(routes(), create_test_state().await, TestUser::admin());

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/",
                json!({"code": "1.1", "title": "Training and assessment", "category": "Training"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let standard: Standard = read_json(response).await;

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                &format!("/{}", standard.id),
                json!({"category": null}),
            ))
            .await
            .unwrap();
        let updated: Standard = read_json(response).await;
        assert_eq!(updated.category, None);
        assert_eq!(updated.title, "Training and assessment");

        let response = app
            .clone()
            .oneshot(empty_request("DELETE", &format!("/{}", standard.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(empty_request("GET", &format!("/{}", standard.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_policies_for_standard() {
        let state = create_test_state().await;
        let standard = create_standard_repository(&state.db)
            .create(&Standard::new("2.1", "Risk"))
            .await
            .unwrap();
        let repo = create_policy_repository(&state.db);
        let policy = repo
            .create(&Policy::new("POL-100", "Risk management"), None)
            .await
            .unwrap();
        repo.set_standards(policy.id, &[standard.id]).await.unwrap();
        let app = app_as(routes(), state, TestUser::staff());

        let response = app
            .clone()
            .oneshot(empty_request("GET", &format!("/{}/policies", standard.id)))
            .await
            .unwrap();
        let policies: Vec<Value> = read_json(response).await;
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0]["policy_number"], "POL-100");

        let response = app
            .oneshot(empty_request(
                "GET",
                &format!("/{}/policies?published_only=true", standard.id),
            ))
            .await
            .unwrap();
        let policies: Vec<Value> = read_json(response).await;
        assert!(policies.is_empty());
    }

    #[tokio::test]
    async fn test_staff_cannot_create() {
        let app = app_as(routes(), create_test_state().await, TestUser::staff());
        let response = app
            .oneshot(json_request("POST", "/", json!({"code": "9", "title": "x"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
