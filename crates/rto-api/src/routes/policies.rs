//! Policies, their version history and standard mappings.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rto_core::db::{
    create_policy_repository, create_standard_repository, NewPolicyVersion, Pagination,
};
use rto_core::models::{Policy, PolicyFilter, PolicyStatus, PolicyUpdate, PolicyVersion, Standard};
use rto_core::{Permission, ReviewStatus};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{require_permission, AuthenticatedUser};
use crate::dto::{clean_search, nullable, Paginated};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_policies).post(create_policy))
        .route(
            "/:id",
            get(get_policy).put(update_policy).delete(delete_policy),
        )
        .route("/:id/versions", get(list_versions).post(add_version))
        .route("/:id/publish", post(publish_policy))
        .route("/:id/archive", post(archive_policy))
        .route("/:id/standards", put(set_standards))
}

#[derive(Debug, Deserialize)]
pub struct PolicyListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
    pub status: Option<PolicyStatus>,
    pub category: Option<String>,
    pub owner_id: Option<Uuid>,
    pub review_status: Option<ReviewStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePolicyRequest {
    #[validate(length(min = 1, max = 50, message = "Policy number must be 1-50 characters"))]
    pub policy_number: String,
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub owner_id: Option<Uuid>,
    pub review_date: Option<DateTime<Utc>>,
    /// Content of version 1. Without it the policy starts with no versions.
    pub content: Option<String>,
    pub change_summary: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePolicyRequest {
    #[validate(length(min = 1, max = 50, message = "Policy number must be 1-50 characters"))]
    pub policy_number: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub category: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub owner_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "nullable")]
    pub review_date: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddVersionRequest {
    #[validate(length(min = 1, message = "Content is required"))]
    pub content: String,
    pub change_summary: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetStandardsRequest {
    pub standard_ids: Vec<Uuid>,
}

/// A policy with its derived review status.
#[derive(Debug, Serialize)]
pub struct PolicyResponse {
    #[serde(flatten)]
    pub policy: Policy,
    pub review_status: ReviewStatus,
}

impl PolicyResponse {
    pub fn new(policy: Policy, now: DateTime<Utc>) -> Self {
        let review_status = policy.review_status(now);
        Self {
            policy,
            review_status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PolicyDetail {
    #[serde(flatten)]
    pub policy: PolicyResponse,
    pub current_version: Option<PolicyVersion>,
    pub standards: Vec<Standard>,
}

async fn load_policy(state: &AppState, id: Uuid) -> Result<Policy, ApiError> {
    create_policy_repository(&state.db)
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Policy", id))
}

async fn list_policies(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiQuery(query): ApiQuery<PolicyListQuery>,
) -> Result<Json<Paginated<PolicyResponse>>, ApiError> {
    require_permission(&current, Permission::PoliciesRead)?;

    let filter = PolicyFilter {
        status: query.status,
        category: clean_search(query.category.as_deref()),
        owner_id: query.owner_id,
        review_status: query.review_status,
        search: clean_search(query.search.as_deref()),
    };
    let pagination = Pagination::from_query(query.page, query.per_page);
    let now = Utc::now();
    let result = create_policy_repository(&state.db)
        .list(&filter, &pagination)
        .await?
        .map(|p| PolicyResponse::new(p, now));
    Ok(Json(result.into()))
}

async fn get_policy(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<PolicyDetail>, ApiError> {
    require_permission(&current, Permission::PoliciesRead)?;

    let repo = create_policy_repository(&state.db);
    let policy = load_policy(&state, id).await?;
    let current_version = match policy.current_version_id {
        Some(version_id) => repo.get_version(version_id).await?,
        None => None,
    };
    let standards = repo.standards_for_policy(id).await?;

    Ok(Json(PolicyDetail {
        policy: PolicyResponse::new(policy, Utc::now()),
        current_version,
        standards,
    }))
}

async fn create_policy(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiJson(request): ApiJson<CreatePolicyRequest>,
) -> Result<(StatusCode, Json<PolicyResponse>), ApiError> {
    require_permission(&current, Permission::PoliciesWrite)?;
    request.validate()?;

    let mut policy = Policy::new(request.policy_number.trim(), request.title.trim());
    policy.category = request.category;
    policy.description = request.description;
    policy.owner_id = request.owner_id;
    policy.review_date = request.review_date;

    let initial = request
        .content
        .filter(|c| !c.trim().is_empty())
        .map(|content| NewPolicyVersion {
            content,
            change_summary: request.change_summary,
            created_by: Some(current.id()),
        });

    let policy = create_policy_repository(&state.db)
        .create(&policy, initial.as_ref())
        .await?;
    info!(policy = %policy.policy_number, created_by = %current.id(), "Policy created");
    Ok((
        StatusCode::CREATED,
        Json(PolicyResponse::new(policy, Utc::now())),
    ))
}

async fn update_policy(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdatePolicyRequest>,
) -> Result<Json<PolicyResponse>, ApiError> {
    require_permission(&current, Permission::PoliciesWrite)?;
    request.validate()?;

    let update = PolicyUpdate {
        policy_number: request.policy_number.map(|n| n.trim().to_string()),
        title: request.title.map(|t| t.trim().to_string()),
        category: request.category,
        description: request.description,
        owner_id: request.owner_id,
        review_date: request.review_date,
    };
    let policy = create_policy_repository(&state.db)
        .update(id, &update)
        .await?;
    Ok(Json(PolicyResponse::new(policy, Utc::now())))
}

async fn delete_policy(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_permission(&current, Permission::PoliciesWrite)?;

    if !create_policy_repository(&state.db).delete(id).await? {
        return Err(ApiError::not_found("Policy", id));
    }
    info!(policy_id = %id, deleted_by = %current.id(), "Policy deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_versions(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Vec<PolicyVersion>>, ApiError> {
    require_permission(&current, Permission::PoliciesRead)?;

    load_policy(&state, id).await?;
    let versions = create_policy_repository(&state.db)
        .list_versions(id)
        .await?;
    Ok(Json(versions))
}

async fn add_version(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<AddVersionRequest>,
) -> Result<(StatusCode, Json<PolicyVersion>), ApiError> {
    require_permission(&current, Permission::PoliciesWrite)?;
    request.validate()?;

    let version = create_policy_repository(&state.db)
        .add_version(
            id,
            &NewPolicyVersion {
                content: request.content,
                change_summary: request.change_summary,
                created_by: Some(current.id()),
            },
        )
        .await?;
    info!(
        policy_id = %id,
        version = version.version_number,
        "Policy version added"
    );
    Ok((StatusCode::CREATED, Json(version)))
}

async fn publish_policy(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<PolicyResponse>, ApiError> {
    require_permission(&current, Permission::PoliciesPublish)?;

    let policy = load_policy(&state, id).await?;
    if policy.status == PolicyStatus::Archived {
        return Err(ApiError::BadRequest(
            "Archived policies cannot be published".to_string(),
        ));
    }
    if policy.current_version_id.is_none() {
        return Err(ApiError::BadRequest(
            "A policy needs at least one version before it can be published".to_string(),
        ));
    }

    let now = Utc::now();
    let policy = create_policy_repository(&state.db)
        .set_status(id, PolicyStatus::Published, Some(now))
        .await?;
    info!(policy = %policy.policy_number, published_by = %current.id(), "Policy published");
    Ok(Json(PolicyResponse::new(policy, now)))
}

async fn archive_policy(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<PolicyResponse>, ApiError> {
    require_permission(&current, Permission::PoliciesWrite)?;

    let policy = create_policy_repository(&state.db)
        .set_status(id, PolicyStatus::Archived, None)
        .await?;
    info!(policy = %policy.policy_number, archived_by = %current.id(), "Policy archived");
    Ok(Json(PolicyResponse::new(policy, Utc::now())))
}

async fn set_standards(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<SetStandardsRequest>,
) -> Result<Json<Vec<Standard>>, ApiError> {
    require_permission(&current, Permission::PoliciesWrite)?;
    load_policy(&state, id).await?;

    let mut standard_ids = request.standard_ids;
    standard_ids.sort();
    standard_ids.dedup();

    let standards = create_standard_repository(&state.db);
    for standard_id in &standard_ids {
        if standards.get(*standard_id).await?.is_none() {
            return Err(ApiError::validation_field(
                "standard_ids",
                format!("Standard {} does not exist", standard_id),
            ));
        }
    }

    let repo = create_policy_repository(&state.db);
    repo.set_standards(id, &standard_ids).await?;
    Ok(Json(repo.standards_for_policy(id).await?))
}
