//! Roles and the permission catalogue.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use rto_core::auth::RoleUpdate;
use rto_core::db::{create_role_repository, create_user_repository};
use rto_core::{Permission, Role};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{require_permission, AuthenticatedUser};
use crate::dto::nullable;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_roles).post(create_role))
        .route("/permissions", get(list_permissions))
        .route("/:id", get(get_role).put(update_role).delete(delete_role))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRoleRequest {
    #[validate(length(min = 1, max = 64, message = "Name must be 1-64 characters"))]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: BTreeSet<Permission>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRoleRequest {
    #[validate(length(min = 1, max = 64, message = "Name must be 1-64 characters"))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub permissions: Option<BTreeSet<Permission>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PermissionInfo {
    pub name: String,
    pub resource: String,
    pub action: String,
}

async fn list_roles(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
) -> Result<Json<Vec<Role>>, ApiError> {
    require_permission(&current, Permission::UsersRead)?;
    Ok(Json(create_role_repository(&state.db).list().await?))
}

async fn list_permissions(
    AuthenticatedUser(current): AuthenticatedUser,
) -> Result<Json<Vec<PermissionInfo>>, ApiError> {
    require_permission(&current, Permission::UsersRead)?;

    let permissions = Permission::all()
        .iter()
        .map(|p| {
            let name = p.as_str();
            let (resource, action) = name.split_once(':').unwrap_or((name, ""));
            PermissionInfo {
                name: name.to_string(),
                resource: resource.to_string(),
                action: action.to_string(),
            }
        })
        .collect();
    Ok(Json(permissions))
}

async fn get_role(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Role>, ApiError> {
    require_permission(&current, Permission::UsersRead)?;

    let role = create_role_repository(&state.db)
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Role", id))?;
    Ok(Json(role))
}

async fn create_role(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiJson(request): ApiJson<CreateRoleRequest>,
) -> Result<(StatusCode, Json<Role>), ApiError> {
    require_permission(&current, Permission::RolesManage)?;
    request.validate()?;

    let role = Role::new(
        request.name.trim(),
        request.description,
        request.permissions,
    );
    let role = create_role_repository(&state.db).create(&role).await?;
    info!(role = %role.name, created_by = %current.id(), "Role created");
    Ok((StatusCode::CREATED, Json(role)))
}

/// System roles keep their name and permissions; only the description of a
/// system role may change.
async fn update_role(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateRoleRequest>,
) -> Result<Json<Role>, ApiError> {
    require_permission(&current, Permission::RolesManage)?;
    request.validate()?;

    let repo = create_role_repository(&state.db);
    let existing = repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Role", id))?;
    if existing.is_system && (request.name.is_some() || request.permissions.is_some()) {
        return Err(ApiError::BadRequest(
            "System roles cannot be renamed or have their permissions changed".to_string(),
        ));
    }

    let update = RoleUpdate {
        name: request.name.map(|n| n.trim().to_string()),
        description: request.description,
        permissions: request.permissions,
    };
    let role = repo.update(id, &update).await?;
    info!(role = %role.name, updated_by = %current.id(), "Role updated");
    Ok(Json(role))
}

async fn delete_role(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_permission(&current, Permission::RolesManage)?;

    let repo = create_role_repository(&state.db);
    let role = repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Role", id))?;
    if role.is_system {
        return Err(ApiError::BadRequest(
            "System roles cannot be deleted".to_string(),
        ));
    }

    let usage = create_user_repository(&state.db).count_by_role(id).await?;
    if usage.active > 0 {
        return Err(ApiError::Conflict(format!(
            "Role is assigned to {} user(s)",
            usage.active
        )));
    }
    if usage.deleted > 0 {
        return Err(ApiError::Conflict(format!(
            "Role is still referenced by {} deleted user(s)",
            usage.deleted
        )));
    }

    repo.delete(id).await?;
    info!(role = %role.name, deleted_by = %current.id(), "Role deleted");
    Ok(StatusCode::NO_CONTENT)
}
