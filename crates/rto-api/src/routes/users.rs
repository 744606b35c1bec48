//! User administration.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use rto_core::auth::password::{generate_password, hash_new_password, hash_password};
use rto_core::auth::{UserFilter, UserUpdate};
use rto_core::db::{
    create_refresh_token_repository, create_role_repository, create_user_repository, Pagination,
};
use rto_core::{CurrentUser, Permission, User};
use rto_notify::{EmailTemplate, PasswordResetEmail, Recipient};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{require_permission, AuthenticatedUser};
use crate::dto::{clean_search, nullable, Paginated};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::routes::email::send_best_effort;
use crate::state::AppState;

/// Length of generated temporary passwords.
const TEMPORARY_PASSWORD_LEN: usize = 16;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
        .route("/:id/deactivate", post(deactivate_user))
        .route("/:id/activate", post(activate_user))
        .route("/:id/reset-password", post(reset_password))
}

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
    pub role_id: Option<Uuid>,
    pub department: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, max = 100, message = "First name must be 1-100 characters"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Last name must be 1-100 characters"))]
    pub last_name: String,
    pub password: String,
    pub role_id: Uuid,
    pub department: Option<String>,
    pub position: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 100, message = "First name must be 1-100 characters"))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Last name must be 1-100 characters"))]
    pub last_name: Option<String>,
    pub role_id: Option<Uuid>,
    #[serde(default, deserialize_with = "nullable")]
    pub department: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub position: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub phone: Option<Option<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PasswordResetResponse {
    pub message: String,
    /// Returned only when the password could not be emailed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporary_password: Option<String>,
    pub emailed: bool,
}

async fn ensure_role_exists(state: &AppState, role_id: Uuid) -> Result<(), ApiError> {
    create_role_repository(&state.db)
        .get(role_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| ApiError::validation_field("role_id", "Role does not exist"))
}

fn reject_self(current: &CurrentUser, id: Uuid, action: &str) -> Result<(), ApiError> {
    if current.id() == id {
        return Err(ApiError::BadRequest(format!(
            "You cannot {} your own account",
            action
        )));
    }
    Ok(())
}

async fn list_users(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiQuery(query): ApiQuery<UserListQuery>,
) -> Result<Json<Paginated<User>>, ApiError> {
    require_permission(&current, Permission::UsersRead)?;

    let filter = UserFilter {
        role_id: query.role_id,
        department: clean_search(query.department.as_deref()),
        is_active: query.is_active,
        search: clean_search(query.search.as_deref()),
    };
    let pagination = Pagination::from_query(query.page, query.per_page);
    let result = create_user_repository(&state.db)
        .list(&filter, &pagination)
        .await?;
    Ok(Json(result.into()))
}

async fn get_user(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<User>, ApiError> {
    require_permission(&current, Permission::UsersRead)?;

    let user = create_user_repository(&state.db)
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", id))?;
    Ok(Json(user))
}

async fn create_user(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiJson(request): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    require_permission(&current, Permission::UsersWrite)?;
    request.validate()?;
    ensure_role_exists(&state, request.role_id).await?;

    let password_hash = hash_new_password(&request.password)?;
    let mut user = User::new(
        request.email,
        request.first_name.trim(),
        request.last_name.trim(),
        password_hash,
        request.role_id,
    );
    user.department = request.department;
    user.position = request.position;
    user.phone = request.phone;

    let user = create_user_repository(&state.db).create(&user).await?;
    info!(user_id = %user.id, created_by = %current.id(), "User created");
    Ok((StatusCode::CREATED, Json(user)))
}

async fn update_user(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    require_permission(&current, Permission::UsersWrite)?;
    request.validate()?;
    if let Some(role_id) = request.role_id {
        ensure_role_exists(&state, role_id).await?;
    }
    if request.is_active == Some(false) {
        reject_self(&current, id, "deactivate")?;
    }

    let update = UserUpdate {
        email: request.email,
        first_name: request.first_name,
        last_name: request.last_name,
        role_id: request.role_id,
        department: request.department,
        position: request.position,
        phone: request.phone,
        is_active: request.is_active,
    };
    let user = create_user_repository(&state.db).update(id, &update).await?;
    Ok(Json(user))
}

async fn delete_user(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_permission(&current, Permission::UsersWrite)?;
    reject_self(&current, id, "delete")?;

    if !create_user_repository(&state.db).delete(id).await? {
        return Err(ApiError::not_found("User", id));
    }
    create_refresh_token_repository(&state.db)
        .revoke_all_for_user(id)
        .await?;

    info!(user_id = %id, deleted_by = %current.id(), "User deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn set_active(
    state: &AppState,
    current: &CurrentUser,
    id: Uuid,
    active: bool,
) -> Result<User, ApiError> {
    require_permission(current, Permission::UsersWrite)?;
    if !active {
        reject_self(current, id, "deactivate")?;
    }

    let update = UserUpdate {
        is_active: Some(active),
        ..Default::default()
    };
    let user = create_user_repository(&state.db).update(id, &update).await?;
    if !active {
        create_refresh_token_repository(&state.db)
            .revoke_all_for_user(id)
            .await?;
    }

    info!(user_id = %id, active, changed_by = %current.id(), "User activation changed");
    Ok(user)
}

async fn deactivate_user(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(set_active(&state, &current, id, false).await?))
}

async fn activate_user(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(set_active(&state, &current, id, true).await?))
}

/// Sets a generated temporary password and revokes the user's sessions.
///
/// The password is emailed when email is configured; otherwise it is
/// returned so an administrator can pass it on.
async fn reset_password(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<PasswordResetResponse>, ApiError> {
    require_permission(&current, Permission::UsersWrite)?;

    let users = create_user_repository(&state.db);
    let user = users
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    let temporary_password = generate_password(TEMPORARY_PASSWORD_LEN);
    let hash = hash_password(&temporary_password)?;
    users.update_password(id, &hash).await?;
    create_refresh_token_repository(&state.db)
        .revoke_all_for_user(id)
        .await?;

    let emailed = match &state.email {
        Some(email) => {
            let template = EmailTemplate::PasswordReset(PasswordResetEmail {
                recipient_name: user.full_name(),
                temporary_password: temporary_password.clone(),
                app_url: email.app_url().to_string(),
            });
            send_best_effort(email, &Recipient::from(&user), &template).await
        }
        None => false,
    };

    info!(user_id = %id, reset_by = %current.id(), emailed, "Password reset");
    Ok(Json(PasswordResetResponse {
        message: "Password reset".to_string(),
        temporary_password: (!emailed).then_some(temporary_password),
        emailed,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_helpers::{inject_test_user, TestUser};
    use crate::test_helpers::create_test_state;
    use axum::{body::Body, http::Request, middleware};
    use rto_core::auth::system_roles;
    use tower::ServiceExt;

    fn app(state: AppState, user: TestUser) -> Router {
        routes()
            .layer(middleware::from_fn(move |req, next| {
                inject_test_user(user.clone(), req, next)
            }))
            .with_state(state)
    }

    async fn staff_role(state: &AppState) -> Uuid {
        create_role_repository(&state.db)
            .get_by_name(system_roles::STAFF)
            .await
            .unwrap()
            .unwrap()
            .id
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let state = create_test_state().await;
        let role_id = staff_role(&state).await;
        let app = app(state, TestUser::admin());

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/",
                serde_json::json!({
                    "email": "new@example.com",
                    "first_name": "New",
                    "last_name": "Person",
                    "password": "Passw0rdX",
                    "role_id": role_id,
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let created: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(created.get("password_hash").is_none());

        let uri = format!("/{}", created["id"].as_str().unwrap());
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_weak_password_rejected() {
        let state = create_test_state().await;
        let role_id = staff_role(&state).await;
        let app = app(state, TestUser::admin());

        let response = app
            .oneshot(json_request(
                "POST",
                "/",
                serde_json::json!({
                    "email": "weak@example.com",
                    "first_name": "Weak",
                    "last_name": "Password",
                    "password": "short",
                    "role_id": role_id,
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cannot_delete_self() {
        let state = create_test_state().await;
        let admin = TestUser::admin();
        let uri = format!("/{}", admin.0.id());
        let app = app(state, admin);

        let response = app
            .oneshot(Request::delete(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_staff_cannot_list_users() {
        let app = app(create_test_state().await, TestUser::staff());
        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_reset_password_without_email_returns_password() {
        let state = create_test_state().await;
        let role_id = staff_role(&state).await;
        let user = User::new("reset@example.com", "Re", "Set", "x", role_id);
        let user = create_user_repository(&state.db).create(&user).await.unwrap();
        let app = app(state, TestUser::admin());

        let response = app
            .oneshot(
                Request::post(format!("/{}/reset-password", user.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let reset: PasswordResetResponse = serde_json::from_slice(&body).unwrap();
        assert!(!reset.emailed);
        assert_eq!(reset.temporary_password.unwrap().len(), TEMPORARY_PASSWORD_LEN);
    }
}
