//! Token authentication: login, refresh rotation, logout and password change.

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rto_core::auth::password::{hash_new_password, verify_password};
use rto_core::auth::RefreshToken;
use rto_core::db::{create_refresh_token_repository, create_role_repository, create_user_repository};
use rto_core::{Permission, Role, User};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::{info, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::{hash_refresh_token, load_current_user, AuthenticatedUser};
use crate::dto::MessageResponse;
use crate::error::{ApiError, ProblemDetails};
use crate::extract::ApiJson;
use crate::rate_limit::extract_client_ip;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/change-password", post(change_password))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Always `Bearer`.
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    #[schema(value_type = Object)]
    pub user: User,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    #[schema(value_type = Object)]
    pub user: User,
    #[schema(value_type = Object)]
    pub role: Role,
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    pub new_password: String,
}

/// Issues an access token and a stored refresh token for `user`.
async fn issue_tokens(state: &AppState, user: User, role: &Role) -> Result<TokenResponse, ApiError> {
    let access_token = state.jwt.issue_access_token(&user, role)?;
    let refresh = state.jwt.issue_refresh_token();

    create_refresh_token_repository(&state.db)
        .create(&RefreshToken::new(
            user.id,
            refresh.token_hash,
            refresh.expires_at,
        ))
        .await?;

    Ok(TokenResponse {
        access_token,
        refresh_token: refresh.token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt.access_ttl_secs(),
        user,
    })
}

/// Exchanges email and password for a token pair.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = TokenResponse),
        (status = 400, description = "Invalid request", body = ProblemDetails),
        (status = 401, description = "Invalid credentials", body = ProblemDetails),
        (status = 403, description = "Account disabled", body = ProblemDetails),
        (status = 429, description = "Too many attempts", body = ProblemDetails)
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let client_ip = extract_client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr));

    // Rate limits are checked before any credential work.
    state.login_limiter.check(client_ip).map_err(|e| {
        warn!(ip = %client_ip, email = %request.email, "Login rate limited");
        e
    })?;

    request.validate()?;

    let users = create_user_repository(&state.db);
    let Some(user) = users.get_by_email(&request.email).await? else {
        warn!(ip = %client_ip, email = %request.email, "Login attempt for unknown user");
        return Err(ApiError::InvalidCredentials);
    };

    if !verify_password(&request.password, &user.password_hash)? {
        warn!(ip = %client_ip, user_id = %user.id, "Invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    if !user.is_active {
        warn!(ip = %client_ip, user_id = %user.id, "Login attempt for deactivated account");
        return Err(ApiError::AccountDisabled);
    }

    let role = create_role_repository(&state.db)
        .get(user.role_id)
        .await?
        .ok_or_else(|| ApiError::Forbidden("User has no role assigned".to_string()))?;

    users.update_last_login(user.id).await?;
    let user = users.get(user.id).await?.unwrap_or(user);

    info!(ip = %client_ip, user_id = %user.id, role = %role.name, "User logged in");
    Ok(Json(issue_tokens(&state, user, &role).await?))
}

/// Rotates a refresh token: the presented token is revoked and a new pair
/// is returned.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenResponse),
        (status = 401, description = "Unknown, revoked or expired token", body = ProblemDetails)
    ),
    tag = "Auth"
)]
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RefreshRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let tokens = create_refresh_token_repository(&state.db);
    let stored = tokens
        .get_by_hash(&hash_refresh_token(&request.refresh_token))
        .await?
        .filter(|t| t.is_usable(Utc::now()))
        .ok_or_else(|| ApiError::Unauthorized("Invalid or expired refresh token".to_string()))?;

    let current = load_current_user(&state, stored.user_id).await?;

    // A concurrent rotation of the same token loses here.
    if !tokens.revoke(stored.id).await? {
        return Err(ApiError::Unauthorized(
            "Invalid or expired refresh token".to_string(),
        ));
    }

    Ok(Json(issue_tokens(&state, current.user, &current.role).await?))
}

/// Revokes a refresh token. Unknown tokens are ignored.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    request_body = RefreshRequest,
    responses((status = 204, description = "Logged out")),
    tag = "Auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RefreshRequest>,
) -> Result<StatusCode, ApiError> {
    let tokens = create_refresh_token_repository(&state.db);
    if let Some(stored) = tokens
        .get_by_hash(&hash_refresh_token(&request.refresh_token))
        .await?
    {
        tokens.revoke(stored.id).await?;
        info!(user_id = %stored.user_id, "User logged out");
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Returns the current user with role and effective permissions.
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "Not authenticated", body = ProblemDetails)
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn me(AuthenticatedUser(current): AuthenticatedUser) -> Json<MeResponse> {
    let permissions = current
        .role
        .permissions
        .iter()
        .map(Permission::as_str)
        .map(str::to_string)
        .collect();
    Json(MeResponse {
        user: current.user,
        role: current.role,
        permissions,
    })
}

/// Changes the caller's password and revokes every refresh token they hold.
#[utoipa::path(
    post,
    path = "/api/v1/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Wrong current password or weak new password", body = ProblemDetails)
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn change_password(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiJson(request): ApiJson<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    request.validate()?;

    if !verify_password(&request.current_password, &current.user.password_hash)? {
        return Err(ApiError::validation_field(
            "current_password",
            "Current password is incorrect",
        ));
    }
    let new_hash = hash_new_password(&request.new_password)?;

    create_user_repository(&state.db)
        .update_password(current.id(), &new_hash)
        .await?;
    let revoked = create_refresh_token_repository(&state.db)
        .revoke_all_for_user(current.id())
        .await?;

    info!(user_id = %current.id(), revoked_tokens = revoked, "Password changed");
    Ok(Json(MessageResponse::new("Password changed")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::create_test_state;
    use axum::{body::Body, http::Request};
    use rto_core::auth::password::hash_password;
    use rto_core::auth::system_roles;
    use tower::ServiceExt;

    async fn seed_user(state: &AppState, email: &str, password: &str, active: bool) -> User {
        let role = create_role_repository(&state.db)
            .get_by_name(system_roles::STAFF)
            .await
            .unwrap()
            .unwrap();
        let mut user = User::new(email, "Sam", "Lee", hash_password(password).unwrap(), role.id);
        user.is_active = active;
        create_user_repository(&state.db).create(&user).await.unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_login_and_refresh_rotation() {
        let state = create_test_state().await;
        seed_user(&state, "sam@example.com", "Passw0rd!", true).await;
        let app = routes().with_state(state);

        let response = app
            .clone()
            .oneshot(post_json(
                "/login",
                serde_json::json!({"email": "SAM@example.com", "password": "Passw0rd!"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let tokens: TokenResponse = json_body(response).await;
        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.expires_in, 900);
        assert!(tokens.user.last_login_at.is_some());

        let response = app
            .clone()
            .oneshot(post_json(
                "/refresh",
                serde_json::json!({"refresh_token": tokens.refresh_token}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let rotated: TokenResponse = json_body(response).await;
        assert_ne!(rotated.refresh_token, tokens.refresh_token);

        // The old token was revoked by the rotation.
        let response = app
            .oneshot(post_json(
                "/refresh",
                serde_json::json!({"refresh_token": tokens.refresh_token}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_wrong_password_is_invalid_credentials() {
        let state = create_test_state().await;
        seed_user(&state, "sam@example.com", "Passw0rd!", true).await;
        let app = routes().with_state(state);

        let response = app
            .oneshot(post_json(
                "/login",
                serde_json::json!({"email": "sam@example.com", "password": "wrong"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let problem: ProblemDetails = json_body(response).await;
        assert_eq!(problem.code, "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn test_deactivated_account_is_forbidden() {
        let state = create_test_state().await;
        seed_user(&state, "gone@example.com", "Passw0rd!", false).await;
        let app = routes().with_state(state);

        let response = app
            .oneshot(post_json(
                "/login",
                serde_json::json!({"email": "gone@example.com", "password": "Passw0rd!"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let problem: ProblemDetails = json_body(response).await;
        assert_eq!(problem.code, "ACCOUNT_DISABLED");
    }

    #[tokio::test]
    async fn test_logout_revokes_refresh_token() {
        let state = create_test_state().await;
        seed_user(&state, "sam@example.com", "Passw0rd!", true).await;
        let app = routes().with_state(state);

        let response = app
            .clone()
            .oneshot(post_json(
                "/login",
                serde_json::json!({"email": "sam@example.com", "password": "Passw0rd!"}),
            ))
            .await
            .unwrap();
        let tokens: TokenResponse = json_body(response).await;

        let response = app
            .clone()
            .oneshot(post_json(
                "/logout",
                serde_json::json!({"refresh_token": tokens.refresh_token}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(post_json(
                "/refresh",
                serde_json::json!({"refresh_token": tokens.refresh_token}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_me_requires_token() {
        let app = routes().with_state(create_test_state().await);
        let response = app
            .oneshot(Request::get("/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
