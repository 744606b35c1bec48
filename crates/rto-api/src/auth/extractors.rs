//! Axum extractors for authentication and authorization.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use rto_core::{
    db::{create_role_repository, create_user_repository},
    CurrentUser, Permission,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Extractor for authenticated users.
///
/// Reads a `Bearer` access token, then loads the user and role from the
/// database so deactivation and permission changes apply immediately.
///
/// ```ignore
/// async fn me(AuthenticatedUser(current): AuthenticatedUser) -> String {
///     current.user.full_name()
/// }
/// ```
pub struct AuthenticatedUser(pub CurrentUser);

/// Returns the bearer token from the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        #[cfg(test)]
        {
            if let Some(test_user) = parts.extensions.get::<super::test_helpers::TestUser>() {
                return Ok(AuthenticatedUser(test_user.0.clone()));
            }
        }

        let app_state = AppState::from_ref(state);

        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;
        let claims = app_state.jwt.verify_access_token(token)?;

        let current = load_current_user(&app_state, claims.sub).await?;
        Ok(AuthenticatedUser(current))
    }
}

/// Loads an active user and its role.
pub async fn load_current_user(state: &AppState, user_id: Uuid) -> Result<CurrentUser, ApiError> {
    let user = create_user_repository(&state.db)
        .get(user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User no longer exists".to_string()))?;

    if !user.is_active {
        debug!(user_id = %user.id, "Rejected token for deactivated account");
        return Err(ApiError::AccountDisabled);
    }

    let role = create_role_repository(&state.db)
        .get(user.role_id)
        .await?
        .ok_or_else(|| ApiError::Forbidden("User has no role assigned".to_string()))?;

    Ok(CurrentUser { user, role })
}

/// Fails with 403 unless the user's role grants `permission`.
pub fn require_permission(current: &CurrentUser, permission: Permission) -> Result<(), ApiError> {
    if current.has_permission(permission) {
        return Ok(());
    }
    warn!(
        user_id = %current.id(),
        role = %current.role.name,
        permission = %permission,
        "Permission denied"
    );
    Err(ApiError::Forbidden(format!(
        "Insufficient permissions: {} required",
        permission
    )))
}

/// Fails with 403 unless the user owns the record or holds `permission`.
pub fn require_owner_or(
    current: &CurrentUser,
    owner_id: Uuid,
    permission: Permission,
) -> Result<(), ApiError> {
    if current.can_access_owned(owner_id, permission) {
        return Ok(());
    }
    require_permission(current, permission)
}
