//! Staff credentials.
//!
//! Holders can always see and maintain their own credentials. The
//! `credentials:read` and `credentials:write` permissions extend that to
//! everyone's. Revocation is reserved for `credentials:write`.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rto_core::db::{create_credential_repository, create_user_repository, Pagination};
use rto_core::models::{Credential, CredentialFilter, CredentialType, CredentialUpdate};
use rto_core::{CredentialStatus, Permission};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{require_owner_or, require_permission, AuthenticatedUser};
use crate::dto::{clean_search, nullable, Paginated};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_credentials).post(create_credential))
        .route(
            "/:id",
            get(get_credential)
                .put(update_credential)
                .delete(delete_credential),
        )
        .route("/:id/revoke", post(revoke_credential))
}

#[derive(Debug, Deserialize)]
pub struct CredentialListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
    pub user_id: Option<Uuid>,
    pub status: Option<CredentialStatus>,
    pub credential_type: Option<CredentialType>,
    /// Active credentials expiring within this many days.
    pub expiring_within: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCredentialRequest {
    /// Defaults to the caller.
    pub user_id: Option<Uuid>,
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,
    pub credential_type: CredentialType,
    pub issuer: Option<String>,
    pub credential_number: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    #[validate(url(message = "Evidence URL must be a valid URL"))]
    pub evidence_url: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCredentialRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,
    pub credential_type: Option<CredentialType>,
    #[serde(default, deserialize_with = "nullable")]
    pub issuer: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub credential_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub issued_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub expires_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub evidence_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
}

/// A credential with its derived status.
#[derive(Debug, Serialize)]
pub struct CredentialResponse {
    #[serde(flatten)]
    pub credential: Credential,
    pub status: CredentialStatus,
    /// Whole days until expiry; negative once expired.
    pub days_until_expiry: Option<i64>,
}

impl CredentialResponse {
    pub fn new(credential: Credential, now: DateTime<Utc>) -> Self {
        let status = credential.status(now);
        let days_until_expiry = credential
            .expires_at
            .map(|expiry| (expiry - now).num_days());
        Self {
            credential,
            status,
            days_until_expiry,
        }
    }
}

fn check_dates(
    issued_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<(), ApiError> {
    if let (Some(issued), Some(expires)) = (issued_at, expires_at) {
        if expires < issued {
            return Err(ApiError::validation_field(
                "expires_at",
                "Expiry must not be before the issue date",
            ));
        }
    }
    Ok(())
}

async fn load_credential(state: &AppState, id: Uuid) -> Result<Credential, ApiError> {
    create_credential_repository(&state.db)
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Credential", id))
}

/// Longest look-ahead accepted for expiring-credential filters.
pub(crate) const MAX_EXPIRING_WITHIN_DAYS: i64 = 3650;

pub(crate) fn validate_expiring_window(field: &str, days: Option<i64>) -> Result<(), ApiError> {
    match days {
        Some(days) if !(1..=MAX_EXPIRING_WITHIN_DAYS).contains(&days) => {
            Err(ApiError::validation_field(
                field,
                format!("Must be between 1 and {}", MAX_EXPIRING_WITHIN_DAYS),
            ))
        }
        _ => Ok(()),
    }
}

async fn list_credentials(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiQuery(query): ApiQuery<CredentialListQuery>,
) -> Result<Json<Paginated<CredentialResponse>>, ApiError> {
    // Without the read permission the list is scoped to the caller.
    let user_id = if current.has_permission(Permission::CredentialsRead) {
        query.user_id
    } else {
        Some(current.id())
    };

    validate_expiring_window("expiring_within", query.expiring_within)?;

    let filter = CredentialFilter {
        user_id,
        credential_type: query.credential_type,
        status: query.status,
        expiring_within_days: query.expiring_within,
        search: clean_search(query.search.as_deref()),
    };
    let pagination = Pagination::from_query(query.page, query.per_page);
    let now = Utc::now();
    let result = create_credential_repository(&state.db)
        .list(&filter, &pagination)
        .await?
        .map(|c| CredentialResponse::new(c, now));
    Ok(Json(result.into()))
}

async fn get_credential(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<CredentialResponse>, ApiError> {
    let credential = load_credential(&state, id).await?;
    require_owner_or(&current, credential.user_id, Permission::CredentialsRead)?;
    Ok(Json(CredentialResponse::new(credential, Utc::now())))
}

async fn create_credential(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiJson(request): ApiJson<CreateCredentialRequest>,
) -> Result<(StatusCode, Json<CredentialResponse>), ApiError> {
    let user_id = request.user_id.unwrap_or_else(|| current.id());
    require_owner_or(&current, user_id, Permission::CredentialsWrite)?;
    request.validate()?;
    check_dates(request.issued_at, request.expires_at)?;

    if user_id != current.id() {
        create_user_repository(&state.db)
            .get(user_id)
            .await?
            .ok_or_else(|| ApiError::validation_field("user_id", "User does not exist"))?;
    }

    let mut credential = Credential::new(user_id, request.name.trim(), request.credential_type);
    credential.issuer = request.issuer;
    credential.credential_number = request.credential_number;
    credential.issued_at = request.issued_at;
    credential.expires_at = request.expires_at;
    credential.evidence_url = request.evidence_url;
    credential.notes = request.notes;

    let credential = create_credential_repository(&state.db)
        .create(&credential)
        .await?;
    info!(
        credential_id = %credential.id,
        holder = %credential.user_id,
        created_by = %current.id(),
        "Credential recorded"
    );
    Ok((
        StatusCode::CREATED,
        Json(CredentialResponse::new(credential, Utc::now())),
    ))
}

async fn update_credential(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateCredentialRequest>,
) -> Result<Json<CredentialResponse>, ApiError> {
    let existing = load_credential(&state, id).await?;
    require_owner_or(&current, existing.user_id, Permission::CredentialsWrite)?;
    request.validate()?;

    let issued_at = request.issued_at.unwrap_or(existing.issued_at);
    let expires_at = request.expires_at.unwrap_or(existing.expires_at);
    check_dates(issued_at, expires_at)?;

    let update = CredentialUpdate {
        name: request.name.map(|n| n.trim().to_string()),
        credential_type: request.credential_type,
        issuer: request.issuer,
        credential_number: request.credential_number,
        issued_at: request.issued_at,
        expires_at: request.expires_at,
        evidence_url: request.evidence_url,
        notes: request.notes,
    };
    let credential = create_credential_repository(&state.db)
        .update(id, &update)
        .await?;
    Ok(Json(CredentialResponse::new(credential, Utc::now())))
}

async fn delete_credential(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    let existing = load_credential(&state, id).await?;
    require_owner_or(&current, existing.user_id, Permission::CredentialsWrite)?;

    create_credential_repository(&state.db).delete(id).await?;
    info!(credential_id = %id, deleted_by = %current.id(), "Credential deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn revoke_credential(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<CredentialResponse>, ApiError> {
    require_permission(&current, Permission::CredentialsWrite)?;

    let credential = create_credential_repository(&state.db).revoke(id).await?;
    info!(credential_id = %id, revoked_by = %current.id(), "Credential revoked");
    Ok(Json(CredentialResponse::new(credential, Utc::now())))
}
