//! Third-party integrations: Google Drive document storage plus the Xero
//! and Accelerate imports.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{Duration, Utc};
use rto_core::db::create_drive_repository;
use rto_core::models::{GoogleDriveConnection, GoogleDriveFile, GoogleDriveFolder};
use rto_core::Permission;
use rto_integrations::{DriveApi, OAuthTokens};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{require_permission, AuthenticatedUser};
use crate::dto::MessageResponse;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};
use crate::routes::health::IntegrationsHealth;
use crate::state::AppState;
use crate::sync::{sync_assets, sync_courses, SyncReport};

/// Record types that can have documents stored in Drive.
pub const DRIVE_ENTITY_TYPES: &[&str] = &[
    "policies",
    "credentials",
    "assets",
    "complaints",
    "training_products",
    "sops",
    "pd_items",
    "onboarding",
];

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(status))
        .route("/xero/sync-assets", post(sync_xero_assets))
        .route("/accelerate/sync-courses", post(sync_accelerate_courses))
        .route("/google-drive/auth-url", get(drive_auth_url))
        .route("/google-drive/callback", get(drive_callback))
        .route("/google-drive/connection", delete(drive_disconnect))
        .route("/google-drive/upload", post(drive_upload))
        .route("/google-drive/files", get(drive_files))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IntegrationStatus {
    #[serde(flatten)]
    pub configured: IntegrationsHealth,
    /// Users with a stored Drive connection.
    pub google_drive_connections: u64,
    /// Whether the caller has connected their own Drive.
    pub google_drive_connected: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthUrlResponse {
    pub url: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by Google when the user declines consent.
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UploadRequest {
    pub entity_type: String,
    pub entity_id: Uuid,
    #[validate(length(min = 1, max = 255, message = "File name must be 1-255 characters"))]
    pub file_name: String,
    #[validate(length(min = 1, max = 255, message = "MIME type is required"))]
    pub mime_type: String,
    pub content_base64: String,
}

#[derive(Debug, Deserialize)]
pub struct FilesQuery {
    pub entity_type: String,
    pub entity_id: Uuid,
}

fn drive_client(state: &AppState) -> Result<Arc<dyn DriveApi>, ApiError> {
    state
        .drive
        .clone()
        .ok_or_else(|| ApiError::ServiceUnavailable("Google Drive is not configured".to_string()))
}

fn check_entity_type(entity_type: &str) -> Result<(), ApiError> {
    if DRIVE_ENTITY_TYPES.contains(&entity_type) {
        Ok(())
    } else {
        Err(ApiError::validation_field(
            "entity_type",
            format!(
                "Unknown entity type: {}. Expected one of: {}",
                entity_type,
                DRIVE_ENTITY_TYPES.join(", ")
            ),
        ))
    }
}

fn connection_from_tokens(user_id: Uuid, tokens: OAuthTokens) -> GoogleDriveConnection {
    let now = Utc::now();
    GoogleDriveConnection {
        id: Uuid::new_v4(),
        user_id,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        expires_at: Some(now + Duration::seconds(tokens.expires_in)),
        scope: tokens.scope,
        connected_at: now,
        updated_at: now,
    }
}

async fn status(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
) -> Result<Json<IntegrationStatus>, ApiError> {
    require_permission(&current, Permission::IntegrationsManage)?;

    let repo = create_drive_repository(&state.db);
    Ok(Json(IntegrationStatus {
        configured: IntegrationsHealth::from_state(&state),
        google_drive_connections: repo.count_connections().await?,
        google_drive_connected: repo.get_connection(current.id()).await?.is_some(),
    }))
}

async fn sync_xero_assets(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
) -> Result<Json<SyncReport>, ApiError> {
    require_permission(&current, Permission::IntegrationsManage)?;
    let source = state
        .xero
        .clone()
        .ok_or_else(|| ApiError::ServiceUnavailable("Xero is not configured".to_string()))?;

    Ok(Json(sync_assets(&state.db, source.as_ref()).await?))
}

async fn sync_accelerate_courses(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
) -> Result<Json<SyncReport>, ApiError> {
    require_permission(&current, Permission::IntegrationsManage)?;
    let source = state.accelerate.clone().ok_or_else(|| {
        ApiError::ServiceUnavailable("Accelerate is not configured".to_string())
    })?;

    Ok(Json(sync_courses(&state.db, source.as_ref()).await?))
}

async fn drive_auth_url(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
) -> Result<Json<AuthUrlResponse>, ApiError> {
    require_permission(&current, Permission::IntegrationsManage)?;
    let drive = drive_client(&state)?;

    let token = state.oauth_states.issue(current.id());
    Ok(Json(AuthUrlResponse {
        url: drive.authorization_url(&token),
        state: token,
    }))
}

/// Google redirects the browser here without an API token, so the one-time
/// `state` token identifies the user who started the flow.
async fn drive_callback(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<CallbackQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    let drive = drive_client(&state)?;

    let token = query
        .state
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("Missing state parameter".to_string()))?;
    let user_id = state.oauth_states.consume(token).ok_or_else(|| {
        warn!("Google Drive callback with unknown or expired state");
        ApiError::BadRequest("Invalid or expired state parameter".to_string())
    })?;

    if let Some(error) = query.error {
        return Err(ApiError::BadRequest(format!(
            "Google Drive authorization was declined: {}",
            error
        )));
    }
    let code = query
        .code
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("Missing code parameter".to_string()))?;

    let tokens = drive.exchange_code(code).await?;
    create_drive_repository(&state.db)
        .upsert_connection(&connection_from_tokens(user_id, tokens))
        .await?;

    info!(user_id = %user_id, "Google Drive connected");
    Ok(Json(MessageResponse::new("Google Drive connected")))
}

async fn drive_disconnect(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
) -> Result<StatusCode, ApiError> {
    require_permission(&current, Permission::IntegrationsManage)?;

    if !create_drive_repository(&state.db)
        .delete_connection(current.id())
        .await?
    {
        return Err(ApiError::NotFound(
            "No Google Drive connection for this user".to_string(),
        ));
    }
    info!(user_id = %current.id(), "Google Drive disconnected");
    Ok(StatusCode::NO_CONTENT)
}

/// The caller's connection, refreshed when the access token is about to
/// expire.
async fn active_connection(
    state: &AppState,
    drive: &dyn DriveApi,
    user_id: Uuid,
) -> Result<GoogleDriveConnection, ApiError> {
    let repo = create_drive_repository(&state.db);
    let connection = repo.get_connection(user_id).await?.ok_or_else(|| {
        ApiError::BadRequest("Connect Google Drive before uploading".to_string())
    })?;

    if !connection.needs_refresh(Utc::now()) {
        return Ok(connection);
    }
    let refresh_token = connection.refresh_token.as_deref().ok_or_else(|| {
        ApiError::BadRequest("Google Drive session expired; reconnect to continue".to_string())
    })?;
    let tokens = drive.refresh(refresh_token).await?;
    info!(user_id = %user_id, "Refreshed Google Drive access token");
    Ok(repo
        .upsert_connection(&connection_from_tokens(user_id, tokens))
        .await?)
}

/// Finds or creates the folder for `entity_type`/`entity_id`, under a
/// per-type parent folder.
async fn entity_folder(
    state: &AppState,
    drive: &dyn DriveApi,
    access_token: &str,
    entity_type: &str,
    entity_id: Uuid,
) -> Result<GoogleDriveFolder, ApiError> {
    let repo = create_drive_repository(&state.db);
    if let Some(folder) = repo.find_folder(entity_type, Some(entity_id)).await? {
        return Ok(folder);
    }

    let parent = match repo.find_folder(entity_type, None).await? {
        Some(parent) => parent,
        None => {
            let item = drive.create_folder(access_token, entity_type, None).await?;
            repo.create_folder(&GoogleDriveFolder {
                id: Uuid::new_v4(),
                drive_folder_id: item.id,
                name: entity_type.to_string(),
                parent_drive_id: None,
                entity_type: entity_type.to_string(),
                entity_id: None,
                created_at: Utc::now(),
            })
            .await?
        }
    };

    let name = entity_id.to_string();
    let item = drive
        .create_folder(access_token, &name, Some(&parent.drive_folder_id))
        .await?;
    Ok(repo
        .create_folder(&GoogleDriveFolder {
            id: Uuid::new_v4(),
            drive_folder_id: item.id,
            name,
            parent_drive_id: Some(parent.drive_folder_id),
            entity_type: entity_type.to_string(),
            entity_id: Some(entity_id),
            created_at: Utc::now(),
        })
        .await?)
}

async fn drive_upload(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiJson(request): ApiJson<UploadRequest>,
) -> Result<(StatusCode, Json<GoogleDriveFile>), ApiError> {
    require_permission(&current, Permission::IntegrationsManage)?;
    request.validate()?;
    check_entity_type(&request.entity_type)?;
    let drive = drive_client(&state)?;

    let content = BASE64
        .decode(request.content_base64.trim())
        .map_err(|_| ApiError::validation_field("content_base64", "Content is not valid base64"))?;
    if content.is_empty() {
        return Err(ApiError::validation_field(
            "content_base64",
            "File content is empty",
        ));
    }

    let connection = active_connection(&state, drive.as_ref(), current.id()).await?;
    let folder = entity_folder(
        &state,
        drive.as_ref(),
        &connection.access_token,
        &request.entity_type,
        request.entity_id,
    )
    .await?;

    let size = content.len();
    let item = drive
        .upload_file(
            &connection.access_token,
            &request.file_name,
            &request.mime_type,
            content,
            Some(&folder.drive_folder_id),
        )
        .await?;

    let file = create_drive_repository(&state.db)
        .create_file(&GoogleDriveFile {
            id: Uuid::new_v4(),
            drive_file_id: item.id,
            name: request.file_name,
            mime_type: request.mime_type,
            folder_id: Some(folder.id),
            entity_type: request.entity_type,
            entity_id: request.entity_id,
            web_view_link: item.web_view_link,
            uploaded_by: Some(current.id()),
            created_at: Utc::now(),
        })
        .await?;

    info!(
        file_id = %file.id,
        entity_type = %file.entity_type,
        entity_id = %file.entity_id,
        bytes = size,
        "Uploaded file to Google Drive"
    );
    Ok((StatusCode::CREATED, Json(file)))
}

async fn drive_files(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiQuery(query): ApiQuery<FilesQuery>,
) -> Result<Json<Vec<GoogleDriveFile>>, ApiError> {
    require_permission(&current, Permission::IntegrationsManage)?;
    check_entity_type(&query.entity_type)?;

    Ok(Json(
        create_drive_repository(&state.db)
            .list_files(&query.entity_type, query.entity_id)
            .await?,
    ))
}
