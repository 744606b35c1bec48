//! Physical assets and their service history.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use rto_core::db::{create_asset_repository, Pagination};
use rto_core::models::{Asset, AssetFilter, AssetService, AssetStatus, AssetUpdate};
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
        .route("/", get(list_assets).post(create_asset))
        .route("/:id", get(get_asset).put(update_asset).delete(delete_asset))
        .route("/:id/services", get(list_services).post(record_service))
}

#[derive(Debug, Deserialize)]
pub struct AssetListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
    pub status: Option<AssetStatus>,
    pub category: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub service_status: Option<ReviewStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAssetRequest {
    #[validate(length(min = 1, max = 50, message = "Asset tag must be 1-50 characters"))]
    pub asset_tag: String,
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,
    pub category: Option<String>,
    pub location: Option<String>,
    pub status: Option<AssetStatus>,
    pub purchase_date: Option<DateTime<Utc>>,
    #[validate(range(min = 0.0, message = "Purchase cost must not be negative"))]
    pub purchase_cost: Option<f64>,
    pub assigned_to: Option<Uuid>,
    pub next_service_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateAssetRequest {
    #[validate(length(min = 1, max = 50, message = "Asset tag must be 1-50 characters"))]
    pub asset_tag: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub category: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub location: Option<Option<String>>,
    pub status: Option<AssetStatus>,
    #[serde(default, deserialize_with = "nullable")]
    pub purchase_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub purchase_cost: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub assigned_to: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "nullable")]
    pub next_service_date: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordServiceRequest {
    pub service_date: DateTime<Utc>,
    #[validate(length(min = 1, max = 100, message = "Service type must be 1-100 characters"))]
    pub service_type: String,
    pub performed_by: Option<String>,
    #[validate(range(min = 0.0, message = "Cost must not be negative"))]
    pub cost: Option<f64>,
    pub notes: Option<String>,
    pub next_service_date: Option<DateTime<Utc>>,
}

/// An asset with its derived service status.
#[derive(Debug, Serialize)]
pub struct AssetResponse {
    #[serde(flatten)]
    pub asset: Asset,
    pub service_status: ReviewStatus,
}

impl AssetResponse {
    pub fn new(asset: Asset, now: DateTime<Utc>) -> Self {
        let service_status = asset.service_status(now);
        Self {
            asset,
            service_status,
        }
    }
}

async fn load_asset(state: &AppState, id: Uuid) -> Result<Asset, ApiError> {
    create_asset_repository(&state.db)
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Asset", id))
}

async fn list_assets(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiQuery(query): ApiQuery<AssetListQuery>,
) -> Result<Json<Paginated<AssetResponse>>, ApiError> {
    require_permission(&current, Permission::AssetsRead)?;

    let filter = AssetFilter {
        status: query.status,
        category: clean_search(query.category.as_deref()),
        assigned_to: query.assigned_to,
        service_status: query.service_status,
        search: clean_search(query.search.as_deref()),
    };
    let pagination = Pagination::from_query(query.page, query.per_page);
    let now = Utc::now();
    let result = create_asset_repository(&state.db)
        .list(&filter, &pagination)
        .await?
        .map(|a| AssetResponse::new(a, now));
    Ok(Json(result.into()))
}

async fn get_asset(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<AssetResponse>, ApiError> {
    require_permission(&current, Permission::AssetsRead)?;
    let asset = load_asset(&state, id).await?;
    Ok(Json(AssetResponse::new(asset, Utc::now())))
}

async fn create_asset(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiJson(request): ApiJson<CreateAssetRequest>,
) -> Result<(StatusCode, Json<AssetResponse>), ApiError> {
    require_permission(&current, Permission::AssetsWrite)?;
    request.validate()?;

    let mut asset = Asset::new(request.asset_tag.trim(), request.name.trim());
    asset.category = request.category;
    asset.location = request.location;
    if let Some(status) = request.status {
        asset.status = status;
    }
    asset.purchase_date = request.purchase_date;
    asset.purchase_cost = request.purchase_cost;
    asset.assigned_to = request.assigned_to;
    asset.next_service_date = request.next_service_date;

    let asset = create_asset_repository(&state.db).create(&asset).await?;
    info!(asset_tag = %asset.asset_tag, created_by = %current.id(), "Asset created");
    Ok((
        StatusCode::CREATED,
        Json(AssetResponse::new(asset, Utc::now())),
    ))
}

async fn update_asset(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateAssetRequest>,
) -> Result<Json<AssetResponse>, ApiError> {
    require_permission(&current, Permission::AssetsWrite)?;
    request.validate()?;
    if let Some(Some(cost)) = request.purchase_cost {
        if cost < 0.0 {
            return Err(ApiError::validation_field(
                "purchase_cost",
                "Purchase cost must not be negative",
            ));
        }
    }

    let update = AssetUpdate {
        asset_tag: request.asset_tag.map(|t| t.trim().to_string()),
        name: request.name.map(|n| n.trim().to_string()),
        category: request.category,
        location: request.location,
        status: request.status,
        purchase_date: request.purchase_date,
        purchase_cost: request.purchase_cost,
        assigned_to: request.assigned_to,
        next_service_date: request.next_service_date,
        external_id: None,
    };
    let asset = create_asset_repository(&state.db)
        .update(id, &update)
        .await?;
    Ok(Json(AssetResponse::new(asset, Utc::now())))
}

async fn delete_asset(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_permission(&current, Permission::AssetsWrite)?;

    if !create_asset_repository(&state.db).delete(id).await? {
        return Err(ApiError::not_found("Asset", id));
    }
    info!(asset_id = %id, deleted_by = %current.id(), "Asset deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_services(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Vec<AssetService>>, ApiError> {
    require_permission(&current, Permission::AssetsRead)?;
    load_asset(&state, id).await?;

    Ok(Json(
        create_asset_repository(&state.db)
            .list_services(id)
            .await?,
    ))
}

async fn record_service(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<RecordServiceRequest>,
) -> Result<(StatusCode, Json<AssetService>), ApiError> {
    require_permission(&current, Permission::AssetsWrite)?;
    request.validate()?;
    if let Some(next) = request.next_service_date {
        if next < request.service_date {
            return Err(ApiError::validation_field(
                "next_service_date",
                "Next service must not be before this service",
            ));
        }
    }
    load_asset(&state, id).await?;

    let mut service = AssetService::new(id, request.service_date, request.service_type.trim());
    service.performed_by = request.performed_by;
    service.cost = request.cost;
    service.notes = request.notes;
    service.next_service_date = request.next_service_date;

    let service = create_asset_repository(&state.db)
        .record_service(&service)
        .await?;
    info!(asset_id = %id, service_type = %service.service_type, "Asset service recorded");
    Ok((StatusCode::CREATED, Json(service)))
}
