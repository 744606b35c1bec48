//! Training products (qualifications, units, skill sets, courses) and SOPs.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use rto_core::db::{create_sop_repository, create_training_product_repository, Pagination};
use rto_core::models::{
    ProductStatus, ProductType, Sop, SopFilter, SopUpdate, TrainingProduct, TrainingProductFilter,
    TrainingProductUpdate,
};
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

/// Routes mounted at `/training-products`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route(
            "/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/:id/sops", get(list_product_sops))
}

/// Routes mounted at `/sops`.
pub fn sop_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sops).post(create_sop))
        .route("/:id", get(get_sop).put(update_sop).delete(delete_sop))
}

#[derive(Debug, Deserialize)]
pub struct ProductListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
    pub product_type: Option<ProductType>,
    pub status: Option<ProductStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 50, message = "Code must be 1-50 characters"))]
    pub code: String,
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,
    pub product_type: ProductType,
    pub status: Option<ProductStatus>,
    pub description: Option<String>,
    pub external_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 50, message = "Code must be 1-50 characters"))]
    pub code: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: Option<String>,
    pub product_type: Option<ProductType>,
    pub status: Option<ProductStatus>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub external_id: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct SopListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
    pub training_product_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSopRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,
    pub training_product_id: Option<Uuid>,
    #[validate(length(min = 1, max = 20, message = "Version must be 1-20 characters"))]
    pub version: Option<String>,
    #[validate(url(message = "Document URL must be a valid URL"))]
    pub document_url: Option<String>,
    pub content: Option<String>,
    pub owner_id: Option<Uuid>,
    pub review_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSopRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub training_product_id: Option<Option<Uuid>>,
    #[validate(length(min = 1, max = 20, message = "Version must be 1-20 characters"))]
    pub version: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub document_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub content: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub owner_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "nullable")]
    pub review_date: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Serialize)]
pub struct SopResponse {
    #[serde(flatten)]
    pub sop: Sop,
    pub review_status: ReviewStatus,
}

impl SopResponse {
    fn new(sop: Sop, now: DateTime<Utc>) -> Self {
        let review_status = sop.review_status(now);
        Self { sop, review_status }
    }
}

async fn ensure_product_exists(state: &AppState, id: Uuid) -> Result<(), ApiError> {
    create_training_product_repository(&state.db)
        .get(id)
        .await?
        .map(|_| ())
        .ok_or_else(|| {
            ApiError::validation_field("training_product_id", "Training product does not exist")
        })
}

async fn list_products(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiQuery(query): ApiQuery<ProductListQuery>,
) -> Result<Json<Paginated<TrainingProduct>>, ApiError> {
    require_permission(&current, Permission::TrainingRead)?;

    let filter = TrainingProductFilter {
        product_type: query.product_type,
        status: query.status,
        search: clean_search(query.search.as_deref()),
    };
    let pagination = Pagination::from_query(query.page, query.per_page);
    let result = create_training_product_repository(&state.db)
        .list(&filter, &pagination)
        .await?;
    Ok(Json(result.into()))
}

async fn get_product(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<TrainingProduct>, ApiError> {
    require_permission(&current, Permission::TrainingRead)?;

    let product = create_training_product_repository(&state.db)
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Training product", id))?;
    Ok(Json(product))
}

async fn create_product(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiJson(request): ApiJson<CreateProductRequest>,
) -> Result<(StatusCode, Json<TrainingProduct>), ApiError> {
    require_permission(&current, Permission::TrainingWrite)?;
    request.validate()?;

    let mut product = TrainingProduct::new(
        request.code.trim().to_uppercase(),
        request.title.trim(),
        request.product_type,
    );
    if let Some(status) = request.status {
        product.status = status;
    }
    product.description = request.description;
    product.external_id = request.external_id;

    let product = create_training_product_repository(&state.db)
        .create(&product)
        .await?;
    info!(code = %product.code, created_by = %current.id(), "Training product created");
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateProductRequest>,
) -> Result<Json<TrainingProduct>, ApiError> {
    require_permission(&current, Permission::TrainingWrite)?;
    request.validate()?;

    let update = TrainingProductUpdate {
        code: request.code.map(|c| c.trim().to_uppercase()),
        title: request.title.map(|t| t.trim().to_string()),
        product_type: request.product_type,
        status: request.status,
        description: request.description,
        external_id: request.external_id,
    };
    let product = create_training_product_repository(&state.db)
        .update(id, &update)
        .await?;
    Ok(Json(product))
}

async fn delete_product(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_permission(&current, Permission::TrainingWrite)?;

    if !create_training_product_repository(&state.db)
        .delete(id)
        .await?
    {
        return Err(ApiError::not_found("Training product", id));
    }
    info!(product_id = %id, deleted_by = %current.id(), "Training product deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_product_sops(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<SopListQuery>,
) -> Result<Json<Paginated<SopResponse>>, ApiError> {
    require_permission(&current, Permission::TrainingRead)?;
    create_training_product_repository(&state.db)
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Training product", id))?;

    let filter = SopFilter {
        training_product_id: Some(id),
        search: clean_search(query.search.as_deref()),
    };
    let pagination = Pagination::from_query(query.page, query.per_page);
    let now = Utc::now();
    let result = create_sop_repository(&state.db)
        .list(&filter, &pagination)
        .await?
        .map(|s| SopResponse::new(s, now));
    Ok(Json(result.into()))
}

async fn list_sops(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiQuery(query): ApiQuery<SopListQuery>,
) -> Result<Json<Paginated<SopResponse>>, ApiError> {
    require_permission(&current, Permission::TrainingRead)?;

    let filter = SopFilter {
        training_product_id: query.training_product_id,
        search: clean_search(query.search.as_deref()),
    };
    let pagination = Pagination::from_query(query.page, query.per_page);
    let now = Utc::now();
    let result = create_sop_repository(&state.db)
        .list(&filter, &pagination)
        .await?
        .map(|s| SopResponse::new(s, now));
    Ok(Json(result.into()))
}

async fn get_sop(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<SopResponse>, ApiError> {
    require_permission(&current, Permission::TrainingRead)?;

    let sop = create_sop_repository(&state.db)
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("SOP", id))?;
    Ok(Json(SopResponse::new(sop, Utc::now())))
}

async fn create_sop(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiJson(request): ApiJson<CreateSopRequest>,
) -> Result<(StatusCode, Json<SopResponse>), ApiError> {
    require_permission(&current, Permission::TrainingWrite)?;
    request.validate()?;
    if let Some(product_id) = request.training_product_id {
        ensure_product_exists(&state, product_id).await?;
    }

    let mut sop = Sop::new(request.title.trim());
    sop.training_product_id = request.training_product_id;
    if let Some(version) = request.version {
        sop.version = version;
    }
    sop.document_url = request.document_url;
    sop.content = request.content;
    sop.owner_id = request.owner_id;
    sop.review_date = request.review_date;

    let sop = create_sop_repository(&state.db).create(&sop).await?;
    info!(sop_id = %sop.id, created_by = %current.id(), "SOP created");
    Ok((StatusCode::CREATED, Json(SopResponse::new(sop, Utc::now()))))
}

async fn update_sop(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateSopRequest>,
) -> Result<Json<SopResponse>, ApiError> {
    require_permission(&current, Permission::TrainingWrite)?;
    request.validate()?;
    if let Some(Some(product_id)) = request.training_product_id {
        ensure_product_exists(&state, product_id).await?;
    }

    let update = SopUpdate {
        title: request.title.map(|t| t.trim().to_string()),
        training_product_id: request.training_product_id,
        version: request.version,
        document_url: request.document_url,
        content: request.content,
        owner_id: request.owner_id,
        review_date: request.review_date,
    };
    let sop = create_sop_repository(&state.db).update(id, &update).await?;
    Ok(Json(SopResponse::new(sop, Utc::now())))
}

async fn delete_sop(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_permission(&current, Permission::TrainingWrite)?;

    if !create_sop_repository(&state.db).delete(id).await? {
        return Err(ApiError::not_found("SOP", id));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_helpers::TestUser;
    use crate::test_helpers::{app_as, create_test_state, empty_request, json_request, read_json};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_product_code_normalised_and_unique() {
        let app = app_as(routes(), create_test_state().await, TestUser::admin());

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/",
                json!({"code": "bsb40120", "title": "Certificate IV in Business", "product_type": "qualification"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let product: TrainingProduct = read_json(response).await;
        assert_eq!(product.code, "BSB40120");
        assert_eq!(product.status, ProductStatus::Current);

        let response = app
            .oneshot(json_request(
                "POST",
                "/",
                json!({"code": "BSB40120", "title": "Duplicate", "product_type": "qualification"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_invalid_product_type_rejected() {
        let app = app_as(routes(), create_test_state().await, TestUser::admin());
        let response = app
            .oneshot(json_request(
                "POST",
                "/",
                json!({"code": "X1", "title": "X", "product_type": "degree"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_sops_listed_under_product() {
        let state = create_test_state().await;
        let product = create_training_product_repository(&state.db)
            .create(&TrainingProduct::new("TAE40122", "Cert IV TAE", ProductType::Qualification))
            .await
            .unwrap();
        let sops = app_as(sop_routes(), state.clone(), TestUser::admin());
        let products = app_as(routes(), state, TestUser::staff());

        let response = sops
            .clone()
            .oneshot(json_request(
                "POST",
                "/",
                json!({"title": "Enrolment SOP", "training_product_id": product.id}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let sop: Value = read_json(response).await;
        assert_eq!(sop["version"], "1.0");
        assert_eq!(sop["review_status"], "not_scheduled");

        let response = sops
            .oneshot(json_request(
                "POST",
                "/",
                json!({"title": "Orphan", "training_product_id": Uuid::new_v4()}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = products
            .oneshot(empty_request("GET", &format!("/{}/sops", product.id)))
            .await
            .unwrap();
        let page: Paginated<Value> = read_json(response).await;
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0]["title"], "Enrolment SOP");
    }
}
