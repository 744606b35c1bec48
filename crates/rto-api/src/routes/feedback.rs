//! Learner, employer, staff and industry feedback.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use rto_core::db::{create_feedback_repository, create_training_product_repository, Pagination};
use rto_core::models::{
    Feedback, FeedbackFilter, FeedbackStatus, FeedbackSummary, FeedbackType, FeedbackUpdate,
};
use rto_core::Permission;
use serde::Deserialize;
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
        .route("/", get(list_feedback).post(submit_feedback))
        .route("/summary", get(summary))
        .route(
            "/:id",
            get(get_feedback)
                .put(update_feedback)
                .delete(delete_feedback),
        )
}

#[derive(Debug, Deserialize)]
pub struct FeedbackListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
    pub feedback_type: Option<FeedbackType>,
    pub status: Option<FeedbackStatus>,
    pub training_product_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub feedback_type: Option<FeedbackType>,
    pub training_product_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitFeedbackRequest {
    pub feedback_type: FeedbackType,
    pub training_product_id: Option<Uuid>,
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: Option<i64>,
    #[validate(length(min = 1, max = 5000, message = "Comments must be 1-5000 characters"))]
    pub comments: String,
    /// Name of the person the feedback came from, when entered on their behalf.
    pub submitted_by: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFeedbackRequest {
    pub status: Option<FeedbackStatus>,
    #[serde(default, deserialize_with = "nullable")]
    pub response: Option<Option<String>>,
}

fn check_range(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Result<(), ApiError> {
    match (from, to) {
        (Some(from), Some(to)) if from > to => Err(ApiError::validation_field(
            "from",
            "Start of range must not be after its end",
        )),
        _ => Ok(()),
    }
}

async fn list_feedback(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiQuery(query): ApiQuery<FeedbackListQuery>,
) -> Result<Json<Paginated<Feedback>>, ApiError> {
    require_permission(&current, Permission::FeedbackRead)?;
    check_range(query.from, query.to)?;

    let filter = FeedbackFilter {
        feedback_type: query.feedback_type,
        status: query.status,
        training_product_id: query.training_product_id,
        from: query.from,
        to: query.to,
        search: clean_search(query.search.as_deref()),
    };
    let pagination = Pagination::from_query(query.page, query.per_page);
    let result = create_feedback_repository(&state.db)
        .list(&filter, &pagination)
        .await?;
    Ok(Json(result.into()))
}

async fn summary(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiQuery(query): ApiQuery<SummaryQuery>,
) -> Result<Json<FeedbackSummary>, ApiError> {
    require_permission(&current, Permission::FeedbackRead)?;
    check_range(query.from, query.to)?;

    let filter = FeedbackFilter {
        feedback_type: query.feedback_type,
        training_product_id: query.training_product_id,
        from: query.from,
        to: query.to,
        ..Default::default()
    };
    Ok(Json(
        create_feedback_repository(&state.db)
            .summary(&filter)
            .await?,
    ))
}

async fn get_feedback(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Feedback>, ApiError> {
    require_permission(&current, Permission::FeedbackRead)?;

    let feedback = create_feedback_repository(&state.db)
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Feedback", id))?;
    Ok(Json(feedback))
}

async fn submit_feedback(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiJson(request): ApiJson<SubmitFeedbackRequest>,
) -> Result<(StatusCode, Json<Feedback>), ApiError> {
    require_permission(&current, Permission::FeedbackWrite)?;
    request.validate()?;

    if let Some(product_id) = request.training_product_id {
        create_training_product_repository(&state.db)
            .get(product_id)
            .await?
            .ok_or_else(|| {
                ApiError::validation_field(
                    "training_product_id",
                    "Training product does not exist",
                )
            })?;
    }

    let mut feedback = Feedback::new(request.feedback_type, request.comments.trim());
    feedback.training_product_id = request.training_product_id;
    feedback.rating = request.rating;
    if request.is_anonymous {
        feedback.anonymise();
    } else {
        feedback.submitted_by = request
            .submitted_by
            .or_else(|| Some(current.user.full_name()));
        feedback.email = request.email.or_else(|| Some(current.user.email.clone()));
    }

    let feedback = create_feedback_repository(&state.db)
        .create(&feedback)
        .await?;
    info!(
        feedback_id = %feedback.id,
        feedback_type = %feedback.feedback_type,
        "Feedback submitted"
    );
    Ok((StatusCode::CREATED, Json(feedback)))
}

async fn update_feedback(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateFeedbackRequest>,
) -> Result<Json<Feedback>, ApiError> {
    require_permission(&current, Permission::FeedbackWrite)?;

    let update = FeedbackUpdate {
        status: request.status,
        response: request.response,
    };
    let feedback = create_feedback_repository(&state.db)
        .update(id, &update)
        .await?;
    Ok(Json(feedback))
}

async fn delete_feedback(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_permission(&current, Permission::FeedbackWrite)?;

    if !create_feedback_repository(&state.db).delete(id).await? {
        return Err(ApiError::not_found("Feedback", id));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_helpers::TestUser;
    use crate::test_helpers::{app_as, create_test_state, empty_request, json_request, read_json};
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_anonymous_feedback_drops_identity() {
        let app = app_as(routes(), create_test_state().await, TestUser::staff());

        let response = app
            .oneshot(json_request(
                "POST",
                "/",
                json!({
                    "feedback_type": "learner",
                    "rating": 4,
                    "comments": "Great trainer",
                    "submitted_by": "Sam",
                    "is_anonymous": true,
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let feedback: Feedback = read_json(response).await;
        assert!(feedback.is_anonymous);
        assert_eq!(feedback.submitted_by, None);
        assert_eq!(feedback.status, FeedbackStatus::New);
    }

    #[tokio::test]
    async fn test_rating_out_of_range() {
        let app = app_as(routes(), create_test_state().await, TestUser::staff());
        let response = app
            .oneshot(json_request(
                "POST",
                "/",
                json!({"feedback_type": "employer", "rating": 6, "comments": "x"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_summary_averages_ratings() {
        let app = app_as(routes(), create_test_state().await, TestUser::admin());
        for (kind, rating) in [("learner", 5), ("learner", 3), ("employer", 4)] {
            app.clone()
                .oneshot(json_request(
                    "POST",
                    "/",
                    json!({"feedback_type": kind, "rating": rating, "comments": "ok"}),
                ))
                .await
                .unwrap();
        }

        let response = app
            .oneshot(empty_request("GET", "/summary"))
            .await
            .unwrap();
        let summary: FeedbackSummary = read_json(response).await;
        assert_eq!(summary.total, 3);
        assert_eq!(summary.average_rating, Some(4.0));
        assert_eq!(summary.by_type.get("learner"), Some(&2));
        assert_eq!(summary.by_status.get("new"), Some(&3));
    }

    #[tokio::test]
    async fn test_staff_cannot_list() {
        let app = app_as(routes(), create_test_state().await, TestUser::staff());
        let response = app.oneshot(empty_request("GET", "/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
