//! Email sending endpoints and the delivery log.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rto_core::db::{create_email_log_repository, create_user_repository, Pagination};
use rto_core::models::{EmailLog, EmailLogFilter, EmailStatus};
use rto_core::Permission;
use rto_notify::{
    send_credential_reminders, send_digests, send_pd_reminders, DeliveryReport, EmailService,
    EmailTemplate, GeneralNoticeEmail, Recipient,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{require_permission, AuthenticatedUser};
use crate::dto::{clean_search, Paginated};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};
use crate::state::AppState;

/// Default look-ahead for credential reminders.
const DEFAULT_REMINDER_DAYS: i64 = 30;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/send", post(send_notice))
        .route("/credential-reminders", post(credential_reminders))
        .route("/pd-reminders", post(pd_reminders))
        .route("/digest", post(digest))
        .route("/test", post(send_test))
        .route("/logs", get(list_logs))
}

/// The configured email service, or 503.
pub(crate) fn email_service(state: &AppState) -> Result<&Arc<EmailService>, ApiError> {
    state
        .email
        .as_ref()
        .ok_or_else(|| ApiError::ServiceUnavailable("Email is not configured".to_string()))
}

/// Sends a notification whose failure must not fail the calling request.
///
/// Returns whether the message was delivered.
pub(crate) async fn send_best_effort(
    service: &EmailService,
    recipient: &Recipient,
    template: &EmailTemplate,
) -> bool {
    match service.send_template(recipient, template).await {
        Ok(_) => true,
        Err(e) => {
            warn!(
                template = template.name(),
                recipient = %recipient.email,
                error = %e,
                "Notification email failed"
            );
            false
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendNoticeRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1, max = 200, message = "Subject must be 1-200 characters"))]
    pub subject: String,
    #[validate(length(min = 1, message = "Body is required"))]
    pub body: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CredentialRemindersRequest {
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TestEmailRequest {
    #[validate(email(message = "Invalid email address"))]
    pub to: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailLogQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<EmailStatus>,
    pub recipient: Option<String>,
    pub template: Option<String>,
}

async fn send_notice(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiJson(request): ApiJson<SendNoticeRequest>,
) -> Result<Json<EmailLog>, ApiError> {
    require_permission(&current, Permission::EmailSend)?;
    request.validate()?;
    let service = email_service(&state)?;

    let user = create_user_repository(&state.db)
        .get(request.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", request.user_id))?;

    let template = EmailTemplate::GeneralNotice(GeneralNoticeEmail {
        recipient_name: user.full_name(),
        subject: request.subject,
        body: request.body,
    });
    let log = service
        .send_template(&Recipient::from(&user), &template)
        .await?;

    info!(recipient = %user.id, sent_by = %current.id(), "Notice emailed");
    Ok(Json(log))
}

async fn credential_reminders(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    request: Option<ApiJson<CredentialRemindersRequest>>,
) -> Result<Json<DeliveryReport>, ApiError> {
    require_permission(&current, Permission::EmailSend)?;
    let service = email_service(&state)?;

    let days = request
        .and_then(|ApiJson(r)| r.days)
        .unwrap_or(DEFAULT_REMINDER_DAYS);
    if !(1..=365).contains(&days) {
        return Err(ApiError::validation_field(
            "days",
            "Days must be between 1 and 365",
        ));
    }

    let report = send_credential_reminders(&state.db, service, days, Utc::now()).await?;
    Ok(Json(report))
}

async fn pd_reminders(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
) -> Result<Json<DeliveryReport>, ApiError> {
    require_permission(&current, Permission::EmailSend)?;
    let service = email_service(&state)?;

    let report = send_pd_reminders(&state.db, service, Utc::now()).await?;
    Ok(Json(report))
}

async fn digest(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
) -> Result<Json<DeliveryReport>, ApiError> {
    require_permission(&current, Permission::EmailSend)?;
    let service = email_service(&state)?;

    let report = send_digests(&state.db, service, Utc::now()).await?;
    info!(sent = report.sent, failed = report.failed, "Digest run on demand");
    Ok(Json(report))
}

async fn send_test(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiJson(request): ApiJson<TestEmailRequest>,
) -> Result<Json<EmailLog>, ApiError> {
    require_permission(&current, Permission::EmailSend)?;
    request.validate()?;
    let service = email_service(&state)?;

    let template = EmailTemplate::GeneralNotice(GeneralNoticeEmail {
        recipient_name: request.to.clone(),
        subject: "Test email".to_string(),
        body: format!(
            "This is a test message from the compliance platform, sent through the {} provider.",
            service.provider_name()
        ),
    });
    let log = service
        .send_template(&Recipient::new(&request.to, &request.to), &template)
        .await?;
    Ok(Json(log))
}

async fn list_logs(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiQuery(query): ApiQuery<EmailLogQuery>,
) -> Result<Json<Paginated<EmailLog>>, ApiError> {
    require_permission(&current, Permission::AuditRead)?;

    let filter = EmailLogFilter {
        status: query.status,
        recipient: clean_search(query.recipient.as_deref()),
        template: clean_search(query.template.as_deref()),
    };
    let pagination = Pagination::from_query(query.page, query.per_page);
    let result = create_email_log_repository(&state.db)
        .list(&filter, &pagination)
        .await?;
    Ok(Json(result.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_helpers::{inject_test_user, TestUser};
    use crate::test_helpers::create_test_state;
    use axum::{body::Body, http::Request, http::StatusCode, middleware};
    use rto_core::db::create_role_repository;
    use rto_core::User;
    use rto_notify::{MockEmailProvider, RateLimitConfig, RetryPolicy};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(state: AppState, user: TestUser) -> Router {
        routes()
            .layer(middleware::from_fn(move |req, next| {
                inject_test_user(user.clone(), req, next)
            }))
            .with_state(state)
    }

    fn with_mock_email(state: AppState, provider: Arc<MockEmailProvider>) -> AppState {
        let logs = Arc::from(create_email_log_repository(&state.db));
        let service = EmailService::new(
            provider,
            logs,
            RateLimitConfig::default(),
            RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
            },
            "http://localhost:3000",
        );
        state.with_email(Arc::new(service))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_unconfigured_email_is_unavailable() {
        let app = app(create_test_state().await, TestUser::admin());
        let response = app
            .oneshot(post_json("/test", serde_json::json!({"to": "a@example.com"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_send_notice_logs_delivery() {
        let provider = Arc::new(MockEmailProvider::new());
        let state = with_mock_email(create_test_state().await, provider.clone());
        let role = create_role_repository(&state.db)
            .get_by_name("staff")
            .await
            .unwrap()
            .unwrap();
        let user = create_user_repository(&state.db)
            .create(&User::new("kim@example.com", "Kim", "Ng", "x", role.id))
            .await
            .unwrap();
        let app = app(state, TestUser::admin());

        let response = app
            .clone()
            .oneshot(post_json(
                "/send",
                serde_json::json!({"user_id": user.id, "subject": "Audit", "body": "Visit Tuesday"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(provider.sent().await.len(), 1);

        let response = app
            .oneshot(Request::get("/logs?status=sent").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let page: Paginated<EmailLog> = serde_json::from_slice(&body).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].recipient, "kim@example.com");
    }

    #[tokio::test]
    async fn test_reminder_days_validated() {
        let provider = Arc::new(MockEmailProvider::new());
        let state = with_mock_email(create_test_state().await, provider);
        let app = app(state, TestUser::admin());

        let response = app
            .oneshot(post_json("/credential-reminders", serde_json::json!({"days": 0})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_staff_cannot_send() {
        let app = app(create_test_state().await, TestUser::staff());
        let response = app
            .oneshot(Request::post("/digest").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
