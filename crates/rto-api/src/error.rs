//! API error types and handling.
//!
//! Every error is rendered as an RFC 7807 problem document with the
//! `application/problem+json` content type.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use rto_core::auth::password::PasswordError;
use rto_core::db::DbError;
use rto_integrations::IntegrationError;
use rto_notify::EmailError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

use crate::auth::jwt::JwtError;
use crate::middleware::current_request_id;

pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

/// Detail returned for every 5xx caused by an internal failure.
pub const INTERNAL_ERROR_DETAIL: &str = "An internal error occurred";

/// API error type.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    /// Missing, invalid or expired access token.
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but lacking the permission.
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    /// Request body exceeds the configured limit.
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Validation error with field-level details.
    #[error("{}", .0.message)]
    ValidationError(ValidationErrorDetails),

    #[error("Too many requests, retry in {retry_after_secs} seconds")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),

    /// An integration or provider is not configured.
    #[error("{0}")]
    ServiceUnavailable(String),

    /// An upstream service failed.
    #[error("{0}")]
    BadGateway(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is deactivated")]
    AccountDisabled,
}

/// Field-level validation failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationErrorDetails {
    pub message: String,
    pub fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrorDetails {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut details = Self {
            message: format!("Validation failed for field '{}'", field),
            fields: BTreeMap::new(),
        };
        details.add_error(field, message);
        details
    }

    pub fn from_fields(fields: BTreeMap<String, Vec<String>>) -> Self {
        let message = match fields.keys().next() {
            Some(field) if fields.len() == 1 => format!("Validation failed for field '{}'", field),
            _ => format!("Validation failed for {} fields", fields.len()),
        };
        Self { message, fields }
    }

    pub fn add_error(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }
}

/// RFC 7807 problem details body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    /// Stable code for programmatic handling, e.g. `NOT_FOUND`.
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::AccountDisabled => StatusCode::FORBIDDEN,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            ApiError::Internal(_) | ApiError::Database(_) => "INTERNAL_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::BadGateway(_) => "BAD_GATEWAY",
            ApiError::InvalidCredentials => "INVALID_CREDENTIALS",
            ApiError::AccountDisabled => "ACCOUNT_DISABLED",
        }
    }

    pub fn validation_field(field: &str, message: impl Into<String>) -> Self {
        ApiError::ValidationError(ValidationErrorDetails::field(field, message))
    }

    /// Maps a body extraction failure by the status axum assigned it.
    pub fn body_rejection(status: StatusCode, detail: String) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(detail)
        } else {
            ApiError::BadRequest(detail)
        }
    }

    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        ApiError::NotFound(format!("{} {} not found", entity, id))
    }

    fn detail(&self) -> String {
        match self {
            ApiError::Internal(_) | ApiError::Database(_) => INTERNAL_ERROR_DETAIL.to_string(),
            other => other.to_string(),
        }
    }

    pub fn to_problem(&self) -> ProblemDetails {
        let status = self.status_code();
        ProblemDetails {
            problem_type: "about:blank".to_string(),
            title: status.canonical_reason().unwrap_or("Error").to_string(),
            status: status.as_u16(),
            detail: self.detail(),
            code: self.error_code().to_string(),
            errors: match self {
                ApiError::ValidationError(details) => Some(details.fields.clone()),
                _ => None,
            },
            request_id: current_request_id(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self, ApiError::Internal(_) | ApiError::Database(_)) {
            error!(error = %self, request_id = ?current_request_id(), "Request failed");
        }

        let status = self.status_code();
        let problem = self.to_problem();
        let body = serde_json::to_vec(&problem).unwrap_or_default();

        let mut response = (status, body).into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(PROBLEM_CONTENT_TYPE),
        );
        if let ApiError::RateLimitExceeded { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                headers.insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, id),
            DbError::Constraint(msg) => ApiError::Conflict(msg),
            DbError::Serialization(msg) => ApiError::BadRequest(msg),
            DbError::PoolExhausted => {
                ApiError::ServiceUnavailable("Database is busy, try again".to_string())
            }
            err => ApiError::Database(err.to_string()),
        }
    }
}

impl From<EmailError> for ApiError {
    fn from(err: EmailError) -> Self {
        match err {
            EmailError::InvalidAddress(msg) => ApiError::validation_field("email", msg),
            EmailError::Configuration(msg) => ApiError::ServiceUnavailable(msg),
            EmailError::RateLimited(_) => ApiError::RateLimitExceeded {
                retry_after_secs: 60,
            },
            EmailError::Rejected(msg) | EmailError::Provider(msg) | EmailError::Network(msg) => {
                ApiError::BadGateway(format!("Email provider error: {}", msg))
            }
            EmailError::Template(msg) => ApiError::Internal(msg),
            EmailError::Database(db) => db.into(),
        }
    }
}

impl From<IntegrationError> for ApiError {
    fn from(err: IntegrationError) -> Self {
        match err {
            IntegrationError::NotConfigured(msg) => ApiError::ServiceUnavailable(msg),
            other => ApiError::BadGateway(other.to_string()),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::TooWeak(reasons) => {
                let fields = BTreeMap::from([(
                    "password".to_string(),
                    reasons.into_iter().map(str::to_string).collect(),
                )]);
                ApiError::ValidationError(ValidationErrorDetails::from_fields(fields))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Signing(_) => ApiError::Internal(err.to_string()),
            _ => ApiError::Unauthorized(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::body_rejection(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut fields: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (field_name, field_errors) in err.field_errors() {
            let messages = field_errors
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{} failed validation: {}", field_name, e.code))
                })
                .collect();
            fields.insert(field_name.to_string(), messages);
        }

        ApiError::ValidationError(ValidationErrorDetails::from_fields(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn problem_of(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            PROBLEM_CONTENT_TYPE
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_not_found_problem() {
        let (status, body) = problem_of(ApiError::not_found("Policy", "123")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["type"], "about:blank");
        assert_eq!(body["title"], "Not Found");
        assert_eq!(body["status"], 404);
        assert_eq!(body["detail"], "Policy 123 not found");
        assert_eq!(body["code"], "NOT_FOUND");
        assert!(body.get("errors").is_none());
    }

    #[tokio::test]
    async fn test_internal_detail_is_generic() {
        let (status, body) =
            problem_of(ApiError::Database("no such table: policies".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["detail"], INTERNAL_ERROR_DETAIL);
        assert_eq!(body["code"], "INTERNAL_ERROR");
    }

    #[tokio::test]
    async fn test_validation_lists_fields() {
        let (status, body) = problem_of(ApiError::validation_field("email", "must be valid")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["errors"]["email"][0], "must be valid");
    }

    #[tokio::test]
    async fn test_rate_limit_sets_retry_after() {
        let response = ApiError::RateLimitExceeded {
            retry_after_secs: 42,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "42");
    }

    #[test]
    fn test_db_error_mapping() {
        assert!(matches!(
            ApiError::from(DbError::not_found("Role", "x")),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(DbError::Constraint("UNIQUE".into())),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from(DbError::Query("boom".into())),
            ApiError::Database(_)
        ));
    }

    #[tokio::test]
    async fn test_payload_too_large_problem() {
        let (status, body) = problem_of(ApiError::body_rejection(
            StatusCode::PAYLOAD_TOO_LARGE,
            "length limit exceeded".to_string(),
        ))
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["code"], "PAYLOAD_TOO_LARGE");
        assert_eq!(body["title"], "Payload Too Large");

        let other = ApiError::body_rejection(StatusCode::UNPROCESSABLE_ENTITY, "bad".to_string());
        assert!(matches!(other, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_integration_error_mapping() {
        assert_eq!(
            ApiError::from(IntegrationError::NotConfigured("xero".into())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(IntegrationError::Authentication("expired".into())).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_weak_password_is_validation_error() {
        let err = ApiError::from(PasswordError::TooWeak(vec!["too short", "needs a digit"]));
        match err {
            ApiError::ValidationError(details) => {
                assert_eq!(details.fields["password"].len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
