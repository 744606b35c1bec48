//! Audit trail of mutating API requests.
//!
//! Every `POST`, `PUT`, `PATCH` and `DELETE` under `/api/v1` is recorded with
//! the acting user, the derived action and resource, the response status and
//! the request body with sensitive fields redacted. The write happens on a
//! spawned task and never affects the response.

use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use rto_core::db::{create_audit_log_repository, with_retry, RetryConfig};
use rto_core::models::AuditLog;
use rto_observability::redact_json;
use http_body_util::LengthLimitError;
use serde_json::Value;
use std::error::Error as StdError;
use std::net::SocketAddr;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::bearer_token;
use crate::error::ApiError;
use crate::rate_limit::extract_client_ip;
use crate::state::AppState;

/// Bodies larger than this are recorded by size only.
pub const MAX_AUDIT_BODY_BYTES: usize = 64 * 1024;

pub const API_PREFIX: &str = "/api/v1/";

/// Path groups whose second segment names the resource.
const NESTED_GROUPS: [&str; 2] = ["onboarding", "integrations"];

/// What an audited path refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditTarget {
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
}

fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

fn normalize(segment: &str) -> String {
    segment.replace('-', "_")
}

/// Derives `{resource}.{verb}` plus resource type and id from a request path.
///
/// `POST /api/v1/policies` is `policies.create`; `POST
/// /api/v1/policies/{id}/publish` is `policies.publish`;
/// `POST /api/v1/onboarding/tasks/{id}/complete` is
/// `onboarding_tasks.complete`.
pub fn describe_request(method: &Method, path: &str) -> Option<AuditTarget> {
    let rest = path.strip_prefix(API_PREFIX)?;
    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
    let (first, tail) = segments.split_first()?;

    let (resource_type, mut tail) = match tail.split_first() {
        Some((second, after)) if NESTED_GROUPS.contains(first) => {
            (format!("{}_{}", normalize(first), normalize(second)), after)
        }
        _ => (normalize(first), tail),
    };

    let mut resource_id = None;
    if let Some((candidate, after)) = tail.split_first() {
        if Uuid::parse_str(candidate).is_ok() {
            resource_id = Some(candidate.to_string());
            tail = after;
        }
    }

    let verb = if tail.is_empty() {
        match *method {
            Method::POST => "create".to_string(),
            Method::DELETE => "delete".to_string(),
            _ => "update".to_string(),
        }
    } else {
        tail.iter().map(|s| normalize(s)).collect::<Vec<_>>().join("_")
    };

    Some(AuditTarget {
        action: format!("{}.{}", resource_type, verb),
        resource_type,
        resource_id,
    })
}

fn audit_details(headers: &HeaderMap, body: &[u8]) -> Option<Value> {
    if body.is_empty() {
        return None;
    }
    if body.len() > MAX_AUDIT_BODY_BYTES {
        return Some(serde_json::json!({ "body_truncated": true, "body_bytes": body.len() }));
    }

    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    if !is_json {
        return None;
    }

    serde_json::from_slice::<Value>(body)
        .ok()
        .map(|value| redact_json(&value))
}

/// True when the body stream was cut off by a size limit.
fn exceeded_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

/// Middleware recording mutating requests in the audit log.
pub async fn audit_mutations(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let target = match is_mutating(&method)
        .then(|| describe_request(&method, &path))
        .flatten()
    {
        Some(target) => target,
        None => return next.run(request).await,
    };

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "Failed to buffer request body");
            let status = if exceeded_length_limit(&e) {
                StatusCode::PAYLOAD_TOO_LARGE
            } else {
                StatusCode::BAD_REQUEST
            };
            let detail = format!("Failed to buffer the request body: {}", e);
            return ApiError::body_rejection(status, detail).into_response();
        }
    };

    let user_id = bearer_token(&parts.headers)
        .and_then(|token| state.jwt.verify_access_token(token).ok())
        .map(|claims| claims.sub);
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = extract_client_ip(&parts.headers, peer);
    let user_agent = parts
        .headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let details = audit_details(&parts.headers, &bytes);

    let response = next
        .run(Request::from_parts(parts, Body::from(bytes)))
        .await;

    let mut entry = AuditLog::new(target.action, method.as_str(), path);
    entry.user_id = user_id;
    entry.resource_type = Some(target.resource_type);
    entry.resource_id = target.resource_id;
    entry.status_code = i64::from(response.status().as_u16());
    entry.ip_address = Some(ip.to_string());
    entry.user_agent = user_agent;
    entry.details = details;

    let db = state.db.clone();
    tokio::spawn(async move {
        let repo = create_audit_log_repository(&db);
        let (repo, log) = (&repo, &entry);
        let written = with_retry(RetryConfig::default(), "audit_log.insert", move || {
            repo.insert(log)
        })
        .await;
        if let Err(e) = written {
            warn!(error = %e, action = %entry.action, "Failed to write audit log entry");
        }
    });

    response
}
