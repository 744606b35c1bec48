//! Read access to the audit trail.

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use rto_core::db::{create_audit_log_repository, Pagination};
use rto_core::models::{AuditLog, AuditLogFilter};
use rto_core::Permission;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{require_permission, AuthenticatedUser};
use crate::dto::Paginated;
use crate::error::ApiError;
use crate::extract::ApiQuery;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(list_audit_logs))
}

#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub user_id: Option<Uuid>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub action: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn list_audit_logs(
    State(state): State<AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    ApiQuery(query): ApiQuery<AuditLogQuery>,
) -> Result<Json<Paginated<AuditLog>>, ApiError> {
    require_permission(&current, Permission::AuditRead)?;
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(ApiError::validation_field(
                "from",
                "Start of range must not be after its end",
            ));
        }
    }

    let filter = AuditLogFilter {
        user_id: query.user_id,
        resource_type: non_empty(query.resource_type),
        resource_id: non_empty(query.resource_id),
        action: non_empty(query.action),
        from: query.from,
        to: query.to,
    };
    let pagination = Pagination::from_query(query.page, query.per_page);
    let result = create_audit_log_repository(&state.db)
        .list(&filter, &pagination)
        .await?;
    Ok(Json(result.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_helpers::TestUser;
    use crate::test_helpers::{app_as, create_test_state, empty_request, read_json};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn entry(action: &str, resource_type: &str) -> AuditLog {
        let mut log = AuditLog::new(action, "POST", format!("/api/v1/{}", resource_type));
        log.status_code = 201;
        log.resource_type = Some(resource_type.to_string());
        log
    }

    #[tokio::test]
    async fn test_filters_by_resource_type() {
        let state = create_test_state().await;
        let repo = create_audit_log_repository(&state.db);
        repo.insert(&entry("policies.create", "policies")).await.unwrap();
        repo.insert(&entry("assets.create", "assets")).await.unwrap();
        let app = app_as(routes(), state, TestUser::admin());

        let response = app
            .oneshot(empty_request("GET", "/?resource_type=assets"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let page: Paginated<AuditLog> = read_json(response).await;
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].action, "assets.create");
    }

    #[tokio::test]
    async fn test_requires_audit_read() {
        let app = app_as(routes(), create_test_state().await, TestUser::staff());
        let response = app.oneshot(empty_request("GET", "/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
