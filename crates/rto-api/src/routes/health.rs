//! Health check endpoints.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use metrics::gauge;
use rto_observability::{DB_POOL_IDLE, DB_POOL_SIZE};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use utoipa::ToSchema;

use crate::state::AppState;

/// Start time for uptime calculation.
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize the start time.
pub fn init_start_time() {
    START_TIME.get_or_init(Instant::now);
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// `healthy` or `unhealthy`.
    pub status: String,
    pub version: String,
    pub database: DatabaseHealth,
    pub uptime_seconds: u64,
    pub integrations: IntegrationsHealth,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DatabaseHealth {
    pub connected: bool,
    pub pool_size: u32,
    pub idle_connections: usize,
}

/// Which optional collaborators are configured.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IntegrationsHealth {
    pub email: bool,
    pub google_drive: bool,
    pub xero: bool,
    pub accelerate: bool,
}

impl IntegrationsHealth {
    pub fn from_state(state: &AppState) -> Self {
        Self {
            email: state.email.is_some(),
            google_drive: state.drive.is_some(),
            xero: state.xero.is_some(),
            accelerate: state.accelerate.is_some(),
        }
    }
}

/// Creates health check routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
}

/// Health check endpoint.
///
/// Returns overall system health status.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System is healthy", body = HealthResponse),
        (status = 503, description = "System is unhealthy", body = HealthResponse)
    ),
    tag = "Health"
)]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let db_healthy = state.db.is_healthy().await;
    let uptime = START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0);

    let pool_size = state.db.pool_size();
    let idle_connections = state.db.idle_connections();
    gauge!(DB_POOL_SIZE).set(f64::from(pool_size));
    gauge!(DB_POOL_IDLE).set(idle_connections as f64);

    let (status, http_status) = if db_healthy {
        ("healthy", StatusCode::OK)
    } else {
        ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
    };

    (
        http_status,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: DatabaseHealth {
                connected: db_healthy,
                pool_size,
                idle_connections,
            },
            uptime_seconds: uptime,
            integrations: IntegrationsHealth::from_state(&state),
        }),
    )
}

/// Readiness probe.
///
/// Returns 200 once the database answers queries.
#[utoipa::path(
    get,
    path = "/ready",
    responses(
        (status = 200, description = "Service is ready"),
        (status = 503, description = "Service is not ready")
    ),
    tag = "Health"
)]
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    if state.db.is_healthy().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/live",
    responses((status = 200, description = "Service is alive")),
    tag = "Health"
)]
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}
