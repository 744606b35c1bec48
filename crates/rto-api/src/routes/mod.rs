//! API routes.

pub mod assets;
pub mod audit_logs;
pub mod auth;
pub mod complaints;
pub mod credentials;
pub mod email;
pub mod feedback;
pub mod health;
pub mod integrations;
pub mod onboarding;
pub mod pd;
pub mod policies;
pub mod reports;
pub mod roles;
pub mod standards;
pub mod training;
pub mod users;

use axum::{middleware, Router};

use crate::audit::audit_mutations;
use crate::state::AppState;

/// Creates the main API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_routes())
        // Outside the nest so the middleware sees the full path.
        .layer(middleware::from_fn_with_state(
            state.clone(),
            audit_mutations,
        ))
        .merge(health::routes())
        .with_state(state)
}

/// Routes under the `/api/v1` prefix.
fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::routes())
        .nest("/users", users::routes())
        .nest("/roles", roles::routes())
        .nest("/policies", policies::routes())
        .nest("/standards", standards::routes())
        .nest("/credentials", credentials::routes())
        .nest("/training-products", training::routes())
        .nest("/sops", training::sop_routes())
        .nest("/feedback", feedback::routes())
        .nest("/assets", assets::routes())
        .nest("/complaints", complaints::routes())
        .nest("/onboarding", onboarding::routes())
        .nest("/pd-items", pd::routes())
        .nest("/reports", reports::routes())
        .nest("/email", email::routes())
        .nest("/audit-logs", audit_logs::routes())
        .nest("/integrations", integrations::routes())
}
