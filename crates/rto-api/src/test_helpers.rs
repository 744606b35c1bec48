//! Shared test helpers for the rto-api crate.
//!
//! ```ignore
//! let state = create_test_state().await;
//! let router = routes::assets::routes().with_state(state);
//! ```

use axum::{
    body::{to_bytes, Body},
    http::Request,
    middleware,
    response::Response,
    Router,
};
use rto_core::db::{
    create_pool_with_options, create_role_repository, create_user_repository,
    ensure_default_roles, run_migrations, DbPool, PoolOptions,
};
use rto_core::{CurrentUser, User};
use serde::de::DeserializeOwned;
use std::time::Duration;
use uuid::Uuid;

use crate::auth::test_helpers::{inject_test_user, TestUser};
use crate::auth::JwtConfig;
use crate::state::AppState;

pub const TEST_JWT_SECRET: &str = "test-secret-that-is-at-least-32-bytes-long";

/// Creates an isolated in-memory database with migrations and system roles.
pub async fn setup_test_pool() -> DbPool {
    let url = format!("sqlite:file:test_{}?mode=memory&cache=shared", Uuid::new_v4());
    let pool = create_pool_with_options(
        &url,
        PoolOptions {
            max_connections: 1,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            max_lifetime: None,
            idle_timeout: None,
        },
    )
    .await
    .expect("Failed to create test pool");
    run_migrations(&pool).await.expect("Failed to run migrations");
    ensure_default_roles(&pool)
        .await
        .expect("Failed to seed roles");
    pool
}

/// Creates application state over a fresh database.
pub async fn create_test_state() -> AppState {
    AppState::new(setup_test_pool().await, JwtConfig::new(TEST_JWT_SECRET))
}

/// Mounts `routes` with `user` injected as the authenticated caller.
pub fn app_as(routes: Router<AppState>, state: AppState, user: TestUser) -> Router {
    routes
        .layer(middleware::from_fn(move |req, next| {
            inject_test_user(user.clone(), req, next)
        }))
        .with_state(state)
}

/// A JSON request with the given method.
pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

/// A bodiless request with the given method.
pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("valid request")
}

/// Reads and deserializes a JSON response body.
pub async fn read_json<T: DeserializeOwned>(response: Response) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    serde_json::from_slice(&bytes).expect("JSON body")
}

/// Looks up a seeded system role id.
pub async fn role_id(state: &AppState, name: &str) -> Uuid {
    create_role_repository(&state.db)
        .get_by_name(name)
        .await
        .expect("role lookup")
        .expect("seeded role")
        .id
}

/// Persists a user with the given system role.
pub async fn create_user(state: &AppState, email: &str, role: &str) -> User {
    let user = User::new(email, "Test", "User", "not_used", role_id(state, role).await);
    create_user_repository(&state.db)
        .create(&user)
        .await
        .expect("user created")
}

/// A test identity backed by a persisted user, for routes that join on the
/// caller's id.
pub async fn persisted_test_user(state: &AppState, email: &str, role: &str) -> TestUser {
    let user = create_user(state, email, role).await;
    let role = create_role_repository(&state.db)
        .get(user.role_id)
        .await
        .expect("role lookup")
        .expect("role exists");
    TestUser(CurrentUser { user, role })
}
