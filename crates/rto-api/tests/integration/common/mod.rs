//! Common utilities for integration tests.
//!
//! Tests drive the full router, including real JWT authentication, against an
//! in-memory SQLite database.

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use rto_api::auth::JwtConfig;
use rto_api::{ApiServer, ApiServerConfig, AppState, LoginRateLimiter};
use rto_core::auth::password::hash_password;
use rto_core::db::{
    create_pool_with_options, create_role_repository, create_user_repository,
    ensure_default_roles, run_migrations, DbPool, PoolOptions,
};
use rto_core::User;
use serde_json::Value;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "integration-secret-that-is-at-least-32-bytes";
pub const TEST_PASSWORD: &str = "Correct-Horse-42";

/// Creates an in-memory database with migrations and system roles.
pub async fn setup_test_db() -> DbPool {
    let url = format!(
        "sqlite:file:integration_test_{}?mode=memory&cache=shared",
        Uuid::new_v4()
    );
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
    .expect("Failed to create SQLite pool");
    run_migrations(&pool).await.expect("Failed to run migrations");
    ensure_default_roles(&pool)
        .await
        .expect("Failed to seed roles");
    pool
}

/// The router and the state behind it.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    /// An app whose login limiter will not interfere with multi-user tests.
    pub async fn new() -> Self {
        Self::with_limiter(LoginRateLimiter::with_config(
            1_000,
            1_000,
            Duration::from_secs(60),
        ))
        .await
    }

    pub async fn with_limiter(limiter: LoginRateLimiter) -> Self {
        let state = AppState::new(setup_test_db().await, JwtConfig::new(TEST_JWT_SECRET))
            .with_login_limiter(limiter);
        Self::from_state(state)
    }

    pub fn from_state(state: AppState) -> Self {
        let config = ApiServerConfig {
            enable_swagger: false,
            ..Default::default()
        };
        let router = ApiServer::new(state.clone(), config).router();
        Self { router, state }
    }

    /// Persists an active user with `TEST_PASSWORD` and the given system role.
    pub async fn create_user(&self, email: &str, role: &str) -> User {
        let role = create_role_repository(&self.state.db)
            .get_by_name(role)
            .await
            .expect("role lookup")
            .expect("seeded role");
        let hash = hash_password(TEST_PASSWORD).expect("hash");
        let user = User::new(email, "Test", "User", hash, role.id);
        create_user_repository(&self.state.db)
            .create(&user)
            .await
            .expect("user created")
    }

    /// Logs in through the API and returns the access token.
    pub async fn login(&self, email: &str) -> String {
        let (status, body, _) = self
            .send(
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(serde_json::json!({"email": email, "password": TEST_PASSWORD})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["access_token"]
            .as_str()
            .expect("access token")
            .to_string()
    }

    /// Creates a user with `role` and returns a token for them.
    pub async fn token_for(&self, email: &str, role: &str) -> String {
        self.create_user(email, role).await;
        self.login(email).await
    }

    /// Sends a request and returns the status, JSON body (`Null` when empty)
    /// and headers.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value, HeaderMap) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("valid request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("readable body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json, headers)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        let (status, body, _) = self.send(Method::GET, uri, Some(token), None).await;
        (status, body)
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        let (status, body, _) = self.send(Method::POST, uri, Some(token), Some(body)).await;
        (status, body)
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        let (status, body, _) = self.send(Method::PUT, uri, Some(token), Some(body)).await;
        (status, body)
    }
}
