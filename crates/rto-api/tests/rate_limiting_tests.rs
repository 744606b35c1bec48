//! Login rate limiting through the full router.
//!
//! The limiter itself is unit tested in `rate_limit.rs`; these tests check
//! that the login endpoint applies it per client address and reports
//! `Retry-After`.

#[path = "integration/common/mod.rs"]
mod common;

use axum::http::{header, Method, StatusCode};
use common::TestApp;
use rto_api::LoginRateLimiter;
use serde_json::json;
use std::time::Duration;

async fn attempt(app: &TestApp, forwarded_for: &str) -> (StatusCode, Option<String>) {
    let request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/api/v1/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", forwarded_for)
        .body(axum::body::Body::from(
            json!({"email": "nobody@example.com", "password": "guess"}).to_string(),
        ))
        .unwrap();

    let response = tower::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();
    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    (response.status(), retry_after)
}

#[tokio::test]
async fn test_login_limited_per_ip() {
    let app =
        TestApp::with_limiter(LoginRateLimiter::with_config(2, 100, Duration::from_secs(60))).await;

    for _ in 0..2 {
        let (status, _) = attempt(&app, "203.0.113.7").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, retry_after) = attempt(&app, "203.0.113.7").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    let secs: u64 = retry_after.expect("Retry-After header").parse().unwrap();
    assert!(secs >= 1);

    // Another client is unaffected.
    let (status, _) = attempt(&app, "198.51.100.20").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_global_login_limit() {
    let app =
        TestApp::with_limiter(LoginRateLimiter::with_config(100, 3, Duration::from_secs(60))).await;

    for i in 1..=3 {
        let (status, _) = attempt(&app, &format!("192.0.2.{}", i)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, _) = attempt(&app, "192.0.2.99").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}
