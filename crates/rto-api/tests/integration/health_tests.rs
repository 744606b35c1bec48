//! Health probe tests.

use axum::http::{Method, StatusCode};

use super::common::TestApp;

#[tokio::test]
async fn test_health_without_auth() {
    let app = TestApp::new().await;
    let (status, body, headers) = app.send(Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"]["connected"], true);
    assert_eq!(body["integrations"]["email"], false);
    assert!(headers.contains_key("x-request-id"));
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
}

#[tokio::test]
async fn test_probes() {
    let app = TestApp::new().await;
    let (ready, _, _) = app.send(Method::GET, "/ready", None, None).await;
    let (live, _, _) = app.send(Method::GET, "/live", None, None).await;
    assert_eq!(ready, StatusCode::OK);
    assert_eq!(live, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = TestApp::new().await;
    let (status, _, _) = app.send(Method::GET, "/api/v1/nope", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
