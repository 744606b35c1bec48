//! The audit middleware as seen through `/audit-logs`.

use axum::http::{Method, StatusCode};
use rto_core::auth::system_roles;
use serde_json::{json, Value};
use std::time::Duration;

use super::common::TestApp;

/// Audit entries are written off the request path, so poll briefly.
async fn wait_for_logs(app: &TestApp, token: &str, query: &str, expected: u64) -> Value {
    for _ in 0..50 {
        let (_, page) = app
            .get(&format!("/api/v1/audit-logs?{}", query), token)
            .await;
        if page["total"].as_u64() == Some(expected) {
            return page;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected {} audit entries for {}", expected, query);
}

#[tokio::test]
async fn test_mutation_is_audited() {
    let app = TestApp::new().await;
    let user = app.create_user("root@example.com", system_roles::ADMIN).await;
    let token = app.login("root@example.com").await;

    let (status, asset) = app
        .post(
            "/api/v1/assets",
            &token,
            json!({"asset_tag": "AS-001", "name": "Projector"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let page = wait_for_logs(&app, &token, "resource_type=assets", 1).await;
    let entry = &page["data"][0];
    assert_eq!(entry["action"], "assets.create");
    assert_eq!(entry["method"], "POST");
    assert_eq!(entry["status_code"], 201);
    assert_eq!(entry["user_id"], user.id.to_string());
    assert_eq!(entry["details"]["asset_tag"], "AS-001");
    assert!(asset["id"].is_string());
}

#[tokio::test]
async fn test_failed_login_is_audited_without_password() {
    let app = TestApp::new().await;
    let token = app.token_for("root@example.com", system_roles::ADMIN).await;

    let (status, _, _) = app
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"email": "root@example.com", "password": "guess"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // One successful and one failed login.
    let page = wait_for_logs(&app, &token, "action=auth.login", 2).await;
    let failed = page["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["status_code"] == 401)
        .expect("failed login entry");
    assert_eq!(failed["details"]["email"], "root@example.com");
    assert_eq!(failed["details"]["password"], "[REDACTED]");
}

#[tokio::test]
async fn test_reads_are_not_audited() {
    let app = TestApp::new().await;
    let token = app.token_for("root@example.com", system_roles::ADMIN).await;

    app.get("/api/v1/policies", &token).await;
    app.get("/api/v1/assets", &token).await;

    // Only the login is recorded.
    wait_for_logs(&app, &token, "", 1).await;
}
