//! Authentication and authorization over the full router.

use axum::http::{header, Method, StatusCode};
use rto_core::auth::system_roles;
use serde_json::json;

use super::common::{TestApp, TEST_PASSWORD};

const PROTECTED_ROUTES: &[&str] = &[
    "/api/v1/users",
    "/api/v1/roles",
    "/api/v1/policies",
    "/api/v1/standards",
    "/api/v1/credentials",
    "/api/v1/training-products",
    "/api/v1/sops",
    "/api/v1/feedback",
    "/api/v1/assets",
    "/api/v1/complaints",
    "/api/v1/onboarding/workflows",
    "/api/v1/pd-items",
    "/api/v1/reports/compliance-summary",
    "/api/v1/email/logs",
    "/api/v1/audit-logs",
    "/api/v1/integrations/status",
];

#[tokio::test]
async fn test_resources_require_token() {
    let app = TestApp::new().await;
    for uri in PROTECTED_ROUTES {
        let (status, body, _) = app.send(Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{} should need a token", uri);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }
}

#[tokio::test]
async fn test_garbage_token_rejected() {
    let app = TestApp::new().await;
    let (status, _) = app.get("/api/v1/policies", "not-a-jwt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_then_me() {
    let app = TestApp::new().await;
    let token = app
        .token_for("manager@example.com", system_roles::COMPLIANCE_MANAGER)
        .await;

    let (status, me) = app.get("/api/v1/auth/me", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["user"]["email"], "manager@example.com");
    assert_eq!(me["role"]["name"], system_roles::COMPLIANCE_MANAGER);
    let permissions: Vec<&str> = me["permissions"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p.as_str())
        .collect();
    assert!(permissions.contains(&"policies:publish"));
    assert!(!permissions.contains(&"users:write"));
    assert!(me["user"].get("password_hash").is_none());
}

#[tokio::test]
async fn test_wrong_password() {
    let app = TestApp::new().await;
    app.create_user("staff@example.com", system_roles::STAFF).await;

    let (status, body, _) = app
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"email": "staff@example.com", "password": "wrong"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn test_staff_permissions_enforced() {
    let app = TestApp::new().await;
    let token = app.token_for("staff@example.com", system_roles::STAFF).await;

    let (status, _) = app.get("/api/v1/policies", &token).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post(
            "/api/v1/policies",
            &token,
            json!({"policy_number": "POL-9", "title": "Not allowed"}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, _) = app.get("/api/v1/audit-logs", &token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_refresh_rotates_token() {
    let app = TestApp::new().await;
    app.create_user("trainer@example.com", system_roles::TRAINER).await;

    let (_, tokens, _) = app
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"email": "trainer@example.com", "password": TEST_PASSWORD})),
        )
        .await;
    let refresh = tokens["refresh_token"].as_str().unwrap().to_string();

    let (status, rotated, _) = app
        .send(
            Method::POST,
            "/api/v1/auth/refresh",
            None,
            Some(json!({"refresh_token": refresh})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(rotated["refresh_token"], tokens["refresh_token"]);

    let (status, _, _) = app
        .send(
            Method::POST,
            "/api/v1/auth/refresh",
            None,
            Some(json!({"refresh_token": refresh})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_deactivated_user_token_stops_working() {
    let app = TestApp::new().await;
    let admin = app.token_for("root@example.com", system_roles::ADMIN).await;
    let staff = app.create_user("leaver@example.com", system_roles::STAFF).await;
    let staff_token = app.login("leaver@example.com").await;

    let (status, _) = app
        .post(
            &format!("/api/v1/users/{}/deactivate", staff.id),
            &admin,
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body, headers) = app
        .send(Method::GET, "/api/v1/auth/me", Some(&staff_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "ACCOUNT_DISABLED");
    assert_eq!(
        headers.get(header::CONTENT_TYPE).unwrap(),
        "application/problem+json"
    );
}
