//! Request body limits over the full middleware stack.

use axum::http::StatusCode;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rto_api::{ApiServer, ApiServerConfig, AppState};
use rto_core::auth::system_roles;
use rto_integrations::MockGoogleDrive;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::common::TestApp;

#[tokio::test]
async fn test_drive_upload_above_extractor_default() {
    let base = TestApp::new().await;
    let drive = MockGoogleDrive::new();
    let app = TestApp::from_state(base.state.clone().with_drive(Arc::new(drive.clone())));
    let token = app.token_for("admin@example.com", system_roles::ADMIN).await;

    let (status, auth) = app
        .get("/api/v1/integrations/google-drive/auth-url", &token)
        .await;
    assert_eq!(status, StatusCode::OK);
    let callback = format!(
        "/api/v1/integrations/google-drive/callback?code=ok&state={}",
        auth["state"].as_str().unwrap()
    );
    let (status, _) = app.get(&callback, &token).await;
    assert_eq!(status, StatusCode::OK);

    // 2 MiB of content, about 2.8 MB once base64 encoded.
    let content = vec![0x25u8; 2 * 1024 * 1024];
    let (status, file) = app
        .post(
            "/api/v1/integrations/google-drive/upload",
            &token,
            json!({
                "entity_type": "policies",
                "entity_id": Uuid::new_v4(),
                "file_name": "handbook.pdf",
                "mime_type": "application/pdf",
                "content_base64": BASE64.encode(&content),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", file);
    assert_eq!(file["name"], "handbook.pdf");
    assert_eq!(drive.upload_count(), 1);
}

fn small_limit_app(state: AppState) -> TestApp {
    let config = ApiServerConfig {
        enable_swagger: false,
        body_limit: 4 * 1024,
        ..Default::default()
    };
    TestApp {
        router: ApiServer::new(state.clone(), config).router(),
        state,
    }
}

#[tokio::test]
async fn test_body_over_configured_limit_is_413() {
    let base = TestApp::new().await;
    let app = small_limit_app(base.state.clone());
    let token = app.token_for("admin@example.com", system_roles::ADMIN).await;

    let (status, body) = app
        .post(
            "/api/v1/policies",
            &token,
            json!({
                "title": "Oversized",
                "content": "x".repeat(8 * 1024),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["code"], "PAYLOAD_TOO_LARGE");
}
