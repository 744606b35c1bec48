//! Multi-step workflows across resources, as the dashboard drives them.

use axum::http::{header, Method, StatusCode};
use rto_core::auth::system_roles;
use serde_json::{json, Value};

use super::common::TestApp;

fn id_of(value: &Value) -> String {
    value["id"].as_str().expect("id").to_string()
}

#[tokio::test]
async fn test_policy_lifecycle_and_coverage() {
    let app = TestApp::new().await;
    let token = app
        .token_for("manager@example.com", system_roles::COMPLIANCE_MANAGER)
        .await;

    let (status, standard) = app
        .post(
            "/api/v1/standards",
            &token,
            json!({"code": "1.8", "title": "Assessment", "category": "Training"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let standard_id = id_of(&standard);

    let (status, policy) = app
        .post(
            "/api/v1/policies",
            &token,
            json!({
                "policy_number": "POL-010",
                "title": "Assessment Policy",
                "content": "All assessments are validated.",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(policy["status"], "draft");
    let policy_id = id_of(&policy);

    let (status, _) = app
        .put(
            &format!("/api/v1/policies/{}/standards", policy_id),
            &token,
            json!({"standard_ids": [standard_id]}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Drafts do not cover a standard.
    let (_, coverage) = app
        .get("/api/v1/reports/standards-coverage", &token)
        .await;
    assert_eq!(coverage[0]["covered"], false);

    let (status, published) = app
        .post(&format!("/api/v1/policies/{}/publish", policy_id), &token, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(published["status"], "published");

    let (status, version) = app
        .post(
            &format!("/api/v1/policies/{}/versions", policy_id),
            &token,
            json!({"content": "Validated annually.", "change_summary": "Annual cycle"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(version["version_number"], 2);

    let (_, coverage) = app
        .get("/api/v1/reports/standards-coverage", &token)
        .await;
    assert_eq!(coverage[0]["covered"], true);
    assert_eq!(coverage[0]["policies"][0]["policy_number"], "POL-010");

    let (_, summary) = app
        .get("/api/v1/reports/compliance-summary", &token)
        .await;
    assert_eq!(summary["standards_without_policy"], 0);
}

#[tokio::test]
async fn test_complaint_register_flow() {
    let app = TestApp::new().await;
    let token = app
        .token_for("manager@example.com", system_roles::COMPLIANCE_MANAGER)
        .await;

    let (status, complaint) = app
        .post(
            "/api/v1/complaints",
            &token,
            json!({
                "complainant_name": "Jordan",
                "complainant_type": "learner",
                "description": "Results were released late",
                "priority": "high",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(complaint["reference"].as_str().unwrap().starts_with("CMP-"));
    let uri = format!("/api/v1/complaints/{}", id_of(&complaint));

    let (status, _) = app
        .post(&format!("{}/notes", uri), &token, json!({"note": "Called learner"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .post(&format!("{}/status", uri), &token, json!({"status": "resolved"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["resolution"].is_array());

    let (status, resolved) = app
        .post(
            &format!("{}/status", uri),
            &token,
            json!({"status": "resolved", "resolution": "Results reissued"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(resolved["resolved_at"].is_string());

    let (_, detail) = app.get(&uri, &token).await;
    assert_eq!(detail["notes"].as_array().unwrap().len(), 1);

    let (_, summary) = app
        .get("/api/v1/reports/compliance-summary", &token)
        .await;
    assert_eq!(summary["open_complaints"], 0);
}

#[tokio::test]
async fn test_staff_manage_own_credentials_and_pd() {
    let app = TestApp::new().await;
    let manager = app
        .token_for("manager@example.com", system_roles::COMPLIANCE_MANAGER)
        .await;
    let staff = app.token_for("staff@example.com", system_roles::STAFF).await;
    let other = app.token_for("other@example.com", system_roles::STAFF).await;

    let (status, credential) = app
        .post(
            "/api/v1/credentials",
            &staff,
            json!({
                "name": "Working with Children Check",
                "credential_type": "working_with_children",
                "expires_at": "2020-01-01T00:00:00Z",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(credential["status"], "expired");
    let uri = format!("/api/v1/credentials/{}", id_of(&credential));

    let (status, _) = app.get(&uri, &other).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get(&uri, &manager).await;
    assert_eq!(status, StatusCode::OK);

    let (status, item) = app
        .post(
            "/api/v1/pd-items",
            &staff,
            json!({"title": "Industry placement", "activity_type": "industry_placement", "hours": 16}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app
        .post(
            &format!("/api/v1/pd-items/{}/complete", id_of(&item)),
            &staff,
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, page) = app.get("/api/v1/pd-items", &other).await;
    assert_eq!(page["total"], 0);

    let (_, summary) = app.get("/api/v1/pd-items/summary", &staff).await;
    assert_eq!(summary["completed_hours"], 16.0);
}

#[tokio::test]
async fn test_report_download_headers() {
    let app = TestApp::new().await;
    let token = app
        .token_for("manager@example.com", system_roles::COMPLIANCE_MANAGER)
        .await;

    let (status, _, headers) = app
        .send(
            Method::GET,
            "/api/v1/reports/policies?format=csv",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers.get(header::CONTENT_TYPE).unwrap(),
        "text/csv; charset=utf-8"
    );
    assert!(headers
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .ends_with(".csv\""));
}
