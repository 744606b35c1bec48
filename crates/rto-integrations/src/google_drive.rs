//! Google Drive connector: OAuth consent, token exchange and uploads.

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{IntegrationError, IntegrationResult};
use crate::http::{HttpClient, HttpClientConfig};
use crate::traits::{DriveApi, DriveItem, OAuthTokens};

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

const ITEM_FIELDS: &str = "id,name,mimeType,webViewLink";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleDriveConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_scope")]
    pub scope: String,
}

fn default_auth_url() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_api_base_url() -> String {
    "https://www.googleapis.com".to_string()
}

fn default_scope() -> String {
    "https://www.googleapis.com/auth/drive.file".to_string()
}

impl GoogleDriveConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            api_base_url: default_api_base_url(),
            scope: default_scope(),
        }
    }

    /// Returns one message per problem.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.client_id.is_empty() {
            problems.push("google_drive.client_id is empty".to_string());
        }
        if self.client_secret.is_empty() {
            problems.push("google_drive.client_secret is empty".to_string());
        }
        if Url::parse(&self.redirect_uri).is_err() {
            problems.push(format!(
                "google_drive.redirect_uri '{}' is not a valid URL",
                self.redirect_uri
            ));
        }
        problems
    }
}

pub struct GoogleDriveClient {
    config: GoogleDriveConfig,
    http: HttpClient,
}

impl GoogleDriveClient {
    pub fn new(config: GoogleDriveConfig) -> IntegrationResult<Self> {
        let problems = config.validate();
        if !problems.is_empty() {
            return Err(IntegrationError::NotConfigured(problems.join("; ")));
        }
        let http = HttpClient::new(HttpClientConfig::new(
            "google_drive",
            config.api_base_url.clone(),
        ))?;
        Ok(Self { config, http })
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> IntegrationResult<OAuthTokens> {
        let request = self
            .http
            .request(Method::POST, &self.config.token_url)
            .form(params);

        self.http.send_json(request).await.map_err(|e| match e {
            IntegrationError::RequestFailed(msg) => IntegrationError::Authentication(msg),
            other => other,
        })
    }
}

/// Builds a `multipart/related` body: JSON metadata followed by the file.
pub fn multipart_related_body(
    boundary: &str,
    metadata: &Value,
    mime_type: &str,
    content: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + 512);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

#[async_trait]
impl DriveApi for GoogleDriveClient {
    fn authorization_url(&self, state: &str) -> String {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", self.config.scope.as_str()),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("state", state),
        ];
        match Url::parse_with_params(&self.config.auth_url, &params) {
            Ok(url) => url.to_string(),
            Err(_) => self.config.auth_url.clone(),
        }
    }

    #[instrument(skip_all)]
    async fn exchange_code(&self, code: &str) -> IntegrationResult<OAuthTokens> {
        let tokens = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .await?;
        info!("Exchanged Google authorization code");
        Ok(tokens)
    }

    #[instrument(skip_all)]
    async fn refresh(&self, refresh_token: &str) -> IntegrationResult<OAuthTokens> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ])
        .await
    }

    #[instrument(skip(self, access_token))]
    async fn create_folder(
        &self,
        access_token: &str,
        name: &str,
        parent_id: Option<&str>,
    ) -> IntegrationResult<DriveItem> {
        let mut metadata = json!({ "name": name, "mimeType": FOLDER_MIME_TYPE });
        if let Some(parent) = parent_id {
            metadata["parents"] = json!([parent]);
        }

        let request = self
            .http
            .request(Method::POST, "/drive/v3/files")
            .query(&[("fields", ITEM_FIELDS)])
            .bearer_auth(access_token)
            .json(&metadata);
        self.http.send_json(request).await
    }

    #[instrument(skip(self, access_token, content), fields(size = content.len()))]
    async fn upload_file(
        &self,
        access_token: &str,
        name: &str,
        mime_type: &str,
        content: Vec<u8>,
        folder_id: Option<&str>,
    ) -> IntegrationResult<DriveItem> {
        let mut metadata = json!({ "name": name, "mimeType": mime_type });
        if let Some(folder) = folder_id {
            metadata["parents"] = json!([folder]);
        }

        let boundary = format!("rto-{}", Uuid::new_v4().simple());
        let body = multipart_related_body(&boundary, &metadata, mime_type, &content);

        let request = self
            .http
            .request(Method::POST, "/upload/drive/v3/files")
            .query(&[("uploadType", "multipart"), ("fields", ITEM_FIELDS)])
            .bearer_auth(access_token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body);

        let item: DriveItem = self.http.send_json(request).await?;
        info!(file_id = %item.id, "Uploaded file to Google Drive");
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn config(base: &str) -> GoogleDriveConfig {
        let mut config = GoogleDriveConfig::new(
            "client-1",
            "secret-1",
            "https://rto.example/api/v1/integrations/google-drive/callback",
        );
        config.token_url = format!("{}/token", base);
        config.api_base_url = base.to_string();
        config
    }

    #[test]
    fn test_authorization_url_carries_state() {
        let client = GoogleDriveClient::new(config("https://www.googleapis.com")).unwrap();
        let url = Url::parse(&client.authorization_url("abc123")).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(params["state"], "abc123");
        assert_eq!(params["client_id"], "client-1");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["access_type"], "offline");
    }

    #[test]
    fn test_missing_credentials_not_configured() {
        let err = GoogleDriveClient::new(GoogleDriveConfig::new("", "", "not a url"))
            .err()
            .unwrap();
        match err {
            IntegrationError::NotConfigured(msg) => {
                assert!(msg.contains("client_id"));
                assert!(msg.contains("redirect_uri"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_multipart_related_layout() {
        let body = multipart_related_body("b1", &json!({"name": "a.txt"}), "text/plain", b"hi");
        let text = String::from_utf8(body).unwrap();
        assert_eq!(
            text,
            "--b1\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{\"name\":\"a.txt\"}\
             \r\n--b1\r\nContent-Type: text/plain\r\n\r\nhi\r\n--b1--\r\n"
        );
    }

    #[tokio::test]
    async fn test_exchange_code() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "code-9".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"access_token":"at","refresh_token":"rt","expires_in":3599,"scope":"drive.file","token_type":"Bearer"}"#,
            )
            .create_async()
            .await;

        let client = GoogleDriveClient::new(config(&server.url())).unwrap();
        let tokens = client.exchange_code("code-9").await.unwrap();
        assert_eq!(tokens.access_token, "at");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt"));
        assert_eq!(tokens.expires_in, 3599);
        assert!(!format!("{:?}", tokens).contains("\"at\""));
    }

    #[tokio::test]
    async fn test_rejected_code_is_authentication_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let client = GoogleDriveClient::new(config(&server.url())).unwrap();
        let err = client.exchange_code("stale").await.unwrap_err();
        assert!(matches!(err, IntegrationError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_upload_uses_multipart_related() {
        let mut server = mockito::Server::new_async().await;
        let upload = server
            .mock("POST", "/upload/drive/v3/files")
            .match_query(Matcher::UrlEncoded("uploadType".into(), "multipart".into()))
            .match_header("authorization", "Bearer user-token")
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/related; boundary=rto-".to_string()),
            )
            .match_body(Matcher::Regex("\"parents\":\\[\"folder-1\"\\]".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"file-1","name":"evidence.pdf","mimeType":"application/pdf","webViewLink":"https://drive/file-1"}"#)
            .create_async()
            .await;

        let client = GoogleDriveClient::new(config(&server.url())).unwrap();
        let item = client
            .upload_file(
                "user-token",
                "evidence.pdf",
                "application/pdf",
                b"%PDF-1.4".to_vec(),
                Some("folder-1"),
            )
            .await
            .unwrap();

        assert_eq!(item.id, "file-1");
        assert_eq!(item.web_view_link.as_deref(), Some("https://drive/file-1"));
        upload.assert_async().await;
    }
}
