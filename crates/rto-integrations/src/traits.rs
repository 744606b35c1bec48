//! Connector traits and the records they exchange.
//!
//! The API layer depends on these traits so that tests can swap in the mock
//! connectors.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::IntegrationResult;

/// Tokens returned by an OAuth 2.0 code exchange or refresh.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    /// Only present on the first exchange and when the provider rotates it.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl std::fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

/// A file or folder stored in Google Drive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub web_view_link: Option<String>,
}

/// Google Drive operations used by the platform.
#[async_trait]
pub trait DriveApi: Send + Sync {
    /// Consent screen URL carrying the CSRF `state` token.
    fn authorization_url(&self, state: &str) -> String;

    async fn exchange_code(&self, code: &str) -> IntegrationResult<OAuthTokens>;

    async fn refresh(&self, refresh_token: &str) -> IntegrationResult<OAuthTokens>;

    async fn create_folder(
        &self,
        access_token: &str,
        name: &str,
        parent_id: Option<&str>,
    ) -> IntegrationResult<DriveItem>;

    async fn upload_file(
        &self,
        access_token: &str,
        name: &str,
        mime_type: &str,
        content: Vec<u8>,
        folder_id: Option<&str>,
    ) -> IntegrationResult<DriveItem>;
}

/// A fixed asset from the accounting system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalAsset {
    pub external_id: String,
    /// Becomes the local asset tag.
    pub asset_number: String,
    pub name: String,
    pub purchase_date: Option<NaiveDate>,
    pub purchase_price: Option<f64>,
    /// Upstream status such as `Registered` or `Disposed`.
    pub status: String,
}

impl ExternalAsset {
    pub fn is_disposed(&self) -> bool {
        self.status.eq_ignore_ascii_case("disposed")
    }
}

/// A course from the student management system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalCourse {
    pub external_id: String,
    /// National code, used to match local training products.
    pub code: String,
    pub title: String,
    /// Upstream product kind, e.g. `qualification` or `unit`.
    pub kind: String,
    pub is_current: bool,
}

#[async_trait]
pub trait AssetSource: Send + Sync {
    fn name(&self) -> &str;

    async fn list_assets(&self) -> IntegrationResult<Vec<ExternalAsset>>;
}

#[async_trait]
pub trait CourseSource: Send + Sync {
    fn name(&self) -> &str;

    async fn list_courses(&self) -> IntegrationResult<Vec<ExternalCourse>>;
}
