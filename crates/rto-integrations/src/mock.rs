//! Mock connectors for tests and local development.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{IntegrationError, IntegrationResult};
use crate::google_drive::FOLDER_MIME_TYPE;
use crate::traits::{
    AssetSource, CourseSource, DriveApi, DriveItem, ExternalAsset, ExternalCourse, OAuthTokens,
};

/// Returns a fixed asset list, or a configured error.
#[derive(Clone, Default)]
pub struct MockXeroClient {
    assets: Arc<RwLock<Vec<ExternalAsset>>>,
    error: Arc<RwLock<Option<IntegrationError>>>,
}

impl MockXeroClient {
    pub fn new(assets: Vec<ExternalAsset>) -> Self {
        Self {
            assets: Arc::new(RwLock::new(assets)),
            error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn set_assets(&self, assets: Vec<ExternalAsset>) {
        *self.assets.write().await = assets;
    }

    pub async fn fail_with(&self, error: IntegrationError) {
        *self.error.write().await = Some(error);
    }
}

#[async_trait]
impl AssetSource for MockXeroClient {
    fn name(&self) -> &str {
        "xero"
    }

    async fn list_assets(&self) -> IntegrationResult<Vec<ExternalAsset>> {
        if let Some(error) = self.error.read().await.clone() {
            return Err(error);
        }
        Ok(self.assets.read().await.clone())
    }
}

#[derive(Clone, Default)]
pub struct MockAccelerateClient {
    courses: Arc<RwLock<Vec<ExternalCourse>>>,
    error: Arc<RwLock<Option<IntegrationError>>>,
}

impl MockAccelerateClient {
    pub fn new(courses: Vec<ExternalCourse>) -> Self {
        Self {
            courses: Arc::new(RwLock::new(courses)),
            error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn fail_with(&self, error: IntegrationError) {
        *self.error.write().await = Some(error);
    }
}

#[async_trait]
impl CourseSource for MockAccelerateClient {
    fn name(&self) -> &str {
        "accelerate"
    }

    async fn list_courses(&self) -> IntegrationResult<Vec<ExternalCourse>> {
        if let Some(error) = self.error.read().await.clone() {
            return Err(error);
        }
        Ok(self.courses.read().await.clone())
    }
}

/// An in-memory Drive. Codes starting with `bad` are rejected on exchange.
#[derive(Clone, Default)]
pub struct MockGoogleDrive {
    items: Arc<RwLock<Vec<(DriveItem, Option<String>)>>>,
    uploads: Arc<AtomicU32>,
}

impl MockGoogleDrive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every folder and file created, paired with its parent id.
    pub async fn items(&self) -> Vec<(DriveItem, Option<String>)> {
        self.items.read().await.clone()
    }

    pub fn upload_count(&self) -> u32 {
        self.uploads.load(Ordering::SeqCst)
    }

    fn tokens(&self) -> OAuthTokens {
        OAuthTokens {
            access_token: format!("mock-access-{}", Uuid::new_v4()),
            refresh_token: Some(format!("mock-refresh-{}", Uuid::new_v4())),
            expires_in: 3600,
            scope: Some("https://www.googleapis.com/auth/drive.file".to_string()),
            token_type: "Bearer".to_string(),
        }
    }

    async fn store(&self, name: &str, mime_type: &str, parent: Option<&str>) -> DriveItem {
        let id = Uuid::new_v4().simple().to_string();
        let item = DriveItem {
            web_view_link: Some(format!("https://drive.google.com/file/d/{}/view", id)),
            id,
            name: name.to_string(),
            mime_type: Some(mime_type.to_string()),
        };
        self.items
            .write()
            .await
            .push((item.clone(), parent.map(str::to_string)));
        item
    }
}

#[async_trait]
impl DriveApi for MockGoogleDrive {
    fn authorization_url(&self, state: &str) -> String {
        format!("https://accounts.google.com/o/oauth2/v2/auth?state={}", state)
    }

    async fn exchange_code(&self, code: &str) -> IntegrationResult<OAuthTokens> {
        if code.starts_with("bad") {
            return Err(IntegrationError::Authentication("invalid_grant".to_string()));
        }
        Ok(self.tokens())
    }

    async fn refresh(&self, _refresh_token: &str) -> IntegrationResult<OAuthTokens> {
        let mut tokens = self.tokens();
        tokens.refresh_token = None;
        Ok(tokens)
    }

    async fn create_folder(
        &self,
        _access_token: &str,
        name: &str,
        parent_id: Option<&str>,
    ) -> IntegrationResult<DriveItem> {
        Ok(self.store(name, FOLDER_MIME_TYPE, parent_id).await)
    }

    async fn upload_file(
        &self,
        _access_token: &str,
        name: &str,
        mime_type: &str,
        _content: Vec<u8>,
        folder_id: Option<&str>,
    ) -> IntegrationResult<DriveItem> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(self.store(name, mime_type, folder_id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_drive_tracks_parents() {
        let drive = MockGoogleDrive::new();
        let folder = drive.create_folder("t", "Policies", None).await.unwrap();
        drive
            .upload_file("t", "a.pdf", "application/pdf", vec![1], Some(&folder.id))
            .await
            .unwrap();

        let items = drive.items().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].1.as_deref(), Some(folder.id.as_str()));
        assert_eq!(drive.upload_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_xero_error() {
        let xero = MockXeroClient::new(vec![]);
        xero.fail_with(IntegrationError::Authentication("expired".into()))
            .await;
        assert!(xero.list_assets().await.is_err());
    }
}
