//! Google Drive connection state and the files mirrored into Drive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// OAuth tokens for a user's Drive connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoogleDriveConnection {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GoogleDriveConnection {
    /// True when the access token is expired or expires within a minute.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .map_or(false, |exp| exp <= now + chrono::Duration::seconds(60))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoogleDriveFolder {
    pub id: Uuid,
    pub drive_folder_id: String,
    pub name: String,
    pub parent_drive_id: Option<String>,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoogleDriveFile {
    pub id: Uuid,
    pub drive_file_id: String,
    pub name: String,
    pub mime_type: String,
    pub folder_id: Option<Uuid>,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub web_view_link: Option<String>,
    pub uploaded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
