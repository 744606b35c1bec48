//! Google Drive connections and the folders and files uploaded through them.

use super::rows::{fmt_opt_ts, fmt_ts, opt_uuid, parse_opt_ts, parse_opt_uuid, parse_ts, parse_uuid};
use super::{DbError, DbPool};
use crate::models::{GoogleDriveConnection, GoogleDriveFile, GoogleDriveFolder};
use async_trait::async_trait;
use uuid::Uuid;

const CONNECTION_COLUMNS: &str =
    "id, user_id, access_token, refresh_token, expires_at, scope, connected_at, updated_at";

const FOLDER_COLUMNS: &str = "id, drive_folder_id, name, parent_drive_id, entity_type, entity_id, created_at";

const FILE_COLUMNS: &str = "id, drive_file_id, name, mime_type, folder_id, entity_type, entity_id, \
     web_view_link, uploaded_by, created_at";

#[async_trait]
pub trait DriveRepository: Send + Sync {
    /// Stores the user's connection, replacing any previous one. A missing
    /// refresh token keeps the stored one, since Google only returns it on
    /// first consent.
    async fn upsert_connection(
        &self,
        connection: &GoogleDriveConnection,
    ) -> Result<GoogleDriveConnection, DbError>;

    async fn get_connection(&self, user_id: Uuid)
        -> Result<Option<GoogleDriveConnection>, DbError>;

    async fn delete_connection(&self, user_id: Uuid) -> Result<bool, DbError>;

    async fn count_connections(&self) -> Result<u64, DbError>;

    /// The folder recorded for an entity. `entity_id = None` finds the
    /// per-type parent folder.
    async fn find_folder(
        &self,
        entity_type: &str,
        entity_id: Option<Uuid>,
    ) -> Result<Option<GoogleDriveFolder>, DbError>;

    async fn create_folder(&self, folder: &GoogleDriveFolder) -> Result<GoogleDriveFolder, DbError>;

    async fn create_file(&self, file: &GoogleDriveFile) -> Result<GoogleDriveFile, DbError>;

    /// Files uploaded for an entity, newest first.
    async fn list_files(
        &self,
        entity_type: &str,
        entity_id: Uuid,
    ) -> Result<Vec<GoogleDriveFile>, DbError>;
}

pub struct SqliteDriveRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteDriveRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DriveRepository for SqliteDriveRepository {
    async fn upsert_connection(
        &self,
        connection: &GoogleDriveConnection,
    ) -> Result<GoogleDriveConnection, DbError> {
        sqlx::query(
            r#"
            INSERT INTO google_drive_connections (id, user_id, access_token, refresh_token, expires_at,
                                                  scope, connected_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = COALESCE(excluded.refresh_token, google_drive_connections.refresh_token),
                expires_at = excluded.expires_at,
                scope = COALESCE(excluded.scope, google_drive_connections.scope),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(connection.id.to_string())
        .bind(connection.user_id.to_string())
        .bind(&connection.access_token)
        .bind(&connection.refresh_token)
        .bind(fmt_opt_ts(connection.expires_at))
        .bind(&connection.scope)
        .bind(fmt_ts(connection.connected_at))
        .bind(fmt_ts(connection.updated_at))
        .execute(&self.pool)
        .await?;

        self.get_connection(connection.user_id)
            .await?
            .ok_or_else(|| DbError::not_found("GoogleDriveConnection", connection.user_id))
    }

    async fn get_connection(
        &self,
        user_id: Uuid,
    ) -> Result<Option<GoogleDriveConnection>, DbError> {
        let sql = format!(
            "SELECT {} FROM google_drive_connections WHERE user_id = ?",
            CONNECTION_COLUMNS
        );
        let row: Option<ConnectionRow> = sqlx::query_as(&sql)
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn delete_connection(&self, user_id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM google_drive_connections WHERE user_id = ?")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_connections(&self) -> Result<u64, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM google_drive_connections")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn find_folder(
        &self,
        entity_type: &str,
        entity_id: Option<Uuid>,
    ) -> Result<Option<GoogleDriveFolder>, DbError> {
        let row: Option<FolderRow> = match entity_id {
            Some(id) => {
                let sql = format!(
                    "SELECT {} FROM google_drive_folders WHERE entity_type = ? AND entity_id = ? LIMIT 1",
                    FOLDER_COLUMNS
                );
                sqlx::query_as(&sql)
                    .bind(entity_type)
                    .bind(id.to_string())
                    .fetch_optional(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM google_drive_folders WHERE entity_type = ? AND entity_id IS NULL LIMIT 1",
                    FOLDER_COLUMNS
                );
                sqlx::query_as(&sql)
                    .bind(entity_type)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        row.map(TryInto::try_into).transpose()
    }

    async fn create_folder(
        &self,
        folder: &GoogleDriveFolder,
    ) -> Result<GoogleDriveFolder, DbError> {
        sqlx::query(
            r#"
            INSERT INTO google_drive_folders (id, drive_folder_id, name, parent_drive_id, entity_type,
                                              entity_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(folder.id.to_string())
        .bind(&folder.drive_folder_id)
        .bind(&folder.name)
        .bind(&folder.parent_drive_id)
        .bind(&folder.entity_type)
        .bind(opt_uuid(folder.entity_id))
        .bind(fmt_ts(folder.created_at))
        .execute(&self.pool)
        .await?;
        Ok(folder.clone())
    }

    async fn create_file(&self, file: &GoogleDriveFile) -> Result<GoogleDriveFile, DbError> {
        sqlx::query(
            r#"
            INSERT INTO google_drive_files (id, drive_file_id, name, mime_type, folder_id, entity_type,
                                            entity_id, web_view_link, uploaded_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(file.id.to_string())
        .bind(&file.drive_file_id)
        .bind(&file.name)
        .bind(&file.mime_type)
        .bind(opt_uuid(file.folder_id))
        .bind(&file.entity_type)
        .bind(file.entity_id.to_string())
        .bind(&file.web_view_link)
        .bind(opt_uuid(file.uploaded_by))
        .bind(fmt_ts(file.created_at))
        .execute(&self.pool)
        .await?;
        Ok(file.clone())
    }

    async fn list_files(
        &self,
        entity_type: &str,
        entity_id: Uuid,
    ) -> Result<Vec<GoogleDriveFile>, DbError> {
        let sql = format!(
            "SELECT {} FROM google_drive_files WHERE entity_type = ? AND entity_id = ? ORDER BY created_at DESC",
            FILE_COLUMNS
        );
        let rows: Vec<FileRow> = sqlx::query_as(&sql)
            .bind(entity_type)
            .bind(entity_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

pub fn create_drive_repository(pool: &DbPool) -> Box<dyn DriveRepository> {
    Box::new(SqliteDriveRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct ConnectionRow {
    id: String,
    user_id: String,
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<String>,
    scope: Option<String>,
    connected_at: String,
    updated_at: String,
}

impl TryFrom<ConnectionRow> for GoogleDriveConnection {
    type Error = DbError;

    fn try_from(row: ConnectionRow) -> Result<Self, Self::Error> {
        Ok(GoogleDriveConnection {
            id: parse_uuid(&row.id)?,
            user_id: parse_uuid(&row.user_id)?,
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            expires_at: parse_opt_ts(row.expires_at)?,
            scope: row.scope,
            connected_at: parse_ts(&row.connected_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FolderRow {
    id: String,
    drive_folder_id: String,
    name: String,
    parent_drive_id: Option<String>,
    entity_type: String,
    entity_id: Option<String>,
    created_at: String,
}

impl TryFrom<FolderRow> for GoogleDriveFolder {
    type Error = DbError;

    fn try_from(row: FolderRow) -> Result<Self, Self::Error> {
        Ok(GoogleDriveFolder {
            id: parse_uuid(&row.id)?,
            drive_folder_id: row.drive_folder_id,
            name: row.name,
            parent_drive_id: row.parent_drive_id,
            entity_type: row.entity_type,
            entity_id: parse_opt_uuid(row.entity_id)?,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FileRow {
    id: String,
    drive_file_id: String,
    name: String,
    mime_type: String,
    folder_id: Option<String>,
    entity_type: String,
    entity_id: String,
    web_view_link: Option<String>,
    uploaded_by: Option<String>,
    created_at: String,
}

impl TryFrom<FileRow> for GoogleDriveFile {
    type Error = DbError;

    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        Ok(GoogleDriveFile {
            id: parse_uuid(&row.id)?,
            drive_file_id: row.drive_file_id,
            name: row.name,
            mime_type: row.mime_type,
            folder_id: parse_opt_uuid(row.folder_id)?,
            entity_type: row.entity_type,
            entity_id: parse_uuid(&row.entity_id)?,
            web_view_link: row.web_view_link,
            uploaded_by: parse_opt_uuid(row.uploaded_by)?,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}
