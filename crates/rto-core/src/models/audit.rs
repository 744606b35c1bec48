use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One audited API mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    /// `{resource}.{verb}`, e.g. `policies.create`.
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub method: String,
    pub path: String,
    pub status_code: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Request body with sensitive fields redacted.
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditLog {
    pub fn new(action: impl Into<String>, method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: None,
            action: action.into(),
            resource_type: None,
            resource_id: None,
            method: method.into(),
            path: path.into(),
            status_code: 0,
            ip_address: None,
            user_agent: None,
            details: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub user_id: Option<Uuid>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub action: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}
