use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::string_enum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Queued,
    Sent,
    Failed,
}

string_enum!(EmailStatus {
    Queued => "queued",
    Sent => "sent",
    Failed => "failed",
});

/// Delivery record for one outbound email.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailLog {
    pub id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub template: String,
    pub status: EmailStatus,
    pub provider: String,
    pub attempts: i64,
    pub error: Option<String>,
    pub message_id: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl EmailLog {
    pub fn queued(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        template: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient: recipient.into(),
            subject: subject.into(),
            template: template.into(),
            status: EmailStatus::Queued,
            provider: provider.into(),
            attempts: 0,
            error: None,
            message_id: None,
            sent_at: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EmailLogFilter {
    pub status: Option<EmailStatus>,
    pub recipient: Option<String>,
    pub template: Option<String>,
}
