//! Policies, their versions, and standards they map to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::{review_status, string_enum, ReviewStatus};

/// Publication lifecycle of a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    Draft,
    Published,
    Archived,
}

string_enum!(PolicyStatus {
    Draft => "draft",
    Published => "published",
    Archived => "archived",
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Policy {
    pub id: Uuid,
    pub policy_number: String,
    pub title: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub owner_id: Option<Uuid>,
    pub status: PolicyStatus,
    pub review_date: Option<DateTime<Utc>>,
    pub current_version_id: Option<Uuid>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Policy {
    pub fn new(policy_number: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            policy_number: policy_number.into(),
            title: title.into(),
            category: None,
            description: None,
            owner_id: None,
            status: PolicyStatus::Draft,
            review_date: None,
            current_version_id: None,
            published_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn review_status(&self, now: DateTime<Utc>) -> ReviewStatus {
        review_status(self.review_date, now)
    }
}

/// An immutable snapshot of a policy's content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyVersion {
    pub id: Uuid,
    pub policy_id: Uuid,
    /// Starts at 1 and increases by one per policy.
    pub version_number: i64,
    pub content: String,
    pub change_summary: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct PolicyUpdate {
    pub policy_number: Option<String>,
    pub title: Option<String>,
    pub category: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub owner_id: Option<Option<Uuid>>,
    pub review_date: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Default)]
pub struct PolicyFilter {
    pub status: Option<PolicyStatus>,
    pub category: Option<String>,
    pub owner_id: Option<Uuid>,
    pub review_status: Option<ReviewStatus>,
    /// Matches title or policy number.
    pub search: Option<String>,
}
