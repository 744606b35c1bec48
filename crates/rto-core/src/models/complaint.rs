//! Complaints register.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::string_enum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    Open,
    UnderInvestigation,
    Resolved,
    Closed,
}

string_enum!(ComplaintStatus {
    Open => "open",
    UnderInvestigation => "under_investigation",
    Resolved => "resolved",
    Closed => "closed",
});

impl ComplaintStatus {
    /// Whether the register allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: ComplaintStatus) -> bool {
        use ComplaintStatus::*;
        matches!(
            (self, next),
            (Open, UnderInvestigation)
                | (Open, Resolved)
                | (Open, Closed)
                | (UnderInvestigation, Resolved)
                | (UnderInvestigation, Open)
                | (Resolved, Closed)
                | (Resolved, UnderInvestigation)
                | (Closed, Open)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintPriority {
    Low,
    Medium,
    High,
}

string_enum!(ComplaintPriority {
    Low => "low",
    Medium => "medium",
    High => "high",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplainantType {
    Learner,
    Employer,
    Staff,
    Public,
}

string_enum!(ComplainantType {
    Learner => "learner",
    Employer => "employer",
    Staff => "staff",
    Public => "public",
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Complaint {
    pub id: Uuid,
    /// `CMP-{year}-{seq:04}`, assigned by the repository on insert.
    pub reference: String,
    pub complainant_name: String,
    pub complainant_email: Option<String>,
    pub complainant_type: ComplainantType,
    pub category: Option<String>,
    pub description: String,
    pub priority: ComplaintPriority,
    pub status: ComplaintStatus,
    pub assigned_to: Option<Uuid>,
    pub received_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Complaint {
    pub fn new(
        complainant_name: impl Into<String>,
        complainant_type: ComplainantType,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            reference: String::new(),
            complainant_name: complainant_name.into(),
            complainant_email: None,
            complainant_type,
            category: None,
            description: description.into(),
            priority: ComplaintPriority::Medium,
            status: ComplaintStatus::Open,
            assigned_to: None,
            received_at: now,
            resolved_at: None,
            resolution: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn days_open(&self, now: DateTime<Utc>) -> i64 {
        let end = self.resolved_at.unwrap_or(now);
        (end - self.received_at).num_days().max(0)
    }
}

/// Formats a complaint reference.
pub fn complaint_reference(received_at: DateTime<Utc>, sequence: u32) -> String {
    format!("CMP-{}-{:04}", received_at.year(), sequence)
}

#[derive(Debug, Clone, Default)]
pub struct ComplaintUpdate {
    pub complainant_name: Option<String>,
    pub complainant_email: Option<Option<String>>,
    pub complainant_type: Option<ComplainantType>,
    pub category: Option<Option<String>>,
    pub description: Option<String>,
    pub priority: Option<ComplaintPriority>,
    pub assigned_to: Option<Option<Uuid>>,
}

#[derive(Debug, Clone, Default)]
pub struct ComplaintFilter {
    pub status: Option<ComplaintStatus>,
    pub priority: Option<ComplaintPriority>,
    pub assigned_to: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Matches reference, complainant name or description.
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplaintNote {
    pub id: Uuid,
    pub complaint_id: Uuid,
    pub author_id: Option<Uuid>,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

impl ComplaintNote {
    pub fn new(complaint_id: Uuid, author_id: Option<Uuid>, note: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            complaint_id,
            author_id,
            note: note.into(),
            created_at: Utc::now(),
        }
    }
}
