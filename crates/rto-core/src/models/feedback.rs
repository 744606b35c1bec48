use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::status::string_enum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    Learner,
    Employer,
    Staff,
    Industry,
}

string_enum!(FeedbackType {
    Learner => "learner",
    Employer => "employer",
    Staff => "staff",
    Industry => "industry",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    New,
    Reviewed,
    Actioned,
}

string_enum!(FeedbackStatus {
    New => "new",
    Reviewed => "reviewed",
    Actioned => "actioned",
});

/// Feedback from learners, employers, staff or industry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feedback {
    pub id: Uuid,
    pub feedback_type: FeedbackType,
    pub training_product_id: Option<Uuid>,
    /// Cleared when the feedback is anonymous.
    pub submitted_by: Option<String>,
    pub email: Option<String>,
    /// 1 to 5 inclusive.
    pub rating: Option<i64>,
    pub comments: String,
    pub is_anonymous: bool,
    pub status: FeedbackStatus,
    pub response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Feedback {
    pub fn new(feedback_type: FeedbackType, comments: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            feedback_type,
            training_product_id: None,
            submitted_by: None,
            email: None,
            rating: None,
            comments: comments.into(),
            is_anonymous: false,
            status: FeedbackStatus::New,
            response: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Strips identifying fields.
    pub fn anonymise(&mut self) {
        self.is_anonymous = true;
        self.submitted_by = None;
        self.email = None;
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeedbackUpdate {
    pub status: Option<FeedbackStatus>,
    pub response: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct FeedbackFilter {
    pub feedback_type: Option<FeedbackType>,
    pub status: Option<FeedbackStatus>,
    pub training_product_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

/// Aggregate view of feedback.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeedbackSummary {
    pub total: u64,
    pub average_rating: Option<f64>,
    pub by_type: BTreeMap<String, u64>,
    pub by_status: BTreeMap<String, u64>,
}
