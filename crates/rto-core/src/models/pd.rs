//! Professional development records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::status::{pd_status, string_enum, PdStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Course,
    Workshop,
    Conference,
    IndustryPlacement,
    Reading,
    Other,
}

string_enum!(ActivityType {
    Course => "course",
    Workshop => "workshop",
    Conference => "conference",
    IndustryPlacement => "industry_placement",
    Reading => "reading",
    Other => "other",
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PdItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub activity_type: ActivityType,
    pub provider: Option<String>,
    pub hours: f64,
    pub due_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub evidence_url: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PdItem {
    pub fn new(user_id: Uuid, title: impl Into<String>, activity_type: ActivityType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: title.into(),
            activity_type,
            provider: None,
            hours: 0.0,
            due_at: None,
            completed_at: None,
            evidence_url: None,
            notes: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn status(&self, now: DateTime<Utc>) -> PdStatus {
        pd_status(self.due_at, self.completed_at, now)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PdItemUpdate {
    pub title: Option<String>,
    pub activity_type: Option<ActivityType>,
    pub provider: Option<Option<String>>,
    pub hours: Option<f64>,
    pub due_at: Option<Option<DateTime<Utc>>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub evidence_url: Option<Option<String>>,
    pub notes: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct PdItemFilter {
    pub user_id: Option<Uuid>,
    pub activity_type: Option<ActivityType>,
    pub status: Option<PdStatus>,
    pub search: Option<String>,
}

/// PD totals for a user over a period.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PdSummary {
    pub user_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Hours of items completed within the period.
    pub completed_hours: f64,
    pub by_status: BTreeMap<String, u64>,
}

impl PdSummary {
    /// Builds the summary from the user's items.
    pub fn from_items(
        items: &[PdItem],
        user_id: Option<Uuid>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut summary = PdSummary {
            user_id,
            from,
            to,
            ..Default::default()
        };

        for item in items {
            *summary
                .by_status
                .entry(item.status(now).as_str().to_string())
                .or_insert(0) += 1;

            if let Some(completed) = item.completed_at {
                let after_start = from.map_or(true, |f| completed >= f);
                let before_end = to.map_or(true, |t| completed <= t);
                if after_start && before_end {
                    summary.completed_hours += item.hours;
                }
            }
        }

        summary
    }
}
