use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A regulatory standard or clause that policies demonstrate compliance with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Standard {
    pub id: Uuid,
    /// Clause code, e.g. `1.8`.
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Standard {
    pub fn new(code: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            title: title.into(),
            description: None,
            category: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StandardUpdate {
    pub code: Option<String>,
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub category: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct StandardFilter {
    pub category: Option<String>,
    pub search: Option<String>,
}
