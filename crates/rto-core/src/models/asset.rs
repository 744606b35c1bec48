//! Physical assets and their service history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::{review_status, string_enum, ReviewStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Active,
    InMaintenance,
    Retired,
}

string_enum!(AssetStatus {
    Active => "active",
    InMaintenance => "in_maintenance",
    Retired => "retired",
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Asset {
    pub id: Uuid,
    pub asset_tag: String,
    pub name: String,
    pub category: Option<String>,
    pub location: Option<String>,
    pub status: AssetStatus,
    pub purchase_date: Option<DateTime<Utc>>,
    pub purchase_cost: Option<f64>,
    pub assigned_to: Option<Uuid>,
    pub next_service_date: Option<DateTime<Utc>>,
    /// Identifier in the accounting system, when synced.
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Asset {
    pub fn new(asset_tag: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            asset_tag: asset_tag.into(),
            name: name.into(),
            category: None,
            location: None,
            status: AssetStatus::Active,
            purchase_date: None,
            purchase_cost: None,
            assigned_to: None,
            next_service_date: None,
            external_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn service_status(&self, now: DateTime<Utc>) -> ReviewStatus {
        review_status(self.next_service_date, now)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssetUpdate {
    pub asset_tag: Option<String>,
    pub name: Option<String>,
    pub category: Option<Option<String>>,
    pub location: Option<Option<String>>,
    pub status: Option<AssetStatus>,
    pub purchase_date: Option<Option<DateTime<Utc>>>,
    pub purchase_cost: Option<Option<f64>>,
    pub assigned_to: Option<Option<Uuid>>,
    pub next_service_date: Option<Option<DateTime<Utc>>>,
    pub external_id: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct AssetFilter {
    pub status: Option<AssetStatus>,
    pub category: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub service_status: Option<ReviewStatus>,
    /// Matches asset tag, name or location.
    pub search: Option<String>,
}

/// A maintenance or inspection record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetService {
    pub id: Uuid,
    pub asset_id: Uuid,
    pub service_date: DateTime<Utc>,
    pub service_type: String,
    pub performed_by: Option<String>,
    pub cost: Option<f64>,
    pub notes: Option<String>,
    pub next_service_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AssetService {
    pub fn new(asset_id: Uuid, service_date: DateTime<Utc>, service_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            asset_id,
            service_date,
            service_type: service_type.into(),
            performed_by: None,
            cost: None,
            notes: None,
            next_service_date: None,
            created_at: Utc::now(),
        }
    }
}
