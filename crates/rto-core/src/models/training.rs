//! Training products on scope and the SOPs attached to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::{review_status, string_enum, ReviewStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Qualification,
    Unit,
    SkillSet,
    Course,
}

string_enum!(ProductType {
    Qualification => "qualification",
    Unit => "unit",
    SkillSet => "skill_set",
    Course => "course",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Current,
    Superseded,
}

string_enum!(ProductStatus {
    Current => "current",
    Superseded => "superseded",
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingProduct {
    pub id: Uuid,
    pub code: String,
    pub title: String,
    pub product_type: ProductType,
    pub status: ProductStatus,
    pub description: Option<String>,
    /// Identifier in the student management system, when synced.
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TrainingProduct {
    pub fn new(code: impl Into<String>, title: impl Into<String>, product_type: ProductType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            title: title.into(),
            product_type,
            status: ProductStatus::Current,
            description: None,
            external_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrainingProductUpdate {
    pub code: Option<String>,
    pub title: Option<String>,
    pub product_type: Option<ProductType>,
    pub status: Option<ProductStatus>,
    pub description: Option<Option<String>>,
    pub external_id: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct TrainingProductFilter {
    pub product_type: Option<ProductType>,
    pub status: Option<ProductStatus>,
    pub search: Option<String>,
}

/// Standard operating procedure document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sop {
    pub id: Uuid,
    pub title: String,
    pub training_product_id: Option<Uuid>,
    pub version: String,
    pub document_url: Option<String>,
    pub content: Option<String>,
    pub owner_id: Option<Uuid>,
    pub review_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Sop {
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            training_product_id: None,
            version: "1.0".to_string(),
            document_url: None,
            content: None,
            owner_id: None,
            review_date: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn review_status(&self, now: DateTime<Utc>) -> ReviewStatus {
        review_status(self.review_date, now)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SopUpdate {
    pub title: Option<String>,
    pub training_product_id: Option<Option<Uuid>>,
    pub version: Option<String>,
    pub document_url: Option<Option<String>>,
    pub content: Option<Option<String>>,
    pub owner_id: Option<Option<Uuid>>,
    pub review_date: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Default)]
pub struct SopFilter {
    pub training_product_id: Option<Uuid>,
    pub search: Option<String>,
}
