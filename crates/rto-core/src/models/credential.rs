//! Staff credentials: qualifications, licences, checks and certificates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::{credential_status, expiring_within, string_enum, CredentialStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    Qualification,
    Licence,
    Certification,
    WorkingWithChildren,
    PoliceCheck,
    FirstAid,
    Other,
}

string_enum!(CredentialType {
    Qualification => "qualification",
    Licence => "licence",
    Certification => "certification",
    WorkingWithChildren => "working_with_children",
    PoliceCheck => "police_check",
    FirstAid => "first_aid",
    Other => "other",
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Credential {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub credential_type: CredentialType,
    pub issuer: Option<String>,
    pub credential_number: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Only `Revoked` is ever stored here; other statuses are derived.
    pub manual_status: Option<CredentialStatus>,
    pub evidence_url: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(user_id: Uuid, name: impl Into<String>, credential_type: CredentialType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            name: name.into(),
            credential_type,
            issuer: None,
            credential_number: None,
            issued_at: None,
            expires_at: None,
            manual_status: None,
            evidence_url: None,
            notes: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn status(&self, now: DateTime<Utc>) -> CredentialStatus {
        credential_status(self.expires_at, self.manual_status, now)
    }

    pub fn expires_within(&self, days: i64, now: DateTime<Utc>) -> bool {
        expiring_within(self.expires_at, self.manual_status, days, now)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CredentialUpdate {
    pub name: Option<String>,
    pub credential_type: Option<CredentialType>,
    pub issuer: Option<Option<String>>,
    pub credential_number: Option<Option<String>>,
    pub issued_at: Option<Option<DateTime<Utc>>>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub evidence_url: Option<Option<String>>,
    pub notes: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct CredentialFilter {
    pub user_id: Option<Uuid>,
    pub credential_type: Option<CredentialType>,
    pub status: Option<CredentialStatus>,
    /// Active credentials expiring within this many days.
    pub expiring_within_days: Option<i64>,
    /// Matches name, issuer or credential number.
    pub search: Option<String>,
}
