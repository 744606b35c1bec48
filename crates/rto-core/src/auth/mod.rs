//! Users, roles and the permission catalogue.
//!
//! Authorization is role based: every user holds exactly one [`Role`], and a
//! role grants a set of [`Permission`]s. The four system roles are seeded on
//! startup and cannot be deleted; custom roles may be added through the API.

pub mod password;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Fine-grained permissions checked by the API layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "users:read")]
    UsersRead,
    #[serde(rename = "users:write")]
    UsersWrite,
    #[serde(rename = "roles:manage")]
    RolesManage,
    #[serde(rename = "policies:read")]
    PoliciesRead,
    #[serde(rename = "policies:write")]
    PoliciesWrite,
    #[serde(rename = "policies:publish")]
    PoliciesPublish,
    #[serde(rename = "standards:read")]
    StandardsRead,
    #[serde(rename = "standards:write")]
    StandardsWrite,
    #[serde(rename = "credentials:read")]
    CredentialsRead,
    #[serde(rename = "credentials:write")]
    CredentialsWrite,
    #[serde(rename = "training:read")]
    TrainingRead,
    #[serde(rename = "training:write")]
    TrainingWrite,
    #[serde(rename = "feedback:read")]
    FeedbackRead,
    #[serde(rename = "feedback:write")]
    FeedbackWrite,
    #[serde(rename = "assets:read")]
    AssetsRead,
    #[serde(rename = "assets:write")]
    AssetsWrite,
    #[serde(rename = "complaints:read")]
    ComplaintsRead,
    #[serde(rename = "complaints:write")]
    ComplaintsWrite,
    #[serde(rename = "onboarding:read")]
    OnboardingRead,
    #[serde(rename = "onboarding:write")]
    OnboardingWrite,
    #[serde(rename = "pd:read")]
    PdRead,
    #[serde(rename = "pd:write")]
    PdWrite,
    #[serde(rename = "reports:read")]
    ReportsRead,
    #[serde(rename = "email:send")]
    EmailSend,
    #[serde(rename = "audit:read")]
    AuditRead,
    #[serde(rename = "integrations:manage")]
    IntegrationsManage,
}

impl Permission {
    /// Every permission, in catalogue order.
    pub fn all() -> &'static [Permission] {
        use Permission::*;
        &[
            UsersRead,
            UsersWrite,
            RolesManage,
            PoliciesRead,
            PoliciesWrite,
            PoliciesPublish,
            StandardsRead,
            StandardsWrite,
            CredentialsRead,
            CredentialsWrite,
            TrainingRead,
            TrainingWrite,
            FeedbackRead,
            FeedbackWrite,
            AssetsRead,
            AssetsWrite,
            ComplaintsRead,
            ComplaintsWrite,
            OnboardingRead,
            OnboardingWrite,
            PdRead,
            PdWrite,
            ReportsRead,
            EmailSend,
            AuditRead,
            IntegrationsManage,
        ]
    }

    /// Returns the `resource:action` string for this permission.
    pub fn as_str(&self) -> &'static str {
        use Permission::*;
        match self {
            UsersRead => "users:read",
            UsersWrite => "users:write",
            RolesManage => "roles:manage",
            PoliciesRead => "policies:read",
            PoliciesWrite => "policies:write",
            PoliciesPublish => "policies:publish",
            StandardsRead => "standards:read",
            StandardsWrite => "standards:write",
            CredentialsRead => "credentials:read",
            CredentialsWrite => "credentials:write",
            TrainingRead => "training:read",
            TrainingWrite => "training:write",
            FeedbackRead => "feedback:read",
            FeedbackWrite => "feedback:write",
            AssetsRead => "assets:read",
            AssetsWrite => "assets:write",
            ComplaintsRead => "complaints:read",
            ComplaintsWrite => "complaints:write",
            OnboardingRead => "onboarding:read",
            OnboardingWrite => "onboarding:write",
            PdRead => "pd:read",
            PdWrite => "pd:write",
            ReportsRead => "reports:read",
            EmailSend => "email:send",
            AuditRead => "audit:read",
            IntegrationsManage => "integrations:manage",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::all()
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("Unknown permission: {}", s))
    }
}

/// Names of the roles seeded on startup.
pub mod system_roles {
    pub const ADMIN: &str = "admin";
    pub const COMPLIANCE_MANAGER: &str = "compliance_manager";
    pub const TRAINER: &str = "trainer";
    pub const STAFF: &str = "staff";

    pub const ALL: [&str; 4] = [ADMIN, COMPLIANCE_MANAGER, TRAINER, STAFF];
}

/// Returns the permission set for a system role, or `None` for custom roles.
pub fn system_role_permissions(name: &str) -> Option<BTreeSet<Permission>> {
    use Permission::*;

    let set: BTreeSet<Permission> = match name {
        system_roles::ADMIN => Permission::all().iter().copied().collect(),
        system_roles::COMPLIANCE_MANAGER => Permission::all()
            .iter()
            .copied()
            .filter(|p| !matches!(p, UsersWrite | RolesManage | IntegrationsManage))
            .collect(),
        system_roles::TRAINER => [
            PoliciesRead,
            StandardsRead,
            TrainingRead,
            TrainingWrite,
            FeedbackRead,
            FeedbackWrite,
            AssetsRead,
            OnboardingRead,
            PdRead,
            PdWrite,
        ]
        .into_iter()
        .collect(),
        system_roles::STAFF => [PoliciesRead, StandardsRead, TrainingRead, FeedbackWrite]
            .into_iter()
            .collect(),
        _ => return None,
    };

    Some(set)
}

/// A role and the permissions it grants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// System roles are seeded and cannot be deleted.
    pub is_system: bool,
    pub permissions: BTreeSet<Permission>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    /// Creates a new custom role.
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        permissions: BTreeSet<Permission>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description,
            is_system: false,
            permissions,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

/// Partial update for a role.
#[derive(Debug, Clone, Default)]
pub struct RoleUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub permissions: Option<BTreeSet<Permission>>,
}

/// A staff member with access to the platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role_id: Uuid,
    pub department: Option<String>,
    pub position: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Creates a new active user.
    pub fn new(
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        password_hash: impl Into<String>,
        role_id: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: email.into().to_lowercase(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            password_hash: password_hash.into(),
            role_id,
            department: None,
            position: None,
            phone: None,
            is_active: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Partial update for a user. `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role_id: Option<Uuid>,
    pub department: Option<Option<String>>,
    pub position: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub is_active: Option<bool>,
}

/// Filter for listing users.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role_id: Option<Uuid>,
    pub department: Option<String>,
    pub is_active: Option<bool>,
    /// Matches email, first name or last name.
    pub search: Option<String>,
}

/// The authenticated principal: a user together with its resolved role.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub role: Role,
}

impl CurrentUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }

    /// True when the user holds `permission` or owns the resource.
    pub fn can_access_owned(&self, owner_id: Uuid, permission: Permission) -> bool {
        self.user.id == owner_id || self.has_permission(permission)
    }
}

/// Stored refresh token. Only the SHA-256 hash of the token is persisted.
#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn new(user_id: Uuid, token_hash: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            token_hash: token_hash.into(),
            expires_at,
            revoked_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_round_trip_through_str() {
        for permission in Permission::all() {
            assert_eq!(permission.as_str().parse::<Permission>().unwrap(), *permission);
        }
        assert!("policies:delete".parse::<Permission>().is_err());
    }

    #[test]
    fn test_permission_serde_uses_resource_action() {
        let json = serde_json::to_string(&Permission::PoliciesPublish).unwrap();
        assert_eq!(json, "\"policies:publish\"");
    }

    #[test]
    fn test_system_role_permissions() {
        let admin = system_role_permissions(system_roles::ADMIN).unwrap();
        assert_eq!(admin.len(), Permission::all().len());

        let manager = system_role_permissions(system_roles::COMPLIANCE_MANAGER).unwrap();
        assert!(manager.contains(&Permission::PoliciesPublish));
        assert!(!manager.contains(&Permission::UsersWrite));
        assert!(!manager.contains(&Permission::RolesManage));

        let staff = system_role_permissions(system_roles::STAFF).unwrap();
        assert!(staff.contains(&Permission::FeedbackWrite));
        assert!(!staff.contains(&Permission::CredentialsRead));

        assert!(system_role_permissions("auditor").is_none());
    }

    #[test]
    fn test_user_email_is_normalised() {
        let user = User::new("Jane.Doe@Example.COM", "Jane", "Doe", "hash", Uuid::new_v4());
        assert_eq!(user.email, "jane.doe@example.com");
        assert_eq!(user.full_name(), "Jane Doe");
        assert!(user.is_active);
    }

    #[test]
    fn test_owner_access() {
        let role = Role::new("staff", None, BTreeSet::new());
        let user = User::new("a@b.c", "A", "B", "hash", role.id);
        let current = CurrentUser { user: user.clone(), role };

        assert!(current.can_access_owned(user.id, Permission::CredentialsRead));
        assert!(!current.can_access_owned(Uuid::new_v4(), Permission::CredentialsRead));
    }

    #[test]
    fn test_refresh_token_usable() {
        let now = Utc::now();
        let mut token = RefreshToken::new(Uuid::new_v4(), "abc", now + chrono::Duration::days(1));
        assert!(token.is_usable(now));
        token.revoked_at = Some(now);
        assert!(!token.is_usable(now));
    }
}
