//! Date-derived compliance statuses.
//!
//! Statuses are computed at read time from the stored dates and `now`. They
//! are never persisted, so an expiry takes effect the moment its date passes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Days before a due date at which an item is reported as "due".
pub const DUE_SOON_WINDOW_DAYS: i64 = 30;

/// Longest look-ahead any window may span (one century).
pub const MAX_WINDOW_DAYS: i64 = 36_525;

/// `now` plus `days`, with `days` capped at [`MAX_WINDOW_DAYS`].
pub fn days_after(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    Duration::try_days(days.min(MAX_WINDOW_DAYS))
        .and_then(|window| now.checked_add_signed(window))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(format!(
                        "Invalid {}: {}. Expected one of: {}",
                        stringify!($name),
                        s,
                        [$($text),+].join(", ")
                    )),
                }
            }
        }
    };
}

pub(crate) use string_enum;

/// Derived status of a staff credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Active,
    Expired,
    Revoked,
}

string_enum!(CredentialStatus {
    Active => "active",
    Expired => "expired",
    Revoked => "revoked",
});

/// Derives the credential status.
///
/// A manual revocation always wins. Without an expiry date the credential is
/// active; otherwise it is expired once `now` is strictly past `expires_at`.
pub fn credential_status(
    expires_at: Option<DateTime<Utc>>,
    manual_status: Option<CredentialStatus>,
    now: DateTime<Utc>,
) -> CredentialStatus {
    if manual_status == Some(CredentialStatus::Revoked) {
        return CredentialStatus::Revoked;
    }
    match expires_at {
        None => CredentialStatus::Active,
        Some(expiry) if now > expiry => CredentialStatus::Expired,
        Some(_) => CredentialStatus::Active,
    }
}

/// True when an active credential expires within `days` days of `now`.
pub fn expiring_within(
    expires_at: Option<DateTime<Utc>>,
    manual_status: Option<CredentialStatus>,
    days: i64,
    now: DateTime<Utc>,
) -> bool {
    match expires_at {
        Some(expiry) => {
            credential_status(expires_at, manual_status, now) == CredentialStatus::Active
                && expiry <= days_after(now, days)
        }
        None => false,
    }
}

/// Derived status of a professional development item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PdStatus {
    Planned,
    Due,
    Overdue,
    Completed,
}

string_enum!(PdStatus {
    Planned => "planned",
    Due => "due",
    Overdue => "overdue",
    Completed => "completed",
});

pub fn pd_status(
    due_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> PdStatus {
    if completed_at.is_some() {
        return PdStatus::Completed;
    }
    match due_at {
        None => PdStatus::Planned,
        Some(due) if now > due => PdStatus::Overdue,
        Some(due) if due <= now + Duration::days(DUE_SOON_WINDOW_DAYS) => PdStatus::Due,
        Some(_) => PdStatus::Planned,
    }
}

/// Derived review status for policies and SOPs, and service status for assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    NotScheduled,
    Current,
    Due,
    Overdue,
}

string_enum!(ReviewStatus {
    NotScheduled => "not_scheduled",
    Current => "current",
    Due => "due",
    Overdue => "overdue",
});

pub fn review_status(review_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> ReviewStatus {
    match review_date {
        None => ReviewStatus::NotScheduled,
        Some(date) if now > date => ReviewStatus::Overdue,
        Some(date) if date <= now + Duration::days(DUE_SOON_WINDOW_DAYS) => ReviewStatus::Due,
        Some(_) => ReviewStatus::Current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_credential_without_expiry_is_active() {
        assert_eq!(credential_status(None, None, now()), CredentialStatus::Active);
    }

    #[test]
    fn test_credential_expires_strictly_after_date() {
        let expiry = now();
        assert_eq!(
            credential_status(Some(expiry), None, now()),
            CredentialStatus::Active
        );
        assert_eq!(
            credential_status(Some(expiry), None, now() + Duration::seconds(1)),
            CredentialStatus::Expired
        );
    }

    #[test]
    fn test_revoked_wins_over_dates() {
        assert_eq!(
            credential_status(
                Some(now() + Duration::days(365)),
                Some(CredentialStatus::Revoked),
                now()
            ),
            CredentialStatus::Revoked
        );
        assert_eq!(
            credential_status(None, Some(CredentialStatus::Revoked), now()),
            CredentialStatus::Revoked
        );
    }

    #[test]
    fn test_manual_expired_is_ignored() {
        // Only a revocation overrides the dates.
        assert_eq!(
            credential_status(None, Some(CredentialStatus::Expired), now()),
            CredentialStatus::Active
        );
    }

    #[test]
    fn test_expiring_within() {
        let soon = Some(now() + Duration::days(10));
        assert!(expiring_within(soon, None, 30, now()));
        assert!(!expiring_within(soon, None, 5, now()));
        assert!(!expiring_within(soon, Some(CredentialStatus::Revoked), 30, now()));
        assert!(!expiring_within(Some(now() - Duration::days(1)), None, 30, now()));
        assert!(!expiring_within(None, None, 30, now()));
    }

    #[test]
    fn test_expiring_within_huge_window_is_capped() {
        let soon = Some(now() + Duration::days(10));
        assert!(expiring_within(soon, None, 1_000_000_000, now()));
        assert!(expiring_within(soon, None, i64::MAX, now()));
        assert_eq!(
            days_after(now(), i64::MAX),
            now() + Duration::days(MAX_WINDOW_DAYS)
        );
    }

    #[test]
    fn test_pd_status() {
        assert_eq!(pd_status(None, None, now()), PdStatus::Planned);
        assert_eq!(
            pd_status(Some(now() - Duration::days(1)), Some(now()), now()),
            PdStatus::Completed
        );
        assert_eq!(
            pd_status(Some(now() - Duration::days(1)), None, now()),
            PdStatus::Overdue
        );
        assert_eq!(
            pd_status(Some(now() + Duration::days(7)), None, now()),
            PdStatus::Due
        );
        assert_eq!(
            pd_status(Some(now() + Duration::days(90)), None, now()),
            PdStatus::Planned
        );
    }

    #[test]
    fn test_review_status() {
        assert_eq!(review_status(None, now()), ReviewStatus::NotScheduled);
        assert_eq!(
            review_status(Some(now() - Duration::days(1)), now()),
            ReviewStatus::Overdue
        );
        assert_eq!(
            review_status(Some(now() + Duration::days(DUE_SOON_WINDOW_DAYS)), now()),
            ReviewStatus::Due
        );
        assert_eq!(
            review_status(Some(now() + Duration::days(DUE_SOON_WINDOW_DAYS + 1)), now()),
            ReviewStatus::Current
        );
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Revoked".parse::<CredentialStatus>(), Ok(CredentialStatus::Revoked));
        assert_eq!("not_scheduled".parse::<ReviewStatus>(), Ok(ReviewStatus::NotScheduled));
        assert!("bogus".parse::<PdStatus>().is_err());
        assert_eq!(PdStatus::Overdue.to_string(), "overdue");
    }
}
