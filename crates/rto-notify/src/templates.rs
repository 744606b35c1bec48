//! Plain-text email templates.
//!
//! Bodies live in `templates/*.txt` and are compiled in by askama. Subjects
//! are built here so they can carry counts and references.

use askama::Template;
use chrono::{DateTime, Utc};
use rto_core::models::{Credential, PdItem, Policy};

use crate::error::EmailError;

const DATE_FORMAT: &str = "%d %b %Y";

fn format_date(date: DateTime<Utc>) -> String {
    date.format(DATE_FORMAT).to_string()
}

// ============================================
// Line items
// ============================================

#[derive(Debug, Clone)]
pub struct CredentialLine {
    pub name: String,
    pub expires_on: String,
    pub days_left: i64,
}

impl CredentialLine {
    /// `None` for credentials without an expiry date.
    pub fn from_credential(credential: &Credential, now: DateTime<Utc>) -> Option<Self> {
        let expires_at = credential.expires_at?;
        Some(Self {
            name: credential.name.clone(),
            expires_on: format_date(expires_at),
            days_left: (expires_at - now).num_days().max(0),
        })
    }
}

#[derive(Debug, Clone)]
pub struct PdLine {
    pub title: String,
    pub status: String,
    pub due_on: String,
}

impl PdLine {
    pub fn from_item(item: &PdItem, now: DateTime<Utc>) -> Self {
        Self {
            title: item.title.clone(),
            status: item.status(now).to_string(),
            due_on: item
                .due_at
                .map(format_date)
                .unwrap_or_else(|| "no date".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PolicyLine {
    pub policy_number: String,
    pub title: String,
    pub review_on: String,
}

impl PolicyLine {
    pub fn from_policy(policy: &Policy) -> Self {
        Self {
            policy_number: policy.policy_number.clone(),
            title: policy.title.clone(),
            review_on: policy
                .review_date
                .map(format_date)
                .unwrap_or_else(|| "unscheduled".to_string()),
        }
    }
}

// ============================================
// Templates
// ============================================

#[derive(Template, Debug, Clone)]
#[template(path = "credential_expiry.txt")]
pub struct CredentialExpiryEmail {
    pub recipient_name: String,
    pub items: Vec<CredentialLine>,
    pub app_url: String,
}

#[derive(Template, Debug, Clone)]
#[template(path = "pd_reminder.txt")]
pub struct PdReminderEmail {
    pub recipient_name: String,
    pub items: Vec<PdLine>,
    pub app_url: String,
}

#[derive(Template, Debug, Clone)]
#[template(path = "onboarding_assigned.txt")]
pub struct OnboardingAssignedEmail {
    pub recipient_name: String,
    pub workflow_name: String,
    pub start_date: String,
    pub task_count: usize,
    pub app_url: String,
}

#[derive(Template, Debug, Clone)]
#[template(path = "complaint_received.txt")]
pub struct ComplaintReceivedEmail {
    pub recipient_name: String,
    pub reference: String,
    pub complainant_name: String,
    pub priority: String,
    pub description: String,
    pub app_url: String,
}

#[derive(Template, Debug, Clone)]
#[template(path = "compliance_digest.txt")]
pub struct ComplianceDigestEmail {
    pub recipient_name: String,
    pub credentials: Vec<CredentialLine>,
    pub pd_items: Vec<PdLine>,
    pub policies: Vec<PolicyLine>,
    pub app_url: String,
}

impl ComplianceDigestEmail {
    pub fn item_count(&self) -> usize {
        self.credentials.len() + self.pd_items.len() + self.policies.len()
    }
}

#[derive(Template, Debug, Clone)]
#[template(path = "general_notice.txt")]
pub struct GeneralNoticeEmail {
    pub recipient_name: String,
    pub subject: String,
    pub body: String,
}

#[derive(Template, Debug, Clone)]
#[template(path = "password_reset.txt")]
pub struct PasswordResetEmail {
    pub recipient_name: String,
    pub temporary_password: String,
    pub app_url: String,
}

/// Every email the platform sends.
#[derive(Debug, Clone)]
pub enum EmailTemplate {
    CredentialExpiry(CredentialExpiryEmail),
    PdReminder(PdReminderEmail),
    OnboardingAssigned(OnboardingAssignedEmail),
    ComplaintReceived(ComplaintReceivedEmail),
    ComplianceDigest(ComplianceDigestEmail),
    GeneralNotice(GeneralNoticeEmail),
    PasswordReset(PasswordResetEmail),
}

impl EmailTemplate {
    /// Name stored in the email log.
    pub fn name(&self) -> &'static str {
        match self {
            EmailTemplate::CredentialExpiry(_) => "credential_expiry",
            EmailTemplate::PdReminder(_) => "pd_reminder",
            EmailTemplate::OnboardingAssigned(_) => "onboarding_assigned",
            EmailTemplate::ComplaintReceived(_) => "complaint_received",
            EmailTemplate::ComplianceDigest(_) => "compliance_digest",
            EmailTemplate::GeneralNotice(_) => "general_notice",
            EmailTemplate::PasswordReset(_) => "password_reset",
        }
    }

    pub fn subject(&self) -> String {
        match self {
            EmailTemplate::CredentialExpiry(t) => match t.items.len() {
                1 => "A credential is expiring soon".to_string(),
                n => format!("{} credentials are expiring soon", n),
            },
            EmailTemplate::PdReminder(_) => "Professional development reminder".to_string(),
            EmailTemplate::OnboardingAssigned(t) => format!("Onboarding: {}", t.workflow_name),
            EmailTemplate::ComplaintReceived(t) => format!("New complaint {}", t.reference),
            EmailTemplate::ComplianceDigest(t) => {
                format!("Compliance digest: {} item(s) need attention", t.item_count())
            }
            EmailTemplate::GeneralNotice(t) => t.subject.clone(),
            EmailTemplate::PasswordReset(_) => "Your password has been reset".to_string(),
        }
    }

    pub fn render(&self) -> Result<String, EmailError> {
        let body = match self {
            EmailTemplate::CredentialExpiry(t) => t.render()?,
            EmailTemplate::PdReminder(t) => t.render()?,
            EmailTemplate::OnboardingAssigned(t) => t.render()?,
            EmailTemplate::ComplaintReceived(t) => t.render()?,
            EmailTemplate::ComplianceDigest(t) => t.render()?,
            EmailTemplate::GeneralNotice(t) => t.render()?,
            EmailTemplate::PasswordReset(t) => t.render()?,
        };
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rto_core::models::{ActivityType, CredentialType};
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_credential_expiry_lists_items() {
        let mut credential =
            Credential::new(Uuid::new_v4(), "First Aid Certificate", CredentialType::FirstAid);
        credential.expires_at = Some(now() + Duration::days(12));
        let line = CredentialLine::from_credential(&credential, now()).unwrap();
        assert_eq!(line.days_left, 12);
        assert_eq!(line.expires_on, "13 Mar 2025");

        let template = EmailTemplate::CredentialExpiry(CredentialExpiryEmail {
            recipient_name: "Jo Smith".to_string(),
            items: vec![line],
            app_url: "https://rto.example".to_string(),
        });

        assert_eq!(template.name(), "credential_expiry");
        assert_eq!(template.subject(), "A credential is expiring soon");
        let body = template.render().unwrap();
        assert!(body.contains("Hello Jo Smith"));
        assert!(body.contains("First Aid Certificate: expires 13 Mar 2025 (12 days)"));
        assert!(body.contains("https://rto.example/credentials"));
    }

    #[test]
    fn test_credential_without_expiry_has_no_line() {
        let credential = Credential::new(Uuid::new_v4(), "Cert IV", CredentialType::Qualification);
        assert!(CredentialLine::from_credential(&credential, now()).is_none());
    }

    #[test]
    fn test_text_is_not_html_escaped() {
        let template = EmailTemplate::GeneralNotice(GeneralNoticeEmail {
            recipient_name: "Sam O'Neil".to_string(),
            subject: "Audit <Friday>".to_string(),
            body: "Bring A & B".to_string(),
        });
        let body = template.render().unwrap();
        assert!(body.contains("Sam O'Neil"));
        assert!(body.contains("Bring A & B"));
        assert_eq!(template.subject(), "Audit <Friday>");
    }

    #[test]
    fn test_digest_sections_are_optional() {
        let mut item = PdItem::new(Uuid::new_v4(), "Assessment validation", ActivityType::Workshop);
        item.due_at = Some(now() - Duration::days(2));

        let digest = ComplianceDigestEmail {
            recipient_name: "Jo".to_string(),
            credentials: vec![],
            pd_items: vec![PdLine::from_item(&item, now())],
            policies: vec![],
            app_url: "https://rto.example".to_string(),
        };
        assert_eq!(digest.item_count(), 1);

        let body = EmailTemplate::ComplianceDigest(digest).render().unwrap();
        assert!(body.contains("Assessment validation (overdue, due 27 Feb 2025)"));
        assert!(!body.contains("Credentials expiring"));
        assert!(!body.contains("Policies overdue"));
    }

    #[test]
    fn test_onboarding_pluralises_tasks() {
        let one = OnboardingAssignedEmail {
            recipient_name: "Jo".to_string(),
            workflow_name: "Trainer induction".to_string(),
            start_date: "03 Feb 2025".to_string(),
            task_count: 1,
            app_url: "https://rto.example".to_string(),
        };
        assert!(one.render().unwrap().contains("It has 1 task for you"));

        let many = OnboardingAssignedEmail { task_count: 4, ..one };
        assert!(many.render().unwrap().contains("It has 4 tasks for you"));
    }
}
