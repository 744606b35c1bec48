//! # rto-notify
//!
//! Outbound email for the RTO compliance platform.
//!
//! Messages are rendered from askama text templates, delivered through a
//! pluggable [`EmailProvider`] (SMTP, SendGrid or an in-memory mock) and
//! recorded in the email log. [`EmailService`] adds send limits and retries;
//! [`DigestScheduler`] sends the periodic compliance digest.

pub mod config;
pub mod digest;
pub mod error;
pub mod limiter;
pub mod mock;
pub mod provider;
pub mod reminders;
pub mod sendgrid;
pub mod service;
pub mod smtp;
pub mod templates;

pub use config::{DigestSettings, EmailConfig, ProviderKind, SmtpSettings};
pub use digest::{build_digests, send_digests, DigestScheduler};
pub use error::EmailError;
pub use limiter::{EmailRateLimiter, RateLimitConfig};
pub use mock::MockEmailProvider;
pub use provider::{EmailMessage, EmailProvider, Sender};
pub use reminders::{send_credential_reminders, send_pd_reminders, DeliveryReport};
pub use sendgrid::SendGridProvider;
pub use service::{EmailService, Recipient, RetryPolicy};
pub use smtp::SmtpProvider;
pub use templates::{
    ComplaintReceivedEmail, ComplianceDigestEmail, CredentialExpiryEmail, CredentialLine,
    EmailTemplate, GeneralNoticeEmail, OnboardingAssignedEmail, PasswordResetEmail, PdLine,
    PdReminderEmail, PolicyLine,
};
