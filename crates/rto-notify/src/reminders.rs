//! Reminder runs: one email per user listing everything that needs attention.

use chrono::{DateTime, Utc};
use rto_core::db::{
    create_credential_repository, create_pd_item_repository, create_user_repository, DbPool,
};
use rto_core::models::{Credential, CredentialFilter, PdItem, PdItemFilter};
use rto_core::{PdStatus, User};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::EmailError;
use crate::service::{EmailService, Recipient};
use crate::templates::{
    CredentialExpiryEmail, CredentialLine, EmailTemplate, PdLine, PdReminderEmail,
};

/// Outcome of a bulk send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
    /// Recipients with items but no active account.
    pub skipped: usize,
}

impl DeliveryReport {
    pub(crate) fn record(&mut self, result: Result<(), EmailError>, to: &str) {
        match result {
            Ok(()) => self.sent += 1,
            Err(e) => {
                warn!(to = %to, error = %e, "Reminder not delivered");
                self.failed += 1;
            }
        }
    }
}

pub(crate) fn group_by_user<T>(items: Vec<T>, owner: impl Fn(&T) -> Uuid) -> BTreeMap<Uuid, Vec<T>> {
    let mut grouped: BTreeMap<Uuid, Vec<T>> = BTreeMap::new();
    for item in items {
        grouped.entry(owner(&item)).or_default().push(item);
    }
    grouped
}

/// Active credentials expiring within `days` days.
pub(crate) async fn expiring_credentials(
    pool: &DbPool,
    days: i64,
) -> Result<Vec<Credential>, EmailError> {
    let filter = CredentialFilter {
        expiring_within_days: Some(days),
        ..Default::default()
    };
    Ok(create_credential_repository(pool).list_all(&filter).await?)
}

/// PD items that are overdue or due soon.
pub(crate) async fn outstanding_pd(pool: &DbPool) -> Result<Vec<PdItem>, EmailError> {
    let repo = create_pd_item_repository(pool);
    let mut items = Vec::new();
    for status in [PdStatus::Overdue, PdStatus::Due] {
        let filter = PdItemFilter {
            status: Some(status),
            ..Default::default()
        };
        items.extend(repo.list_all(&filter).await?);
    }
    Ok(items)
}

pub(crate) async fn active_users(pool: &DbPool) -> Result<BTreeMap<Uuid, User>, EmailError> {
    Ok(create_user_repository(pool)
        .list_active()
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect())
}

/// Emails each holder of a credential expiring within `days` days.
pub async fn send_credential_reminders(
    pool: &DbPool,
    service: &EmailService,
    days: i64,
    now: DateTime<Utc>,
) -> Result<DeliveryReport, EmailError> {
    let users = active_users(pool).await?;
    let grouped = group_by_user(expiring_credentials(pool, days).await?, |c| c.user_id);
    let mut report = DeliveryReport::default();

    for (user_id, credentials) in grouped {
        let Some(user) = users.get(&user_id) else {
            report.skipped += 1;
            continue;
        };

        let items: Vec<CredentialLine> = credentials
            .iter()
            .filter_map(|c| CredentialLine::from_credential(c, now))
            .collect();
        let template = EmailTemplate::CredentialExpiry(CredentialExpiryEmail {
            recipient_name: user.full_name(),
            items,
            app_url: service.app_url().to_string(),
        });

        let result = service
            .send_template(&Recipient::from(user), &template)
            .await
            .map(|_| ());
        report.record(result, &user.email);
    }

    info!(
        days,
        sent = report.sent,
        failed = report.failed,
        "Credential reminders sent"
    );
    Ok(report)
}

/// Emails each user with overdue or due PD.
pub async fn send_pd_reminders(
    pool: &DbPool,
    service: &EmailService,
    now: DateTime<Utc>,
) -> Result<DeliveryReport, EmailError> {
    let users = active_users(pool).await?;
    let grouped = group_by_user(outstanding_pd(pool).await?, |p| p.user_id);
    let mut report = DeliveryReport::default();

    for (user_id, items) in grouped {
        let Some(user) = users.get(&user_id) else {
            report.skipped += 1;
            continue;
        };

        let template = EmailTemplate::PdReminder(PdReminderEmail {
            recipient_name: user.full_name(),
            items: items.iter().map(|p| PdLine::from_item(p, now)).collect(),
            app_url: service.app_url().to_string(),
        });

        let result = service
            .send_template(&Recipient::from(user), &template)
            .await
            .map(|_| ());
        report.record(result, &user.email);
    }

    info!(sent = report.sent, failed = report.failed, "PD reminders sent");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::RateLimitConfig;
    use crate::mock::MockEmailProvider;
    use crate::service::testing::{service, test_pool};
    use chrono::Duration;
    use rto_core::db::create_role_repository;
    use rto_core::models::{ActivityType, CredentialType};
    use rto_core::auth::system_roles;
    use std::sync::Arc;

    async fn user(pool: &DbPool, email: &str) -> User {
        let role = create_role_repository(pool)
            .get_by_name(system_roles::TRAINER)
            .await
            .unwrap()
            .unwrap();
        let user = User::new(email, "Pat", "Lee", "hash", role.id);
        create_user_repository(pool).create(&user).await.unwrap()
    }

    #[tokio::test]
    async fn test_credential_reminders_group_per_user() {
        let pool = test_pool().await;
        let now = Utc::now();
        let pat = user(&pool, "pat@college.edu.au").await;
        let sam = user(&pool, "sam@college.edu.au").await;
        let repo = create_credential_repository(&pool);

        for (owner, days) in [(pat.id, 5), (pat.id, 20), (sam.id, 90)] {
            let mut credential = Credential::new(owner, "Cert", CredentialType::Certification);
            credential.expires_at = Some(now + Duration::days(days));
            repo.create(&credential).await.unwrap();
        }

        let provider = MockEmailProvider::new();
        let service = service(&pool, Arc::new(provider.clone()), RateLimitConfig::default());
        let report = send_credential_reminders(&pool, &service, 30, now).await.unwrap();

        assert_eq!(report, DeliveryReport { sent: 1, failed: 0, skipped: 0 });
        let sent = provider.sent().await;
        assert_eq!(sent[0].to, "pat@college.edu.au");
        assert_eq!(sent[0].subject, "2 credentials are expiring soon");
    }

    #[tokio::test]
    async fn test_inactive_users_are_skipped() {
        let pool = test_pool().await;
        let now = Utc::now();
        let pat = user(&pool, "pat@college.edu.au").await;

        let mut item = PdItem::new(pat.id, "Industry currency", ActivityType::IndustryPlacement);
        item.due_at = Some(now - Duration::days(1));
        create_pd_item_repository(&pool).create(&item).await.unwrap();

        let users = create_user_repository(&pool);
        users
            .update(
                pat.id,
                &rto_core::auth::UserUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let provider = MockEmailProvider::new();
        let service = service(&pool, Arc::new(provider.clone()), RateLimitConfig::default());
        let report = send_pd_reminders(&pool, &service, now).await.unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.sent, 0);
        assert!(provider.sent().await.is_empty());
    }

    #[test]
    fn test_group_by_user() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let grouped = group_by_user(vec![(a, 1), (b, 2), (a, 3)], |(id, _)| *id);
        assert_eq!(grouped[&a], vec![(a, 1), (a, 3)]);
        assert_eq!(grouped[&b].len(), 1);
    }
}
