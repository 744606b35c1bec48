//! Periodic compliance digest.
//!
//! Each run gathers credentials expiring within the due-soon window,
//! outstanding PD, and (for users who maintain policies) overdue policy
//! reviews, then emails every user with at least one item.

use chrono::{DateTime, Utc};
use rto_core::db::{create_policy_repository, create_role_repository, DbPool};
use rto_core::models::{Credential, PdItem, Policy, PolicyFilter};
use rto_core::{Permission, ReviewStatus, Role, User, DUE_SOON_WINDOW_DAYS};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::error::EmailError;
use crate::reminders::{
    active_users, expiring_credentials, group_by_user, outstanding_pd, DeliveryReport,
};
use crate::service::{EmailService, Recipient};
use crate::templates::{
    ComplianceDigestEmail, CredentialLine, EmailTemplate, PdLine, PolicyLine,
};

/// Builds one digest per user that has something to report.
///
/// Overdue policy reviews go only to users whose role can edit policies.
pub fn build_digests(
    users: &[User],
    roles: &HashMap<Uuid, Role>,
    credentials: Vec<Credential>,
    pd_items: Vec<PdItem>,
    overdue_policies: &[Policy],
    app_url: &str,
    now: DateTime<Utc>,
) -> Vec<(Recipient, ComplianceDigestEmail)> {
    let mut credentials = group_by_user(credentials, |c| c.user_id);
    let mut pd_items = group_by_user(pd_items, |p| p.user_id);
    let policy_lines: Vec<PolicyLine> = overdue_policies.iter().map(PolicyLine::from_policy).collect();

    users
        .iter()
        .filter(|u| u.is_active)
        .filter_map(|user| {
            let maintains_policies = roles
                .get(&user.role_id)
                .is_some_and(|r| r.has_permission(Permission::PoliciesWrite));

            let digest = ComplianceDigestEmail {
                recipient_name: user.full_name(),
                credentials: credentials
                    .remove(&user.id)
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|c| CredentialLine::from_credential(c, now))
                    .collect(),
                pd_items: pd_items
                    .remove(&user.id)
                    .unwrap_or_default()
                    .iter()
                    .map(|p| PdLine::from_item(p, now))
                    .collect(),
                policies: if maintains_policies {
                    policy_lines.clone()
                } else {
                    Vec::new()
                },
                app_url: app_url.to_string(),
            };

            (digest.item_count() > 0).then(|| (Recipient::from(user), digest))
        })
        .collect()
}

/// Sends the compliance digest on a fixed interval until shut down.
pub struct DigestScheduler {
    pool: DbPool,
    service: Arc<EmailService>,
    interval: Duration,
}

impl DigestScheduler {
    pub fn new(pool: DbPool, service: Arc<EmailService>, interval: Duration) -> Self {
        Self {
            pool,
            service,
            interval,
        }
    }

    /// Runs until `shutdown` flips to `true`. The first tick fires after one
    /// full interval.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        info!(interval_secs = self.interval.as_secs(), "Digest scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once(Utc::now()).await {
                        Ok(report) => info!(
                            sent = report.sent,
                            failed = report.failed,
                            "Compliance digest run finished"
                        ),
                        Err(e) => error!(error = %e, "Compliance digest run failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Digest scheduler stopping");
                        break;
                    }
                }
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<DeliveryReport, EmailError> {
        send_digests(&self.pool, &self.service, now).await
    }
}

/// Builds and sends every digest once.
pub async fn send_digests(
    pool: &DbPool,
    service: &EmailService,
    now: DateTime<Utc>,
) -> Result<DeliveryReport, EmailError> {
    let users: Vec<User> = active_users(pool).await?.into_values().collect();
    let roles: HashMap<Uuid, Role> = create_role_repository(pool)
        .list()
        .await?
        .into_iter()
        .map(|r| (r.id, r))
        .collect();
    let overdue = create_policy_repository(pool)
        .list_all(&PolicyFilter {
            review_status: Some(ReviewStatus::Overdue),
            ..Default::default()
        })
        .await?;

    let digests = build_digests(
        &users,
        &roles,
        expiring_credentials(pool, DUE_SOON_WINDOW_DAYS).await?,
        outstanding_pd(pool).await?,
        &overdue,
        service.app_url(),
        now,
    );

    let mut report = DeliveryReport::default();
    for (recipient, digest) in digests {
        let result = service
            .send_template(&recipient, &EmailTemplate::ComplianceDigest(digest))
            .await
            .map(|_| ());
        report.record(result, &recipient.email);
    }
    Ok(report)
}
