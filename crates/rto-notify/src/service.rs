//! Email delivery with logging, retries and send limits.

use chrono::Utc;
use metrics::counter;
use rto_core::db::EmailLogRepository;
use rto_core::models::{EmailLog, EmailStatus};
use rto_observability::{EMAILS_FAILED_TOTAL, EMAILS_SENT_TOTAL};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::EmailConfig;
use crate::error::EmailError;
use crate::limiter::{EmailRateLimiter, RateLimitConfig};
use crate::provider::{EmailMessage, EmailProvider};
use crate::templates::EmailTemplate;

/// Who an email goes to.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub email: String,
    pub name: String,
}

impl Recipient {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
        }
    }
}

impl From<&rto_core::User> for Recipient {
    fn from(user: &rto_core::User) -> Self {
        Self::new(user.email.clone(), user.full_name())
    }
}

/// Fixed-count retry with linear backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt after `attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

pub struct EmailService {
    provider: Arc<dyn EmailProvider>,
    logs: Arc<dyn EmailLogRepository>,
    limiter: EmailRateLimiter,
    retry: RetryPolicy,
    app_url: String,
}

impl EmailService {
    pub fn new(
        provider: Arc<dyn EmailProvider>,
        logs: Arc<dyn EmailLogRepository>,
        limits: RateLimitConfig,
        retry: RetryPolicy,
        app_url: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            logs,
            limiter: EmailRateLimiter::new(limits),
            retry,
            app_url: app_url.into(),
        }
    }

    pub fn from_config(
        config: &EmailConfig,
        provider: Arc<dyn EmailProvider>,
        logs: Arc<dyn EmailLogRepository>,
    ) -> Self {
        let retry = RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.retry_base_delay(),
        };
        Self::new(
            provider,
            logs,
            config.rate_limit.clone(),
            retry,
            config.app_url.trim_end_matches('/'),
        )
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Dashboard base URL for links in bodies.
    pub fn app_url(&self) -> &str {
        &self.app_url
    }

    /// Renders and delivers a template, recording the outcome in the email log.
    ///
    /// Returns the final log row on success. Rate-limited and failed sends are
    /// logged as `failed` and returned as errors.
    #[instrument(skip(self, template), fields(to = %recipient.email, template = template.name()))]
    pub async fn send_template(
        &self,
        recipient: &Recipient,
        template: &EmailTemplate,
    ) -> Result<EmailLog, EmailError> {
        let subject = template.subject();
        let body = template.render()?;
        recipient.email.parse::<lettre::Address>()?;

        let mut log = EmailLog::queued(
            &recipient.email,
            &subject,
            template.name(),
            self.provider.name(),
        );

        if let Err(e) = self.limiter.check(&recipient.email).await {
            warn!(error = %e, "Email send rate limited");
            log.status = EmailStatus::Failed;
            log.error = Some(e.to_string());
            self.logs.create(&log).await?;
            counter!(EMAILS_FAILED_TOTAL, "reason" => "rate_limited").increment(1);
            return Err(e);
        }

        self.logs.create(&log).await?;

        let message = EmailMessage::new(&recipient.email, subject, body).with_name(&recipient.name);
        self.deliver(&mut log, &message).await?;
        Ok(log)
    }

    async fn deliver(&self, log: &mut EmailLog, message: &EmailMessage) -> Result<(), EmailError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.provider.send(message).await {
                Ok(message_id) => {
                    self.logs
                        .mark_sent(log.id, attempt as i64, Some(&message_id))
                        .await?;
                    log.status = EmailStatus::Sent;
                    log.attempts = attempt as i64;
                    log.message_id = Some(message_id);
                    log.sent_at = Some(Utc::now());

                    counter!(EMAILS_SENT_TOTAL, "provider" => self.provider.name().to_string())
                        .increment(1);
                    info!(attempts = attempt, "Email sent");
                    return Ok(());
                }
                Err(e) if e.is_permanent() || attempt >= self.retry.max_attempts => {
                    self.logs
                        .mark_failed(log.id, attempt as i64, &e.to_string())
                        .await?;
                    log.status = EmailStatus::Failed;
                    log.attempts = attempt as i64;
                    log.error = Some(e.to_string());

                    counter!(EMAILS_FAILED_TOTAL, "reason" => "provider").increment(1);
                    warn!(attempts = attempt, error = %e, "Email delivery failed");
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Email send failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use rto_core::db::{
        create_email_log_repository, create_pool_with_options, ensure_default_roles,
        run_migrations, DbPool, PoolOptions,
    };
    use uuid::Uuid;

    pub(crate) async fn test_pool() -> DbPool {
        let url = format!(
            "sqlite:file:notify_{}?mode=memory&cache=shared",
            Uuid::new_v4()
        );
        let options = PoolOptions {
            max_connections: 1,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            max_lifetime: None,
            idle_timeout: None,
        };
        let pool = create_pool_with_options(&url, options).await.unwrap();
        run_migrations(&pool).await.unwrap();
        ensure_default_roles(&pool).await.unwrap();
        pool
    }

    pub(crate) fn service(
        pool: &DbPool,
        provider: Arc<dyn EmailProvider>,
        limits: RateLimitConfig,
    ) -> EmailService {
        EmailService::new(
            provider,
            Arc::from(create_email_log_repository(pool)),
            limits,
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(10),
            },
            "https://rto.example",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{service, test_pool};
    use super::*;
    use crate::mock::MockEmailProvider;
    use crate::templates::GeneralNoticeEmail;
    use rto_core::db::{create_email_log_repository, Pagination};
    use rto_core::models::EmailLogFilter;

    fn notice() -> EmailTemplate {
        EmailTemplate::GeneralNotice(GeneralNoticeEmail {
            recipient_name: "Jo".to_string(),
            subject: "Audit next week".to_string(),
            body: "Please update your trainer matrix.".to_string(),
        })
    }

    fn jo() -> Recipient {
        Recipient::new("jo@college.edu.au", "Jo Smith")
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let pool = test_pool().await;
        let provider = MockEmailProvider::new();
        provider.fail_next(2);
        let service = service(&pool, Arc::new(provider.clone()), RateLimitConfig::default());

        let log = service.send_template(&jo(), &notice()).await.unwrap();
        assert_eq!(log.status, EmailStatus::Sent);
        assert_eq!(log.attempts, 3);
        assert_eq!(provider.sent().await.len(), 1);

        let stored = create_email_log_repository(&pool)
            .get(log.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, EmailStatus::Sent);
        assert_eq!(stored.attempts, 3);
        assert!(stored.sent_at.is_some());
        assert_eq!(stored.template, "general_notice");
        assert_eq!(stored.subject, "Audit next week");
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let pool = test_pool().await;
        let provider = MockEmailProvider::new();
        provider.fail_next(5);
        let service = service(&pool, Arc::new(provider.clone()), RateLimitConfig::default());

        let err = service.send_template(&jo(), &notice()).await.unwrap_err();
        assert!(matches!(err, EmailError::Provider(_)));
        assert_eq!(provider.attempts(), 3);

        let logs = create_email_log_repository(&pool)
            .list(&EmailLogFilter::default(), &Pagination::default())
            .await
            .unwrap();
        assert_eq!(logs.items[0].status, EmailStatus::Failed);
        assert_eq!(logs.items[0].attempts, 3);
        assert!(logs.items[0].error.as_deref().unwrap().contains("mock transient"));
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let pool = test_pool().await;
        let provider = MockEmailProvider::new();
        provider.fail_permanently();
        let service = service(&pool, Arc::new(provider.clone()), RateLimitConfig::default());

        assert!(service.send_template(&jo(), &notice()).await.is_err());
        assert_eq!(provider.attempts(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_send_is_logged() {
        let pool = test_pool().await;
        let provider = MockEmailProvider::new();
        let limits = RateLimitConfig {
            max_per_window: 100,
            max_per_recipient: 1,
            window_secs: 60,
        };
        let service = service(&pool, Arc::new(provider.clone()), limits);

        service.send_template(&jo(), &notice()).await.unwrap();
        let err = service.send_template(&jo(), &notice()).await.unwrap_err();
        assert!(matches!(err, EmailError::RateLimited(_)));
        assert_eq!(provider.attempts(), 1);

        let failed = create_email_log_repository(&pool)
            .list(
                &EmailLogFilter {
                    status: Some(EmailStatus::Failed),
                    ..Default::default()
                },
                &Pagination::default(),
            )
            .await
            .unwrap();
        assert_eq!(failed.total, 1);
        assert!(failed.items[0].error.as_deref().unwrap().contains("Rate limit"));
    }

    #[tokio::test]
    async fn test_invalid_address_is_rejected_before_logging() {
        let pool = test_pool().await;
        let service = service(
            &pool,
            Arc::new(MockEmailProvider::new()),
            RateLimitConfig::default(),
        );

        let err = service
            .send_template(&Recipient::new("nobody", "Nobody"), &notice())
            .await
            .unwrap_err();
        assert!(matches!(err, EmailError::InvalidAddress(_)));
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(200));
        assert_eq!(policy.delay_after(2), Duration::from_millis(400));
    }
}
