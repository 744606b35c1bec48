//! Retries for transient database failures.
//!
//! SQLite reports lock contention as "database is locked" or "busy". Those,
//! together with pool exhaustion and dropped connections, are retried with
//! exponential backoff. Everything else fails immediately.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::DbError;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Adds up to 25% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);
        let delay = if self.jitter {
            capped * (1.0 + rand::thread_rng().gen_range(0.0..0.25))
        } else {
            capped
        };
        Duration::from_millis(delay as u64)
    }
}

/// Whether retrying `error` could succeed.
pub fn is_transient_error(error: &DbError) -> bool {
    let mentions = |msg: &str, needles: &[&str]| {
        let lower = msg.to_lowercase();
        needles.iter().any(|n| lower.contains(n))
    };

    match error {
        DbError::PoolExhausted => true,
        DbError::Connection(msg) => mentions(
            msg,
            &["timeout", "connection refused", "connection reset", "broken pipe"],
        ),
        DbError::Transaction(msg) | DbError::Query(msg) => {
            mentions(msg, &["database is locked", "busy", "timeout"])
        }
        DbError::NotFound { .. }
        | DbError::Constraint(_)
        | DbError::Serialization(_)
        | DbError::Migration(_)
        | DbError::Configuration(_) => false,
    }
}

/// Runs `f`, retrying transient failures according to `config`.
pub async fn with_retry<F, Fut, T>(config: RetryConfig, operation: &str, f: F) -> Result<T, DbError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(operation, attempt = attempt + 1, "Database operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt < config.max_retries && is_transient_error(&e) => {
                let delay = config.delay_for(attempt);
                warn!(
                    operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient database error, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if attempt > 0 {
                    warn!(operation, attempts = attempt + 1, error = %e, "Database operation failed after retries");
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient_error(&DbError::PoolExhausted));
        assert!(is_transient_error(&DbError::Query("database is locked".into())));
        assert!(!is_transient_error(&DbError::Constraint("UNIQUE".into())));
        assert!(!is_transient_error(&DbError::not_found("Policy", "x")));
    }

    #[test]
    fn test_delay_is_capped() {
        let config = RetryConfig {
            jitter: false,
            ..RetryConfig::default()
        };
        assert_eq!(config.delay_for(0), Duration::from_millis(100));
        assert_eq!(config.delay_for(2), Duration::from_millis(400));
        assert_eq!(config.delay_for(20), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = with_retry(fast(), "flaky", || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(DbError::PoolExhausted)
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), _> = with_retry(fast(), "dup", || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DbError::Constraint("duplicate".into()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), _> = with_retry(fast(), "down", || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DbError::PoolExhausted)
            }
        })
        .await;

        assert!(matches!(result, Err(DbError::PoolExhausted)));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
