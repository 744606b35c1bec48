//! In-memory provider for tests and the `mock` email setting.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::error::EmailError;
use crate::provider::{EmailMessage, EmailProvider};

/// Records every message it is asked to send.
///
/// `fail_next(n)` makes the next `n` sends fail with a transient provider
/// error; `fail_permanently()` makes every send fail with a rejection.
#[derive(Clone, Default)]
pub struct MockEmailProvider {
    sent: Arc<RwLock<Vec<EmailMessage>>>,
    attempts: Arc<AtomicU32>,
    failures_remaining: Arc<AtomicU32>,
    reject_all: Arc<AtomicBool>,
}

impl MockEmailProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn fail_permanently(&self) {
        self.reject_all.store(true, Ordering::SeqCst);
    }

    /// Messages delivered successfully.
    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.read().await.clone()
    }

    /// All calls to `send`, successful or not.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmailProvider for MockEmailProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, message: &EmailMessage) -> Result<String, EmailError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.reject_all.load(Ordering::SeqCst) {
            return Err(EmailError::Rejected("mock rejection".to_string()));
        }

        let injected = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(EmailError::Provider("mock transient failure".to_string()));
        }

        info!(to = %message.to, subject = %message.subject, "Mock email sent");
        self.sent.write().await.push(message.clone());
        Ok(format!("mock-{}", Uuid::new_v4()))
    }
}
