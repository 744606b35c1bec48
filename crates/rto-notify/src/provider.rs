//! The provider seam between the email service and delivery backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EmailError;

/// A rendered plain-text message ready to hand to a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            to_name: None,
            subject: subject.into(),
            body: body.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.to_name = Some(name.into());
        self
    }
}

/// Sender identity shared by every provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub address: String,
    pub name: String,
}

/// A backend able to deliver one message at a time.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Short name recorded in the email log.
    fn name(&self) -> &str;

    /// Delivers the message and returns the provider's message id.
    async fn send(&self, message: &EmailMessage) -> Result<String, EmailError>;
}
