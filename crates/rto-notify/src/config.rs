//! Email configuration and provider construction.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::EmailError;
use crate::limiter::RateLimitConfig;
use crate::mock::MockEmailProvider;
use crate::provider::{EmailProvider, Sender};
use crate::sendgrid::{SendGridProvider, DEFAULT_SENDGRID_URL};
use crate::smtp::SmtpProvider;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Smtp,
    Sendgrid,
    Mock,
    #[default]
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpSettings {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_true")]
    pub starttls: bool,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_smtp_port(),
            username: None,
            password: None,
            starttls: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_digest_hours")]
    pub interval_hours: u64,
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: default_digest_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_from_address")]
    pub from_address: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    #[serde(default)]
    pub smtp: SmtpSettings,
    #[serde(default)]
    pub sendgrid_api_key: Option<String>,
    #[serde(default = "default_sendgrid_url")]
    pub sendgrid_base_url: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub digest: DigestSettings,
    /// Base URL of the dashboard, used for links in email bodies.
    #[serde(default = "default_app_url")]
    pub app_url: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Disabled,
            from_address: default_from_address(),
            from_name: default_from_name(),
            smtp: SmtpSettings::default(),
            sendgrid_api_key: None,
            sendgrid_base_url: default_sendgrid_url(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_delay_ms(),
            rate_limit: RateLimitConfig::default(),
            digest: DigestSettings::default(),
            app_url: default_app_url(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

fn default_digest_hours() -> u64 {
    24
}

fn default_from_address() -> String {
    "noreply@localhost".to_string()
}

fn default_from_name() -> String {
    "RTO Compliance".to_string()
}

fn default_sendgrid_url() -> String {
    DEFAULT_SENDGRID_URL.to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_app_url() -> String {
    "http://localhost:3000".to_string()
}

impl EmailConfig {
    pub fn sender(&self) -> Sender {
        Sender {
            address: self.from_address.clone(),
            name: self.from_name.clone(),
        }
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn digest_interval(&self) -> Duration {
        Duration::from_secs(self.digest.interval_hours.max(1) * 3600)
    }

    /// Returns one message per problem; an empty list means the settings are
    /// complete for the selected provider.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.provider != ProviderKind::Disabled
            && self.from_address.parse::<lettre::Address>().is_err()
        {
            problems.push(format!("email.from_address '{}' is not valid", self.from_address));
        }

        match self.provider {
            ProviderKind::Smtp => {
                if self.smtp.host.trim().is_empty() {
                    problems.push("email.smtp.host is required for the smtp provider".to_string());
                }
                if self.smtp.username.is_some() != self.smtp.password.is_some() {
                    problems.push(
                        "email.smtp.username and email.smtp.password must be set together"
                            .to_string(),
                    );
                }
            }
            ProviderKind::Sendgrid => {
                if self.sendgrid_api_key.as_deref().unwrap_or("").is_empty() {
                    problems.push(
                        "email.sendgrid_api_key is required for the sendgrid provider".to_string(),
                    );
                }
            }
            ProviderKind::Mock | ProviderKind::Disabled => {}
        }

        if self.max_attempts == 0 {
            problems.push("email.max_attempts must be at least 1".to_string());
        }

        problems
    }

    /// Builds the configured provider, or `None` when email is disabled.
    pub fn build_provider(&self) -> Result<Option<Arc<dyn EmailProvider>>, EmailError> {
        let provider: Arc<dyn EmailProvider> = match self.provider {
            ProviderKind::Disabled => return Ok(None),
            ProviderKind::Mock => Arc::new(MockEmailProvider::new()),
            ProviderKind::Smtp => Arc::new(SmtpProvider::new(&self.smtp, &self.sender())?),
            ProviderKind::Sendgrid => {
                let key = self.sendgrid_api_key.clone().ok_or_else(|| {
                    EmailError::Configuration("SendGrid API key is not set".to_string())
                })?;
                Arc::new(SendGridProvider::new(
                    key,
                    self.sendgrid_base_url.clone(),
                    self.sender(),
                )?)
            }
        };
        Ok(Some(provider))
    }
}
