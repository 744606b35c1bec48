//! Configuration loading for the `rto` CLI.

use anyhow::{Context, Result};
use rto_api::auth::JwtConfig;
use rto_api::rate_limit::{
    DEFAULT_LOGIN_RATE_GLOBAL, DEFAULT_LOGIN_RATE_PER_IP, DEFAULT_RATE_LIMIT_WINDOW_SECS,
};
use rto_api::LoginRateLimiter;
use rto_integrations::{AccelerateConfig, GoogleDriveConfig, XeroConfig};
use rto_notify::EmailConfig;
use rto_observability::{LoggingConfig, REDACTED};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Overrides `auth.jwt_secret`.
pub const JWT_SECRET_ENV: &str = "RTO_JWT_SECRET";
/// Overrides `database.url`.
pub const DATABASE_URL_ENV: &str = "RTO_DATABASE_URL";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub auth: AuthSettings,

    #[serde(default)]
    pub email: EmailConfig,

    #[serde(default)]
    pub integrations: IntegrationSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl AppConfig {
    /// Loads configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Applies `RTO_JWT_SECRET` and `RTO_DATABASE_URL`. Runs after CLI flags
    /// so the environment wins over both.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secret) = lookup(JWT_SECRET_ENV).filter(|v| !v.is_empty()) {
            self.auth.jwt_secret = secret;
        }
        if let Some(url) = lookup(DATABASE_URL_ENV).filter(|v| !v.is_empty()) {
            self.database.url = url;
        }
    }

    /// Creates a copy with secrets redacted.
    pub fn redact_secrets(&self) -> Self {
        let mut config = self.clone();

        redact(&mut config.auth.jwt_secret);
        if let Some(password) = config.email.smtp.password.as_mut() {
            redact(password);
        }
        if let Some(key) = config.email.sendgrid_api_key.as_mut() {
            redact(key);
        }

        let integrations = &mut config.integrations;
        if let Some(drive) = integrations.google_drive.as_mut() {
            redact(&mut drive.client_secret);
        }
        if let Some(xero) = integrations.xero.as_mut() {
            redact(&mut xero.access_token);
        }
        if let Some(accelerate) = integrations.accelerate.as_mut() {
            redact(&mut accelerate.api_token);
        }

        config
    }

    pub fn jwt_config(&self) -> JwtConfig {
        let auth = &self.auth;
        JwtConfig {
            secret: auth.jwt_secret.clone(),
            issuer: auth.issuer.clone(),
            audience: auth.audience.clone(),
            access_ttl: chrono::Duration::minutes(auth.access_token_minutes),
            refresh_ttl: chrono::Duration::days(auth.refresh_token_days),
        }
    }

    pub fn login_limiter(&self) -> LoginRateLimiter {
        LoginRateLimiter::with_config(
            self.auth.login_per_ip,
            self.auth.login_global,
            Duration::from_secs(self.auth.login_window_secs),
        )
    }

    pub fn logging_config(&self, verbose: bool) -> LoggingConfig {
        let base = if self.logging.json {
            LoggingConfig::production()
        } else {
            LoggingConfig::default()
        };
        if verbose {
            base.with_level_name("debug")
        } else {
            base.with_level_name(&self.logging.level)
        }
    }
}

fn redact(value: &mut String) {
    if !value.is_empty() {
        *value = REDACTED.to_string();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub swagger: bool,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            swagger: true,
            request_timeout_secs: default_request_timeout(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_url")]
    pub url: String,
}

fn default_database_url() -> String {
    "sqlite://rto-compliance.db?mode=rwc".to_string()
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

/// Token signing and login throttling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    #[serde(default)]
    pub jwt_secret: String,

    #[serde(default = "default_issuer")]
    pub issuer: String,

    #[serde(default = "default_audience")]
    pub audience: String,

    #[serde(default = "default_access_minutes")]
    pub access_token_minutes: i64,

    #[serde(default = "default_refresh_days")]
    pub refresh_token_days: i64,

    /// Login attempts per client IP per window.
    #[serde(default = "default_login_per_ip")]
    pub login_per_ip: u32,

    /// Login attempts across all clients per window.
    #[serde(default = "default_login_global")]
    pub login_global: u32,

    #[serde(default = "default_login_window")]
    pub login_window_secs: u64,
}

fn default_issuer() -> String {
    "rto-compliance".to_string()
}

fn default_audience() -> String {
    "rto-compliance-api".to_string()
}

fn default_access_minutes() -> i64 {
    15
}

fn default_refresh_days() -> i64 {
    7
}

fn default_login_per_ip() -> u32 {
    DEFAULT_LOGIN_RATE_PER_IP
}

fn default_login_global() -> u32 {
    DEFAULT_LOGIN_RATE_GLOBAL
}

fn default_login_window() -> u64 {
    DEFAULT_RATE_LIMIT_WINDOW_SECS
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: default_issuer(),
            audience: default_audience(),
            access_token_minutes: default_access_minutes(),
            refresh_token_days: default_refresh_days(),
            login_per_ip: default_login_per_ip(),
            login_global: default_login_global(),
            login_window_secs: default_login_window(),
        }
    }
}

/// External systems. A missing section leaves that integration disabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrationSettings {
    #[serde(default)]
    pub google_drive: Option<GoogleDriveConfig>,

    #[serde(default)]
    pub xero: Option<XeroConfig>,

    #[serde(default)]
    pub accelerate: Option<AccelerateConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
