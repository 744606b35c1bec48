//! Startup validation of the `rto` configuration.
//!
//! Errors block `serve`; warnings are printed and the server starts anyway.

use colored::Colorize;
use rto_api::auth::MIN_SECRET_LEN;
use rto_notify::ProviderKind;

use crate::config::{AppConfig, JWT_SECRET_ENV};

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Critical errors that prevent startup.
    pub errors: Vec<String>,
    /// Warnings that should be addressed but don't prevent startup.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Prints the validation result to the console.
    pub fn print(&self) {
        if !self.warnings.is_empty() {
            println!();
            println!("{}", "Configuration Warnings:".yellow().bold());
            for warning in &self.warnings {
                println!("  {} {}", "⚠".yellow(), warning);
            }
        }

        if !self.errors.is_empty() {
            println!();
            println!("{}", "Configuration Errors:".red().bold());
            for error in &self.errors {
                println!("  {} {}", "✗".red(), error);
            }
        }

        if self.errors.is_empty() && self.warnings.is_empty() {
            println!("  {} Configuration OK", "✓".green());
        }
    }
}

/// Validates application configuration before startup.
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &AppConfig) -> ValidationResult {
        let mut result = ValidationResult::new();

        Self::validate_jwt(config, &mut result);
        Self::validate_server(config, &mut result);
        Self::validate_database_url(config, &mut result);
        Self::validate_email(config, &mut result);
        Self::validate_integrations(config, &mut result);

        result
    }

    fn validate_jwt(config: &AppConfig, result: &mut ValidationResult) {
        let auth = &config.auth;
        if auth.jwt_secret.is_empty() {
            result.add_error(format!(
                "Missing required config: auth.jwt_secret. Set it in the config file or \
                 through {}. Generate one with: openssl rand -base64 48",
                JWT_SECRET_ENV
            ));
        } else if auth.jwt_secret.len() < MIN_SECRET_LEN {
            result.add_error(format!(
                "auth.jwt_secret must be at least {} bytes, got {}",
                MIN_SECRET_LEN,
                auth.jwt_secret.len()
            ));
        }

        if auth.access_token_minutes <= 0 {
            result.add_error("auth.access_token_minutes must be positive");
        }
        if auth.refresh_token_days <= 0 {
            result.add_error("auth.refresh_token_days must be positive");
        }
        if auth.refresh_token_days * 24 * 60 <= auth.access_token_minutes {
            result.add_warning("Refresh tokens expire before access tokens");
        }
        if auth.login_per_ip == 0 || auth.login_global == 0 || auth.login_window_secs == 0 {
            result.add_error("auth login limits and window must be greater than zero");
        } else if auth.login_per_ip > auth.login_global {
            result.add_warning(format!(
                "auth.login_per_ip ({}) exceeds auth.login_global ({})",
                auth.login_per_ip, auth.login_global
            ));
        }
    }

    fn validate_server(config: &AppConfig, result: &mut ValidationResult) {
        let server = &config.server;
        if format!("{}:{}", server.host, server.port)
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            result.add_error(format!(
                "server.host '{}' is not a valid IP address",
                server.host
            ));
        }
        if server.request_timeout_secs == 0 {
            result.add_error("server.request_timeout_secs must be greater than zero");
        }
        if server.cors_origins.is_empty() {
            result.add_warning("server.cors_origins is empty; any origin may call the API");
        }
        for origin in &server.cors_origins {
            if !origin.starts_with("http://") && !origin.starts_with("https://") {
                result.add_error(format!(
                    "server.cors_origins entry '{}' must start with http:// or https://",
                    origin
                ));
            }
        }
    }

    fn validate_database_url(config: &AppConfig, result: &mut ValidationResult) {
        let url = &config.database.url;
        if url.is_empty() {
            result.add_error("Missing required config: database.url");
        } else if !url.starts_with("sqlite:") {
            result.add_error(format!(
                "database.url '{}' is not supported. Only sqlite: URLs are accepted",
                url
            ));
        } else if url.contains("mode=memory") {
            result.add_warning("database.url is in-memory; data is lost on shutdown");
        }
    }

    fn validate_email(config: &AppConfig, result: &mut ValidationResult) {
        let email = &config.email;
        for problem in email.validate() {
            result.add_error(problem);
        }

        match email.provider {
            ProviderKind::Disabled => {
                if email.digest.enabled {
                    result.add_warning(
                        "email.digest.enabled has no effect while email.provider is disabled",
                    );
                }
            }
            ProviderKind::Mock => {
                result.add_warning("email.provider is mock; no email leaves this process");
            }
            ProviderKind::Smtp | ProviderKind::Sendgrid => {}
        }
    }

    fn validate_integrations(config: &AppConfig, result: &mut ValidationResult) {
        let integrations = &config.integrations;

        if let Some(drive) = &integrations.google_drive {
            for problem in drive.validate() {
                result.add_error(format!("integrations.{}", problem));
            }
        }
        if let Some(xero) = &integrations.xero {
            for problem in xero.validate() {
                result.add_error(format!("integrations.{}", problem));
            }
        }
        if let Some(accelerate) = &integrations.accelerate {
            for problem in accelerate.validate() {
                result.add_error(format!("integrations.{}", problem));
            }
        }
    }
}
