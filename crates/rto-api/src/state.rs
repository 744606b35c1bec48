//! Application state shared across handlers.

use rto_core::db::DbPool;
use rto_integrations::{AssetSource, CourseSource, DriveApi};
use rto_notify::EmailService;
use std::sync::Arc;

use crate::auth::{JwtConfig, JwtManager, OAuthStateStore};
use crate::rate_limit::LoginRateLimiter;

/// Shared application state.
///
/// Optional collaborators are `None` when not configured; the handlers that
/// need them answer 503.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub jwt: Arc<JwtManager>,
    pub login_limiter: LoginRateLimiter,
    /// Pending Google Drive consent round trips.
    pub oauth_states: OAuthStateStore,
    pub email: Option<Arc<EmailService>>,
    pub drive: Option<Arc<dyn DriveApi>>,
    pub xero: Option<Arc<dyn AssetSource>>,
    pub accelerate: Option<Arc<dyn CourseSource>>,
}

impl AppState {
    pub fn new(db: DbPool, jwt: JwtConfig) -> Self {
        Self {
            db: Arc::new(db),
            jwt: Arc::new(JwtManager::new(jwt)),
            login_limiter: LoginRateLimiter::new(),
            oauth_states: OAuthStateStore::new(),
            email: None,
            drive: None,
            xero: None,
            accelerate: None,
        }
    }

    pub fn with_login_limiter(mut self, limiter: LoginRateLimiter) -> Self {
        self.login_limiter = limiter;
        self
    }

    pub fn with_email(mut self, service: Arc<EmailService>) -> Self {
        self.email = Some(service);
        self
    }

    pub fn with_drive(mut self, drive: Arc<dyn DriveApi>) -> Self {
        self.drive = Some(drive);
        self
    }

    pub fn with_xero(mut self, source: Arc<dyn AssetSource>) -> Self {
        self.xero = Some(source);
        self
    }

    pub fn with_accelerate(mut self, source: Arc<dyn CourseSource>) -> Self {
        self.accelerate = Some(source);
        self
    }
}
