use thiserror::Error;

/// Errors that can occur when talking to a third-party service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntegrationError {
    #[error("Integration not configured: {0}")]
    NotConfigured(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

/// Result type for integration operations.
pub type IntegrationResult<T> = Result<T, IntegrationError>;

impl From<reqwest::Error> for IntegrationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            IntegrationError::Timeout(e.to_string())
        } else if e.is_connect() || e.is_request() {
            IntegrationError::Network(e.to_string())
        } else if e.is_decode() {
            IntegrationError::InvalidResponse(e.to_string())
        } else {
            IntegrationError::RequestFailed(e.to_string())
        }
    }
}
