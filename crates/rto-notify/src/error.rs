use rto_core::db::DbError;
use thiserror::Error;

/// Errors raised while rendering or delivering email.
#[derive(Error, Debug)]
pub enum EmailError {
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Email is not configured: {0}")]
    Configuration(String),

    /// The provider refused the message; resending will not help.
    #[error("Provider rejected message: {0}")]
    Rejected(String),

    /// A transient provider failure.
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl EmailError {
    /// Permanent errors are not retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            EmailError::InvalidAddress(_)
                | EmailError::Configuration(_)
                | EmailError::Rejected(_)
                | EmailError::Template(_)
        )
    }
}

impl From<askama::Error> for EmailError {
    fn from(err: askama::Error) -> Self {
        EmailError::Template(err.to_string())
    }
}

impl From<lettre::address::AddressError> for EmailError {
    fn from(err: lettre::address::AddressError) -> Self {
        EmailError::InvalidAddress(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_classification() {
        assert!(EmailError::InvalidAddress("x".into()).is_permanent());
        assert!(EmailError::Configuration("x".into()).is_permanent());
        assert!(EmailError::Rejected("bad sender".into()).is_permanent());
        assert!(!EmailError::Provider("503".into()).is_permanent());
        assert!(!EmailError::Network("reset".into()).is_permanent());
        assert!(!EmailError::RateLimited("global".into()).is_permanent());
    }
}
