//! # rto-observability
//!
//! Logging, metrics and redaction shared by the RTO compliance crates.
//!
//! Logging goes through `tracing` with an `EnvFilter`; `RUST_LOG` always wins
//! over the configured level. Metric names are described once at startup so
//! any installed `metrics` recorder can expose them with help text.

pub mod logging;
pub mod metrics;
pub mod redact;

pub use logging::{init_logging_with_config, LoggingConfig};
pub use self::metrics::{
    register_metrics, DB_POOL_IDLE, DB_POOL_SIZE, EMAILS_FAILED_TOTAL, EMAILS_SENT_TOTAL,
    HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION, INTEGRATION_SYNC_TOTAL, LOGIN_RATE_LIMIT_ALLOWED,
    LOGIN_RATE_LIMIT_REJECTED, LOGIN_RATE_LIMIT_TRACKED_IPS,
};
pub use redact::{is_sensitive_key, redact_json, REDACTED};
