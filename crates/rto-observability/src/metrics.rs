//! Metric names and descriptions.
//!
//! Call sites use the `metrics` macros directly with these names; this module
//! only registers help text so a recorder can expose it.

use metrics::{describe_counter, describe_gauge, describe_histogram};

pub const HTTP_REQUESTS_TOTAL: &str = "rto_http_requests_total";
pub const HTTP_REQUEST_DURATION: &str = "rto_http_request_duration_seconds";
pub const EMAILS_SENT_TOTAL: &str = "rto_emails_sent_total";
pub const EMAILS_FAILED_TOTAL: &str = "rto_emails_failed_total";
pub const LOGIN_RATE_LIMIT_ALLOWED: &str = "rto_login_rate_limit_allowed_total";
pub const LOGIN_RATE_LIMIT_REJECTED: &str = "rto_login_rate_limit_rejected_total";
pub const LOGIN_RATE_LIMIT_TRACKED_IPS: &str = "rto_login_rate_limit_tracked_ips";
pub const INTEGRATION_SYNC_TOTAL: &str = "rto_integration_sync_total";
pub const DB_POOL_SIZE: &str = "rto_db_pool_size";
pub const DB_POOL_IDLE: &str = "rto_db_pool_idle";

/// Registers descriptions for every metric the platform emits.
pub fn register_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests by method and status");
    describe_histogram!(HTTP_REQUEST_DURATION, "HTTP request latency");

    describe_counter!(EMAILS_SENT_TOTAL, "Emails delivered by the provider");
    describe_counter!(EMAILS_FAILED_TOTAL, "Emails that failed after all retries");

    describe_counter!(LOGIN_RATE_LIMIT_ALLOWED, "Login attempts allowed by the rate limiter");
    describe_counter!(
        LOGIN_RATE_LIMIT_REJECTED,
        "Login attempts rejected by the rate limiter"
    );
    describe_gauge!(
        LOGIN_RATE_LIMIT_TRACKED_IPS,
        "Client IPs currently tracked by the login limiter"
    );

    describe_counter!(INTEGRATION_SYNC_TOTAL, "Integration sync runs by source and outcome");

    describe_gauge!(DB_POOL_SIZE, "Connections in the database pool");
    describe_gauge!(DB_POOL_IDLE, "Idle connections in the database pool");
}
