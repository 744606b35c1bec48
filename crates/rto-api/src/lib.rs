//! # rto-api
//!
//! REST API server for the RTO compliance platform.
//!
//! Every resource lives under `/api/v1` behind JWT bearer authentication and
//! role-based permissions. Mutating requests are recorded in the audit log.

pub mod audit;
pub mod auth;
pub mod dto;
pub mod error;
pub mod export;
pub mod extract;
pub mod middleware;
pub mod rate_limit;
pub mod routes;
pub mod server;
pub mod state;
pub mod sync;

#[cfg(test)]
mod test_helpers;

pub use error::ApiError;
pub use rate_limit::LoginRateLimiter;
pub use server::{ApiServer, ApiServerConfig};
pub use state::AppState;
