//! # rto-core
//!
//! Core domain for the RTO compliance platform: users and roles, the
//! compliance register records, date-derived statuses and the SQLite
//! persistence layer that the API and CLI build on.

pub mod auth;
pub mod db;
pub mod models;
pub mod status;

pub use auth::{CurrentUser, Permission, Role, User};
pub use status::{CredentialStatus, PdStatus, ReviewStatus, DUE_SOON_WINDOW_DAYS};
