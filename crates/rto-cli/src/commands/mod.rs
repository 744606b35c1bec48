//! CLI command implementations.

pub mod database;
pub mod serve;

pub use database::{cmd_migrate, cmd_seed};
pub use serve::run_server;
