//! Integration test modules.

pub mod audit_tests;
pub mod auth_tests;
pub mod body_limit_tests;
pub mod common;
pub mod compliance_workflow_tests;
pub mod health_tests;
