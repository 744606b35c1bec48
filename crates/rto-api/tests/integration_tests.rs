//! End-to-end tests for the RTO compliance API.
//!
//! These run the full router with JWT authentication. Handler-level tests
//! that inject a user directly live in the crate's unit tests.

mod integration;
