//! Database layer for the compliance platform.
//!
//! Persistence goes through SQLx on SQLite. Each aggregate has an
//! `#[async_trait]` repository trait, a `Sqlite*Repository` implementation and
//! a `create_*_repository` factory returning a boxed trait object.

mod error;
mod filters;
mod pagination;
mod pool;
pub mod retry;
mod rows;
mod schema;

pub mod asset_repo;
pub mod audit_repo;
pub mod complaint_repo;
pub mod credential_repo;
pub mod drive_repo;
pub mod email_log_repo;
pub mod feedback_repo;
pub mod onboarding_repo;
pub mod pd_repo;
pub mod policy_repo;
pub mod role_repo;
pub mod seed;
pub mod standard_repo;
pub mod token_repo;
pub mod training_repo;
pub mod user_repo;

pub use error::DbError;
pub use pagination::{PaginatedResult, Pagination, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use pool::{
    create_pool, create_pool_with_options, escape_like_pattern, make_like_pattern, DbPool,
    PoolOptions,
};
pub use retry::{is_transient_error, with_retry, RetryConfig};
pub use schema::run_migrations;

// Repository traits
pub use asset_repo::AssetRepository;
pub use audit_repo::AuditLogRepository;
pub use complaint_repo::ComplaintRepository;
pub use credential_repo::CredentialRepository;
pub use drive_repo::DriveRepository;
pub use email_log_repo::EmailLogRepository;
pub use feedback_repo::FeedbackRepository;
pub use onboarding_repo::OnboardingRepository;
pub use pd_repo::PdItemRepository;
pub use policy_repo::{NewPolicyVersion, PolicyRepository};
pub use role_repo::RoleRepository;
pub use standard_repo::StandardRepository;
pub use token_repo::RefreshTokenRepository;
pub use training_repo::{SopRepository, TrainingProductRepository};
pub use user_repo::{RoleUsage, UserRepository};

// Factory functions
pub use asset_repo::create_asset_repository;
pub use audit_repo::create_audit_log_repository;
pub use complaint_repo::create_complaint_repository;
pub use credential_repo::create_credential_repository;
pub use drive_repo::create_drive_repository;
pub use email_log_repo::create_email_log_repository;
pub use feedback_repo::create_feedback_repository;
pub use onboarding_repo::create_onboarding_repository;
pub use pd_repo::create_pd_item_repository;
pub use policy_repo::create_policy_repository;
pub use role_repo::create_role_repository;
pub use standard_repo::create_standard_repository;
pub use token_repo::create_refresh_token_repository;
pub use training_repo::{create_sop_repository, create_training_product_repository};
pub use user_repo::create_user_repository;

pub use seed::{ensure_admin_user, ensure_default_roles, SeedError, DEFAULT_ADMIN_EMAIL};
