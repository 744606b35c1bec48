//! Authentication and authorization for the API.
//!
//! - JWT access tokens and hashed refresh tokens
//! - Extractors resolving the current user and checking permissions
//! - One-time OAuth `state` tokens for the Google Drive consent flow

pub mod extractors;
pub mod jwt;
pub mod oauth_state;

#[cfg(test)]
pub mod test_helpers;

pub use extractors::{
    bearer_token, load_current_user, require_owner_or, require_permission, AuthenticatedUser,
};
pub use jwt::{
    hash_refresh_token, Claims, IssuedRefreshToken, JwtConfig, JwtError, JwtManager, MIN_SECRET_LEN,
};
pub use oauth_state::OAuthStateStore;
