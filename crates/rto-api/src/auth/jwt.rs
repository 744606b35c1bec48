//! Access and refresh token issuance.
//!
//! Access tokens are short-lived HS256 JWTs. Refresh tokens are opaque random
//! strings; only their SHA-256 hash is persisted.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{distributions::Alphanumeric, Rng};
use rto_core::{Role, User};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

pub const ACCESS_TOKEN_TYPE: &str = "access";

/// Length of a refresh token in characters.
pub const REFRESH_TOKEN_LEN: usize = 64;

/// Smallest accepted HMAC secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtError {
    #[error("Token has expired")]
    Expired,

    #[error("Invalid token")]
    Invalid,

    #[error("Invalid token type")]
    WrongType,

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
            _ => JwtError::Invalid,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: "rto-compliance".to_string(),
            audience: "rto-compliance-api".to_string(),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
        }
    }
}

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// User id.
    pub sub: Uuid,
    pub email: String,
    /// Role name at issue time. Permissions are re-read on every request.
    pub role: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
    #[serde(rename = "type")]
    pub token_type: String,
}

/// A freshly generated refresh token and what to store for it.
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

pub struct JwtManager {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtManager {
    pub fn new(config: JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.audience.as_str()]);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            config,
        }
    }

    /// Access token lifetime in seconds, as reported to clients.
    pub fn access_ttl_secs(&self) -> i64 {
        self.config.access_ttl.num_seconds()
    }

    pub fn issue_access_token(&self, user: &User, role: &Role) -> Result<String, JwtError> {
        self.issue_access_token_at(user, role, Utc::now())
    }

    pub fn issue_access_token_at(
        &self,
        user: &User,
        role: &Role,
        now: DateTime<Utc>,
    ) -> Result<String, JwtError> {
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: role.name.clone(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            iat: now.timestamp(),
            exp: (now + self.config.access_ttl).timestamp(),
            jti: Uuid::new_v4(),
            token_type: ACCESS_TOKEN_TYPE.to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::Signing(e.to_string()))
    }

    /// Verifies signature, issuer, audience, expiry and token type.
    pub fn verify_access_token(&self, token: &str) -> Result<Claims, JwtError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        if data.claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(JwtError::WrongType);
        }
        Ok(data.claims)
    }

    pub fn issue_refresh_token(&self) -> IssuedRefreshToken {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(REFRESH_TOKEN_LEN)
            .map(char::from)
            .collect();

        IssuedRefreshToken {
            token_hash: hash_refresh_token(&token),
            expires_at: Utc::now() + self.config.refresh_ttl,
            token,
        }
    }
}

/// Hex SHA-256 of a refresh token, the form it is stored and looked up in.
pub fn hash_refresh_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn fixtures() -> (JwtManager, User, Role) {
        let manager = JwtManager::new(JwtConfig::new("0123456789abcdef0123456789abcdef"));
        let role = Role::new("staff", None, BTreeSet::new());
        let user = User::new("Jo@Example.com", "Jo", "Smith", "hash", role.id);
        (manager, user, role)
    }

    #[test]
    fn test_access_token_round_trip() {
        let (manager, user, role) = fixtures();
        let token = manager.issue_access_token(&user, &role).unwrap();
        let claims = manager.verify_access_token(&token).unwrap();

        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, "jo@example.com");
        assert_eq!(claims.role, "staff");
        assert_eq!(claims.token_type, ACCESS_TOKEN_TYPE);
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn test_expired_token_rejected() {
        let (manager, user, role) = fixtures();
        let issued = Utc::now() - Duration::hours(1);
        let token = manager.issue_access_token_at(&user, &role, issued).unwrap();

        let err = manager.verify_access_token(&token).unwrap_err();
        assert_eq!(err, JwtError::Expired);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let (manager, user, role) = fixtures();
        let token = manager.issue_access_token(&user, &role).unwrap();
        let other = JwtManager::new(JwtConfig::new("another-secret-another-secret-xx"));
        assert_eq!(other.verify_access_token(&token), Err(JwtError::Invalid));
    }

    #[test]
    fn test_refresh_token_shape() {
        let (manager, _, _) = fixtures();
        let issued = manager.issue_refresh_token();
        assert_eq!(issued.token.len(), REFRESH_TOKEN_LEN);
        assert!(issued.token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(issued.token_hash, hash_refresh_token(&issued.token));
        assert_eq!(issued.token_hash.len(), 64);
        assert!(issued.expires_at > Utc::now() + Duration::days(6));
    }
}
