//! Argon2id password hashing.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::Rng;
use thiserror::Error;

/// Password hashing errors.
#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashError(String),

    #[error("Failed to verify password: {0}")]
    VerifyError(String),

    #[error("Invalid password hash format")]
    InvalidHash,

    /// The password failed the strength policy.
    #[error("Password does not meet requirements: {}", .0.join("; "))]
    TooWeak(Vec<&'static str>),
}

/// Hashes a password using Argon2id and returns the PHC string.
///
/// ```
/// use rto_core::auth::password::hash_password;
///
/// let hash = hash_password("Welcome2024").unwrap();
/// assert!(hash.starts_with("$argon2id$"));
/// ```
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::HashError(e.to_string()))
}

/// Verifies a password against a stored PHC hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHash)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerifyError(e.to_string())),
    }
}

/// Checks a password against the strength policy.
///
/// Returns the list of unmet requirements, empty when the password is acceptable.
pub fn validate_password_strength(password: &str) -> Vec<&'static str> {
    let mut errors = Vec::new();

    if password.chars().count() < 8 {
        errors.push("Password must be at least 8 characters long");
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        errors.push("Password must contain at least one lowercase letter");
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        errors.push("Password must contain at least one uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain at least one digit");
    }

    errors
}

/// Validates strength and hashes in one step.
pub fn hash_new_password(password: &str) -> Result<String, PasswordError> {
    let problems = validate_password_strength(password);
    if !problems.is_empty() {
        return Err(PasswordError::TooWeak(problems));
    }
    hash_password(password)
}

/// Generates a random password that satisfies the strength policy.
///
/// Used for the bootstrap admin account and admin-initiated resets.
pub fn generate_password(len: usize) -> String {
    const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
    const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
    const DIGITS: &[u8] = b"23456789";
    const SPECIAL: &[u8] = b"!@#$%^&*";

    let len = len.max(8);
    let mut rng = rand::thread_rng();
    let mut password = Vec::with_capacity(len);

    password.push(UPPER[rng.gen_range(0..UPPER.len())]);
    password.push(LOWER[rng.gen_range(0..LOWER.len())]);
    password.push(DIGITS[rng.gen_range(0..DIGITS.len())]);
    password.push(SPECIAL[rng.gen_range(0..SPECIAL.len())]);

    let all: Vec<u8> = [UPPER, LOWER, DIGITS, SPECIAL].concat();
    while password.len() < len {
        password.push(all[rng.gen_range(0..all.len())]);
    }

    // Fisher-Yates so the guaranteed classes are not always first
    for i in (1..password.len()).rev() {
        let j = rng.gen_range(0..=i);
        password.swap(i, j);
    }

    password.into_iter().map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("SecurePass123").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("SecurePass123", &hash).unwrap());
        assert!(!verify_password("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_hash_uniqueness() {
        let hash1 = hash_password("TestPassword123").unwrap();
        let hash2 = hash_password("TestPassword123").unwrap();
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_invalid_hash() {
        assert!(matches!(
            verify_password("anything", "not-a-phc-string"),
            Err(PasswordError::InvalidHash)
        ));
    }

    #[test]
    fn test_password_strength() {
        assert!(validate_password_strength("Str0ngPass").is_empty());
        assert_eq!(validate_password_strength("short").len(), 3);
        assert!(validate_password_strength("alllowercase1")
            .contains(&"Password must contain at least one uppercase letter"));
    }

    #[test]
    fn test_hash_new_password_rejects_weak() {
        assert!(matches!(
            hash_new_password("weak"),
            Err(PasswordError::TooWeak(_))
        ));
        assert!(hash_new_password("Acceptable1").is_ok());
    }

    #[test]
    fn test_generated_password_is_strong() {
        for _ in 0..20 {
            let password = generate_password(16);
            assert_eq!(password.len(), 16);
            assert!(validate_password_strength(&password).is_empty());
        }
    }
}
