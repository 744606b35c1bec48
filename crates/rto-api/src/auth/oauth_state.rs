//! One-time `state` tokens guarding the OAuth consent round trip.

use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use subtle::ConstantTimeEq;
use uuid::Uuid;

pub const STATE_TOKEN_LEN: usize = 32;

pub const STATE_TTL_MINUTES: i64 = 10;

struct PendingState {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

/// In-memory map of outstanding state tokens.
#[derive(Clone, Default)]
pub struct OAuthStateStore {
    pending: Arc<Mutex<HashMap<String, PendingState>>>,
}

impl OAuthStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingState>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Creates a token for `user_id`, pruning expired entries first.
    pub fn issue(&self, user_id: Uuid) -> String {
        self.issue_at(user_id, Utc::now())
    }

    pub fn issue_at(&self, user_id: Uuid, now: DateTime<Utc>) -> String {
        let token = generate_state_token();
        let mut pending = self.entries();
        pending.retain(|_, state| state.expires_at > now);
        pending.insert(
            token.clone(),
            PendingState {
                user_id,
                expires_at: now + Duration::minutes(STATE_TTL_MINUTES),
            },
        );
        token
    }

    /// Consumes `token`, returning the user it was issued to when it is known
    /// and unexpired. A token can be consumed once.
    pub fn consume(&self, token: &str) -> Option<Uuid> {
        self.consume_at(token, Utc::now())
    }

    pub fn consume_at(&self, token: &str, now: DateTime<Utc>) -> Option<Uuid> {
        let mut pending = self.entries();
        let key = pending
            .keys()
            .find(|candidate| tokens_match(candidate, token))
            .cloned()?;
        let state = pending.remove(&key)?;
        (state.expires_at > now).then_some(state.user_id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn generate_state_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Constant-time comparison.
fn tokens_match(expected: &str, submitted: &str) -> bool {
    if expected.len() != submitted.len() {
        return false;
    }
    expected.as_bytes().ct_eq(submitted.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shape_and_uniqueness() {
        let store = OAuthStateStore::new();
        let a = store.issue(Uuid::new_v4());
        let b = store.issue(Uuid::new_v4());
        assert_eq!(a.len(), STATE_TOKEN_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_consumed_once() {
        let store = OAuthStateStore::new();
        let user = Uuid::new_v4();
        let token = store.issue(user);

        assert_eq!(store.consume(&token), Some(user));
        assert_eq!(store.consume(&token), None);
    }

    #[test]
    fn test_expired_token_rejected() {
        let store = OAuthStateStore::new();
        let issued = Utc::now() - Duration::minutes(STATE_TTL_MINUTES + 1);
        let token = store.issue_at(Uuid::new_v4(), issued);
        assert_eq!(store.consume(&token), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_expired_entries_pruned_on_issue() {
        let store = OAuthStateStore::new();
        let old = Utc::now() - Duration::hours(1);
        store.issue_at(Uuid::new_v4(), old);
        store.issue_at(Uuid::new_v4(), old);
        store.issue(Uuid::new_v4());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_unknown_token() {
        let store = OAuthStateStore::new();
        store.issue(Uuid::new_v4());
        assert_eq!(store.consume("not-a-real-state"), None);
        assert_eq!(store.len(), 1);
    }
}
