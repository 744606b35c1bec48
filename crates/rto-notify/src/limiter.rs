//! Fixed-window send limits, global and per recipient.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::EmailError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_per_window")]
    pub max_per_window: u32,
    #[serde(default = "default_max_per_recipient")]
    pub max_per_recipient: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_per_window: default_max_per_window(),
            max_per_recipient: default_max_per_recipient(),
            window_secs: default_window_secs(),
        }
    }
}

fn default_max_per_window() -> u32 {
    100
}

fn default_max_per_recipient() -> u32 {
    10
}

fn default_window_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

impl Window {
    fn new(now: Instant) -> Self {
        Self { started: now, count: 0 }
    }

    fn expired(&self, now: Instant, length: Duration) -> bool {
        now.duration_since(self.started) >= length
    }
}

struct LimiterState {
    global: Window,
    recipients: HashMap<String, Window>,
}

/// Counts sends in fixed windows. A window resets once its length has elapsed
/// since the first send counted in it.
pub struct EmailRateLimiter {
    config: RateLimitConfig,
    state: Mutex<LimiterState>,
}

impl EmailRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LimiterState {
                global: Window::new(Instant::now()),
                recipients: HashMap::new(),
            }),
        }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.config.window_secs)
    }

    /// Counts a send to `recipient`, or fails without counting it when either
    /// limit is already reached.
    pub async fn check(&self, recipient: &str) -> Result<(), EmailError> {
        let now = Instant::now();
        let window = self.window();
        let key = recipient.to_ascii_lowercase();
        let mut state = self.state.lock().await;

        if state.global.expired(now, window) {
            state.global = Window::new(now);
            state.recipients.retain(|_, w| !w.expired(now, window));
        }

        if state.global.count >= self.config.max_per_window {
            return Err(EmailError::RateLimited(format!(
                "global limit of {} emails per {}s reached",
                self.config.max_per_window, self.config.window_secs
            )));
        }

        let entry = state
            .recipients
            .entry(key)
            .or_insert_with(|| Window::new(now));
        if entry.expired(now, window) {
            *entry = Window::new(now);
        }
        if entry.count >= self.config.max_per_recipient {
            return Err(EmailError::RateLimited(format!(
                "limit of {} emails per {}s reached for {}",
                self.config.max_per_recipient, self.config.window_secs, recipient
            )));
        }

        entry.count += 1;
        state.global.count += 1;
        Ok(())
    }

    /// Recipients with a live window.
    pub async fn tracked_recipients(&self) -> usize {
        self.state.lock().await.recipients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(global: u32, per_recipient: u32) -> EmailRateLimiter {
        EmailRateLimiter::new(RateLimitConfig {
            max_per_window: global,
            max_per_recipient: per_recipient,
            window_secs: 60,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_recipient_limit() {
        let limiter = limiter(100, 2);
        limiter.check("jo@college.edu.au").await.unwrap();
        limiter.check("JO@college.edu.au").await.unwrap();

        let err = limiter.check("jo@college.edu.au").await.unwrap_err();
        assert!(matches!(err, EmailError::RateLimited(_)));

        limiter.check("sam@college.edu.au").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_limit() {
        let limiter = limiter(3, 10);
        for i in 0..3 {
            limiter.check(&format!("user{}@college.edu.au", i)).await.unwrap();
        }
        assert!(limiter.check("late@college.edu.au").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets() {
        let limiter = limiter(1, 1);
        limiter.check("jo@college.edu.au").await.unwrap();
        assert!(limiter.check("jo@college.edu.au").await.is_err());

        tokio::time::advance(Duration::from_secs(61)).await;

        limiter.check("jo@college.edu.au").await.unwrap();
        assert_eq!(limiter.tracked_recipients().await, 1);
    }
}
