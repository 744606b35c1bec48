//! Login rate limiting.
//!
//! Uses the governor crate to slow down password guessing. Per-IP limiters
//! live in an LRU cache so a flood of unique addresses cannot exhaust memory.

use axum::http::HeaderMap;
use governor::{
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use lru::LruCache;
use metrics::{counter, gauge};
use rto_observability::{
    LOGIN_RATE_LIMIT_ALLOWED, LOGIN_RATE_LIMIT_REJECTED, LOGIN_RATE_LIMIT_TRACKED_IPS,
};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::{NonZeroU32, NonZeroUsize},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Default per-IP login attempt limit (attempts per minute).
pub const DEFAULT_LOGIN_RATE_PER_IP: u32 = 5;

/// Default global login attempt limit (attempts per minute).
pub const DEFAULT_LOGIN_RATE_GLOBAL: u32 = 100;

pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Default maximum number of IPs tracked at once.
pub const DEFAULT_RATE_LIMIT_MAX_ENTRIES: usize = 10_000;

type IpRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Builds a limiter allowing `limit` attempts per `window`. Zero values are
/// raised to the smallest valid setting.
fn direct_limiter(limit: u32, window: Duration) -> IpRateLimiter {
    let burst = NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN);
    let period = (window / burst.get()).max(Duration::from_nanos(1));
    let quota = Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(burst);
    RateLimiter::direct(quota)
}

/// Login rate limiter with per-IP and global limits.
#[derive(Clone)]
pub struct LoginRateLimiter {
    per_ip: Arc<Mutex<LruCache<IpAddr, Arc<IpRateLimiter>>>>,
    global: Arc<IpRateLimiter>,
    per_ip_limit: u32,
    window: Duration,
    max_entries: usize,
    eviction_count: Arc<AtomicU64>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self::with_config(
            DEFAULT_LOGIN_RATE_PER_IP,
            DEFAULT_LOGIN_RATE_GLOBAL,
            Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECS),
        )
    }

    pub fn with_config(per_ip_limit: u32, global_limit: u32, window: Duration) -> Self {
        Self::with_config_and_max_entries(
            per_ip_limit,
            global_limit,
            window,
            DEFAULT_RATE_LIMIT_MAX_ENTRIES,
        )
    }

    pub fn with_config_and_max_entries(
        per_ip_limit: u32,
        global_limit: u32,
        window: Duration,
        max_entries: usize,
    ) -> Self {
        let cache_size = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);

        Self {
            per_ip: Arc::new(Mutex::new(LruCache::new(cache_size))),
            global: Arc::new(direct_limiter(global_limit, window)),
            per_ip_limit,
            window,
            max_entries: cache_size.get(),
            eviction_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Checks if a login attempt from the given IP should be allowed.
    ///
    /// The global limit is checked first so a distributed attack is slowed
    /// even when each address stays under its own limit.
    pub fn check(&self, ip: IpAddr) -> Result<(), RateLimitError> {
        if let Err(not_until) = self.global.check() {
            let retry_after = not_until.wait_time_from(DefaultClock::default().now());
            warn!(ip = %ip, "Global login rate limit exceeded");
            counter!(LOGIN_RATE_LIMIT_REJECTED, "scope" => "global").increment(1);
            return Err(RateLimitError::GlobalLimitExceeded { retry_after });
        }

        let limiter = self.get_or_create_ip_limiter(ip);

        if let Err(not_until) = limiter.check() {
            let retry_after = not_until.wait_time_from(DefaultClock::default().now());
            warn!(
                ip = %ip,
                limit = self.per_ip_limit,
                window_secs = self.window.as_secs(),
                "Per-IP login rate limit exceeded"
            );
            counter!(LOGIN_RATE_LIMIT_REJECTED, "scope" => "ip").increment(1);
            return Err(RateLimitError::PerIpLimitExceeded { retry_after });
        }

        counter!(LOGIN_RATE_LIMIT_ALLOWED).increment(1);
        Ok(())
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, LruCache<IpAddr, Arc<IpRateLimiter>>> {
        // A poisoned cache still holds valid limiters.
        self.per_ip.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn get_or_create_ip_limiter(&self, ip: IpAddr) -> Arc<IpRateLimiter> {
        let mut cache = self.cache();

        if let Some(limiter) = cache.get(&ip) {
            return limiter.clone();
        }

        let was_at_capacity = cache.len() >= self.max_entries;
        let limiter = Arc::new(direct_limiter(self.per_ip_limit, self.window));
        cache.push(ip, limiter.clone());
        gauge!(LOGIN_RATE_LIMIT_TRACKED_IPS).set(cache.len() as f64);

        if was_at_capacity {
            self.eviction_count.fetch_add(1, Ordering::Relaxed);
            debug!(
                ip = %ip,
                max_entries = self.max_entries,
                "LRU eviction occurred in login rate limiter"
            );
        }

        limiter
    }

    /// Clears rate limit state for an IP.
    pub fn clear_ip(&self, ip: IpAddr) {
        let mut cache = self.cache();
        cache.pop(&ip);
        gauge!(LOGIN_RATE_LIMIT_TRACKED_IPS).set(cache.len() as f64);
    }

    pub fn tracked_ips(&self) -> usize {
        self.cache().len()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn eviction_count(&self) -> u64 {
        self.eviction_count.load(Ordering::Relaxed)
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("Too many login attempts from this IP. Please try again later.")]
    PerIpLimitExceeded { retry_after: Duration },

    #[error("Server is experiencing high load. Please try again later.")]
    GlobalLimitExceeded { retry_after: Duration },
}

impl RateLimitError {
    /// Whole seconds until another attempt may succeed, at least 1.
    pub fn retry_after_secs(&self) -> u64 {
        let wait = match self {
            RateLimitError::PerIpLimitExceeded { retry_after }
            | RateLimitError::GlobalLimitExceeded { retry_after } => *retry_after,
        };
        let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
        secs.max(1)
    }
}

impl From<RateLimitError> for crate::error::ApiError {
    fn from(err: RateLimitError) -> Self {
        crate::error::ApiError::RateLimitExceeded {
            retry_after_secs: err.retry_after_secs(),
        }
    }
}

/// Resolves the client address: `X-Forwarded-For`, then `X-Real-IP`, then
/// the socket peer, then loopback.
pub fn extract_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> IpAddr {
    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok())
    {
        return ip;
    }

    if let Some(ip) = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
    {
        return ip;
    }

    peer.map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn test_per_ip_limit_blocks_after_burst() {
        let limiter = LoginRateLimiter::with_config(3, 100, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(limiter.check(ip(1)).is_ok());
        }
        let err = limiter.check(ip(1)).unwrap_err();
        assert!(matches!(err, RateLimitError::PerIpLimitExceeded { .. }));
        assert!(err.retry_after_secs() >= 1);
    }

    #[test]
    fn test_ips_are_independent() {
        let limiter = LoginRateLimiter::with_config(1, 100, Duration::from_secs(60));
        assert!(limiter.check(ip(1)).is_ok());
        assert!(limiter.check(ip(1)).is_err());
        assert!(limiter.check(ip(2)).is_ok());
    }

    #[test]
    fn test_global_limit() {
        let limiter = LoginRateLimiter::with_config(10, 2, Duration::from_secs(60));
        assert!(limiter.check(ip(1)).is_ok());
        assert!(limiter.check(ip(2)).is_ok());
        assert!(matches!(
            limiter.check(ip(3)),
            Err(RateLimitError::GlobalLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_lru_eviction_bounds_memory() {
        let limiter =
            LoginRateLimiter::with_config_and_max_entries(5, 1000, Duration::from_secs(60), 2);
        limiter.check(ip(1)).unwrap();
        limiter.check(ip(2)).unwrap();
        limiter.check(ip(3)).unwrap();
        assert_eq!(limiter.tracked_ips(), 2);
        assert_eq!(limiter.eviction_count(), 1);
    }

    #[test]
    fn test_clear_ip_unblocks() {
        let limiter = LoginRateLimiter::with_config(1, 100, Duration::from_secs(60));
        limiter.check(ip(1)).unwrap();
        assert!(limiter.check(ip(1)).is_err());
        limiter.clear_ip(ip(1));
        assert!(limiter.check(ip(1)).is_ok());
    }

    #[test]
    fn test_extract_client_ip_order() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "192.168.1.9:5000".parse().unwrap();
        assert_eq!(extract_client_ip(&headers, Some(peer)), peer.ip());
        assert_eq!(
            extract_client_ip(&headers, None),
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        );

        headers.insert("x-real-ip", HeaderValue::from_static("10.1.1.1"));
        assert_eq!(extract_client_ip(&headers, Some(peer)), ip_str("10.1.1.1"));

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(extract_client_ip(&headers, Some(peer)), ip_str("203.0.113.7"));
    }

    fn ip_str(s: &str) -> IpAddr {
        s.parse().unwrap()
    }
}
