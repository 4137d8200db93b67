//! Fixed-window rate limiter keyed by request origin
//!
//! Each origin gets `max_requests` per window. The first request after a
//! window has elapsed starts a fresh one.

use crate::config::RateLimitConfig;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct RateRecord {
    count: u32,
    window_reset_at: Instant,
}

/// Per-origin request counter shared by all request handlers
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    max_origins: usize,
    records: Mutex<HashMap<String, RateRecord>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given config
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: Duration::from_millis(config.window_ms),
            max_origins: config.max_origins,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Count a request from `origin`, returning whether it is allowed
    pub fn allow(&self, origin: &str) -> bool {
        self.allow_at(origin, Instant::now())
    }

    /// Same as [`allow`](Self::allow) at an explicit instant
    pub fn allow_at(&self, origin: &str, now: Instant) -> bool {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match records.get_mut(origin) {
            Some(record) if now <= record.window_reset_at => {
                if record.count >= self.max_requests {
                    return false;
                }
                record.count += 1;
                true
            }
            _ => {
                if records.len() >= self.max_origins && !records.contains_key(origin) {
                    let before = records.len();
                    records.retain(|_, r| now <= r.window_reset_at);
                    tracing::debug!(
                        "Purged {} expired rate limit entries",
                        before - records.len()
                    );
                }
                records.insert(
                    origin.to_string(),
                    RateRecord {
                        count: 1,
                        window_reset_at: now + self.window,
                    },
                );
                true
            }
        }
    }

    /// Number of origins currently tracked
    pub fn tracked_origins(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(max_requests: u32, window_ms: u64) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            max_requests,
            window_ms,
            max_origins: 10_000,
        })
    }

    #[test]
    fn test_eleventh_request_blocked() {
        let limiter = limiter(10, 60_000);
        let t0 = Instant::now();

        for i in 0..10 {
            assert!(
                limiter.allow_at("127.0.0.1", t0 + Duration::from_millis(i * 100)),
                "request {} should pass",
                i + 1
            );
        }
        assert!(!limiter.allow_at("127.0.0.1", t0 + Duration::from_secs(30)));
    }

    #[test]
    fn test_window_reset_allows_again() {
        let limiter = limiter(10, 60_000);
        let t0 = Instant::now();

        for _ in 0..10 {
            assert!(limiter.allow_at("10.0.0.5", t0));
        }
        assert!(!limiter.allow_at("10.0.0.5", t0 + Duration::from_secs(59)));

        // Window ends at t0 + 60s; the next instant after that starts a new one
        let later = t0 + Duration::from_millis(60_001);
        assert!(limiter.allow_at("10.0.0.5", later));
        for _ in 0..9 {
            assert!(limiter.allow_at("10.0.0.5", later));
        }
        assert!(!limiter.allow_at("10.0.0.5", later));
    }

    #[test]
    fn test_origins_are_independent() {
        let limiter = limiter(2, 60_000);
        let t0 = Instant::now();

        assert!(limiter.allow_at("a", t0));
        assert!(limiter.allow_at("a", t0));
        assert!(!limiter.allow_at("a", t0));

        assert!(limiter.allow_at("b", t0));
        assert_eq!(limiter.tracked_origins(), 2);
    }

    #[test]
    fn test_blocked_requests_do_not_extend_window() {
        let limiter = limiter(1, 1_000);
        let t0 = Instant::now();

        assert!(limiter.allow_at("a", t0));
        assert!(!limiter.allow_at("a", t0 + Duration::from_millis(900)));
        assert!(limiter.allow_at("a", t0 + Duration::from_millis(1_001)));
    }

    #[test]
    fn test_expired_origins_purged_when_full() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            max_requests: 10,
            window_ms: 1_000,
            max_origins: 3,
        });
        let t0 = Instant::now();

        for origin in ["a", "b", "c"] {
            assert!(limiter.allow_at(origin, t0));
        }
        assert_eq!(limiter.tracked_origins(), 3);

        // All three windows have expired; a new origin triggers the purge
        assert!(limiter.allow_at("d", t0 + Duration::from_secs(2)));
        assert_eq!(limiter.tracked_origins(), 1);
    }

    #[test]
    fn test_live_origins_survive_purge() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            max_requests: 10,
            window_ms: 1_000,
            max_origins: 2,
        });
        let t0 = Instant::now();

        assert!(limiter.allow_at("old", t0));
        assert!(limiter.allow_at("fresh", t0 + Duration::from_millis(900)));
        assert!(limiter.allow_at("new", t0 + Duration::from_millis(1_500)));

        assert_eq!(limiter.tracked_origins(), 2);
    }

    #[test]
    fn test_concurrent_access_counts_exactly() {
        let limiter = Arc::new(limiter(50, 60_000));
        let t0 = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..20).filter(|_| limiter.allow_at("shared", t0)).count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 50);
    }
}
