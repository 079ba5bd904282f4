//! Sliding-window request counter keyed by caller identity.
//!
//! State lives in this process only: it resets on restart and is not shared
//! between instances. The key map is a bounded LRU, so the least recently
//! seen identities are forgotten once `capacity` keys are tracked.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

pub struct RateLimiter {
    windows: Mutex<LruCache<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            windows: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Record a hit for `key`. Returns the seconds to wait when the window is full.
    pub fn check(&self, key: &str, max_requests: usize, window: Duration) -> Result<(), u64> {
        self.check_at(key, max_requests, window, Instant::now())
    }

    fn check_at(
        &self,
        key: &str,
        max_requests: usize,
        window: Duration,
        now: Instant,
    ) -> Result<(), u64> {
        let mut windows = self.windows.lock();
        let mut hits = windows.pop(key).unwrap_or_default();

        while let Some(oldest) = hits.front() {
            if now.saturating_duration_since(*oldest) >= window {
                hits.pop_front();
            } else {
                break;
            }
        }

        let outcome = if hits.len() >= max_requests {
            let wait = hits
                .front()
                .map(|oldest| window.saturating_sub(now.saturating_duration_since(*oldest)))
                .unwrap_or(window);
            Err(ceil_secs(wait).max(1))
        } else {
            hits.push_back(now);
            Ok(())
        };

        if !hits.is_empty() {
            windows.put(key.to_string(), hits);
        }
        outcome
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().len()
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 { secs + 1 } else { secs }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(capacity: usize) -> RateLimiter {
        RateLimiter::new(NonZeroUsize::new(capacity).expect("non-zero"))
    }

    #[test]
    fn allows_up_to_max_then_rejects_with_retry_hint() {
        let limiter = limiter(8);
        let window = Duration::from_secs(60);
        let start = Instant::now();

        assert!(limiter.check_at("user:u1", 2, window, start).is_ok());
        assert!(limiter.check_at("user:u1", 2, window, start + Duration::from_secs(1)).is_ok());

        let retry = limiter
            .check_at("user:u1", 2, window, start + Duration::from_secs(10))
            .expect_err("over the limit");
        assert_eq!(retry, 50);
    }

    #[test]
    fn window_slides_and_keys_are_independent() {
        let limiter = limiter(8);
        let window = Duration::from_millis(1_000);
        let start = Instant::now();

        assert!(limiter.check_at("ip:10.0.0.1", 1, window, start).is_ok());
        assert!(limiter.check_at("ip:10.0.0.1", 1, window, start).is_err());
        assert!(limiter.check_at("ip:10.0.0.2", 1, window, start).is_ok());

        let later = start + Duration::from_millis(1_000);
        assert!(limiter.check_at("ip:10.0.0.1", 1, window, later).is_ok());
    }

    #[test]
    fn sub_second_waits_round_up() {
        let limiter = limiter(8);
        let window = Duration::from_millis(500);
        let start = Instant::now();

        assert!(limiter.check_at("k", 1, window, start).is_ok());
        assert_eq!(limiter.check_at("k", 1, window, start), Err(1));
    }

    #[test]
    fn evicts_least_recent_identity_at_capacity() {
        let limiter = limiter(2);
        let window = Duration::from_secs(60);
        let start = Instant::now();

        assert!(limiter.check_at("a", 1, window, start).is_ok());
        assert!(limiter.check_at("b", 1, window, start).is_ok());
        assert!(limiter.check_at("c", 1, window, start).is_ok());
        assert_eq!(limiter.tracked_keys(), 2);

        // "a" was evicted, so its history is gone.
        assert!(limiter.check_at("a", 1, window, start).is_ok());
        assert!(limiter.check_at("c", 1, window, start).is_err());
    }
}
