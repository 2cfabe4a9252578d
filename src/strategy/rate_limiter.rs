// =============================================================================
// Generic per-key rate limiter
// =============================================================================
//
// Every strategy must suppress duplicate signals within a configured minimum
// interval, keyed by whatever tuple defines "duplicate" for that strategy
// (symbol; (symbol, price, side); (symbol, buy venue, sell venue); ...).
// =============================================================================

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub struct RateLimiter<K> {
    last_emit: Mutex<HashMap<K, Instant>>,
}

impl<K: Eq + Hash + Clone> RateLimiter<K> {
    pub fn new() -> Self {
        Self {
            last_emit: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` (and records `now`) if `key` has not fired within
    /// `min_interval`; returns `false` without mutating state otherwise.
    pub fn check_and_update(&self, key: K, min_interval: Duration) -> bool {
        let now = Instant::now();
        let mut last_emit = self.last_emit.lock();
        match last_emit.get(&key) {
            Some(last) if now.duration_since(*last) < min_interval => false,
            _ => {
                last_emit.insert(key, now);
                true
            }
        }
    }
}

impl<K: Eq + Hash + Clone> Default for RateLimiter<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn first_call_always_passes() {
        let limiter: RateLimiter<String> = RateLimiter::new();
        assert!(limiter.check_and_update("BTCUSDT".to_string(), Duration::from_secs(60)));
    }

    #[test]
    fn second_call_within_interval_is_suppressed() {
        let limiter: RateLimiter<String> = RateLimiter::new();
        assert!(limiter.check_and_update("BTCUSDT".to_string(), Duration::from_millis(50)));
        assert!(!limiter.check_and_update("BTCUSDT".to_string(), Duration::from_millis(50)));
    }

    #[test]
    fn call_after_interval_passes_again() {
        let limiter: RateLimiter<String> = RateLimiter::new();
        assert!(limiter.check_and_update("BTCUSDT".to_string(), Duration::from_millis(20)));
        sleep(Duration::from_millis(40));
        assert!(limiter.check_and_update("BTCUSDT".to_string(), Duration::from_millis(20)));
    }

    #[test]
    fn distinct_keys_are_independent() {
        let limiter: RateLimiter<(String, String)> = RateLimiter::new();
        assert!(limiter.check_and_update(("BTCUSDT".to_string(), "bid".to_string()), Duration::from_secs(60)));
        assert!(limiter.check_and_update(("BTCUSDT".to_string(), "ask".to_string()), Duration::from_secs(60)));
    }
}
