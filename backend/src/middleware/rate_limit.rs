use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding-window limiter for failed login attempts, keyed by email.
pub struct RateLimiter {
    attempts: Mutex<HashMap<String, VecDeque<Instant>>>,
    max_attempts: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_attempts: usize, window_secs: u64) -> Self {
        Self {
            attempts: Mutex::new(HashMap::new()),
            max_attempts,
            window: Duration::from_secs(window_secs),
        }
    }

    /// True when another attempt is allowed for this key.
    pub fn check(&self, key: &str) -> bool {
        let mut attempts = self.attempts.lock().unwrap();
        match attempts.get_mut(key) {
            Some(entry) => {
                Self::prune(entry, self.window);
                entry.len() < self.max_attempts
            }
            None => true,
        }
    }

    /// Record a failed attempt.
    pub fn record(&self, key: &str) {
        let mut attempts = self.attempts.lock().unwrap();
        let entry = attempts.entry(key.to_string()).or_default();
        Self::prune(entry, self.window);
        entry.push_back(Instant::now());
    }

    /// Forget a key, e.g. after a successful login.
    pub fn clear(&self, key: &str) {
        self.attempts.lock().unwrap().remove(key);
    }

    fn prune(entry: &mut VecDeque<Instant>, window: Duration) {
        let now = Instant::now();
        while entry
            .front()
            .is_some_and(|&t| now.duration_since(t) >= window)
        {
            entry.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_allows_under_limit() {
        let limiter = RateLimiter::new(3, 60);

        limiter.record("ada@example.com");
        limiter.record("ada@example.com");
        assert!(limiter.check("ada@example.com"));
    }

    #[test]
    fn test_blocks_over_limit() {
        let limiter = RateLimiter::new(2, 60);

        limiter.record("ada@example.com");
        limiter.record("ada@example.com");
        assert!(!limiter.check("ada@example.com"));
    }

    #[test]
    fn test_window_expires() {
        let limiter = RateLimiter::new(1, 1);

        limiter.record("ada@example.com");
        assert!(!limiter.check("ada@example.com"));

        sleep(Duration::from_secs(2));
        assert!(limiter.check("ada@example.com"));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(1, 60);

        limiter.record("ada@example.com");
        assert!(!limiter.check("ada@example.com"));
        assert!(limiter.check("bob@example.com"));
    }

    #[test]
    fn test_clear_resets_key() {
        let limiter = RateLimiter::new(1, 60);

        limiter.record("ada@example.com");
        assert!(!limiter.check("ada@example.com"));

        limiter.clear("ada@example.com");
        assert!(limiter.check("ada@example.com"));
    }
}
