use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// In-memory rate limiter keyed by "<bucket>:<ip_hash>".
/// Buckets in use: "login" and "comment", each with its own limit and
/// window supplied by the caller.
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        RateLimiter {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Record an attempt and return true if it is allowed (under the limit).
    pub fn check_and_record(&self, key: &str, max_attempts: u64, window: Duration) -> bool {
        let mut map = self.buckets.lock().unwrap();
        let now = Instant::now();
        let cutoff = now - window;

        let stamps = map.entry(key.to_string()).or_default();
        stamps.retain(|t| *t > cutoff);

        if (stamps.len() as u64) < max_attempts {
            stamps.push(now);
            true
        } else {
            false
        }
    }

    /// Drop keys with no attempts inside `max_age`; called from the
    /// periodic maintenance task so the map cannot grow without bound.
    pub fn sweep(&self, max_age: Duration) {
        let mut map = self.buckets.lock().unwrap();
        let cutoff = Instant::now() - max_age;
        map.retain(|_, stamps| {
            stamps.retain(|t| *t > cutoff);
            !stamps.is_empty()
        });
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
