//! Minimum-spacing limiter for cycle-initiating requests.
//!
//! Owned by the orchestrator's construction context rather than living in
//! process-wide state, so tests and multi-instance deployments each get
//! their own tracker. Requests inside the window are rejected with a
//! retry-after hint, never queued.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::condition::SessionKey;

/// Error type for rate-limit rejections.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    #[error("cycle request too soon, retry in {retry_after_ms} ms")]
    TooSoon { retry_after_ms: u64 },
}

/// Per-(participant, session) spacing tracker.
pub struct CycleRateLimiter {
    min_spacing: Duration,
    recent: Mutex<HashMap<(String, SessionKey), Instant>>,
}

impl CycleRateLimiter {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            recent: Mutex::new(HashMap::new()),
        }
    }

    /// A limiter that admits everything (for tests and test mode).
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Admit or reject a cycle-initiating request. Admission records the
    /// timestamp; rejection leaves the previous timestamp untouched so a
    /// hammering client cannot push its own window forward.
    pub fn check(&self, participant_id: &str, key: SessionKey) -> Result<(), RateLimitError> {
        if self.min_spacing.is_zero() {
            return Ok(());
        }

        let now = Instant::now();
        let mut recent = self.recent.lock().unwrap();

        // Entries outside the window can never reject again; drop them.
        recent.retain(|_, last| now.duration_since(*last) < self.min_spacing);

        let entry = (participant_id.to_string(), key);
        if let Some(last) = recent.get(&entry) {
            let remaining = self.min_spacing - now.duration_since(*last);
            return Err(RateLimitError::TooSoon {
                retry_after_ms: remaining.as_millis() as u64,
            });
        }

        recent.insert(entry, now);
        Ok(())
    }

    /// Number of tracked entries (pruning makes this stay small).
    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.recent.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_request_admitted() {
        let limiter = CycleRateLimiter::new(Duration::from_secs(3));
        assert!(limiter.check("p1", SessionKey::Test).is_ok());
    }

    #[test]
    fn test_request_inside_window_rejected() {
        let limiter = CycleRateLimiter::new(Duration::from_secs(3));
        limiter.check("p1", SessionKey::Test).unwrap();
        let err = limiter.check("p1", SessionKey::Test).unwrap_err();
        let RateLimitError::TooSoon { retry_after_ms } = err;
        assert!(retry_after_ms <= 3000);
    }

    #[test]
    fn test_sessions_are_limited_independently() {
        let limiter = CycleRateLimiter::new(Duration::from_secs(3));
        limiter.check("p1", SessionKey::Test).unwrap();
        assert!(limiter.check("p1", SessionKey::Normative).is_ok());
        assert!(limiter.check("p2", SessionKey::Test).is_ok());
    }

    #[test]
    fn test_window_expires() {
        let limiter = CycleRateLimiter::new(Duration::from_millis(20));
        limiter.check("p1", SessionKey::Test).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.check("p1", SessionKey::Test).is_ok());
    }

    #[test]
    fn test_stale_entries_are_pruned() {
        let limiter = CycleRateLimiter::new(Duration::from_millis(20));
        limiter.check("p1", SessionKey::Test).unwrap();
        limiter.check("p2", SessionKey::Test).unwrap();
        assert_eq!(limiter.tracked(), 2);
        std::thread::sleep(Duration::from_millis(30));
        limiter.check("p3", SessionKey::Test).unwrap();
        assert_eq!(limiter.tracked(), 1);
    }

    #[test]
    fn test_disabled_limiter_admits_everything() {
        let limiter = CycleRateLimiter::disabled();
        for _ in 0..10 {
            assert!(limiter.check("p1", SessionKey::Test).is_ok());
        }
    }

    #[test]
    fn test_rejection_does_not_extend_the_window() {
        let limiter = CycleRateLimiter::new(Duration::from_millis(40));
        limiter.check("p1", SessionKey::Test).unwrap();
        std::thread::sleep(Duration::from_millis(25));
        // Rejected, but must not reset the clock
        assert!(limiter.check("p1", SessionKey::Test).is_err());
        std::thread::sleep(Duration::from_millis(25));
        assert!(limiter.check("p1", SessionKey::Test).is_ok());
    }
}
