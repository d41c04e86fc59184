use crate::config::RateLimitConfig;
use std::time::{Duration, Instant};
use tracing::info;

/// Latch recording that the upstream API answered with 429.
///
/// With `resume_after_retry` disabled the latch holds until [`reset`](Self::reset)
/// is called. With it enabled the latch expires once the `Retry-After` window
/// (or the configured default) has elapsed.
#[derive(Debug)]
pub struct RateLimitState {
    rate_limited: bool,
    retry_after: Option<Duration>,
    limited_at: Option<Instant>,
    resume_after_retry: bool,
    default_retry_after: Duration,
}

impl RateLimitState {
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            rate_limited: false,
            retry_after: None,
            limited_at: None,
            resume_after_retry: config.resume_after_retry,
            default_retry_after: Duration::from_secs(config.default_retry_after_seconds),
        }
    }

    /// Mark the API as rate limited starting at `now`
    pub fn trip(&mut self, retry_after: Option<Duration>, now: Instant) {
        self.rate_limited = true;
        self.retry_after = retry_after;
        self.limited_at = Some(now);
    }

    /// Check whether requests must be short-circuited at `now`, clearing an
    /// expired latch on the way.
    pub fn is_limited(&mut self, now: Instant) -> bool {
        if !self.rate_limited {
            return false;
        }
        if self.remaining(now) == Some(Duration::ZERO) {
            info!("rate limit window elapsed, resuming requests");
            self.reset();
            return false;
        }
        true
    }

    /// Time left before the latch expires. `None` when it never expires on its
    /// own or is not set.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        if !self.rate_limited || !self.resume_after_retry {
            return None;
        }
        let window = self.retry_after.unwrap_or(self.default_retry_after);
        let elapsed = self
            .limited_at
            .map_or(Duration::ZERO, |at| now.saturating_duration_since(at));
        Some(window.saturating_sub(elapsed))
    }

    pub fn reset(&mut self) {
        self.rate_limited = false;
        self.retry_after = None;
        self.limited_at = None;
    }

    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    #[must_use]
    pub const fn rate_limited(&self) -> bool {
        self.rate_limited
    }
}

/// Parse a `Retry-After` header given in whole seconds.
///
/// HTTP-date values are not used by the Asana API and yield `None`.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latching() -> RateLimitState {
        RateLimitState::new(&RateLimitConfig::default())
    }

    fn expiring() -> RateLimitState {
        RateLimitState::new(&RateLimitConfig {
            resume_after_retry: true,
            default_retry_after_seconds: 60,
        })
    }

    #[test]
    fn test_initial_state_is_clear() {
        let mut state = latching();
        assert!(!state.is_limited(Instant::now()));
        assert_eq!(state.retry_after(), None);
    }

    #[test]
    fn test_latch_holds_without_resume() {
        let mut state = latching();
        let start = Instant::now();
        state.trip(Some(Duration::from_secs(5)), start);

        assert!(state.is_limited(start));
        assert!(state.is_limited(start + Duration::from_secs(3600)));
        assert_eq!(state.remaining(start), None);
        assert_eq!(state.retry_after(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_reset_clears_latch() {
        let mut state = latching();
        let now = Instant::now();
        state.trip(None, now);
        state.reset();
        assert!(!state.is_limited(now));
        assert!(!state.rate_limited());
    }

    #[test]
    fn test_latch_expires_after_retry_after() {
        let mut state = expiring();
        let start = Instant::now();
        state.trip(Some(Duration::from_secs(5)), start);

        assert!(state.is_limited(start + Duration::from_secs(4)));
        assert_eq!(
            state.remaining(start + Duration::from_secs(4)),
            Some(Duration::from_secs(1))
        );
        assert!(!state.is_limited(start + Duration::from_secs(5)));
        assert!(!state.rate_limited());
    }

    #[test]
    fn test_latch_falls_back_to_default_window() {
        let mut state = expiring();
        let start = Instant::now();
        state.trip(None, start);

        assert!(state.is_limited(start + Duration::from_secs(59)));
        assert!(!state.is_limited(start + Duration::from_secs(60)));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("5"), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after(" 30 "), Some(Duration::from_secs(30)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after(""), None);
        assert_eq!(parse_retry_after("-1"), None);
    }
}
