//! Sliding-window rate limiting for dispatch.
//!
//! The limiter remembers the instants of the most recent `max_items`
//! dispatches. Once that many are recorded, a new dispatch waits until the
//! oldest of them has left the trailing window. Dispatches may come in
//! bursts of up to `max_items` and then stall; they are not spaced evenly.

use kickoff_core::{Clock, CoreError, CoreResult, SystemClock};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Validated rate limit: at most `max_items` dispatches per trailing `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    max_items: usize,
    window: Duration,
}

impl RateLimit {
    /// Create a new rate limit
    ///
    /// # Errors
    ///
    /// Returns error if either parameter is zero
    pub fn new(max_items: usize, window: Duration) -> CoreResult<Self> {
        if max_items == 0 {
            return Err(CoreError::validation("max_items", "must be positive"));
        }
        if window.is_zero() {
            return Err(CoreError::validation("window", "must be positive"));
        }
        Ok(Self { max_items, window })
    }

    /// Build from optional parameters.
    ///
    /// Both absent means unlimited. Exactly one present is an error.
    ///
    /// # Errors
    ///
    /// Returns error if only one parameter is given or either is zero
    pub fn from_parts(max_items: Option<usize>, window: Option<Duration>) -> CoreResult<Option<Self>> {
        match (max_items, window) {
            (None, None) => Ok(None),
            (Some(max_items), Some(window)) => Self::new(max_items, window).map(Some),
            (Some(_), None) => Err(CoreError::validation(
                "window",
                "required when max_items is set",
            )),
            (None, Some(_)) => Err(CoreError::validation(
                "max_items",
                "required when window is set",
            )),
        }
    }

    /// Maximum dispatches per window
    #[must_use]
    pub const fn max_items(&self) -> usize {
        self.max_items
    }

    /// Window length
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }
}

impl std::fmt::Display for RateLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} per {:?}", self.max_items, self.window)
    }
}

/// Outcome of one admission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Instant recorded for the dispatch
    pub at: Instant,
    /// How long the caller was held back
    pub waited: Duration,
}

/// Sliding-window rate limiter
pub struct RateLimiter {
    /// Configured limit, `None` when unlimited
    limit: Option<RateLimit>,
    /// Instants of the most recent dispatches, oldest first
    recent: VecDeque<Instant>,
    /// Time source
    clock: Arc<dyn Clock>,
}

/// Timestamps reserved up front; the deque grows toward `max_items` as needed
const PREALLOCATED: usize = 1024;

impl RateLimiter {
    /// Create a limiter on the given clock
    #[must_use]
    pub fn new(limit: Option<RateLimit>, clock: Arc<dyn Clock>) -> Self {
        let capacity = limit.map_or(0, |l| l.max_items.min(PREALLOCATED));
        Self {
            limit,
            recent: VecDeque::with_capacity(capacity),
            clock,
        }
    }

    /// A limiter that never waits
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(None, Arc::new(SystemClock))
    }

    /// Block until one more dispatch fits in the window, then record it.
    ///
    /// Unlimited limiters return immediately without recording anything.
    pub fn admit(&mut self) -> Admission {
        let Some(limit) = self.limit else {
            return Admission {
                at: self.clock.now(),
                waited: Duration::ZERO,
            };
        };

        let mut waited = Duration::ZERO;
        if self.recent.len() >= limit.max_items {
            if let Some(&oldest) = self.recent.front() {
                let elapsed = self.clock.now().saturating_duration_since(oldest);
                if elapsed < limit.window {
                    waited = limit.window - elapsed;
                    tracing::debug!(
                        wait_ms = waited.as_millis() as u64,
                        max_items = limit.max_items,
                        "rate limit reached, waiting"
                    );
                    self.clock.sleep(waited);
                }
            }
            self.recent.pop_front();
        }

        let at = self.clock.now();
        self.recent.push_back(at);
        Admission { at, waited }
    }

    /// Check if a limit is configured
    #[must_use]
    pub fn is_limited(&self) -> bool {
        self.limit.is_some()
    }

    /// Get the configured limit
    #[must_use]
    pub fn limit(&self) -> Option<RateLimit> {
        self.limit
    }

    /// Number of dispatches currently remembered
    #[must_use]
    pub fn recent_len(&self) -> usize {
        self.recent.len()
    }

    /// Get the clock
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("limit", &self.limit)
            .field("recent", &self.recent.len())
            .finish_non_exhaustive()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::unlimited()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kickoff_core::ManualClock;
    use proptest::prelude::*;

    fn limiter(max_items: usize, window: Duration) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let limit = RateLimit::new(max_items, window).unwrap();
        (RateLimiter::new(Some(limit), clock.clone()), clock)
    }

    #[test]
    fn test_rate_limit_new() {
        let limit = RateLimit::new(10, Duration::from_secs(1)).unwrap();
        assert_eq!(limit.max_items(), 10);
        assert_eq!(limit.window(), Duration::from_secs(1));
    }

    #[test]
    fn test_rate_limit_rejects_zero() {
        assert!(RateLimit::new(0, Duration::from_secs(1)).is_err());
        assert!(RateLimit::new(1, Duration::ZERO).is_err());
    }

    #[test]
    fn test_rate_limit_from_parts() {
        assert_eq!(RateLimit::from_parts(None, None).unwrap(), None);
        assert!(
            RateLimit::from_parts(Some(5), Some(Duration::from_millis(10)))
                .unwrap()
                .is_some()
        );

        let err = RateLimit::from_parts(Some(5), None).unwrap_err();
        assert!(matches!(err, CoreError::Validation { ref field, .. } if field == "window"));

        let err = RateLimit::from_parts(None, Some(Duration::from_secs(1))).unwrap_err();
        assert!(matches!(err, CoreError::Validation { ref field, .. } if field == "max_items"));
    }

    #[test]
    fn test_huge_max_items_behaves_like_a_large_burst() {
        let (mut limiter, clock) = limiter(usize::MAX, Duration::from_secs(1));
        assert_eq!(limiter.limit().map(|l| l.max_items()), Some(usize::MAX));

        for _ in 0..2_000 {
            assert_eq!(limiter.admit().waited, Duration::ZERO);
        }
        assert_eq!(limiter.recent_len(), 2_000);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_unlimited_never_waits() {
        let mut limiter = RateLimiter::unlimited();
        assert!(!limiter.is_limited());
        for _ in 0..1_000 {
            assert_eq!(limiter.admit().waited, Duration::ZERO);
        }
        assert_eq!(limiter.recent_len(), 0);
    }

    #[test]
    fn test_burst_then_stall() {
        let (mut limiter, clock) = limiter(3, Duration::from_secs(1));

        for _ in 0..3 {
            assert_eq!(limiter.admit().waited, Duration::ZERO);
        }
        assert!(clock.sleeps().is_empty());

        let admission = limiter.admit();
        assert_eq!(admission.waited, Duration::from_secs(1));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);
        assert_eq!(limiter.recent_len(), 3);
    }

    #[test]
    fn test_partial_wait_after_time_passes() {
        let (mut limiter, clock) = limiter(2, Duration::from_millis(100));

        limiter.admit();
        clock.advance(Duration::from_millis(30));
        limiter.admit();
        clock.advance(Duration::from_millis(30));

        // oldest dispatch was 60ms ago
        let admission = limiter.admit();
        assert_eq!(admission.waited, Duration::from_millis(40));
    }

    #[test]
    fn test_no_wait_when_window_already_passed() {
        let (mut limiter, clock) = limiter(1, Duration::from_millis(50));

        limiter.admit();
        clock.advance(Duration::from_millis(80));
        assert_eq!(limiter.admit().waited, Duration::ZERO);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_limiter_with_system_clock() {
        let limit = RateLimit::new(2, Duration::from_millis(40)).unwrap();
        let mut limiter = RateLimiter::new(Some(limit), Arc::new(SystemClock));

        let start = Instant::now();
        for _ in 0..5 {
            limiter.admit();
        }
        // dispatches 3 and 5 each wait for a window to pass
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    proptest! {
        #[test]
        fn prop_window_never_exceeded(
            max_items in 1usize..6,
            window_ms in 1u64..200,
            gaps in proptest::collection::vec(0u64..100, 0..60),
        ) {
            let window = Duration::from_millis(window_ms);
            let (mut limiter, clock) = limiter(max_items, window);

            let mut times = Vec::with_capacity(gaps.len());
            for gap in gaps {
                clock.advance(Duration::from_millis(gap));
                times.push(limiter.admit().at);
            }

            for pair in times.windows(max_items + 1) {
                prop_assert!(pair[max_items] - pair[0] >= window);
            }
        }
    }
}
