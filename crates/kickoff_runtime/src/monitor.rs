//! Dispatch monitor for metrics.
//!
//! Counts dispatches and their outcomes, and keeps the offset of every
//! dispatch from the start of the run so throughput can be checked after
//! the fact.

use std::time::{Duration, Instant};

use crate::limiter::Admission;

/// Dispatch metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metrics {
    /// Items whose start capability was invoked
    pub dispatched: u64,
    /// Invocations that returned normally
    pub succeeded: u64,
    /// Invocations that failed or panicked
    pub failed: u64,
    /// Dispatches that had to wait for the rate limiter
    pub throttled: u64,
    /// Total time spent waiting for the rate limiter
    pub total_wait: Duration,
}

impl Metrics {
    /// Create new metrics
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get success rate (0.0 - 1.0)
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.dispatched == 0 {
            return 1.0;
        }
        self.succeeded as f64 / self.dispatched as f64
    }

    /// Get failure rate (0.0 - 1.0)
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        if self.dispatched == 0 {
            return 0.0;
        }
        self.failed as f64 / self.dispatched as f64
    }
}

/// Dispatch monitor
#[derive(Debug, Clone, Default)]
pub struct DispatchMonitor {
    /// Current metrics
    metrics: Metrics,
    /// Instant the run began
    started_at: Option<Instant>,
    /// Instant the run ended
    finished_at: Option<Instant>,
    /// Offset of every dispatch from `started_at`
    dispatch_offsets: Vec<Duration>,
}

impl DispatchMonitor {
    /// Create a new monitor
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of a run
    pub fn begin(&mut self, at: Instant) {
        self.started_at = Some(at);
    }

    /// Mark the end of a run
    pub fn finish(&mut self, at: Instant) {
        self.finished_at = Some(at);
    }

    /// Record an admitted dispatch
    pub fn record_dispatch(&mut self, admission: &Admission) {
        self.metrics.dispatched += 1;
        if !admission.waited.is_zero() {
            self.metrics.throttled += 1;
            self.metrics.total_wait += admission.waited;
        }
        let origin = *self.started_at.get_or_insert(admission.at);
        self.dispatch_offsets
            .push(admission.at.saturating_duration_since(origin));
    }

    /// Record a successful start
    pub fn record_success(&mut self) {
        self.metrics.succeeded += 1;
    }

    /// Record a failed start
    pub fn record_failure(&mut self) {
        self.metrics.failed += 1;
    }

    /// Get current metrics
    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Offsets of dispatches from the start of the run, in dispatch order
    #[must_use]
    pub fn dispatch_offsets(&self) -> &[Duration] {
        &self.dispatch_offsets
    }

    /// Wall time of the run, if it has finished
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end.saturating_duration_since(start)),
            _ => None,
        }
    }

    /// Largest number of dispatches inside any half-open window of `window` length
    #[must_use]
    pub fn peak_in_window(&self, window: Duration) -> usize {
        let offsets = &self.dispatch_offsets;
        let mut peak = 0;
        let mut lo = 0;
        for hi in 0..offsets.len() {
            while lo < hi && offsets[hi].saturating_sub(offsets[lo]) >= window {
                lo += 1;
            }
            peak = peak.max(hi - lo + 1);
        }
        peak
    }
}
