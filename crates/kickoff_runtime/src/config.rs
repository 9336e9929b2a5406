//! Processor configuration.

use kickoff_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::limiter::RateLimit;
use crate::queue::Extraction;

/// Default name of the background dispatch thread
pub const DEFAULT_THREAD_NAME: &str = "kickoff-processor";

/// Processor configuration
///
/// Rate limiting is off unless both `max_items` and `window_secs` are set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessorConfig {
    /// Which end of the pending queue to dispatch from
    pub extraction: Extraction,
    /// Maximum dispatches per window
    pub max_items: Option<usize>,
    /// Window length in seconds
    pub window_secs: Option<f64>,
    /// Name of the background thread
    pub thread_name: Option<String>,
}

impl ProcessorConfig {
    /// Create a default configuration (FIFO, unlimited)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the extraction policy
    #[must_use]
    pub fn with_extraction(mut self, extraction: Extraction) -> Self {
        self.extraction = extraction;
        self
    }

    /// Dispatch from the insertion end (stack order)
    #[must_use]
    pub fn lifo(self) -> Self {
        self.with_extraction(Extraction::Lifo)
    }

    /// Limit dispatch to `max_items` per `window`
    #[must_use]
    pub fn with_rate_limit(mut self, max_items: usize, window: Duration) -> Self {
        self.max_items = Some(max_items);
        self.window_secs = Some(window.as_secs_f64());
        self
    }

    /// Set the background thread name
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }

    /// Background thread name, falling back to the default
    #[must_use]
    pub fn thread_name(&self) -> &str {
        self.thread_name.as_deref().unwrap_or(DEFAULT_THREAD_NAME)
    }

    /// Validate the rate parameters
    ///
    /// # Errors
    ///
    /// Returns error if only one parameter is set, or either is not positive
    pub fn rate_limit(&self) -> CoreResult<Option<RateLimit>> {
        let window = self.window_secs.map(window_from_secs).transpose()?;
        RateLimit::from_parts(self.max_items, window)
    }

    /// Parse a configuration from JSON
    ///
    /// # Errors
    ///
    /// Returns error if the input is not a valid configuration
    pub fn from_json_str(input: &str) -> CoreResult<Self> {
        serde_json::from_str(input).map_err(|err| CoreError::ParseError {
            message: err.to_string(),
        })
    }
}

fn window_from_secs(secs: f64) -> CoreResult<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(CoreError::validation(
            "window_secs",
            format!("must be a positive number of seconds, got {secs}"),
        ));
    }
    Duration::try_from_secs_f64(secs).map_err(|err| CoreError::validation("window_secs", err.to_string()))
}
