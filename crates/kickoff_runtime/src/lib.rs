//! KICKOFF Runtime
//!
//! Dispatches items one at a time from a background thread, throttled by a
//! sliding-window rate limiter, and partitions them by whether their start
//! capability succeeded.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod limiter;
pub mod monitor;
pub mod processor;
pub mod queue;

pub use config::ProcessorConfig;
pub use limiter::{Admission, RateLimit, RateLimiter};
pub use monitor::{DispatchMonitor, Metrics};
pub use processor::{Processor, ProcessorError, ProcessorState};
pub use queue::{Extraction, Failed, OutcomeQueue, PendingQueue};
