//! KICKOFF Core Types
//!
//! This crate contains the start capability every dispatched item exposes,
//! the structural check that admits dynamically typed values, and the clock
//! abstraction the rate limiter sleeps on. No queues and no threads of its own.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod capability;
pub mod error;
pub mod spawn;
pub mod time;

// Re-exports
pub use capability::{Candidate, CapabilityCheck, StartResult, Startable};
pub use error::{CoreError, CoreResult, StartError};
pub use spawn::SpawnItem;
pub use time::{Clock, ManualClock, SystemClock};
