//! Background processor.
//!
//! A [`Processor`] owns a pending queue of startable items and, once started,
//! a single named thread that drains it:
//!
//! 1. stop if nothing is pending
//! 2. wait for the rate limiter
//! 3. pop the next item per the extraction policy
//! 4. invoke its start capability
//! 5. file it under succeeded or failed
//!
//! Dispatch is strictly sequential. A failing or panicking item is recorded
//! and the loop moves on. The lifecycle is `Dormant -> Running -> Terminated`
//! and a processor is never restarted.

use kickoff_core::{
    Candidate, CapabilityCheck, Clock, CoreError, StartError, StartResult, Startable, SystemClock,
};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::ProcessorConfig;
use crate::limiter::RateLimiter;
use crate::monitor::{DispatchMonitor, Metrics};
use crate::queue::{Extraction, Failed, OutcomeQueue, PendingQueue};

/// Lifecycle state of a processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    /// Constructed, not yet started
    Dormant,
    /// Background thread is draining the pending queue
    Running,
    /// Pending queue exhausted
    Terminated,
}

impl std::fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dormant => write!(f, "dormant"),
            Self::Running => write!(f, "running"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Processor errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessorError {
    /// Invalid items or configuration
    #[error(transparent)]
    Core(#[from] CoreError),

    /// `start` called on a processor that is not dormant
    #[error("Processor already started")]
    AlreadyStarted,

    /// `join` called on a processor that was never started
    #[error("Processor not started")]
    NotStarted,

    /// The background thread could not be spawned
    #[error("Failed to spawn processor thread: {reason}")]
    Spawn { reason: String },

    /// The background thread died outside the per-item boundary
    #[error("Processor thread panicked")]
    WorkerPanicked,
}

/// State shared between the processor handle and its background thread
struct Shared<I> {
    pending: Mutex<PendingQueue<I>>,
    succeeded: Mutex<OutcomeQueue<I>>,
    failed: Mutex<OutcomeQueue<Failed<I>>>,
    limiter: Mutex<RateLimiter>,
    monitor: Mutex<DispatchMonitor>,
    state: Mutex<ProcessorState>,
    finished: Condvar,
}

impl<I> Shared<I> {
    fn set_state(&self, next: ProcessorState) {
        *self.state.lock() = next;
        self.finished.notify_all();
    }
}

/// Marks the run terminated however the dispatch loop exits
struct TerminateOnExit<'a, I>(&'a Shared<I>);

impl<I> Drop for TerminateOnExit<'_, I> {
    fn drop(&mut self) {
        let at = self.0.limiter.lock().clock().now();
        self.0.monitor.lock().finish(at);
        self.0.set_state(ProcessorState::Terminated);
    }
}

/// Sequential background dispatcher for startable items
pub struct Processor<I = Arc<dyn Startable>> {
    /// Queues, limiter and lifecycle state
    shared: Arc<Shared<I>>,
    /// Which end of the pending queue to dispatch from
    extraction: Extraction,
    /// Background thread name
    thread_name: String,
    /// Number of items at construction
    total: usize,
    /// Background thread, taken on join
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<I: Startable + 'static> Processor<I> {
    /// Create a processor over the given items, on the wall clock
    ///
    /// # Errors
    ///
    /// Returns error if the rate parameters are invalid
    pub fn new(
        items: impl IntoIterator<Item = I>,
        config: &ProcessorConfig,
    ) -> Result<Self, ProcessorError> {
        Self::with_clock(items, config, Arc::new(SystemClock))
    }

    /// Create a processor that reads time from `clock`
    ///
    /// # Errors
    ///
    /// Returns error if the rate parameters are invalid
    pub fn with_clock(
        items: impl IntoIterator<Item = I>,
        config: &ProcessorConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ProcessorError> {
        let limit = config.rate_limit()?;
        let pending: PendingQueue<I> = items.into_iter().collect();
        let total = pending.len();

        tracing::debug!(
            items = total,
            extraction = %config.extraction,
            rate_limit = ?limit,
            "processor created"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                pending: Mutex::new(pending),
                succeeded: Mutex::new(OutcomeQueue::new()),
                failed: Mutex::new(OutcomeQueue::new()),
                limiter: Mutex::new(RateLimiter::new(limit, clock)),
                monitor: Mutex::new(DispatchMonitor::new()),
                state: Mutex::new(ProcessorState::Dormant),
                finished: Condvar::new(),
            }),
            extraction: config.extraction,
            thread_name: config.thread_name().to_string(),
            total,
            handle: Mutex::new(None),
        })
    }

    /// Start the background dispatch thread
    ///
    /// # Errors
    ///
    /// Returns error if the processor was already started or the thread
    /// could not be spawned
    pub fn start(&self) -> Result<(), ProcessorError> {
        {
            let mut state = self.shared.state.lock();
            if *state != ProcessorState::Dormant {
                return Err(ProcessorError::AlreadyStarted);
            }
            *state = ProcessorState::Running;
        }

        let shared = Arc::clone(&self.shared);
        let extraction = self.extraction;
        let spawned = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || dispatch_loop(&shared, extraction));

        match spawned {
            Ok(handle) => {
                *self.handle.lock() = Some(handle);
                tracing::info!(
                    thread = %self.thread_name,
                    items = self.total,
                    "processor started"
                );
                Ok(())
            }
            Err(err) => {
                self.shared.set_state(ProcessorState::Dormant);
                Err(ProcessorError::Spawn {
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Start and wait for the run to finish
    ///
    /// # Errors
    ///
    /// Returns error if `start` or `join` fails
    pub fn run(&self) -> Result<(), ProcessorError> {
        self.start()?;
        self.join()
    }
}

impl Processor<Arc<dyn Startable>> {
    /// Create a processor from type-erased values, admitting each through `check`.
    ///
    /// No processor is produced if any value lacks the start capability.
    ///
    /// # Errors
    ///
    /// Returns `MissingCapability` naming the first offending value, or an
    /// error if the rate parameters are invalid
    pub fn from_candidates(
        candidates: impl IntoIterator<Item = Candidate>,
        check: &CapabilityCheck,
        config: &ProcessorConfig,
    ) -> Result<Self, ProcessorError> {
        let items = candidates
            .into_iter()
            .enumerate()
            .map(|(index, candidate)| {
                check.resolve(candidate).map_err(|rejected| {
                    tracing::warn!(index, label = rejected.label(), "item rejected");
                    CoreError::MissingCapability {
                        index,
                        label: rejected.label().to_string(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(items, config)
    }
}

impl<I> Processor<I> {
    /// Wait for the run to finish
    ///
    /// Joining a run that already finished returns immediately.
    ///
    /// # Errors
    ///
    /// Returns error if the processor was never started or its thread panicked
    pub fn join(&self) -> Result<(), ProcessorError> {
        if self.state() == ProcessorState::Dormant {
            return Err(ProcessorError::NotStarted);
        }

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            handle.join().map_err(|_| ProcessorError::WorkerPanicked)?;
        }

        let mut state = self.shared.state.lock();
        while *state == ProcessorState::Running {
            self.shared.finished.wait(&mut state);
        }
        match *state {
            ProcessorState::Dormant => Err(ProcessorError::NotStarted),
            _ => Ok(()),
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ProcessorState {
        *self.shared.state.lock()
    }

    /// Extraction policy
    #[must_use]
    pub const fn extraction(&self) -> Extraction {
        self.extraction
    }

    /// Number of items at construction
    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    /// Number of items still pending
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Number of items that started successfully
    #[must_use]
    pub fn succeeded_len(&self) -> usize {
        self.shared.succeeded.lock().len()
    }

    /// Number of items that failed to start
    #[must_use]
    pub fn failed_len(&self) -> usize {
        self.shared.failed.lock().len()
    }

    /// Snapshot of the dispatch metrics
    #[must_use]
    pub fn metrics(&self) -> Metrics {
        self.shared.monitor.lock().metrics().clone()
    }

    /// Snapshot of the dispatch monitor, including dispatch offsets
    #[must_use]
    pub fn monitor(&self) -> DispatchMonitor {
        self.shared.monitor.lock().clone()
    }
}

impl<I: Clone> Processor<I> {
    /// Items still pending, in insertion order
    #[must_use]
    pub fn pending(&self) -> Vec<I> {
        self.shared.pending.lock().iter().cloned().collect()
    }

    /// Items that started successfully, in dispatch order
    #[must_use]
    pub fn succeeded(&self) -> Vec<I> {
        self.shared.succeeded.lock().snapshot()
    }

    /// Items that failed to start, in dispatch order
    #[must_use]
    pub fn failed(&self) -> Vec<I> {
        self.shared
            .failed
            .lock()
            .iter()
            .map(|failed| failed.item.clone())
            .collect()
    }

    /// Failed items together with their errors
    #[must_use]
    pub fn failures(&self) -> Vec<Failed<I>> {
        self.shared.failed.lock().snapshot()
    }
}

impl<I> std::fmt::Debug for Processor<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("state", &self.state())
            .field("extraction", &self.extraction)
            .field("total", &self.total)
            .field("pending", &self.pending_len())
            .field("succeeded", &self.succeeded_len())
            .field("failed", &self.failed_len())
            .finish()
    }
}

fn dispatch_loop<I: Startable>(shared: &Shared<I>, extraction: Extraction) {
    let _terminate = TerminateOnExit(shared);
    let mut limiter = shared.limiter.lock();
    shared.monitor.lock().begin(limiter.clock().now());

    // Only this thread mutates the pending queue, so an empty check here holds
    // until the pop below.
    while !shared.pending.lock().is_empty() {
        let admission = limiter.admit();
        let Some(item) = shared.pending.lock().pop(extraction) else {
            break;
        };
        shared.monitor.lock().record_dispatch(&admission);

        match invoke(&item) {
            Ok(()) => {
                tracing::debug!(item = %item.label(), "item started");
                shared.succeeded.lock().push(item);
                shared.monitor.lock().record_success();
            }
            Err(error) => {
                tracing::warn!(item = %item.label(), error = %error, "item failed to start");
                shared.failed.lock().push(Failed { item, error });
                shared.monitor.lock().record_failure();
            }
        }
    }

    let metrics = shared.monitor.lock().metrics().clone();
    tracing::info!(
        dispatched = metrics.dispatched,
        succeeded = metrics.succeeded,
        failed = metrics.failed,
        throttled = metrics.throttled,
        "processor drained"
    );
}

/// Invoke one item's start capability, turning a panic into a failure
fn invoke<I: Startable>(item: &I) -> StartResult {
    panic::catch_unwind(AssertUnwindSafe(|| item.start()))
        .unwrap_or_else(|payload| Err(StartError::Panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
