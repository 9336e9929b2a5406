//! Thread-backed item.
//!
//! A [`SpawnItem`] behaves like a thread object: starting it launches its
//! body on a fresh named OS thread and returns immediately. It can be started
//! at most once.

use parking_lot::Mutex;
use std::fmt;
use std::thread::{self, JoinHandle};

use crate::capability::{StartResult, Startable};
use crate::error::StartError;

type Body = Box<dyn FnOnce() + Send + 'static>;

/// An item whose start capability spawns its body on a new thread
pub struct SpawnItem {
    /// Thread name
    name: String,
    /// Body, taken on first start
    body: Mutex<Option<Body>>,
    /// Handle of the spawned thread, taken on join
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SpawnItem {
    /// Create a new thread-backed item
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            name: name.into(),
            body: Mutex::new(Some(Box::new(body))),
            handle: Mutex::new(None),
        }
    }

    /// Get the thread name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the item has been started
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.body.lock().is_none()
    }

    /// Wait for the spawned thread.
    ///
    /// Returns `None` if the item was never started or was already joined.
    pub fn join(&self) -> Option<thread::Result<()>> {
        let handle = self.handle.lock().take()?;
        Some(handle.join())
    }
}

impl Startable for SpawnItem {
    fn start(&self) -> StartResult {
        let body = self.body.lock().take().ok_or(StartError::AlreadyStarted)?;
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(body)
            .map_err(|err| StartError::Spawn(err.to_string()))?;
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    fn label(&self) -> String {
        format!("thread:{}", self.name)
    }
}

impl fmt::Debug for SpawnItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnItem")
            .field("name", &self.name)
            .field("started", &self.is_started())
            .finish()
    }
}
