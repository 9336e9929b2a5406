//! Pending and outcome queues.
//!
//! Items enter the pending queue at the back. Which end they leave from is
//! the [`Extraction`] policy:
//! - `Fifo` pops the front (queue order)
//! - `Lifo` pops the back (stack order)
//!
//! Outcome queues only ever grow during a run.

use kickoff_core::StartError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Which end of the pending queue the next item is taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Extraction {
    /// Opposite end from insertion
    #[default]
    Fifo,
    /// Same end as insertion
    Lifo,
}

impl std::fmt::Display for Extraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fifo => write!(f, "fifo"),
            Self::Lifo => write!(f, "lifo"),
        }
    }
}

/// Items awaiting dispatch
#[derive(Debug, Clone)]
pub struct PendingQueue<I> {
    items: VecDeque<I>,
}

impl<I> PendingQueue<I> {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    /// Insert an item at the back
    pub fn push(&mut self, item: I) {
        self.items.push_back(item);
    }

    /// Take the next item according to the extraction policy
    pub fn pop(&mut self, extraction: Extraction) -> Option<I> {
        match extraction {
            Extraction::Fifo => self.items.pop_front(),
            Extraction::Lifo => self.items.pop_back(),
        }
    }

    /// Number of items still pending
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if nothing is pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &I> {
        self.items.iter()
    }
}

impl<I> Default for PendingQueue<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> FromIterator<I> for PendingQueue<I> {
    fn from_iter<T: IntoIterator<Item = I>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

/// Append-only record of dispatched entries, in dispatch order
#[derive(Debug, Clone)]
pub struct OutcomeQueue<T> {
    entries: VecDeque<T>,
}

impl<T> OutcomeQueue<T> {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Append an entry
    pub fn push(&mut self, entry: T) {
        self.entries.push_back(entry);
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in dispatch order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }
}

impl<T: Clone> OutcomeQueue<T> {
    /// Copy of the current entries
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

impl<T> Default for OutcomeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// An item whose start capability failed, with the captured error
#[derive(Debug, Clone)]
pub struct Failed<I> {
    /// The item
    pub item: I,
    /// Why it failed
    pub error: StartError,
}
