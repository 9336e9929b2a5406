//! The start capability and the structural check that admits items.
//!
//! Statically typed items are admitted by the compiler through [`Startable`].
//! Values that arrive type-erased are admitted at runtime by a
//! [`CapabilityCheck`], which knows every concrete type registered as
//! startable and probes a value against them.

use indexmap::IndexMap;
use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

use crate::error::StartError;

/// Result of invoking a start capability
pub type StartResult = Result<(), StartError>;

/// A value that exposes a zero-argument `start` capability.
///
/// Implementations decide what starting means: run a computation inline,
/// print something, spawn a thread. The processor only cares whether the call
/// returned `Ok` or `Err`.
pub trait Startable: Send + Sync {
    /// Begin this item's work
    ///
    /// # Errors
    ///
    /// Returns an error if the item could not be started
    fn start(&self) -> StartResult;

    /// Human-readable label used in logs and validation errors
    fn label(&self) -> String {
        type_name::<Self>().to_string()
    }
}

impl<T: Startable + ?Sized> Startable for &T {
    fn start(&self) -> StartResult {
        (**self).start()
    }

    fn label(&self) -> String {
        (**self).label()
    }
}

impl<T: Startable + ?Sized> Startable for Box<T> {
    fn start(&self) -> StartResult {
        (**self).start()
    }

    fn label(&self) -> String {
        (**self).label()
    }
}

impl<T: Startable + ?Sized> Startable for Arc<T> {
    fn start(&self) -> StartResult {
        (**self).start()
    }

    fn label(&self) -> String {
        (**self).label()
    }
}

/// A type-erased value offered for dispatch, with a label for diagnostics
#[derive(Clone)]
pub struct Candidate {
    label: String,
    value: Arc<dyn Any + Send + Sync>,
}

impl Candidate {
    /// Wrap a value, labelling it with its type name
    #[must_use]
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wrap an already shared value
    #[must_use]
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            label: type_name::<T>().to_string(),
            value,
        }
    }

    /// Override the label
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Get the label
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Borrow the wrapped value
    #[must_use]
    pub fn value(&self) -> &(dyn Any + Send + Sync) {
        &*self.value
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

type Probe = for<'a> fn(&'a (dyn Any + Send + Sync)) -> Option<&'a dyn Startable>;
type Upcast =
    fn(Arc<dyn Any + Send + Sync>) -> Result<Arc<dyn Startable>, Arc<dyn Any + Send + Sync>>;

#[derive(Clone, Copy)]
struct Entry {
    name: &'static str,
    probe: Probe,
    upcast: Upcast,
}

fn probe_as<T: Startable + Any>(value: &(dyn Any + Send + Sync)) -> Option<&dyn Startable> {
    value.downcast_ref::<T>().map(|v| v as &dyn Startable)
}

fn upcast_as<T: Startable + Any>(
    value: Arc<dyn Any + Send + Sync>,
) -> Result<Arc<dyn Startable>, Arc<dyn Any + Send + Sync>> {
    value.downcast::<T>().map(|v| v as Arc<dyn Startable>)
}

/// Structural check for the start capability on type-erased values.
///
/// Every concrete type that should be admitted is registered once. A value
/// passes the check when its concrete type is one of them, independent of
/// any wrapper it was erased from.
#[derive(Clone, Default)]
pub struct CapabilityCheck {
    entries: IndexMap<TypeId, Entry>,
}

impl CapabilityCheck {
    /// Create an empty check that admits nothing
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a startable type (builder form)
    #[must_use]
    pub fn with<T: Startable + Any>(mut self) -> Self {
        self.register::<T>();
        self
    }

    /// Register a startable type. Registering twice is a no-op.
    pub fn register<T: Startable + Any>(&mut self) -> &mut Self {
        self.entries.entry(TypeId::of::<T>()).or_insert(Entry {
            name: type_name::<T>(),
            probe: probe_as::<T>,
            upcast: upcast_as::<T>,
        });
        self
    }

    /// Type-level membership test, no instance required
    #[must_use]
    pub fn accepts_type<T: Any>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Does this value expose a start capability?
    #[must_use]
    pub fn admits(&self, value: &(dyn Any + Send + Sync)) -> bool {
        self.probe(value).is_some()
    }

    /// View a value through its start capability, if it has one
    #[must_use]
    pub fn probe<'a>(&self, value: &'a (dyn Any + Send + Sync)) -> Option<&'a dyn Startable> {
        self.entries.values().find_map(|entry| (entry.probe)(value))
    }

    /// Convert a candidate into a shared startable item.
    ///
    /// # Errors
    ///
    /// Returns the candidate unchanged if its type is not registered
    pub fn resolve(&self, candidate: Candidate) -> Result<Arc<dyn Startable>, Candidate> {
        let Candidate { label, mut value } = candidate;
        for entry in self.entries.values() {
            match (entry.upcast)(value) {
                Ok(item) => {
                    tracing::trace!(label = %label, ty = entry.name, "candidate admitted");
                    return Ok(item);
                }
                Err(rejected) => value = rejected,
            }
        }
        Err(Candidate { label, value })
    }

    /// Names of the registered types, in registration order
    pub fn registered(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.values().map(|entry| entry.name)
    }

    /// Number of registered types
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no types are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CapabilityCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.registered()).finish()
    }
}
