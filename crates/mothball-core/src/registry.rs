//! Trick registry

use crate::trick::{DynTrick, Trick};
use std::sync::Arc;

/// Ordered collection of trick instances
///
/// Built exactly once at process start and passed by reference into the run
/// engine; there is no ambient global. Uniqueness of machine names is a
/// caller invariant; the registry appends blindly.
#[derive(Default, Clone)]
pub struct TrickRegistry {
    tricks: Vec<Arc<dyn DynTrick>>,
}

impl TrickRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a trick, erasing its state type
    pub fn register<T: Trick + 'static>(&mut self, trick: T) {
        self.tricks.push(Arc::new(trick));
    }

    /// Append an already-erased trick
    pub fn register_dyn(&mut self, trick: Arc<dyn DynTrick>) {
        self.tricks.push(trick);
    }

    /// All tricks in registration order
    pub fn all(&self) -> &[Arc<dyn DynTrick>] {
        &self.tricks
    }

    /// Linear scan by machine name
    pub fn find(&self, machine_name: &str) -> Option<Arc<dyn DynTrick>> {
        self.tricks
            .iter()
            .find(|t| t.machine_name() == machine_name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.tricks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tricks.is_empty()
    }
}
