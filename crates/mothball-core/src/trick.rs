//! Trick contract
//!
//! A trick is a pluggable unit of conservation/restoration for one resource
//! family. Each trick owns an opaque state shape: whatever `conserve`
//! captures must be enough, on its own, for `restore` to reverse the
//! degradation with no further lookups.

use crate::error::{Result, TrickError};
use crate::tags::TagFilter;
use async_trait::async_trait;
use mothball_task::{Task, TaskScope};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// What a trick's `conserve` hands back to the engine
///
/// The state is captured at discovery time and holds pre-change values; the
/// tasks are the deferred per-resource mutations the executor schedules
/// afterwards. Every discovered resource must appear both in the state and
/// as a task (a skip task for resources already at target), never silently
/// dropped.
pub struct Conserved<S> {
    pub state: S,
    pub tasks: Vec<Task>,
}

impl<S> Conserved<S> {
    pub fn new(state: S, tasks: Vec<Task>) -> Self {
        Self { state, tasks }
    }
}

/// A unit of conservation/restoration over one resource family
#[async_trait]
pub trait Trick: Send + Sync {
    /// Self-contained snapshot of pre-change configuration
    type State: Serialize + DeserializeOwned + Send + 'static;

    /// Stable unique identifier, used as the state-store key
    ///
    /// Must stay constant across versions; renaming it orphans previously
    /// conserved state.
    fn machine_name(&self) -> &'static str;

    /// Human label, no uniqueness requirement
    fn display_name(&self) -> &str;

    /// Whether this trick's per-resource tasks may run concurrently
    fn can_be_concurrent(&self) -> bool {
        false
    }

    /// Discover resources scoped by `tags`, record their pre-change values
    /// and return the degrading mutations as deferred tasks
    ///
    /// Under `dry_run` the returned tasks must skip instead of mutating;
    /// the state is still captured so a later restore stays consistent.
    async fn conserve(
        &self,
        scope: &TaskScope,
        dry_run: bool,
        tags: &TagFilter,
    ) -> Result<Conserved<Self::State>>;

    /// Return the tasks reversing a previously captured state
    ///
    /// Restore is idempotent: entries already at their captured value skip
    /// without mutating, and entries referencing vanished resources skip
    /// with a warning rather than failing.
    async fn restore(&self, scope: &TaskScope, dry_run: bool, state: Self::State)
    -> Result<Vec<Task>>;
}

/// Type-erased [`Conserved`], state serialized to its stored form
pub struct ErasedConserved {
    pub state: serde_json::Value,
    pub tasks: Vec<Task>,
}

/// Object-safe view of a [`Trick`]
///
/// The registry and engine only see this trait; the blanket impl below
/// encodes/decodes the trick-owned state at the boundary, so heterogeneous
/// state shapes coexist in one store.
#[async_trait]
pub trait DynTrick: Send + Sync {
    fn machine_name(&self) -> &'static str;
    fn display_name(&self) -> &str;
    fn can_be_concurrent(&self) -> bool;

    async fn conserve_erased(
        &self,
        scope: &TaskScope,
        dry_run: bool,
        tags: &TagFilter,
    ) -> Result<ErasedConserved>;

    async fn restore_erased(
        &self,
        scope: &TaskScope,
        dry_run: bool,
        state: serde_json::Value,
    ) -> Result<Vec<Task>>;
}

#[async_trait]
impl<T: Trick> DynTrick for T {
    fn machine_name(&self) -> &'static str {
        Trick::machine_name(self)
    }

    fn display_name(&self) -> &str {
        Trick::display_name(self)
    }

    fn can_be_concurrent(&self) -> bool {
        Trick::can_be_concurrent(self)
    }

    async fn conserve_erased(
        &self,
        scope: &TaskScope,
        dry_run: bool,
        tags: &TagFilter,
    ) -> Result<ErasedConserved> {
        let Conserved { state, tasks } = self.conserve(scope, dry_run, tags).await?;
        Ok(ErasedConserved {
            state: serde_json::to_value(state)?,
            tasks,
        })
    }

    async fn restore_erased(
        &self,
        scope: &TaskScope,
        dry_run: bool,
        state: serde_json::Value,
    ) -> Result<Vec<Task>> {
        let state: T::State = serde_json::from_value(state).map_err(|e| {
            TrickError::StateError(format!(
                "stored state for '{}' does not decode: {e}",
                Trick::machine_name(self)
            ))
        })?;
        self.restore(scope, dry_run, state).await
    }
}
