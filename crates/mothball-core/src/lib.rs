//! Mothball core
//!
//! The conservation/restoration engine: a polymorphic trick abstraction
//! over heterogeneous resource families, the registry aggregating trick
//! instances, the run-state store, and the run engine driving conserve and
//! restore across them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 mothball CLI                     │
//! │          (conserve / restore / list)             │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               mothball-core                      │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          Trick Abstraction                │   │
//! │  │  trait Trick { conserve / restore }       │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │  Run Engine  │  │  State Store │            │
//! │  └──────┬───────┘  └──────────────┘            │
//! └─────────┼───────────────────────────────────────┘
//!           │ task trees
//! ┌─────────▼───────┐ ┌───────────────┐
//! │  mothball-task  │ │  mothball-aws │
//! │    executor     │ │    tricks     │
//! └─────────────────┘ └───────────────┘
//! ```

pub mod engine;
pub mod error;
pub mod registry;
pub mod state;
pub mod tags;
pub mod trick;

// Re-exports
pub use engine::{ConserveOptions, RestoreOptions, RunEngine, RunSummary};
pub use error::{Result, TrickError};
pub use registry::TrickRegistry;
pub use state::{RunState, StateEntry, StateLock, StateStore};
pub use tags::{TagFilter, TagPair};
pub use trick::{Conserved, DynTrick, ErasedConserved, Trick};
