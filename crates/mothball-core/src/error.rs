//! Trick and engine error types

use thiserror::Error;

/// Errors raised by tricks and the run engine
///
/// Discovery failures are fatal to the trick's subtree only; mutation and
/// stability failures are fatal to a single resource's node. The executor
/// converts every one of these into a failed node rather than aborting the
/// run.
#[derive(Error, Debug)]
pub enum TrickError {
    #[error("Discovery failed: {0}")]
    Discovery(String),

    #[error("Mutation failed for {resource}: {reason}")]
    Mutation { resource: String, reason: String },

    #[error("Timed out waiting for {resource} to stabilize after {attempts} attempts")]
    StabilityTimeout { resource: String, attempts: u32 },

    #[error("Captured state no longer matches reality: {0}")]
    StateMismatch(String),

    #[error("No registered trick named: {0}")]
    UnknownTrick(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrickError>;
