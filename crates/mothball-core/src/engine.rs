//! Run engine
//!
//! Drives conserve/restore runs across selected tricks. Each trick gets a
//! branch of the task tree; captured state accumulates in memory and is
//! written to the store in a single terminal save, so concurrently finishing
//! branches can never interleave partial writes.

use crate::error::{Result, TrickError};
use crate::registry::TrickRegistry;
use crate::state::{RunState, StateEntry, StateStore};
use crate::tags::TagFilter;
use crate::trick::DynTrick;
use mothball_task::{Concurrency, Task, TaskGroup, TaskOutcome, TaskReport};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Selection and mode for a conserve run
#[derive(Debug, Clone, Default)]
pub struct ConserveOptions {
    pub dry_run: bool,
    pub tags: TagFilter,
    /// Machine names to run exclusively; empty means all registered tricks
    pub only: Vec<String>,
    /// Machine names to leave out
    pub skip: Vec<String>,
}

/// Mode for a restore run
#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    pub dry_run: bool,
}

/// Outcome of a conserve or restore run
pub struct RunSummary {
    /// Per-branch pass/fail tree
    pub report: TaskReport,

    /// Trick entries captured (conserve) or scheduled (restore)
    pub entries: usize,

    pub dry_run: bool,
}

impl RunSummary {
    /// The single boolean the process exit code reflects
    pub fn is_success(&self) -> bool {
        self.report.is_success()
    }
}

/// Orchestrates runs over a registry and a state store
pub struct RunEngine<'a> {
    registry: &'a TrickRegistry,
    store: StateStore,
}

impl<'a> RunEngine<'a> {
    pub fn new(registry: &'a TrickRegistry, store: StateStore) -> Self {
        Self { registry, store }
    }

    /// Capture pre-change state and apply the degrading mutations
    ///
    /// Every selected trick runs even when an earlier one fails; a failing
    /// trick contributes no state entry. The captured entries are persisted
    /// even under dry-run (flagged as such) so a later restore stays
    /// consistent with what conserve saw.
    pub async fn conserve(&self, options: ConserveOptions) -> Result<RunSummary> {
        let tricks = self.select(&options)?;
        let lock = self.store.acquire_lock().await?;

        let captured: Arc<Mutex<Vec<(String, StateEntry)>>> = Arc::new(Mutex::new(Vec::new()));

        let mut root = TaskGroup::sequential();
        for trick in tricks {
            root.push(conserve_branch(
                trick,
                captured.clone(),
                options.dry_run,
                options.tags.clone(),
            ));
        }

        let report = mothball_task::run(Task::group("conserve", root)).await;

        let mut run_state = RunState::new();
        let entries: Vec<(String, StateEntry)> = captured.lock().await.drain(..).collect();
        let count = entries.len();
        for (name, entry) in entries {
            run_state.set(name, entry);
        }
        self.store.save(&run_state).await?;
        lock.release().await?;

        Ok(RunSummary {
            report,
            entries: count,
            dry_run: options.dry_run,
        })
    }

    /// Reverse a previous conserve from its persisted state
    ///
    /// Entries with no matching registered trick are skipped with a warning;
    /// registered tricks with no entry simply do not appear in the run. The
    /// state file is removed only after a fully successful non-dry-run
    /// restore with no unknown entries left behind; otherwise it is kept so
    /// the run can be retried.
    pub async fn restore(&self, options: RestoreOptions) -> Result<RunSummary> {
        let lock = self.store.acquire_lock().await?;
        let run_state = match self.store.load().await {
            Ok(state) => state,
            Err(e) => {
                lock.release().await?;
                return Err(e);
            }
        };

        let mut unknown = 0usize;
        let mut root = TaskGroup::sequential();
        for (name, entry) in run_state.iter() {
            match self.registry.find(name) {
                Some(trick) => {
                    root.push(restore_branch(trick, entry.clone(), options.dry_run));
                }
                None => {
                    unknown += 1;
                    tracing::warn!(
                        trick = %name,
                        "persisted entry has no registered trick, skipping"
                    );
                    let name = name.clone();
                    root.push(Task::action(name.clone(), move |_scope| async move {
                        Ok(TaskOutcome::skipped(format!(
                            "no registered trick named '{name}'"
                        )))
                    }));
                }
            }
        }

        let entries = run_state.len();
        let report = mothball_task::run(Task::group("restore", root)).await;

        if report.is_success() && unknown == 0 && !options.dry_run {
            self.store.clear().await?;
        }
        lock.release().await?;

        Ok(RunSummary {
            report,
            entries,
            dry_run: options.dry_run,
        })
    }

    /// Resolve `only`/`skip` against the registry, in registration order
    fn select(&self, options: &ConserveOptions) -> Result<Vec<Arc<dyn DynTrick>>> {
        for name in options.only.iter().chain(options.skip.iter()) {
            if self.registry.find(name).is_none() {
                return Err(TrickError::UnknownTrick(name.clone()));
            }
        }

        Ok(self
            .registry
            .all()
            .iter()
            .filter(|t| {
                let name = t.machine_name();
                (options.only.is_empty() || options.only.iter().any(|o| o == name))
                    && !options.skip.iter().any(|s| s == name)
            })
            .cloned()
            .collect())
    }
}

fn conserve_branch(
    trick: Arc<dyn DynTrick>,
    captured: Arc<Mutex<Vec<(String, StateEntry)>>>,
    dry_run: bool,
    tags: TagFilter,
) -> Task {
    let title = trick.display_name().to_string();
    Task::action(title, move |scope| async move {
        let conserved = trick.conserve_erased(&scope, dry_run, &tags).await?;
        captured.lock().await.push((
            trick.machine_name().to_string(),
            StateEntry::new(conserved.state, dry_run),
        ));
        Ok(TaskOutcome::Expanded(TaskGroup::with_tasks(
            branch_mode(trick.as_ref()),
            conserved.tasks,
        )))
    })
}

fn restore_branch(trick: Arc<dyn DynTrick>, entry: StateEntry, dry_run: bool) -> Task {
    let title = trick.display_name().to_string();
    Task::action(title, move |scope| async move {
        let tasks = trick
            .restore_erased(&scope, dry_run, entry.state)
            .await?;
        Ok(TaskOutcome::Expanded(TaskGroup::with_tasks(
            branch_mode(trick.as_ref()),
            tasks,
        )))
    })
}

/// The concurrency advisory is interpreted here, not inside tricks
fn branch_mode(trick: &dyn DynTrick) -> Concurrency {
    if trick.can_be_concurrent() {
        Concurrency::Concurrent
    } else {
        Concurrency::Sequential
    }
}
