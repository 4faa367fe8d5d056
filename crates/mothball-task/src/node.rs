//! Task tree building blocks

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// How a group schedules its children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Concurrency {
    /// Children run in declared order, each to completion before the next
    Sequential,
    /// Children start together and may complete in any order
    Concurrent,
}

/// The result a leaf action reports back to the executor
pub enum TaskOutcome {
    /// The operation was applied
    Completed,
    /// Nothing to do; the reason is surfaced in the report
    Skipped(String),
    /// The action produced a subtree to be scheduled in its place
    Expanded(TaskGroup),
}

impl TaskOutcome {
    /// Convenience for skip reasons built from format strings
    pub fn skipped(reason: impl Into<String>) -> Self {
        TaskOutcome::Skipped(reason.into())
    }
}

type ActionFn = Box<dyn FnOnce(TaskScope) -> BoxFuture<'static, anyhow::Result<TaskOutcome>> + Send>;

pub(crate) enum TaskKind {
    Action(ActionFn),
    Group(TaskGroup),
}

/// A named node in the task tree
pub struct Task {
    pub(crate) title: String,
    pub(crate) kind: TaskKind,
}

impl Task {
    /// Leaf task backed by an async action
    pub fn action<F, Fut>(title: impl Into<String>, run: F) -> Self
    where
        F: FnOnce(TaskScope) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<TaskOutcome>> + Send + 'static,
    {
        Self {
            title: title.into(),
            kind: TaskKind::Action(Box::new(move |scope| Box::pin(run(scope)))),
        }
    }

    /// Task whose children are known up front
    pub fn group(title: impl Into<String>, group: TaskGroup) -> Self {
        Self {
            title: title.into(),
            kind: TaskKind::Group(group),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }
}

/// An ordered set of tasks with a scheduling mode
pub struct TaskGroup {
    pub(crate) mode: Concurrency,
    pub(crate) tasks: Vec<Task>,
}

impl TaskGroup {
    pub fn new(mode: Concurrency) -> Self {
        Self {
            mode,
            tasks: Vec::new(),
        }
    }

    pub fn sequential() -> Self {
        Self::new(Concurrency::Sequential)
    }

    pub fn concurrent() -> Self {
        Self::new(Concurrency::Concurrent)
    }

    pub fn with_tasks(mode: Concurrency, tasks: Vec<Task>) -> Self {
        Self { mode, tasks }
    }

    pub fn push(&mut self, task: Task) {
        self.tasks.push(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Handle given to a leaf action for progress reporting
///
/// The scope identifies the node by its path in the tree; messages are
/// emitted as tracing events so they interleave correctly under concurrent
/// groups.
#[derive(Debug, Clone)]
pub struct TaskScope {
    path: String,
}

impl TaskScope {
    pub(crate) fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// The slash-joined titles from the root down to this node
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn progress(&self, message: impl AsRef<str>) {
        tracing::info!(task = %self.path, "{}", message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        tracing::warn!(task = %self.path, "{}", message.as_ref());
    }
}
