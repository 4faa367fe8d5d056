//! Per-node status reporting

use serde::{Deserialize, Serialize};

/// Lifecycle status of a task node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Skipped,
    Succeeded,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Skipped => write!(f, "skipped"),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Completed-run view of a task node and its descendants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub title: String,
    pub status: TaskStatus,
    /// Skip reason or error message, when there is one
    pub detail: Option<String>,
    pub children: Vec<TaskReport>,
}

impl TaskReport {
    pub(crate) fn leaf(title: String, status: TaskStatus, detail: Option<String>) -> Self {
        Self {
            title,
            status,
            detail,
            children: Vec::new(),
        }
    }

    pub(crate) fn parent(title: String, children: Vec<TaskReport>) -> Self {
        let status = aggregate(&children);
        Self {
            title,
            status,
            detail: None,
            children,
        }
    }

    /// True iff every node in this subtree succeeded or was skipped
    pub fn is_success(&self) -> bool {
        self.status != TaskStatus::Failed
            && self.children.iter().all(TaskReport::is_success)
    }

    /// Number of failed leaf nodes in this subtree
    ///
    /// Parents that fail only because a descendant failed are not counted,
    /// so the number matches the individual operations that went wrong.
    pub fn failure_count(&self) -> usize {
        if self.children.is_empty() {
            usize::from(self.status == TaskStatus::Failed)
        } else {
            self.children
                .iter()
                .map(TaskReport::failure_count)
                .sum()
        }
    }
}

/// A parent fails if any child failed; skips count as success
fn aggregate(children: &[TaskReport]) -> TaskStatus {
    if children.iter().any(|c| !c.is_success()) {
        TaskStatus::Failed
    } else {
        TaskStatus::Succeeded
    }
}
