//! Tree scheduling
//!
//! Suspension only happens inside leaf actions (network waits); concurrent
//! groups interleave cooperatively via `join_all`. A failed branch neither
//! cancels its siblings nor stops later sequential children, and there is no
//! timeout above whatever bound a leaf operation enforces itself.

use crate::node::{Concurrency, Task, TaskGroup, TaskKind, TaskOutcome, TaskScope};
use crate::report::{TaskReport, TaskStatus};
use futures_util::future::{BoxFuture, join_all};

/// Run a task tree to completion and return the per-node report
pub async fn run(task: Task) -> TaskReport {
    run_task(task, String::new()).await
}

fn run_task(task: Task, parent_path: String) -> BoxFuture<'static, TaskReport> {
    Box::pin(async move {
        let path = join_path(&parent_path, &task.title);
        match task.kind {
            TaskKind::Action(action) => {
                tracing::debug!(task = %path, "task started");
                let scope = TaskScope::new(path.clone());
                match action(scope).await {
                    Ok(TaskOutcome::Completed) => {
                        tracing::debug!(task = %path, "task succeeded");
                        TaskReport::leaf(task.title, TaskStatus::Succeeded, None)
                    }
                    Ok(TaskOutcome::Skipped(reason)) => {
                        tracing::info!(task = %path, reason = %reason, "task skipped");
                        TaskReport::leaf(task.title, TaskStatus::Skipped, Some(reason))
                    }
                    Ok(TaskOutcome::Expanded(group)) => {
                        let children = run_group(group, path).await;
                        TaskReport::parent(task.title, children)
                    }
                    Err(error) => {
                        let message = format!("{error:#}");
                        tracing::warn!(task = %path, error = %message, "task failed");
                        TaskReport::leaf(task.title, TaskStatus::Failed, Some(message))
                    }
                }
            }
            TaskKind::Group(group) => {
                let children = run_group(group, path).await;
                TaskReport::parent(task.title, children)
            }
        }
    })
}

async fn run_group(group: TaskGroup, path: String) -> Vec<TaskReport> {
    match group.mode {
        Concurrency::Sequential => {
            let mut reports = Vec::with_capacity(group.tasks.len());
            for task in group.tasks {
                reports.push(run_task(task, path.clone()).await);
            }
            reports
        }
        Concurrency::Concurrent => {
            join_all(
                group
                    .tasks
                    .into_iter()
                    .map(|task| run_task(task, path.clone())),
            )
            .await
        }
    }
}

fn join_path(parent: &str, title: &str) -> String {
    if parent.is_empty() {
        title.to_string()
    } else {
        format!("{parent}/{title}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn record(log: &Arc<Mutex<Vec<&'static str>>>, entry: &'static str) {
        log.lock().unwrap().push(entry);
    }

    #[tokio::test]
    async fn sequential_children_run_in_declared_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut group = TaskGroup::sequential();
        for name in ["first", "second", "third"] {
            let log = log.clone();
            group.push(Task::action(name, move |_| async move {
                record(&log, name);
                Ok(TaskOutcome::Completed)
            }));
        }

        let report = run(Task::group("root", group)).await;
        assert!(report.is_success());
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn sequential_failure_does_not_stop_later_siblings() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut group = TaskGroup::sequential();
        group.push(Task::action("boom", |_| async {
            Err(anyhow::anyhow!("provider rejected the call"))
        }));
        let log2 = log.clone();
        group.push(Task::action("after", move |_| async move {
            record(&log2, "after");
            Ok(TaskOutcome::Completed)
        }));

        let report = run(Task::group("root", group)).await;
        assert!(!report.is_success());
        assert_eq!(report.status, TaskStatus::Failed);
        assert_eq!(report.failure_count(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["after"]);
        assert_eq!(
            report.children[0].detail.as_deref(),
            Some("provider rejected the call")
        );
        assert_eq!(report.children[1].status, TaskStatus::Succeeded);
    }

    #[tokio::test]
    async fn concurrent_children_all_complete() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut group = TaskGroup::concurrent();
        // the slow task is declared first; both must finish regardless
        let slow_log = log.clone();
        group.push(Task::action("slow", move |_| async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            record(&slow_log, "slow");
            Ok(TaskOutcome::Completed)
        }));
        let fast_log = log.clone();
        group.push(Task::action("fast", move |_| async move {
            record(&fast_log, "fast");
            Ok(TaskOutcome::Completed)
        }));

        let report = run(Task::group("root", group)).await;
        assert!(report.is_success());
        assert_eq!(*log.lock().unwrap(), vec!["fast", "slow"]);
    }

    #[tokio::test]
    async fn concurrent_failure_leaves_siblings_running() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut group = TaskGroup::concurrent();
        group.push(Task::action("boom", |_| async {
            Err(anyhow::anyhow!("timed out waiting for stability"))
        }));
        let survivor = log.clone();
        group.push(Task::action("survivor", move |_| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            record(&survivor, "survivor");
            Ok(TaskOutcome::Completed)
        }));

        let report = run(Task::group("root", group)).await;
        assert!(!report.is_success());
        assert_eq!(*log.lock().unwrap(), vec!["survivor"]);
        assert_eq!(report.children[1].status, TaskStatus::Succeeded);
    }

    #[tokio::test]
    async fn action_expands_into_subtree() {
        let task = Task::action("parent", |_| async {
            let mut group = TaskGroup::concurrent();
            group.push(Task::action("child-a", |_| async {
                Ok(TaskOutcome::Completed)
            }));
            group.push(Task::action("child-b", |_| async {
                Ok(TaskOutcome::skipped("already at zero"))
            }));
            Ok(TaskOutcome::Expanded(group))
        });

        let report = run(task).await;
        assert!(report.is_success());
        assert_eq!(report.status, TaskStatus::Succeeded);
        assert_eq!(report.children.len(), 2);
        assert_eq!(report.children[1].status, TaskStatus::Skipped);
        assert_eq!(report.children[1].detail.as_deref(), Some("already at zero"));
    }

    #[tokio::test]
    async fn expansion_failure_bubbles_to_the_expanding_node() {
        let task = Task::action("parent", |_| async {
            let mut group = TaskGroup::sequential();
            group.push(Task::action("child", |_| async {
                Err(anyhow::anyhow!("no such resource"))
            }));
            Ok(TaskOutcome::Expanded(group))
        });

        let report = run(task).await;
        assert_eq!(report.status, TaskStatus::Failed);
        assert_eq!(report.failure_count(), 1);
    }

    #[tokio::test]
    async fn all_skipped_children_still_succeed() {
        let mut group = TaskGroup::sequential();
        group.push(Task::action("a", |_| async {
            Ok(TaskOutcome::skipped("dry-run"))
        }));
        group.push(Task::action("b", |_| async {
            Ok(TaskOutcome::skipped("dry-run"))
        }));

        let report = run(Task::group("root", group)).await;
        assert!(report.is_success());
        assert_eq!(report.status, TaskStatus::Succeeded);
    }

    #[tokio::test]
    async fn empty_group_succeeds() {
        let report = run(Task::group("root", TaskGroup::concurrent())).await;
        assert!(report.is_success());
        assert!(report.children.is_empty());
    }

    #[tokio::test]
    async fn nested_groups_aggregate_bottom_up() {
        let mut inner = TaskGroup::concurrent();
        inner.push(Task::action("ok", |_| async { Ok(TaskOutcome::Completed) }));
        inner.push(Task::action("bad", |_| async {
            Err(anyhow::anyhow!("rejected"))
        }));

        let mut outer = TaskGroup::sequential();
        outer.push(Task::group("inner", inner));
        outer.push(Task::action("sibling", |_| async {
            Ok(TaskOutcome::Completed)
        }));

        let report = run(Task::group("root", outer)).await;
        assert_eq!(report.status, TaskStatus::Failed);
        assert_eq!(report.children[0].status, TaskStatus::Failed);
        assert_eq!(report.children[1].status, TaskStatus::Succeeded);
        assert_eq!(report.failure_count(), 1);
    }
}
