//! Exactly-once terminal resolution

use chrono::Utc;
use std::sync::Arc;
use tether_core::{
    OrchestratorError, ReportedStatus, TaskObserver, TaskReport, TaskResult, TaskState,
};
use tokio::task::AbortHandle;
use tracing::{debug, info};

use crate::record::RemoteTaskRecord;
use crate::registry::TaskRegistry;

/// Commits terminal states. Every outcome path funnels through
/// [`Resolver::finish`], so the first writer wins and the engine hears about
/// each task once.
#[derive(Clone)]
pub struct Resolver {
    registry: TaskRegistry,
    observer: Arc<dyn TaskObserver>,
}

impl Resolver {
    pub fn new(registry: TaskRegistry, observer: Arc<dyn TaskObserver>) -> Self {
        Self { registry, observer }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn observer(&self) -> &Arc<dyn TaskObserver> {
        &self.observer
    }

    /// Move `record` from one of `expected` into the terminal state `target`
    /// and write `result`. The loser of a race gets `AlreadyResolved` (or
    /// `NotAwaitingCallback` when the task is live but in the wrong state)
    /// and nothing is reported.
    pub fn finish(
        &self,
        record: &Arc<RemoteTaskRecord>,
        expected: &[TaskState],
        target: TaskState,
        result: TaskResult,
    ) -> Result<TaskReport, OrchestratorError> {
        debug_assert!(target.is_terminal());

        let (report, background) = {
            let mut inner = record.lock();
            let current = inner.state;

            if current.is_terminal() {
                return Err(OrchestratorError::AlreadyResolved {
                    task_id: record.task_id().clone(),
                    state: current,
                });
            }
            if !expected.contains(&current) || !current.can_transition_to(target) {
                return Err(OrchestratorError::NotAwaitingCallback {
                    task_id: record.task_id().clone(),
                    state: current,
                });
            }

            inner.state = target;
            inner.result = Some(result.clone());

            let reason = inner.cancel_reason.clone();
            let status = match target {
                TaskState::Completed => ReportedStatus::Completed,
                TaskState::Died => ReportedStatus::Died,
                TaskState::CancelSucceeded | TaskState::CancelTimedOut => reason
                    .as_ref()
                    .map(|r| r.status)
                    .unwrap_or(ReportedStatus::Cancelled),
                _ => ReportedStatus::Failed,
            };

            let report = TaskReport {
                task_id: record.task_id().clone(),
                process_instance_id: record.process_instance_id().to_string(),
                node_name: record.node_name().to_string(),
                state: target,
                status,
                result,
                reason,
                retry_count: inner.retry_count,
                resolved_at: Utc::now(),
            };
            (report, inner.take_background())
        };

        abort_others(background);

        info!(
            "Task {} resolved: {} (reported {})",
            report.task_id, report.state, report.status
        );
        self.observer.task_resolved(&report);
        self.registry.remove(record);

        Ok(report)
    }
}

/// Abort the record's background tasks, except the one doing the resolving
fn abort_others(handles: Vec<AbortHandle>) {
    let current = tokio::task::try_id();
    for handle in handles {
        if Some(handle.id()) == current {
            continue;
        }
        debug!("Aborting background task {}", handle.id());
        handle.abort();
    }
}
