//! Inbound completion callbacks

use serde_json::Value;
use tether_core::{
    CancelReason, OrchestratorError, TaskError, TaskId, TaskReport, TaskResult, TaskState,
};
use tracing::{debug, info, warn};

use crate::cancellation::CancellationCoordinator;
use crate::registry::TaskRegistry;
use crate::resolver::Resolver;

/// States in which a callback may still resolve the task. SENDING covers a
/// remote that calls back before its dispatch response was processed.
const ACCEPTING: [TaskState; 3] = [
    TaskState::Sending,
    TaskState::AwaitingCallback,
    TaskState::CancelRequested,
];

#[derive(Clone)]
pub struct CallbackReceiver {
    registry: TaskRegistry,
    resolver: Resolver,
    coordinator: CancellationCoordinator,
}

impl CallbackReceiver {
    pub fn new(registry: TaskRegistry, resolver: Resolver, coordinator: CancellationCoordinator) -> Self {
        Self {
            registry,
            resolver,
            coordinator,
        }
    }

    /// Resolve the task from the remote's callback payload. Late and
    /// duplicate callbacks return an error and change nothing.
    pub fn on_callback(&self, task_id: &TaskId, payload: Value) -> Result<TaskReport, OrchestratorError> {
        let Some(record) = self.registry.get(task_id) else {
            warn!("Callback for unknown or already resolved task {}", task_id);
            return Err(OrchestratorError::UnknownTask(task_id.clone()));
        };

        let verdict = match record.predicate() {
            None => Ok(()),
            Some(predicate) => match predicate.evaluate(&payload) {
                Ok(true) => Ok(()),
                Ok(false) => Err(format!("payload does not satisfy '{}'", predicate)),
                Err(e) => Err(e.to_string()),
            },
        };

        let (target, result, failure) = match verdict {
            Ok(()) => (TaskState::Completed, TaskResult::completed(payload), None),
            Err(message) => (
                TaskState::Failed,
                TaskResult::failed_with_payload(
                    TaskError::ApplicationFailure {
                        message: message.clone(),
                    },
                    payload,
                ),
                Some(message),
            ),
        };

        let report = self
            .resolver
            .finish(&record, &ACCEPTING, target, result)
            .inspect_err(|e| debug!("Callback for {} discarded: {}", task_id, e))?;

        if let Some(message) = failure {
            self.cancel_siblings(task_id, record.process_instance_id(), &message);
        }

        Ok(report)
    }

    /// Cancel-on-failure: every other live task of the same process instance
    fn cancel_siblings(&self, failed: &TaskId, process_instance_id: &str, message: &str) {
        let siblings = self.registry.siblings(process_instance_id, failed);
        if siblings.is_empty() {
            return;
        }

        info!(
            "Task {} failed, cancelling {} sibling task(s) in process {}",
            failed,
            siblings.len(),
            process_instance_id
        );
        for sibling in siblings {
            let reason = CancelReason::sibling_failed(failed, message);
            if let Err(e) = self.coordinator.spawn_cancel(&sibling, reason) {
                debug!("Sibling {} not cancelled: {}", sibling.task_id(), e);
            }
        }
    }
}
