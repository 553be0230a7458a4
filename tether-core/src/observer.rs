//! Engine notification seam

use std::sync::Arc;
use std::time::Duration;

use crate::result::{TaskError, TaskReport};
use crate::task::TaskId;

/// Receives task outcomes. `task_resolved` is called exactly once per task,
/// synchronously, from whichever path committed the terminal state.
/// Implementations must not block; hand slow work to a spawned task.
pub trait TaskObserver: Send + Sync {
    fn task_resolved(&self, report: &TaskReport);

    /// A dispatch attempt failed at the transport level and will be retried
    fn retry_scheduled(&self, _task_id: &TaskId, _attempt: u32, _delay: Duration, _cause: &TaskError) {}
}

/// Observer that drops every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TaskObserver for NoopObserver {
    fn task_resolved(&self, _report: &TaskReport) {}
}

/// Forwards every notification to each registered observer in order
#[derive(Default, Clone)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn TaskObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn TaskObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn push(&mut self, observer: Arc<dyn TaskObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl TaskObserver for ObserverSet {
    fn task_resolved(&self, report: &TaskReport) {
        for observer in &self.observers {
            observer.task_resolved(report);
        }
    }

    fn retry_scheduled(&self, task_id: &TaskId, attempt: u32, delay: Duration, cause: &TaskError) {
        for observer in &self.observers {
            observer.retry_scheduled(task_id, attempt, delay, cause);
        }
    }
}
