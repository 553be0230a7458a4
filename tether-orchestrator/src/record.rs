//! One outstanding remote invocation

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use tether_core::{CancelReason, TaskId, TaskOptions, TaskResult, TaskSnapshot, TaskState};
use tether_http::HttpRequest;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::predicate::SuccessPredicate;

/// Immutable identity and request description plus the mutable lifecycle
/// state behind a per-record mutex. The mutex is never held across an
/// `.await`.
pub struct RemoteTaskRecord {
    task_id: TaskId,
    process_instance_id: String,
    node_name: String,
    request: HttpRequest,
    options: TaskOptions,
    predicate: Option<SuccessPredicate>,
    created_at: DateTime<Utc>,
    inner: Mutex<RecordState>,
}

pub(crate) struct RecordState {
    pub(crate) state: TaskState,
    /// Set at most once, by the dispatcher
    pub(crate) cancel_url: Option<String>,
    pub(crate) retry_count: u32,
    pub(crate) task_timeout_deadline: Option<Instant>,
    pub(crate) cancel_timeout_deadline: Option<Instant>,
    /// `None` disables liveness checking
    pub(crate) heartbeat_deadline: Option<Instant>,
    pub(crate) result: Option<TaskResult>,
    pub(crate) cancel_reason: Option<CancelReason>,
    /// Dispatch, timer and cancel tasks working on this record
    background: Vec<AbortHandle>,
}

impl RecordState {
    pub(crate) fn take_background(&mut self) -> Vec<AbortHandle> {
        std::mem::take(&mut self.background)
    }
}

impl RemoteTaskRecord {
    pub fn new(
        task_id: TaskId,
        process_instance_id: impl Into<String>,
        node_name: impl Into<String>,
        request: HttpRequest,
        options: TaskOptions,
        predicate: Option<SuccessPredicate>,
    ) -> Self {
        Self {
            task_id,
            process_instance_id: process_instance_id.into(),
            node_name: node_name.into(),
            request,
            options,
            predicate,
            created_at: Utc::now(),
            inner: Mutex::new(RecordState {
                state: TaskState::Pending,
                cancel_url: None,
                retry_count: 0,
                task_timeout_deadline: None,
                cancel_timeout_deadline: None,
                heartbeat_deadline: None,
                result: None,
                cancel_reason: None,
                background: Vec::new(),
            }),
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn process_instance_id(&self) -> &str {
        &self.process_instance_id
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn options(&self) -> &TaskOptions {
        &self.options
    }

    pub fn predicate(&self) -> Option<&SuccessPredicate> {
        self.predicate.as_ref()
    }

    pub fn state(&self) -> TaskState {
        self.inner.lock().state
    }

    pub fn retry_count(&self) -> u32 {
        self.inner.lock().retry_count
    }

    pub fn cancel_url(&self) -> Option<String> {
        self.inner.lock().cancel_url.clone()
    }

    /// The terminal result, once written
    pub fn result(&self) -> Option<TaskResult> {
        self.inner.lock().result.clone()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, RecordState> {
        self.inner.lock()
    }

    /// Compare-and-set on the state. Succeeds only when the current state is
    /// one of `expected` and the state machine allows `next`; returns the
    /// previous state, or the current one on refusal.
    pub(crate) fn advance(&self, expected: &[TaskState], next: TaskState) -> Result<TaskState, TaskState> {
        let mut inner = self.inner.lock();
        let current = inner.state;
        if expected.contains(&current) && current.can_transition_to(next) {
            inner.state = next;
            Ok(current)
        } else {
            Err(current)
        }
    }

    /// Track a spawned task so resolution can stop it. A record that is
    /// already terminal aborts the task straight away.
    pub(crate) fn attach(&self, handle: AbortHandle) {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            handle.abort();
        } else {
            inner.background.retain(|h| !h.is_finished());
            inner.background.push(handle);
        }
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let now = Instant::now();
        let inner = self.inner.lock();
        TaskSnapshot {
            task_id: self.task_id.clone(),
            process_instance_id: self.process_instance_id.clone(),
            node_name: self.node_name.clone(),
            state: inner.state,
            retry_count: inner.retry_count,
            max_retries: self.options.max_retries,
            cancel_url: inner.cancel_url.clone(),
            task_timeout_in: inner
                .task_timeout_deadline
                .map(|deadline| deadline.saturating_duration_since(now)),
            heartbeat_expires_in: inner
                .heartbeat_deadline
                .map(|deadline| deadline.saturating_duration_since(now)),
            cancel_expires_in: inner
                .cancel_timeout_deadline
                .map(|deadline| deadline.saturating_duration_since(now)),
            created_at: self.created_at,
        }
    }
}

impl std::fmt::Debug for RemoteTaskRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTaskRecord")
            .field("task_id", &self.task_id)
            .field("process_instance_id", &self.process_instance_id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    pub(crate) fn record(id: &str, process: &str) -> Arc<RemoteTaskRecord> {
        Arc::new(RemoteTaskRecord::new(
            TaskId::from(id),
            process,
            "node",
            HttpRequest::post("http://remote.local/jobs"),
            TaskOptions::default(),
            None,
        ))
    }

    #[test]
    fn advance_is_compare_and_set() {
        let record = record("t-1", "p-1");
        assert_eq!(record.advance(&[TaskState::Pending], TaskState::Sending), Ok(TaskState::Pending));
        assert_eq!(
            record.advance(&[TaskState::Pending], TaskState::Sending),
            Err(TaskState::Sending)
        );
        // Expected state matches but the state machine refuses
        assert_eq!(
            record.advance(&[TaskState::Sending], TaskState::Died),
            Err(TaskState::Sending)
        );
        assert_eq!(record.state(), TaskState::Sending);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_reports_remaining_time() {
        let record = record("t-2", "p-1");
        {
            let mut inner = record.lock();
            inner.state = TaskState::AwaitingCallback;
            inner.heartbeat_deadline = Some(Instant::now() + Duration::from_secs(10));
        }
        tokio::time::advance(Duration::from_secs(4)).await;

        let snapshot = record.snapshot();
        assert_eq!(snapshot.state, TaskState::AwaitingCallback);
        assert_eq!(snapshot.heartbeat_expires_in, Some(Duration::from_secs(6)));
        assert_eq!(snapshot.task_timeout_in, None);
        assert_eq!(snapshot.cancel_expires_in, None);
    }

    #[tokio::test]
    async fn attach_to_terminal_record_aborts() {
        let record = record("t-3", "p-1");
        record.lock().state = TaskState::Completed;

        let handle = tokio::spawn(std::future::pending::<()>());
        record.attach(handle.abort_handle());
        let err = handle.await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
