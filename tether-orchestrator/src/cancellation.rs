//! Two-phase cancellation: remote cancel attempt bounded by a deadline,
//! then local fallback completion.

use std::sync::Arc;
use tether_core::{CancelReason, OrchestratorError, TaskReport, TaskResult, TaskState};
use tether_http::{HttpRequest, HttpTransport};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::record::RemoteTaskRecord;
use crate::resolver::Resolver;

/// What a cancel request found when it looked at the record
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CancelPlan {
    /// The record is now CANCEL_REQUESTED and this caller owns the protocol
    Proceed {
        cancel_url: Option<String>,
        deadline: Instant,
    },
    /// Someone else already started cancelling
    AlreadyRequested,
}

#[derive(Clone)]
pub struct CancellationCoordinator {
    transport: Arc<dyn HttpTransport>,
    resolver: Resolver,
}

impl CancellationCoordinator {
    pub fn new(transport: Arc<dyn HttpTransport>, resolver: Resolver) -> Self {
        Self { transport, resolver }
    }

    /// Move the record into CANCEL_REQUESTED and capture `reason`.
    ///
    /// With `from_timeout` the record must still be AWAITING_CALLBACK and
    /// passes through TIMED_OUT on the way. Otherwise any live state that
    /// allows cancellation is accepted.
    pub(crate) fn request(
        &self,
        record: &RemoteTaskRecord,
        reason: CancelReason,
        from_timeout: bool,
    ) -> Result<CancelPlan, OrchestratorError> {
        let mut inner = record.lock();
        let current = inner.state;

        if current.is_terminal() {
            return Err(OrchestratorError::AlreadyResolved {
                task_id: record.task_id().clone(),
                state: current,
            });
        }
        if current == TaskState::CancelRequested {
            debug!("Task {} is already being cancelled", record.task_id());
            return Ok(CancelPlan::AlreadyRequested);
        }

        if from_timeout {
            if current != TaskState::AwaitingCallback {
                return Err(OrchestratorError::NotAwaitingCallback {
                    task_id: record.task_id().clone(),
                    state: current,
                });
            }
            inner.state = TaskState::TimedOut;
        }

        if !inner.state.can_transition_to(TaskState::CancelRequested) {
            return Err(OrchestratorError::NotAwaitingCallback {
                task_id: record.task_id().clone(),
                state: inner.state,
            });
        }

        let deadline = Instant::now() + record.options().cancel_timeout;
        inner.state = TaskState::CancelRequested;
        inner.cancel_timeout_deadline = Some(deadline);
        inner.cancel_reason.get_or_insert(reason);

        info!(
            "Cancelling task {} from {} (deadline in {:?})",
            record.task_id(),
            current,
            record.options().cancel_timeout
        );

        Ok(CancelPlan::Proceed {
            cancel_url: inner.cancel_url.clone(),
            deadline,
        })
    }

    /// Run the remote-cancel attempt and resolve the record either way
    pub(crate) async fn execute(
        &self,
        record: &Arc<RemoteTaskRecord>,
        cancel_url: Option<String>,
        deadline: Instant,
    ) -> Result<TaskReport, OrchestratorError> {
        let expected = [TaskState::CancelRequested];

        let Some(url) = cancel_url else {
            debug!("Task {} has no cancel handle, completing locally", record.task_id());
            return self.resolver.finish(
                record,
                &expected,
                TaskState::CancelTimedOut,
                TaskResult::cancel_unacknowledged("no cancel handle"),
            );
        };

        // Bounded by the cancel deadline, not the client's own timeout
        let request =
            HttpRequest::post(url.clone()).with_timeout(deadline.saturating_duration_since(Instant::now()));
        let outcome = match timeout_at(deadline, self.transport.send(request)).await {
            Ok(Ok(response)) if response.is_success() => {
                return self.resolver.finish(
                    record,
                    &expected,
                    TaskState::CancelSucceeded,
                    TaskResult::cancel_acknowledged(response.status),
                );
            }
            Ok(Ok(response)) => format!("cancel endpoint answered {}", response.status),
            Ok(Err(e)) => format!("cancel request failed: {}", e),
            Err(_) => "cancel deadline elapsed".to_string(),
        };

        warn!(
            "Remote cancel for task {} at {} did not succeed ({}), completing locally",
            record.task_id(),
            url,
            outcome
        );
        self.resolver.finish(
            record,
            &expected,
            TaskState::CancelTimedOut,
            TaskResult::cancel_unacknowledged(outcome),
        )
    }

    /// Full protocol inline: request, then execute
    pub async fn cancel(
        &self,
        record: &Arc<RemoteTaskRecord>,
        reason: CancelReason,
    ) -> Result<Option<TaskReport>, OrchestratorError> {
        match self.request(record, reason, false)? {
            CancelPlan::Proceed { cancel_url, deadline } => {
                self.execute(record, cancel_url, deadline).await.map(Some)
            }
            CancelPlan::AlreadyRequested => Ok(None),
        }
    }

    /// Request cancellation now and run the remote phase in the background.
    /// Errors (unknown state, already resolved) are reported synchronously.
    pub fn spawn_cancel(
        &self,
        record: &Arc<RemoteTaskRecord>,
        reason: CancelReason,
    ) -> Result<(), OrchestratorError> {
        if let CancelPlan::Proceed { cancel_url, deadline } = self.request(record, reason, false)? {
            let coordinator = self.clone();
            let task_record = Arc::clone(record);
            let handle = tokio::spawn(async move {
                if let Err(e) = coordinator.execute(&task_record, cancel_url, deadline).await {
                    debug!("Cancellation of {} lost a race: {}", task_record.task_id(), e);
                }
            });
            record.attach(handle.abort_handle());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::record;
    use crate::registry::TaskRegistry;
    use std::time::Duration;
    use tether_core::{NoopObserver, ReportedStatus, TaskError};
    use tether_http::{HttpMethod, MockReply, MockTransport};

    fn coordinator(mock: Arc<MockTransport>) -> CancellationCoordinator {
        CancellationCoordinator::new(mock, Resolver::new(TaskRegistry::new(), Arc::new(NoopObserver)))
    }

    fn awaiting(cancel_url: Option<&str>) -> Arc<RemoteTaskRecord> {
        let record = record("t", "p");
        {
            let mut inner = record.lock();
            inner.state = TaskState::AwaitingCallback;
            inner.cancel_url = cancel_url.map(str::to_string);
        }
        record
    }

    #[tokio::test(start_paused = true)]
    async fn acknowledged_cancel_succeeds() {
        let mock = Arc::new(MockTransport::new());
        mock.on(HttpMethod::Post, "http://remote/cancel/t", MockReply::status(202));
        let record = awaiting(Some("http://remote/cancel/t"));

        let report = coordinator(mock.clone())
            .cancel(&record, CancelReason::requested())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.state, TaskState::CancelSucceeded);
        assert_eq!(report.status, ReportedStatus::Cancelled);
        assert!(report.result.cancelled);
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_request_carries_remaining_deadline() {
        let mock = Arc::new(MockTransport::new());
        mock.on(HttpMethod::Post, "http://remote/cancel/t", MockReply::status(200));
        let record = awaiting(Some("http://remote/cancel/t"));

        coordinator(mock.clone())
            .cancel(&record, CancelReason::requested())
            .await
            .unwrap();

        let calls = mock.calls();
        assert_eq!(calls[0].timeout, Some(record.options().cancel_timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_remote_hits_the_deadline() {
        let mock = Arc::new(MockTransport::new());
        mock.on(
            HttpMethod::Post,
            "http://remote/cancel/t",
            MockReply::status(200).after(Duration::from_secs(10)),
        );
        let record = awaiting(Some("http://remote/cancel/t"));
        let started = Instant::now();

        let report = coordinator(mock)
            .cancel(&record, CancelReason::requested())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.state, TaskState::CancelTimedOut);
        assert!(report.result.remote_cancel_failed);
        let elapsed = started.elapsed();
        assert!(elapsed >= record.options().cancel_timeout);
        assert!(elapsed < record.options().cancel_timeout + Duration::from_secs(1));
    }

    #[tokio::test]
    async fn rejected_cancel_falls_back() {
        let mock = Arc::new(MockTransport::new());
        mock.on(HttpMethod::Post, "http://remote/cancel/t", MockReply::status(500));
        let record = awaiting(Some("http://remote/cancel/t"));

        let report = coordinator(mock)
            .cancel(&record, CancelReason::requested())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.state, TaskState::CancelTimedOut);
        assert_eq!(
            report.result.error,
            Some(TaskError::CancelUnacknowledged {
                reason: "cancel endpoint answered 500".into()
            })
        );
    }

    #[tokio::test]
    async fn second_request_is_absorbed() {
        let mock = Arc::new(MockTransport::new());
        let coordinator = coordinator(mock);
        let record = awaiting(None);

        let first = coordinator.request(&record, CancelReason::requested(), false).unwrap();
        assert!(matches!(first, CancelPlan::Proceed { cancel_url: None, .. }));
        let second = coordinator
            .request(&record, CancelReason::timed_out(Duration::from_secs(1)), false)
            .unwrap();
        assert_eq!(second, CancelPlan::AlreadyRequested);
        assert_eq!(
            record.lock().cancel_reason.as_ref().map(|r| r.status),
            Some(ReportedStatus::Cancelled)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_shows_cancel_deadline() {
        let coordinator = coordinator(Arc::new(MockTransport::new()));
        let record = awaiting(Some("http://remote/cancel/t"));

        coordinator.request(&record, CancelReason::requested(), false).unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        let snapshot = record.snapshot();
        assert_eq!(snapshot.state, TaskState::CancelRequested);
        assert_eq!(
            snapshot.cancel_expires_in,
            Some(record.options().cancel_timeout - Duration::from_secs(2))
        );
    }

    #[tokio::test]
    async fn timeout_requires_awaiting_callback() {
        let coordinator = coordinator(Arc::new(MockTransport::new()));
        let record = record("t", "p");
        record.lock().state = TaskState::RetryPending;

        let err = coordinator
            .request(&record, CancelReason::timed_out(Duration::from_secs(1)), true)
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NotAwaitingCallback { .. }));
        assert_eq!(record.state(), TaskState::RetryPending);
    }
}
