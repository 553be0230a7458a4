//! Outbound dispatch with retry on connection failure

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tether_core::{TaskError, TaskObserver, TaskResult, TaskState};
use tether_http::{HttpError, HttpResponse, HttpTransport};
use tether_resilience::{RetryError, RetryExecutor, RetryPolicy, Retryable};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::record::RemoteTaskRecord;
use crate::resolver::Resolver;
use crate::timeout::TimeoutEnforcer;

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The remote accepted the call; the task awaits its callback
    Dispatched,
    /// Dispatch gave up and the task resolved FAILED
    Failed(TaskError),
    /// The task left the dispatch path while a request was in flight
    Superseded,
}

/// Failure of a single attempt
#[derive(Debug, Clone)]
enum AttemptError {
    Http(HttpError),
    Rejected { status: u16 },
    Superseded(TaskState),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Http(e) => write!(f, "{}", e),
            AttemptError::Rejected { status } => write!(f, "remote rejected request with status {}", status),
            AttemptError::Superseded(state) => write!(f, "task moved to {} during dispatch", state),
        }
    }
}

impl Retryable for AttemptError {
    fn is_retryable(&self) -> bool {
        matches!(self, AttemptError::Http(e) if e.is_connection_failure())
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn HttpTransport>,
    resolver: Resolver,
    timeouts: TimeoutEnforcer,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn HttpTransport>, resolver: Resolver, timeouts: TimeoutEnforcer) -> Self {
        Self {
            transport,
            resolver,
            timeouts,
        }
    }

    /// Send the record's request, retrying connection failures up to
    /// `max_retries` times with a fixed `retry_delay`.
    pub async fn dispatch(&self, record: &Arc<RemoteTaskRecord>) -> DispatchOutcome {
        let options = record.options();
        let executor = RetryExecutor::new(RetryPolicy::fixed(options.max_retries, options.retry_delay));
        let observer = self.resolver.observer();

        let outcome = executor
            .execute_with_hooks(
                move |attempt| self.attempt(record, attempt),
                move |attempt, error, delay| self.schedule_retry(record, observer, attempt, error, delay),
            )
            .await;

        match outcome {
            Ok(response) => self.accept(record, &response),
            Err(err) => self.give_up(record, err),
        }
    }

    async fn attempt(&self, record: &Arc<RemoteTaskRecord>, attempt: u32) -> Result<HttpResponse, AttemptError> {
        record
            .advance(&[TaskState::Pending, TaskState::RetryPending], TaskState::Sending)
            .map_err(AttemptError::Superseded)?;

        debug!(
            "Dispatching task {} (attempt {}) to {} {}",
            record.task_id(),
            attempt,
            record.request().method,
            record.request().url
        );

        let response = self
            .transport
            .send(record.request().clone())
            .await
            .map_err(AttemptError::Http)?;

        if !response.is_success() {
            return Err(AttemptError::Rejected {
                status: response.status,
            });
        }
        Ok(response)
    }

    fn schedule_retry(
        &self,
        record: &RemoteTaskRecord,
        observer: &Arc<dyn TaskObserver>,
        attempt: u32,
        error: &AttemptError,
        delay: Duration,
    ) {
        {
            let mut inner = record.lock();
            if inner.state != TaskState::Sending {
                return;
            }
            inner.state = TaskState::RetryPending;
            inner.retry_count += 1;
        }

        warn!(
            "Dispatch of task {} failed on attempt {}: {}; retrying in {:?}",
            record.task_id(),
            attempt,
            error,
            delay
        );
        observer.retry_scheduled(
            record.task_id(),
            attempt,
            delay,
            &TaskError::TransportFailure {
                message: error.to_string(),
            },
        );
    }

    fn accept(&self, record: &Arc<RemoteTaskRecord>, response: &HttpResponse) -> DispatchOutcome {
        let options = record.options();
        let cancel_url = extract_cancel_url(response, &options.cancel_url_pointer);
        let now = Instant::now();

        let timeout_deadline = {
            let mut inner = record.lock();
            if inner.state != TaskState::Sending {
                debug!(
                    "Discarding dispatch response for task {}: already {}",
                    record.task_id(),
                    inner.state
                );
                return DispatchOutcome::Superseded;
            }

            inner.state = TaskState::AwaitingCallback;
            inner.cancel_url = cancel_url;
            if options.heartbeat_enabled() {
                inner.heartbeat_deadline = Some(now + options.heartbeat_timeout);
            }
            if options.task_timeout_enabled() {
                inner.task_timeout_deadline = Some(now + options.task_timeout);
            }
            inner.task_timeout_deadline
        };

        if let Some(deadline) = timeout_deadline {
            self.timeouts.arm(record, deadline);
        }

        info!(
            "Task {} dispatched (status {}), awaiting callback",
            record.task_id(),
            response.status
        );
        DispatchOutcome::Dispatched
    }

    fn give_up(&self, record: &Arc<RemoteTaskRecord>, err: RetryError<AttemptError>) -> DispatchOutcome {
        let attempts = err.attempts();
        let error = match err.into_inner() {
            AttemptError::Superseded(state) => {
                debug!("Dispatch of task {} stopped: task is {}", record.task_id(), state);
                return DispatchOutcome::Superseded;
            }
            AttemptError::Rejected { status } => TaskError::RemoteInvocation {
                attempts,
                message: format!("remote rejected request with status {}", status),
                status_code: Some(status),
            },
            AttemptError::Http(e) => TaskError::RemoteInvocation {
                attempts,
                message: e.to_string(),
                status_code: None,
            },
        };

        match self.resolver.finish(
            record,
            &[TaskState::Sending],
            TaskState::Failed,
            TaskResult::failed(error.clone()),
        ) {
            Ok(_) => DispatchOutcome::Failed(error),
            Err(e) => {
                debug!("Dispatch failure for {} discarded: {}", record.task_id(), e);
                DispatchOutcome::Superseded
            }
        }
    }
}

fn extract_cancel_url(response: &HttpResponse, pointer: &str) -> Option<String> {
    if pointer.is_empty() {
        return None;
    }
    let body = response.json().ok()?;
    body.pointer(pointer)
        .and_then(|value| value.as_str())
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}
