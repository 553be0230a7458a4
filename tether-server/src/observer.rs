//! Engine notification for the standalone service

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tether_core::{TaskError, TaskId, TaskObserver, TaskReport};
use tether_http::{HttpError, HttpRequest, HttpResponse, HttpTransport};
use tether_resilience::{RetryExecutor, RetryPolicy, Retryable};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Writes every outcome to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl TaskObserver for LoggingObserver {
    fn task_resolved(&self, report: &TaskReport) {
        match &report.result.error {
            None => info!(
                "Task {} ({}/{}) finished {}",
                report.task_id, report.process_instance_id, report.node_name, report.status
            ),
            Some(error) => info!(
                "Task {} ({}/{}) finished {}: {}",
                report.task_id, report.process_instance_id, report.node_name, report.status, error
            ),
        }
    }

    fn retry_scheduled(&self, task_id: &TaskId, attempt: u32, delay: Duration, cause: &TaskError) {
        info!(
            "Task {} attempt {} failed ({}), next attempt in {:?}",
            task_id, attempt, cause, delay
        );
    }
}

/// Failure of one delivery attempt to the engine
#[derive(Debug)]
enum DeliveryError {
    Http(HttpError),
    Status { status: u16, retry_after: Option<Duration> },
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::Http(e) => write!(f, "{}", e),
            DeliveryError::Status { status, .. } => write!(f, "engine answered {}", status),
        }
    }
}

impl Retryable for DeliveryError {
    fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Http(e) => !matches!(
                e,
                HttpError::InvalidUrl(_) | HttpError::InvalidHeader(_) | HttpError::InvalidMethod(_)
            ),
            DeliveryError::Status { status, .. } => RETRY_ON_STATUS.contains(status),
        }
    }

    fn retry_delay(&self) -> Option<Duration> {
        match self {
            DeliveryError::Status { retry_after, .. } => *retry_after,
            DeliveryError::Http(_) => None,
        }
    }
}

const RETRY_ON_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

/// Upper bound on a server-requested `Retry-After`
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

fn retry_after(response: &HttpResponse) -> Option<Duration> {
    response
        .header("retry-after")
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

/// POSTs each [`TaskReport`] as JSON to the engine. Delivery runs on a
/// spawned task so the resolving path never waits on the engine, and is
/// retried with exponential backoff on network errors and 429/5xx answers.
#[derive(Clone)]
pub struct WebhookObserver {
    transport: Arc<dyn HttpTransport>,
    url: String,
    policy: RetryPolicy,
}

impl WebhookObserver {
    pub fn new(transport: Arc<dyn HttpTransport>, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
            policy: RetryPolicy::exponential(5, Duration::from_millis(500), Duration::from_secs(30)),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

async fn deliver(transport: &dyn HttpTransport, request: HttpRequest) -> Result<(), DeliveryError> {
    let response = transport.send(request).await.map_err(DeliveryError::Http)?;
    if response.is_success() {
        Ok(())
    } else {
        Err(DeliveryError::Status {
            status: response.status,
            retry_after: retry_after(&response),
        })
    }
}

impl TaskObserver for WebhookObserver {
    fn task_resolved(&self, report: &TaskReport) {
        let body = match serde_json::to_string(report) {
            Ok(body) => body,
            Err(e) => {
                warn!("Could not serialize report for task {}: {}", report.task_id, e);
                return;
            }
        };
        let Ok(runtime) = Handle::try_current() else {
            warn!("No runtime to deliver report for task {}", report.task_id);
            return;
        };

        let request = HttpRequest::post(self.url.clone())
            .with_header("Content-Type", "application/json")
            .with_body(body);
        let transport = Arc::clone(&self.transport);
        let executor = RetryExecutor::new(self.policy.clone());
        let task_id = report.task_id.clone();

        runtime.spawn(async move {
            let outcome = executor
                .execute(|| deliver(transport.as_ref(), request.clone()))
                .await;
            match outcome {
                Ok(()) => debug!("Engine accepted report for task {}", task_id),
                Err(e) => {
                    let attempts = e.attempts();
                    warn!(
                        "Giving up on report for task {} after {} attempt(s): {}",
                        task_id,
                        attempts,
                        e.into_inner()
                    );
                }
            }
        });
    }
}
