//! Shared harness for orchestrator scenario tests

#![allow(dead_code)]

use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tether_config::OrchestratorConfig;
use tether_core::{
    RemoteRequest, TaskDescriptor, TaskError, TaskId, TaskObserver, TaskOptions, TaskReport,
};
use tether_http::{HttpMethod, MockReply, MockTransport};
use tether_orchestrator::Orchestrator;
use tokio::sync::mpsc;

pub const REMOTE_URL: &str = "http://remote.test/jobs";

pub fn cancel_url(n: u32) -> String {
    format!("http://remote.test/jobs/{}/cancel", n)
}

/// Forwards resolutions to a channel and keeps retry notifications
pub struct ChannelObserver {
    resolved: mpsc::UnboundedSender<TaskReport>,
    pub retries: Mutex<Vec<(TaskId, u32, Duration)>>,
}

impl TaskObserver for ChannelObserver {
    fn task_resolved(&self, report: &TaskReport) {
        let _ = self.resolved.send(report.clone());
    }

    fn retry_scheduled(&self, task_id: &TaskId, attempt: u32, delay: Duration, _cause: &TaskError) {
        self.retries.lock().push((task_id.clone(), attempt, delay));
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub remote: Arc<MockTransport>,
    pub observer: Arc<ChannelObserver>,
    pub reports: mpsc::UnboundedReceiver<TaskReport>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(OrchestratorConfig {
            callback_base_url: "http://tether.test".to_string(),
            ..OrchestratorConfig::default()
        })
    }

    pub fn with_config(config: OrchestratorConfig) -> Self {
        let remote = Arc::new(MockTransport::new());
        let (tx, reports) = mpsc::unbounded_channel();
        let observer = Arc::new(ChannelObserver {
            resolved: tx,
            retries: Mutex::new(Vec::new()),
        });
        let orchestrator = Orchestrator::builder(config, remote.clone())
            .observer(observer.clone())
            .build();

        Self {
            orchestrator,
            remote,
            observer,
            reports,
        }
    }

    /// Remote accepts dispatch `n` and hands back its cancel endpoint
    pub fn accept_with_cancel(&self, url: &str, n: u32) {
        self.remote.on(
            HttpMethod::Post,
            url,
            MockReply::json(202, json!({ "cancelUrl": cancel_url(n) })),
        );
    }

    pub async fn next_report(&mut self) -> TaskReport {
        self.reports.recv().await.expect("observer channel closed")
    }

    /// No report arrives within `window`
    pub async fn assert_quiet(&mut self, window: Duration) {
        tokio::time::sleep(window).await;
        assert!(self.reports.try_recv().is_err(), "unexpected extra report");
    }
}

pub fn descriptor(id: &str, process: &str, url: &str) -> TaskDescriptor {
    TaskDescriptor::new(process, RemoteRequest::post(url))
        .with_task_id(id)
        .with_node_name("call-remote")
        .with_options(TaskOptions::default().with_retries(0, Duration::from_secs(1)))
}

/// Let spawned dispatch and cancel tasks run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
