//! End-to-end tests for the standalone service
//!
//! Each test runs three real HTTP servers on ephemeral ports: a fake remote
//! service, a fake engine receiving webhook reports, and the Tether server
//! itself with the reqwest transport. The remote learns its callback and
//! heartbeat URLs from the rendered dispatch body, exactly as a real remote
//! would.

use anyhow::Result;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::post,
    Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tether_config::{ServerConfig, TetherConfig};
use tether_server::Server;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(10);

fn init_quiet_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::WARN)
        .with_target(false)
        .without_time()
        .try_init();
}

/// How long the fake remote takes before answering
#[derive(Debug, Clone, Copy, Default)]
struct RemoteTiming {
    dispatch: Duration,
    cancel: Duration,
}

#[derive(Clone)]
struct RemoteState {
    base: String,
    timing: RemoteTiming,
    dispatched: mpsc::UnboundedSender<Value>,
    cancelled: mpsc::UnboundedSender<String>,
}

async fn remote_dispatch(
    State(state): State<RemoteState>,
    Path(job): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let _ = state.dispatched.send(body);
    tokio::time::sleep(state.timing.dispatch).await;
    (
        StatusCode::ACCEPTED,
        Json(json!({ "cancelUrl": format!("{}/jobs/{}/cancel", state.base, job) })),
    )
}

async fn remote_cancel(State(state): State<RemoteState>, Path(job): Path<String>) -> StatusCode {
    let _ = state.cancelled.send(job);
    tokio::time::sleep(state.timing.cancel).await;
    StatusCode::OK
}

async fn engine_report(
    State(reports): State<mpsc::UnboundedSender<Value>>,
    Json(report): Json<Value>,
) -> StatusCode {
    let _ = reports.send(report);
    StatusCode::NO_CONTENT
}

async fn spawn_router(router: Router) -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok(addr)
}

struct Environment {
    tether: String,
    remote: String,
    client: reqwest::Client,
    dispatched: mpsc::UnboundedReceiver<Value>,
    cancelled: mpsc::UnboundedReceiver<String>,
    reports: mpsc::UnboundedReceiver<Value>,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<Result<()>>,
}

impl Environment {
    async fn start(configure: impl FnOnce(&mut TetherConfig)) -> Result<Self> {
        Self::start_with(RemoteTiming::default(), configure).await
    }

    async fn start_with(timing: RemoteTiming, configure: impl FnOnce(&mut TetherConfig)) -> Result<Self> {
        init_quiet_logging();

        let remote_listener = TcpListener::bind("127.0.0.1:0").await?;
        let remote = format!("http://{}", remote_listener.local_addr()?);
        let (dispatched_tx, dispatched) = mpsc::unbounded_channel();
        let (cancelled_tx, cancelled) = mpsc::unbounded_channel();
        let remote_app = Router::new()
            .route("/jobs/{job}", post(remote_dispatch))
            .route("/jobs/{job}/cancel", post(remote_cancel))
            .with_state(RemoteState {
                base: remote.clone(),
                timing,
                dispatched: dispatched_tx,
                cancelled: cancelled_tx,
            });
        tokio::spawn(async move {
            let _ = axum::serve(remote_listener, remote_app).await;
        });

        let (reports_tx, reports) = mpsc::unbounded_channel();
        let engine = spawn_router(
            Router::new()
                .route("/reports", post(engine_report))
                .with_state(reports_tx),
        )
        .await?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let tether = format!("http://{}", listener.local_addr()?);

        let mut config = TetherConfig::default();
        config.orchestrator.callback_base_url = tether.clone();
        config.orchestrator.heartbeat_scan_interval = Duration::from_millis(100);
        config.orchestrator.task_defaults.max_retries = 0;
        config.server = Some(ServerConfig {
            engine_webhook_url: Some(format!("http://{}/reports", engine)),
            enable_tracing: false,
            shutdown_timeout: Duration::from_secs(1),
            ..ServerConfig::default()
        });
        configure(&mut config);

        let shutdown = CancellationToken::new();
        let server = Server::new(config)?;
        let server = tokio::spawn(server.serve(listener, shutdown.clone()));

        Ok(Self {
            tether,
            remote,
            client: reqwest::Client::new(),
            dispatched,
            cancelled,
            reports,
            shutdown,
            server,
        })
    }

    async fn create_task(&self, task_id: &str, options: Value) -> Result<reqwest::Response> {
        let body = json!({
            "task_id": task_id,
            "process_instance_id": "proc-e2e",
            "node_name": "remote-step",
            "request": {
                "url": format!("{}/jobs/{}", self.remote, task_id),
                "headers": { "Content-Type": "application/json" },
                "body_template": r#"{"callback":"${callbackUrl}","heartbeat":"${heartbeatUrl}","amount":${amount}}"#
            },
            "options": options,
            "variables": { "amount": 12 }
        });
        Ok(self
            .client
            .post(format!("{}/api/v1/tasks", self.tether))
            .json(&body)
            .send()
            .await?)
    }

    async fn next_dispatch(&mut self) -> Value {
        timeout(WAIT, self.dispatched.recv())
            .await
            .expect("remote was not called")
            .expect("remote channel closed")
    }

    /// Poll the snapshot until the dispatch response has been processed
    async fn wait_until_awaiting(&self, task_id: &str) -> Result<Value> {
        let url = format!("{}/api/v1/tasks/{}", self.tether, task_id);
        let poll = async {
            loop {
                let snapshot: Value = self.client.get(&url).send().await?.json().await?;
                if snapshot["state"] == "AWAITING_CALLBACK" {
                    return Ok::<_, anyhow::Error>(snapshot);
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        timeout(WAIT, poll).await?
    }

    async fn next_report(&mut self) -> Value {
        timeout(WAIT, self.reports.recv())
            .await
            .expect("engine was not notified")
            .expect("engine channel closed")
    }

    async fn stop(self) -> Result<()> {
        self.shutdown.cancel();
        timeout(WAIT, self.server).await??
    }
}

#[tokio::test]
async fn callback_completes_task_end_to_end() -> Result<()> {
    let mut env = Environment::start(|_| {}).await?;

    let response = env.create_task("order-1", json!({ "success_eval_expression": "/approved" })).await?;
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);

    let dispatched = env.next_dispatch().await;
    assert_eq!(dispatched["amount"], 12);
    let callback = dispatched["callback"].as_str().unwrap().to_string();
    assert_eq!(callback, format!("{}/callback/order-1", env.tether));

    let snapshot = env.wait_until_awaiting("order-1").await?;
    assert_eq!(snapshot["process_instance_id"], "proc-e2e");
    assert_eq!(
        snapshot["cancel_url"],
        format!("{}/jobs/order-1/cancel", env.remote)
    );

    let ack = env.client.post(&callback).json(&json!({ "approved": true, "ref": "A-1" })).send().await?;
    assert_eq!(ack.status(), reqwest::StatusCode::ACCEPTED);

    let report = env.next_report().await;
    assert_eq!(report["task_id"], "order-1");
    assert_eq!(report["status"], "COMPLETED");
    assert_eq!(report["result"]["payload"]["ref"], "A-1");

    let late = env.client.post(&callback).json(&json!({ "approved": true })).send().await?;
    assert_eq!(late.status(), reqwest::StatusCode::NOT_FOUND);

    env.stop().await
}

#[tokio::test]
async fn engine_cancel_reaches_remote() -> Result<()> {
    let mut env = Environment::start(|_| {}).await?;

    env.create_task("order-2", json!({})).await?;
    env.next_dispatch().await;
    env.wait_until_awaiting("order-2").await?;

    let response = env
        .client
        .post(format!("{}/api/v1/tasks/order-2/cancel", env.tether))
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);

    let cancelled = timeout(WAIT, env.cancelled.recv()).await?;
    assert_eq!(cancelled.as_deref(), Some("order-2"));

    let report = env.next_report().await;
    assert_eq!(report["state"], "CANCEL_SUCCEEDED");
    assert_eq!(report["status"], "CANCELLED");
    assert_eq!(report["result"]["cancelled"], true);

    env.stop().await
}

#[tokio::test]
async fn slow_cancel_is_bounded_by_cancel_timeout_not_client_timeout() -> Result<()> {
    let timing = RemoteTiming {
        cancel: Duration::from_secs(2),
        ..RemoteTiming::default()
    };
    let mut env = Environment::start_with(timing, |config| {
        config.http.timeout = Duration::from_secs(1);
        config.orchestrator.task_defaults.cancel_timeout = Duration::from_secs(5);
    })
    .await?;

    env.create_task("order-4", json!({})).await?;
    env.next_dispatch().await;
    env.wait_until_awaiting("order-4").await?;

    env.client
        .post(format!("{}/api/v1/tasks/order-4/cancel", env.tether))
        .send()
        .await?;

    let report = env.next_report().await;
    assert_eq!(report["state"], "CANCEL_SUCCEEDED");
    assert_eq!(report["result"]["remote_cancel_failed"], false);

    env.stop().await
}

#[tokio::test]
async fn read_timeout_after_dispatch_is_not_resent() -> Result<()> {
    let timing = RemoteTiming {
        dispatch: Duration::from_secs(2),
        ..RemoteTiming::default()
    };
    let mut env = Environment::start_with(timing, |config| {
        config.http.timeout = Duration::from_secs(1);
        config.orchestrator.task_defaults.max_retries = 2;
        config.orchestrator.task_defaults.retry_delay = Duration::from_millis(50);
    })
    .await?;

    env.create_task("order-5", json!({})).await?;
    env.next_dispatch().await;

    let report = env.next_report().await;
    assert_eq!(report["state"], "FAILED");
    assert_eq!(report["result"]["error"]["kind"], "remote_invocation");
    assert_eq!(report["result"]["error"]["attempts"], 1);
    assert!(env.dispatched.try_recv().is_err(), "the remote ran the job twice");

    env.stop().await
}

#[tokio::test]
async fn silent_remote_is_declared_dead() -> Result<()> {
    let mut env = Environment::start(|config| {
        config.orchestrator.task_defaults.heartbeat_timeout = Duration::from_millis(600);
    })
    .await?;

    env.create_task("order-3", json!({})).await?;
    let dispatched = env.next_dispatch().await;
    let heartbeat = dispatched["heartbeat"].as_str().unwrap().to_string();
    env.wait_until_awaiting("order-3").await?;

    let beat = env.client.post(&heartbeat).send().await?;
    assert_eq!(beat.status(), reqwest::StatusCode::ACCEPTED);

    let report = env.next_report().await;
    assert_eq!(report["state"], "DIED");
    assert_eq!(report["status"], "DIED");
    assert_eq!(report["result"]["error"]["kind"], "dead_remote");
    assert!(env.cancelled.try_recv().is_err(), "a dead remote is not cancelled");

    let beat = env.client.post(&heartbeat).send().await?;
    assert_eq!(beat.status(), reqwest::StatusCode::NOT_FOUND);

    env.stop().await
}

#[tokio::test]
async fn health_endpoint_reports_service_state() -> Result<()> {
    let env = Environment::start(|_| {}).await?;

    let health: Value = env
        .client
        .get(format!("{}/health", env.tether))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["active_tasks"], 0);

    env.stop().await
}
