//! Competing resolution signals: every task is reported exactly once

mod common;

use common::{cancel_url, descriptor, Harness, REMOTE_URL};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tether_config::OrchestratorConfig;
use tether_core::{TaskError, TaskId, TaskState};
use tether_http::{HttpMethod, MockReply};
use tokio::sync::Barrier;

const TASKS: u32 = 64;

fn job_url(n: u32) -> String {
    format!("{}/{}", REMOTE_URL, n)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_signals_resolve_each_task_once() {
    let mut h = Harness::with_config(OrchestratorConfig {
        callback_base_url: "http://tether.test".to_string(),
        heartbeat_scan_interval: Duration::from_millis(5),
        ..OrchestratorConfig::default()
    });
    h.orchestrator.start_monitoring();

    let mut ids = Vec::new();
    for n in 0..TASKS {
        h.accept_with_cancel(&job_url(n), n);
        h.remote.on(HttpMethod::Post, &cancel_url(n), MockReply::status(200));

        // Groups of four share a process so failed callbacks fan out to siblings
        let mut task = descriptor(&format!("t-{}", n), &format!("proc-{}", n / 4), &job_url(n));
        task.options = task
            .options
            .with_heartbeat_timeout(Duration::from_millis(60))
            .with_success_expression("/ok");
        ids.push(h.orchestrator.start(task).unwrap());
    }

    // Wait for every dispatch to land
    for id in &ids {
        while matches!(
            h.orchestrator.snapshot(id).map(|s| s.state),
            Ok(TaskState::Pending | TaskState::Sending)
        ) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    // Release callbacks and cancels together, close to heartbeat expiry
    tokio::time::sleep(Duration::from_millis(50)).await;
    let barrier = Arc::new(Barrier::new(ids.len() * 2));
    let mut signals = Vec::new();
    for (n, id) in ids.iter().enumerate() {
        let orchestrator = h.orchestrator.clone();
        let gate = Arc::clone(&barrier);
        let task_id = id.clone();
        signals.push(tokio::spawn(async move {
            gate.wait().await;
            orchestrator
                .on_callback(&task_id, json!({ "ok": n % 3 != 0 }))
                .map(|_| ())
        }));

        let orchestrator = h.orchestrator.clone();
        let gate = Arc::clone(&barrier);
        let task_id = id.clone();
        signals.push(tokio::spawn(async move {
            gate.wait().await;
            orchestrator.cancel(&task_id)
        }));
    }
    for signal in signals {
        if let Err(e) = signal.await.unwrap() {
            assert!(e.is_absorbed_signal(), "signal failed unexpectedly: {e:?}");
        }
    }

    let mut seen: HashMap<TaskId, u32> = HashMap::new();
    while seen.len() < ids.len() {
        let report = tokio::time::timeout(Duration::from_secs(5), h.next_report())
            .await
            .expect("a task was never resolved");
        assert!(report.state.is_terminal(), "non-terminal report {:?}", report.state);
        *seen.entry(report.task_id).or_default() += 1;
    }
    h.assert_quiet(Duration::from_millis(200)).await;

    assert!(seen.values().all(|&count| count == 1), "duplicate reports: {seen:?}");
    for n in 0..TASKS {
        assert!(h.remote.calls_to(HttpMethod::Post, &cancel_url(n)).len() <= 1);
    }
    assert_eq!(h.orchestrator.active_tasks(), 0);
    h.orchestrator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn task_timeout_and_heartbeat_expiry_at_same_instant() {
    let mut h = Harness::with_config(OrchestratorConfig {
        callback_base_url: "http://tether.test".to_string(),
        heartbeat_scan_interval: Duration::from_secs(1),
        ..OrchestratorConfig::default()
    });
    h.accept_with_cancel(REMOTE_URL, 1);
    h.remote.on(HttpMethod::Post, &cancel_url(1), MockReply::status(200));
    h.orchestrator.start_monitoring();

    let mut task = descriptor("t-1", "proc-1", REMOTE_URL);
    task.options = task
        .options
        .with_task_timeout(Duration::from_secs(10))
        .with_heartbeat_timeout(Duration::from_secs(10));
    h.orchestrator.start(task).unwrap();

    let report = h.next_report().await;
    match report.state {
        TaskState::CancelSucceeded => {
            assert_eq!(
                report.reason.and_then(|r| r.cause),
                Some(TaskError::Timeout { after: Duration::from_secs(10) })
            );
            assert_eq!(h.remote.calls_to(HttpMethod::Post, &cancel_url(1)).len(), 1);
        }
        TaskState::Died => {
            assert!(h.remote.calls_to(HttpMethod::Post, &cancel_url(1)).is_empty());
        }
        other => panic!("unexpected terminal state {other}"),
    }

    h.assert_quiet(Duration::from_secs(30)).await;
    assert_eq!(h.orchestrator.active_tasks(), 0);
    h.orchestrator.shutdown().await;
}
