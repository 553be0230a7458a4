//! Liveness tracking

use std::sync::Arc;
use std::time::Duration;
use tether_core::{OrchestratorError, TaskError, TaskId, TaskResult, TaskState};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::record::RemoteTaskRecord;
use crate::registry::TaskRegistry;
use crate::resolver::Resolver;

/// Result of an inbound heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAck {
    /// The liveness deadline moved forward
    Refreshed,
    /// Task has no heartbeat timeout or is not awaiting its callback
    Ignored,
}

/// Recurring in-memory scan that declares silent tasks DIED. The scan
/// never touches the network.
#[derive(Clone)]
pub struct HeartbeatMonitor {
    registry: TaskRegistry,
    resolver: Resolver,
    scan_interval: Duration,
}

impl HeartbeatMonitor {
    pub fn new(registry: TaskRegistry, resolver: Resolver, scan_interval: Duration) -> Self {
        Self {
            registry,
            resolver,
            scan_interval,
        }
    }

    pub fn record_heartbeat(&self, task_id: &TaskId) -> Result<HeartbeatAck, OrchestratorError> {
        let record = self
            .registry
            .get(task_id)
            .ok_or_else(|| OrchestratorError::UnknownTask(task_id.clone()))?;

        let timeout = record.options().heartbeat_timeout;
        let mut inner = record.lock();
        if inner.state != TaskState::AwaitingCallback || timeout.is_zero() {
            debug!("Heartbeat for {} ignored in state {}", task_id, inner.state);
            return Ok(HeartbeatAck::Ignored);
        }

        inner.heartbeat_deadline = Some(Instant::now() + timeout);
        debug!("Heartbeat for {} extends liveness by {:?}", task_id, timeout);
        Ok(HeartbeatAck::Refreshed)
    }

    /// One pass over the registry; returns how many tasks were declared dead
    pub fn scan_once(&self, now: Instant) -> usize {
        let mut died = 0;
        for record in self.registry.records() {
            let Some(silent_for) = expired(&record, now) else {
                continue;
            };

            let error = TaskError::DeadRemote { silent_for };
            match self.resolver.finish(
                &record,
                &[TaskState::AwaitingCallback],
                TaskState::Died,
                TaskResult::failed(error),
            ) {
                Ok(_) => {
                    warn!("Task {} died: no heartbeat for {:?}", record.task_id(), silent_for);
                    died += 1;
                }
                Err(e) => debug!("Liveness expiry for {} lost a race: {}", record.task_id(), e),
            }
        }
        died
    }

    /// Scan every `scan_interval` until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval(self.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Heartbeat monitor started (every {:?})", self.scan_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.scan_once(Instant::now());
                }
            }
        }

        info!("Heartbeat monitor stopped");
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

/// Silence duration when the deadline has passed
fn expired(record: &Arc<RemoteTaskRecord>, now: Instant) -> Option<Duration> {
    let inner = record.lock();
    if inner.state != TaskState::AwaitingCallback {
        return None;
    }
    let deadline = inner.heartbeat_deadline?;
    (now > deadline).then(|| record.options().heartbeat_timeout + (now - deadline))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::record;
    use tether_core::NoopObserver;

    fn monitor() -> (HeartbeatMonitor, TaskRegistry) {
        let registry = TaskRegistry::new();
        let resolver = Resolver::new(registry.clone(), Arc::new(NoopObserver));
        (
            HeartbeatMonitor::new(registry.clone(), resolver, Duration::from_secs(1)),
            registry,
        )
    }

    fn live(registry: &TaskRegistry, id: &str, deadline: Option<Instant>) -> Arc<RemoteTaskRecord> {
        let record = record(id, "p");
        {
            let mut inner = record.lock();
            inner.state = TaskState::AwaitingCallback;
            inner.heartbeat_deadline = deadline;
        }
        registry.insert(record.clone()).unwrap();
        record
    }

    #[tokio::test(start_paused = true)]
    async fn scan_only_kills_expired_tasks() {
        let (monitor, registry) = monitor();
        let now = Instant::now();
        let stale = live(&registry, "stale", Some(now - Duration::from_millis(1)));
        let fresh = live(&registry, "fresh", Some(now + Duration::from_secs(5)));
        let unchecked = live(&registry, "unchecked", None);

        assert_eq!(monitor.scan_once(now), 1);
        assert_eq!(stale.state(), TaskState::Died);
        assert_eq!(fresh.state(), TaskState::AwaitingCallback);
        assert_eq!(unchecked.state(), TaskState::AwaitingCallback);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_is_exclusive() {
        let (monitor, registry) = monitor();
        let now = Instant::now();
        let record = live(&registry, "edge", Some(now));
        assert_eq!(monitor.scan_once(now), 0);
        assert_eq!(record.state(), TaskState::AwaitingCallback);
    }

    #[tokio::test]
    async fn heartbeat_for_unknown_task() {
        let (monitor, _) = monitor();
        assert!(matches!(
            monitor.record_heartbeat(&TaskId::from("ghost")),
            Err(OrchestratorError::UnknownTask(_))
        ));
    }

    #[tokio::test]
    async fn heartbeat_without_timeout_is_ignored() {
        let (monitor, registry) = monitor();
        live(&registry, "t", None);
        assert_eq!(
            monitor.record_heartbeat(&TaskId::from("t")).unwrap(),
            HeartbeatAck::Ignored
        );
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let (monitor, _) = monitor();
        let token = CancellationToken::new();
        let handle = monitor.spawn(token.clone());
        tokio::time::sleep(Duration::from_secs(3)).await;
        token.cancel();
        handle.await.unwrap();
    }
}
