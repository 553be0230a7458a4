//! Per-task timeout timers

use std::sync::Arc;
use tether_core::CancelReason;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use crate::cancellation::{CancelPlan, CancellationCoordinator};
use crate::record::RemoteTaskRecord;

/// Arms one timer per dispatched task. Expiry does not fail the task: it
/// records TIMED_OUT as the reason and hands over to cancellation.
#[derive(Clone)]
pub struct TimeoutEnforcer {
    coordinator: CancellationCoordinator,
}

impl TimeoutEnforcer {
    pub fn new(coordinator: CancellationCoordinator) -> Self {
        Self { coordinator }
    }

    pub fn arm(&self, record: &Arc<RemoteTaskRecord>, deadline: Instant) {
        let enforcer = self.clone();
        let task_record = Arc::clone(record);
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            enforcer.fire(&task_record).await;
        });
        record.attach(handle.abort_handle());
    }

    /// Timer expiry. A task that already left AWAITING_CALLBACK is ignored.
    pub async fn fire(&self, record: &Arc<RemoteTaskRecord>) {
        let reason = CancelReason::timed_out(record.options().task_timeout);
        match self.coordinator.request(record, reason, true) {
            Ok(CancelPlan::Proceed { cancel_url, deadline }) => {
                info!(
                    "Task {} timed out after {:?}",
                    record.task_id(),
                    record.options().task_timeout
                );
                if let Err(e) = self.coordinator.execute(record, cancel_url, deadline).await {
                    debug!("Timeout cancellation of {} lost a race: {}", record.task_id(), e);
                }
            }
            Ok(CancelPlan::AlreadyRequested) => {}
            Err(e) => debug!("Timeout for {} ignored: {}", record.task_id(), e),
        }
    }
}
