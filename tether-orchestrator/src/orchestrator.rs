//! Orchestrator facade

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tether_config::OrchestratorConfig;
use tether_core::{
    CancelReason, NoopObserver, OrchestratorError, RenderContext, RequestRenderer, Result,
    TaskDescriptor, TaskId, TaskObserver, TaskReport, TaskSnapshot,
};
use tether_http::{HttpRequest, HttpTransport};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::callback::CallbackReceiver;
use crate::cancellation::CancellationCoordinator;
use crate::dispatcher::Dispatcher;
use crate::heartbeat::{HeartbeatAck, HeartbeatMonitor};
use crate::predicate::SuccessPredicate;
use crate::record::RemoteTaskRecord;
use crate::registry::TaskRegistry;
use crate::render::PlaceholderRenderer;
use crate::resolver::Resolver;
use crate::timeout::TimeoutEnforcer;

pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    transport: Arc<dyn HttpTransport>,
    observer: Arc<dyn TaskObserver>,
    renderer: Arc<dyn RequestRenderer>,
}

impl OrchestratorBuilder {
    pub fn observer(mut self, observer: Arc<dyn TaskObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn RequestRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn build(self) -> Orchestrator {
        let registry = TaskRegistry::new();
        let resolver = Resolver::new(registry.clone(), self.observer);
        let coordinator = CancellationCoordinator::new(self.transport.clone(), resolver.clone());
        let timeouts = TimeoutEnforcer::new(coordinator.clone());
        let dispatcher = Dispatcher::new(self.transport, resolver.clone(), timeouts);
        let callbacks = CallbackReceiver::new(registry.clone(), resolver.clone(), coordinator.clone());
        let heartbeats = HeartbeatMonitor::new(
            registry.clone(),
            resolver,
            self.config.heartbeat_scan_interval,
        );

        Orchestrator {
            inner: Arc::new(Inner {
                config: self.config,
                registry,
                renderer: self.renderer,
                dispatcher,
                callbacks,
                heartbeats,
                coordinator,
                shutdown: CancellationToken::new(),
                monitor: Mutex::new(None),
            }),
        }
    }
}

struct Inner {
    config: OrchestratorConfig,
    registry: TaskRegistry,
    renderer: Arc<dyn RequestRenderer>,
    dispatcher: Dispatcher,
    callbacks: CallbackReceiver,
    heartbeats: HeartbeatMonitor,
    coordinator: CancellationCoordinator,
    shutdown: CancellationToken,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

/// Entry point for the engine. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn builder(config: OrchestratorConfig, transport: Arc<dyn HttpTransport>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            transport,
            observer: Arc::new(NoopObserver),
            renderer: Arc::new(PlaceholderRenderer::new()),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Start the background heartbeat scan. Calling it again is a no-op.
    pub fn start_monitoring(&self) {
        let mut monitor = self.inner.monitor.lock();
        if monitor.is_none() && !self.inner.shutdown.is_cancelled() {
            *monitor = Some(self.inner.heartbeats.clone().spawn(self.inner.shutdown.clone()));
        }
    }

    /// Stop the heartbeat scan and abandon every live task. Abandoned tasks
    /// are not reported.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();

        let monitor = self.inner.monitor.lock().take();
        if let Some(handle) = monitor {
            if let Err(e) = handle.await {
                warn!("Heartbeat monitor ended abnormally: {}", e);
            }
        }

        let abandoned = self.inner.registry.drain();
        for record in &abandoned {
            for handle in record.lock().take_background() {
                handle.abort();
            }
        }
        info!("Orchestrator stopped, {} live task(s) abandoned", abandoned.len());
    }

    pub fn callback_url(&self, task_id: &TaskId) -> String {
        format!(
            "{}/callback/{}",
            self.inner.config.callback_base_url.trim_end_matches('/'),
            task_id
        )
    }

    pub fn heartbeat_url(&self, task_id: &TaskId) -> String {
        format!(
            "{}/heartbeat/{}",
            self.inner.config.callback_base_url.trim_end_matches('/'),
            task_id
        )
    }

    /// Validate, render and register the task, then dispatch it in the
    /// background. Returns once the task is registered.
    pub fn start(&self, descriptor: TaskDescriptor) -> Result<TaskId> {
        if self.inner.shutdown.is_cancelled() {
            return Err(OrchestratorError::ShuttingDown);
        }
        descriptor.validate()?;

        let predicate = descriptor
            .options
            .success_eval_expression
            .as_deref()
            .map(SuccessPredicate::parse)
            .transpose()
            .map_err(|e| OrchestratorError::InvalidDescriptor(e.to_string()))?;

        let task_id = descriptor.task_id.clone().unwrap_or_else(TaskId::generate);
        let request = self.render_request(&task_id, &descriptor)?;

        let record = Arc::new(RemoteTaskRecord::new(
            task_id.clone(),
            descriptor.process_instance_id,
            descriptor.node_name,
            request,
            descriptor.options,
            predicate,
        ));
        self.inner
            .registry
            .insert_bounded(Arc::clone(&record), self.inner.config.max_active_tasks)?;
        // Shutdown may have drained the registry since the first check
        if self.inner.shutdown.is_cancelled() {
            self.inner.registry.remove(&record);
            return Err(OrchestratorError::ShuttingDown);
        }

        let dispatcher = self.inner.dispatcher.clone();
        let task_record = Arc::clone(&record);
        let handle = tokio::spawn(async move {
            let outcome = dispatcher.dispatch(&task_record).await;
            debug!("Dispatch of {} finished: {:?}", task_record.task_id(), outcome);
        });
        record.attach(handle.abort_handle());

        info!("Task {} started for process {}", task_id, record.process_instance_id());
        Ok(task_id)
    }

    fn render_request(&self, task_id: &TaskId, descriptor: &TaskDescriptor) -> Result<HttpRequest> {
        let mut context = RenderContext::new()
            .with("taskId", task_id.as_str())
            .with("processInstanceId", descriptor.process_instance_id.as_str())
            .with("nodeName", descriptor.node_name.as_str())
            .with("callbackUrl", self.callback_url(task_id))
            .with("heartbeatUrl", self.heartbeat_url(task_id));
        context.extend_variables(&descriptor.variables);

        let render = |template: &str| {
            self.inner
                .renderer
                .render_request_body(template, &context)
                .map_err(|e| OrchestratorError::Render(e.to_string()))
        };

        let remote = &descriptor.request;
        let mut request = HttpRequest::new(remote.method, render(&remote.url)?);
        for (name, value) in &remote.headers {
            request = request.with_header(name.clone(), render(value)?);
        }
        if let Some(template) = &remote.body_template {
            request = request.with_body(render(template)?);
        }
        Ok(request)
    }

    /// Explicit cancel signal from the engine. The remote phase runs in the
    /// background; the outcome reaches the observer.
    pub fn cancel(&self, task_id: &TaskId) -> Result<()> {
        let record = self
            .inner
            .registry
            .get(task_id)
            .ok_or_else(|| OrchestratorError::UnknownTask(task_id.clone()))?;
        self.inner.coordinator.spawn_cancel(&record, CancelReason::requested())
    }

    pub fn on_callback(&self, task_id: &TaskId, payload: Value) -> Result<TaskReport> {
        self.inner.callbacks.on_callback(task_id, payload)
    }

    pub fn on_heartbeat(&self, task_id: &TaskId) -> Result<HeartbeatAck> {
        self.inner.heartbeats.record_heartbeat(task_id)
    }

    pub fn snapshot(&self, task_id: &TaskId) -> Result<TaskSnapshot> {
        self.inner
            .registry
            .get(task_id)
            .map(|record| record.snapshot())
            .ok_or_else(|| OrchestratorError::UnknownTask(task_id.clone()))
    }

    pub fn active_tasks(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}
